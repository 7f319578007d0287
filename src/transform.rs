use nalgebra::{Matrix3, Matrix4, Quaternion, UnitQuaternion, Vector3};
use simba::simd::{SimdRealField, SimdValue};

use crate::arena::{DepthIdx, NodeId, TransformHandle};
use crate::geometry::{
    LANES, SimdFloatType, WorldMatrix, WorldMatrix8, WorldQuaternion, WorldQuaternion8,
    WorldVector, WorldVector8,
};
use crate::slab::{LanePack, Rebase};

/// Position, orientation and scale of a single node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: WorldVector,
    pub orientation: WorldQuaternion,
    pub scale: WorldVector,
}

impl Transform {
    pub fn new(position: WorldVector, orientation: WorldQuaternion, scale: WorldVector) -> Self {
        Transform {
            position,
            orientation,
            scale,
        }
    }

    pub fn from_position(position: WorldVector) -> Self {
        Transform {
            position,
            ..Default::default()
        }
    }

    pub fn to_matrix(&self) -> WorldMatrix {
        compose_matrix(&self.position, &self.orientation, &self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            position: WorldVector::zeros(),
            orientation: WorldQuaternion::identity(),
            scale: WorldVector::repeat(1.0),
        }
    }
}

/// Translation * rotation * scale.
pub fn compose_matrix<T: SimdRealField>(
    position: &Vector3<T>,
    orientation: &UnitQuaternion<T>,
    scale: &Vector3<T>,
) -> Matrix4<T>
where
    T::Element: SimdRealField,
{
    let linear =
        orientation.clone().to_rotation_matrix().into_inner() * Matrix3::from_diagonal(scale);
    let mut m = linear.to_homogeneous();
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(position);
    m
}

/// Parent of a node or object.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ParentRef {
    /// Not part of any hierarchy, behaves as an identity parent transform.
    #[default]
    Detached,
    Node(TransformHandle),
}

impl ParentRef {
    pub fn node(&self) -> Option<TransformHandle> {
        match self {
            ParentRef::Detached => None,
            ParentRef::Node(handle) => Some(*handle),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, ParentRef::Node(_))
    }

    pub fn apply_rebase(&mut self, depth: DepthIdx, rebase: &Rebase) {
        if let ParentRef::Node(handle) = self {
            handle.apply_rebase(depth, rebase);
        }
    }

    /// Repoints references to `old`, returns true if anything changed.
    pub fn replace(&mut self, old: &TransformHandle, new: ParentRef) -> bool {
        if self.node().as_ref() == Some(old) {
            *self = new;
            true
        } else {
            false
        }
    }
}

/// Everything stored for one node slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformLane {
    pub local: Transform,
    pub derived: Transform,
    pub derived_matrix: WorldMatrix,
    pub inherit_orientation: bool,
    pub inherit_scale: bool,
    pub parent: ParentRef,
    pub owner: Option<NodeId>,
}

impl TransformLane {
    pub fn new(owner: NodeId) -> Self {
        TransformLane {
            derived_matrix: WorldMatrix::identity(),
            inherit_orientation: true,
            inherit_scale: true,
            owner: Some(owner),
            ..Default::default()
        }
    }
}

/// `LANES` node transforms in SoA layout.
#[derive(Clone, Debug)]
pub struct TransformPack {
    pub position: WorldVector8,
    pub orientation: WorldQuaternion8,
    pub scale: WorldVector8,
    pub derived_position: WorldVector8,
    pub derived_orientation: WorldQuaternion8,
    pub derived_scale: WorldVector8,
    pub derived_matrix: WorldMatrix8,
    pub inherit_orientation: [bool; LANES],
    pub inherit_scale: [bool; LANES],
    pub parents: [ParentRef; LANES],
    pub owners: [Option<NodeId>; LANES],
}

impl Default for TransformPack {
    fn default() -> Self {
        let zero = WorldVector8::repeat(SimdFloatType::splat(0.0));
        let one = WorldVector8::repeat(SimdFloatType::splat(1.0));
        TransformPack {
            position: zero,
            orientation: WorldQuaternion8::identity(),
            scale: one,
            derived_position: zero,
            derived_orientation: WorldQuaternion8::identity(),
            derived_scale: one,
            derived_matrix: WorldMatrix8::identity(),
            inherit_orientation: [true; LANES],
            inherit_scale: [true; LANES],
            parents: [ParentRef::Detached; LANES],
            owners: [None; LANES],
        }
    }
}

fn extract_quaternion(q: &WorldQuaternion8, lane: usize) -> WorldQuaternion {
    UnitQuaternion::new_unchecked(Quaternion::from(q.coords.map(|x| x.extract(lane))))
}

fn replace_quaternion(q: &mut WorldQuaternion8, lane: usize, value: &WorldQuaternion) {
    q.coords
        .zip_apply(&value.coords, |x, y| x.replace(lane, y));
}

impl TransformPack {
    pub fn local(&self, lane: usize) -> Transform {
        Transform {
            position: self.position.extract(lane),
            orientation: extract_quaternion(&self.orientation, lane),
            scale: self.scale.extract(lane),
        }
    }

    pub fn set_local(&mut self, lane: usize, transform: &Transform) {
        self.position.replace(lane, transform.position);
        replace_quaternion(&mut self.orientation, lane, &transform.orientation);
        self.scale.replace(lane, transform.scale);
    }

    pub fn derived(&self, lane: usize) -> Transform {
        Transform {
            position: self.derived_position.extract(lane),
            orientation: extract_quaternion(&self.derived_orientation, lane),
            scale: self.derived_scale.extract(lane),
        }
    }

    /// Sets the derived values and keeps the derived matrix consistent with them.
    pub fn set_derived(&mut self, lane: usize, transform: &Transform) {
        self.derived_position.replace(lane, transform.position);
        replace_quaternion(&mut self.derived_orientation, lane, &transform.orientation);
        self.derived_scale.replace(lane, transform.scale);
        self.derived_matrix.replace(lane, transform.to_matrix());
    }

    pub fn derived_matrix(&self, lane: usize) -> WorldMatrix {
        self.derived_matrix.extract(lane)
    }
}

impl LanePack for TransformPack {
    type Lane = TransformLane;

    fn read_lane(&self, lane: usize) -> TransformLane {
        TransformLane {
            local: self.local(lane),
            derived: self.derived(lane),
            derived_matrix: self.derived_matrix(lane),
            inherit_orientation: self.inherit_orientation[lane],
            inherit_scale: self.inherit_scale[lane],
            parent: self.parents[lane],
            owner: self.owners[lane],
        }
    }

    fn write_lane(&mut self, lane: usize, value: TransformLane) {
        self.set_local(lane, &value.local);
        self.derived_position.replace(lane, value.derived.position);
        replace_quaternion(&mut self.derived_orientation, lane, &value.derived.orientation);
        self.derived_scale.replace(lane, value.derived.scale);
        self.derived_matrix.replace(lane, value.derived_matrix);
        self.inherit_orientation[lane] = value.inherit_orientation;
        self.inherit_scale[lane] = value.inherit_scale;
        self.parents[lane] = value.parent;
        self.owners[lane] = value.owner;
    }

    fn clear_lane(&mut self, lane: usize) {
        self.write_lane(
            lane,
            TransformLane {
                derived_matrix: WorldMatrix::identity(),
                inherit_orientation: true,
                inherit_scale: true,
                ..Default::default()
            },
        );
    }
}

#[cfg(test)]
mod test {
    use std::f32::consts::FRAC_PI_2;

    use assert2::assert;
    use nalgebra::Unit;

    use super::*;
    use crate::geometry::{WorldPoint, test::approx_eq};

    fn sample_transform() -> Transform {
        Transform::new(
            WorldVector::new(1.0, 2.0, 3.0),
            WorldQuaternion::from_axis_angle(&Unit::new_normalize(WorldVector::z()), FRAC_PI_2),
            WorldVector::new(2.0, 1.0, 1.0),
        )
    }

    #[test]
    fn matrix_scales_then_rotates_then_translates() {
        let m = sample_transform().to_matrix();
        let p = m.transform_point(&WorldPoint::new(1.0, 0.0, 0.0));

        // scaled to (2, 0, 0), rotated to (0, 2, 0), translated
        assert!(approx_eq(p.x, 1.0));
        assert!(approx_eq(p.y, 4.0));
        assert!(approx_eq(p.z, 3.0));
    }

    #[test]
    fn packed_matrix_matches_scalar() {
        let t = sample_transform();
        let packed = compose_matrix(
            &WorldVector8::splat(t.position),
            &UnitQuaternion::new_unchecked(WorldQuaternion8::splat(*t.orientation.quaternion())),
            &WorldVector8::splat(t.scale),
        );

        let expected = t.to_matrix();
        for lane in 0..LANES {
            let m = packed.extract(lane);
            for (a, b) in m.iter().zip(expected.iter()) {
                assert!(approx_eq(*a, *b));
            }
        }
    }

    #[test]
    fn lane_round_trip_is_exact() {
        let mut pack = TransformPack::default();
        let mut lane = TransformLane::new(NodeId::new(7));
        lane.local = sample_transform();
        lane.inherit_scale = false;

        pack.write_lane(3, lane.clone());

        assert!(pack.read_lane(3) == lane);
        assert!(pack.local(2) == Transform::default());
        assert!(pack.owners[2].is_none());
    }

    #[test]
    fn clear_resets_to_identity() {
        let mut pack = TransformPack::default();
        let mut lane = TransformLane::new(NodeId::new(1));
        lane.local = sample_transform();
        pack.write_lane(0, lane);

        let taken = pack.take_lane(0);

        assert!(taken.owner == Some(NodeId::new(1)));
        assert!(pack.local(0) == Transform::default());
        assert!(pack.derived_matrix(0) == WorldMatrix::identity());
        assert!(pack.owners[0].is_none());
    }

    #[test]
    fn set_derived_updates_matrix() {
        let mut pack = TransformPack::default();
        pack.set_derived(5, &sample_transform());
        assert!(pack.derived_matrix(5) == sample_transform().to_matrix());
        assert!(pack.derived_matrix(4) == WorldMatrix::identity());
    }
}
