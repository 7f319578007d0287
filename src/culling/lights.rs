use simba::simd::SimdValue as _;

use crate::geometry::{Frustum, LANES, PackedFrustum, SimdBoolType, WorldSphere};
use crate::object::{LightType, ObjectData, ObjectId, ObjectKind};
use crate::util::{bit_iter, flags_test_mask, lane_mask, simd_bool_from_lanes};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LightRef {
    pub id: ObjectId,
    pub light_type: LightType,
}

/// Lights visible in the current pass. The three vectors are index aligned.
#[derive(Clone, Debug, Default)]
pub struct LightListInfo {
    pub lights: Vec<LightRef>,
    pub visibility_masks: Vec<u32>,
    pub bounding_spheres: Vec<WorldSphere>,
}

impl LightListInfo {
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn clear(&mut self) {
        self.lights.clear();
        self.visibility_masks.clear();
        self.bounding_spheres.clear();
    }

    pub fn push(&mut self, light: LightRef, visibility_mask: u32, bounding_sphere: WorldSphere) {
        self.lights.push(light);
        self.visibility_masks.push(visibility_mask);
        self.bounding_spheres.push(bounding_sphere);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LightRef, u32, &WorldSphere)> {
        itertools::izip!(
            &self.lights,
            self.visibility_masks.iter().copied(),
            &self.bounding_spheres
        )
    }
}

/// Appends visible lights whose world box touches at least one of the frustums and
/// whose light mask is not empty. Objects that are not lights are skipped.
pub fn cull_lights(lights: ObjectData, frustums: &[Frustum], out: &mut LightListInfo) {
    let frustums: Vec<PackedFrustum> = frustums.iter().map(PackedFrustum::new).collect();
    let any_light_bit = [u32::MAX; LANES];
    let initial_len = out.len();

    for pack in lights.packs {
        let visible = frustums
            .iter()
            .fold(SimdBoolType::splat(false), |mask, frustum| {
                mask | !frustum.outside(&pack.world_aabb)
            });
        let visible = lane_mask(visible);
        if visible == 0 {
            continue;
        }

        let mask = visible
            & flags_test_mask(&pack.light_mask, &any_light_bit)
            & lane_mask(simd_bool_from_lanes(&pack.visible));
        for lane in bit_iter(mask) {
            let Some(owner) = pack.owners[lane] else {
                continue;
            };
            let ObjectKind::Light(light_type) = owner.kind else {
                log::warn!("Object {:?} is not a light, skipping it", owner.id);
                continue;
            };

            out.push(
                LightRef {
                    id: owner.id,
                    light_type,
                },
                pack.visibility_flags[lane],
                WorldSphere::new(
                    pack.world_aabb.center.extract(lane),
                    pack.world_radius.extract(lane),
                ),
            );
        }
    }

    log::trace!(
        "Light culling kept {} lights against {} frustums",
        out.len() - initial_len,
        frustums.len()
    );
}

#[cfg(test)]
mod test {
    use std::f32::consts::FRAC_PI_2;

    use assert2::assert;
    use test_case::test_case;

    use super::*;
    use crate::arena::{NoRebaseListener, NodeMemoryManager};
    use crate::culling::update_all_bounds;
    use crate::geometry::{WorldBox, WorldPoint, WorldVector};
    use crate::object::{ObjectMemoryManager, ObjectOwner};
    use crate::slab::SlabConfig;

    fn light_at(
        objects: &mut ObjectMemoryManager,
        id: usize,
        light_type: LightType,
        center: WorldPoint,
    ) {
        let owner = ObjectOwner {
            id: ObjectId::new(id),
            kind: ObjectKind::Light(light_type),
        };
        let handle = objects.object_created(owner, &mut NoRebaseListener).unwrap();
        objects
            .set_local_aabb(&handle, WorldBox::new(center, WorldVector::repeat(1.0)))
            .unwrap();
        objects.set_visibility_flags(&handle, 1 << id).unwrap();
    }

    fn lights() -> ObjectMemoryManager {
        let mut objects = ObjectMemoryManager::new(SlabConfig::default()).unwrap();
        // In front of the default camera
        light_at(&mut objects, 0, LightType::Point, WorldPoint::new(0.0, 0.0, -10.0));
        // Behind it, in front of the flipped camera
        light_at(&mut objects, 1, LightType::Spotlight, WorldPoint::new(0.0, 0.0, 10.0));
        // Outside both
        light_at(&mut objects, 2, LightType::Point, WorldPoint::new(500.0, 0.0, 0.0));

        update_all_bounds(&mut objects.batch_mut(), &NodeMemoryManager::new(SlabConfig::default()))
            .unwrap();
        objects
    }

    fn front() -> Frustum {
        Frustum::perspective(FRAC_PI_2, 1.0, 1.0, 100.0)
    }

    /// Camera looking down +Z
    fn back() -> Frustum {
        let mut planes = *front().planes();
        for plane in planes.iter_mut() {
            plane.normal.z = -plane.normal.z;
        }
        Frustum::from_planes(planes)
    }

    fn culled_ids(objects: &ObjectMemoryManager, frustums: &[Frustum]) -> Vec<usize> {
        let mut out = LightListInfo::default();
        cull_lights(objects.batch(), frustums, &mut out);
        out.lights.iter().map(|light| light.id.index()).collect()
    }

    #[test_case(vec![front()], vec![0] ; "single_frustum")]
    #[test_case(vec![back()], vec![1] ; "flipped_frustum")]
    #[test_case(vec![front(), back()], vec![0, 1] ; "union_of_frustums")]
    #[test_case(vec![front(), front()], vec![0] ; "duplicate_frustum_reports_once")]
    #[test_case(vec![], vec![] ; "no_frustums")]
    fn visible_in_any_frustum(frustums: Vec<Frustum>, expected: Vec<usize>) {
        assert!(culled_ids(&lights(), &frustums) == expected);
    }

    #[test]
    fn output_arrays_are_aligned() {
        let objects = lights();
        let mut out = LightListInfo::default();
        cull_lights(objects.batch(), &[front(), back()], &mut out);

        assert!(out.len() == 2);
        let (light, visibility_mask, sphere) = out.iter().nth(1).unwrap();
        assert!(light.light_type == LightType::Spotlight);
        assert!(visibility_mask == 0b10);
        assert!(sphere.center == WorldPoint::new(0.0, 0.0, 10.0));
        assert!(sphere.radius == 3.0f32.sqrt());
    }

    #[test]
    fn zero_light_mask_is_skipped() {
        let mut objects = lights();
        let handle = objects.objects()[0];
        objects.set_light_mask(&handle, 0).unwrap();

        assert!(culled_ids(&objects, &[front(), back()]) == vec![1]);
    }

    #[test]
    fn hidden_light_is_skipped() {
        let mut objects = lights();
        let handle = objects.objects()[1];
        objects.set_visible(&handle, false).unwrap();

        assert!(culled_ids(&objects, &[front(), back()]) == vec![0]);
    }

    #[test]
    fn removed_lights_are_never_reported() {
        let config = SlabConfig::builder()
            .growth_increment(8)
            .cleanup_threshold(2)
            .build();
        let mut objects = ObjectMemoryManager::new(config).unwrap();
        for id in 0..20 {
            light_at(&mut objects, id, LightType::Point, WorldPoint::new(0.0, 0.0, -10.0));
        }

        let mut handles = objects.objects();
        for index in [15, 7, 3, 0] {
            let removed = handles.remove(index);
            objects.object_destroyed(removed, &mut handles).unwrap();
        }
        update_all_bounds(&mut objects.batch_mut(), &NodeMemoryManager::new(config)).unwrap();

        let mut out = LightListInfo::default();
        cull_lights(objects.batch(), &[front(), back()], &mut out);

        assert!(out.len() == 16);
        for (light, visibility_mask, _) in out.iter() {
            assert!(![0, 3, 7, 15].contains(&light.id.index()));
            assert!(visibility_mask == 1 << light.id.index());
        }
    }
}
