use ordered_float::OrderedFloat;
use simba::simd::SimdValue as _;

use crate::geometry::{FloatType, LANES, SimdFloatType, WorldBox, WorldBox8};
use crate::slab::LanePack;
use crate::transform::ParentRef;

index_vec::define_index_type! {
    /// Back reference to the externally owned object occupying a slot.
    pub struct ObjectId = u32;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spotlight,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Renderable,
    Light(LightType),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectOwner {
    pub id: ObjectId,
    pub kind: ObjectKind,
}

/// Entry of an object's light list.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightClosest {
    pub light: ObjectId,
    pub light_type: LightType,
    pub sq_distance: FloatType,
}

impl LightClosest {
    /// Directional lights first, then by distance.
    pub fn sort_key(&self) -> (bool, OrderedFloat<FloatType>) {
        (
            self.light_type != LightType::Directional,
            OrderedFloat(self.sq_distance),
        )
    }
}

/// Everything stored for one object slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectLane {
    pub local_aabb: WorldBox,
    pub world_aabb: WorldBox,
    pub local_radius: FloatType,
    pub world_radius: FloatType,
    pub visibility_flags: u32,
    pub query_flags: u32,
    pub light_mask: u32,
    pub visible: bool,
    pub owner: Option<ObjectOwner>,
    pub parent: ParentRef,
    pub world_aabb_valid: bool,
    pub light_list: Vec<LightClosest>,
}

impl ObjectLane {
    pub fn new(owner: ObjectOwner) -> Self {
        ObjectLane {
            visibility_flags: 0xFFFF_FFFF,
            query_flags: 0xFFFF_FFFF,
            light_mask: 0xFFFF_FFFF,
            visible: true,
            owner: Some(owner),
            ..Default::default()
        }
    }
}

/// `LANES` objects in SoA layout. Cleared lanes have zero masks and are hidden, so
/// batch algorithms never report them.
#[derive(Clone, Debug)]
pub struct ObjectPack {
    pub local_aabb: WorldBox8,
    pub world_aabb: WorldBox8,
    pub local_radius: SimdFloatType,
    pub world_radius: SimdFloatType,
    pub visibility_flags: [u32; LANES],
    pub query_flags: [u32; LANES],
    pub light_mask: [u32; LANES],
    pub visible: [bool; LANES],
    pub owners: [Option<ObjectOwner>; LANES],
    pub parents: [ParentRef; LANES],
    pub world_aabb_valid: [bool; LANES],
    pub light_lists: [Vec<LightClosest>; LANES],
}

impl Default for ObjectPack {
    fn default() -> Self {
        ObjectPack {
            local_aabb: WorldBox8::default(),
            world_aabb: WorldBox8::default(),
            local_radius: SimdFloatType::splat(0.0),
            world_radius: SimdFloatType::splat(0.0),
            visibility_flags: [0; LANES],
            query_flags: [0; LANES],
            light_mask: [0; LANES],
            visible: [false; LANES],
            owners: [None; LANES],
            parents: [ParentRef::Detached; LANES],
            world_aabb_valid: [false; LANES],
            light_lists: Default::default(),
        }
    }
}

impl LanePack for ObjectPack {
    type Lane = ObjectLane;

    fn read_lane(&self, lane: usize) -> ObjectLane {
        ObjectLane {
            local_aabb: self.local_aabb.extract(lane),
            world_aabb: self.world_aabb.extract(lane),
            local_radius: self.local_radius.extract(lane),
            world_radius: self.world_radius.extract(lane),
            visibility_flags: self.visibility_flags[lane],
            query_flags: self.query_flags[lane],
            light_mask: self.light_mask[lane],
            visible: self.visible[lane],
            owner: self.owners[lane],
            parent: self.parents[lane],
            world_aabb_valid: self.world_aabb_valid[lane],
            light_list: self.light_lists[lane].clone(),
        }
    }

    fn write_lane(&mut self, lane: usize, value: ObjectLane) {
        self.local_aabb.replace(lane, value.local_aabb);
        self.world_aabb.replace(lane, value.world_aabb);
        self.local_radius.replace(lane, value.local_radius);
        self.world_radius.replace(lane, value.world_radius);
        self.visibility_flags[lane] = value.visibility_flags;
        self.query_flags[lane] = value.query_flags;
        self.light_mask[lane] = value.light_mask;
        self.visible[lane] = value.visible;
        self.owners[lane] = value.owner;
        self.parents[lane] = value.parent;
        self.world_aabb_valid[lane] = value.world_aabb_valid;
        self.light_lists[lane] = value.light_list;
    }

    fn clear_lane(&mut self, lane: usize) {
        self.write_lane(lane, ObjectLane::default());
    }

    fn take_lane(&mut self, lane: usize) -> ObjectLane {
        let light_list = std::mem::take(&mut self.light_lists[lane]);
        let value = ObjectLane {
            light_list,
            ..self.read_lane(lane)
        };
        self.clear_lane(lane);
        value
    }
}
