//! Per object culling data, stored in lane packs parallel to the node transforms.

mod pack;

use simba::simd::SimdValue as _;
use thiserror::Error;

pub use pack::{LightClosest, LightType, ObjectId, ObjectKind, ObjectLane, ObjectOwner, ObjectPack};

use crate::arena::{ArenaError, DepthIdx, NodeMemoryManager, RebaseListener, TransformHandle};
use crate::geometry::{FloatType, WorldBox, WorldMatrix, WorldVector};
use crate::slab::{ArraySlab, LanePack as _, Rebase, SlabConfig, SlabError, SlotIdx};
use crate::transform::ParentRef;
use crate::util::simba::max_component;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectError {
    #[error("World AABB of {0:?} was not updated since the last change")]
    AabbOutOfDate(ObjectHandle),

    #[error("Object is already attached to a node")]
    AlreadyAttached,

    #[error("Object is not attached to a node")]
    NotAttached,

    #[error(transparent)]
    Slab(#[from] SlabError),

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub slot: SlotIdx,
    pub generation: u32,
}

impl ObjectHandle {
    pub fn apply_rebase(&mut self, rebase: &Rebase) {
        self.slot = rebase.relocate(self.slot);
        self.generation = rebase.generation;
    }
}

impl RebaseListener for Vec<ObjectHandle> {
    fn on_object_rebase(&mut self, rebase: &Rebase) {
        for handle in self.iter_mut() {
            handle.apply_rebase(rebase);
        }
    }
}

/// Read only view of all used object packs, input of the batch algorithms.
#[derive(Copy, Clone, Debug)]
pub struct ObjectData<'a> {
    pub packs: &'a [ObjectPack],
}

#[derive(Debug)]
pub struct ObjectDataMut<'a> {
    pub packs: &'a mut [ObjectPack],
}

#[derive(Debug)]
pub struct ObjectMemoryManager {
    slab: ArraySlab<ObjectPack>,
}

impl ObjectMemoryManager {
    pub fn new(config: SlabConfig) -> Result<Self, ObjectError> {
        Ok(ObjectMemoryManager {
            slab: ArraySlab::new(config)?,
        })
    }

    pub fn live_count(&self) -> usize {
        self.slab.live_count()
    }

    pub fn capacity(&self) -> usize {
        self.slab.capacity()
    }

    pub fn batch(&self) -> ObjectData<'_> {
        ObjectData {
            packs: self.slab.used_packs(),
        }
    }

    pub fn batch_mut(&mut self) -> ObjectDataMut<'_> {
        ObjectDataMut {
            packs: self.slab.used_packs_mut(),
        }
    }

    /// Handles of all live objects, in slot order.
    pub fn objects(&self) -> Vec<ObjectHandle> {
        let generation = self.slab.generation();
        self.slab
            .live_slots()
            .map(|slot| ObjectHandle { slot, generation })
            .collect()
    }

    /// Allocates a slot with empty bounds, all visibility and light bits set.
    pub fn object_created(
        &mut self,
        owner: ObjectOwner,
        listener: &mut impl RebaseListener,
    ) -> Result<ObjectHandle, ObjectError> {
        let (slot, rebase) = self.slab.allocate()?;
        if let Some(rebase) = &rebase {
            log::debug!("Object slab grown, generation {}", rebase.generation);
            listener.on_object_rebase(rebase);
        }
        self.slab.write(slot, ObjectLane::new(owner));
        Ok(ObjectHandle {
            slot,
            generation: self.slab.generation(),
        })
    }

    pub fn object_destroyed(
        &mut self,
        handle: ObjectHandle,
        listener: &mut impl RebaseListener,
    ) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(&handle)?;
        pack.visibility_flags[lane] = 0;
        pack.query_flags[lane] = 0;
        pack.light_mask[lane] = 0;
        pack.visible[lane] = false;

        if let Some(rebase) = self.slab.free(handle.slot)? {
            log::debug!(
                "Object slab compacted, generation {}, {} slots moved",
                rebase.generation,
                rebase.moved.len()
            );
            listener.on_object_rebase(&rebase);
        }
        Ok(())
    }

    pub fn check(&self, handle: &ObjectHandle) -> Result<(), ObjectError> {
        self.slab
            .check(handle.slot, handle.generation)
            .inspect_err(|e| {
                if let SlabError::StaleHandle { .. } = e {
                    log::warn!("Rejected stale object handle {handle:?}: {e}");
                }
            })?;
        Ok(())
    }

    fn lane(&self, handle: &ObjectHandle) -> Result<(&ObjectPack, usize), ObjectError> {
        self.check(handle)?;
        Ok((self.slab.pack(handle.slot), handle.slot.lane()))
    }

    fn lane_mut(&mut self, handle: &ObjectHandle) -> Result<(&mut ObjectPack, usize), ObjectError> {
        self.check(handle)?;
        Ok((self.slab.pack_mut(handle.slot), handle.slot.lane()))
    }

    pub fn read(&self, handle: &ObjectHandle) -> Result<ObjectLane, ObjectError> {
        self.check(handle)?;
        Ok(self.slab.pack(handle.slot).read_lane(handle.slot.lane()))
    }

    pub fn owner(&self, handle: &ObjectHandle) -> Result<Option<ObjectOwner>, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.owners[lane])
    }

    pub fn parent(&self, handle: &ObjectHandle) -> Result<ParentRef, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.parents[lane])
    }

    pub fn attach_to_node(
        &mut self,
        handle: &ObjectHandle,
        node: TransformHandle,
        arena: &NodeMemoryManager,
    ) -> Result<(), ObjectError> {
        arena.check(&node)?;
        let (pack, lane) = self.lane_mut(handle)?;
        if pack.parents[lane].is_attached() {
            return Err(ObjectError::AlreadyAttached);
        }
        pack.parents[lane] = ParentRef::Node(node);
        pack.world_aabb_valid[lane] = false;
        Ok(())
    }

    pub fn detach_from_node(&mut self, handle: &ObjectHandle) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        if !pack.parents[lane].is_attached() {
            return Err(ObjectError::NotAttached);
        }
        pack.parents[lane] = ParentRef::Detached;
        pack.world_aabb_valid[lane] = false;
        Ok(())
    }

    /// Sets the local box, the local radius becomes the distance from the box center
    /// to its corners.
    pub fn set_local_aabb(
        &mut self,
        handle: &ObjectHandle,
        aabb: WorldBox,
    ) -> Result<(), ObjectError> {
        let radius = aabb.radius();
        self.set_local_bounds(handle, aabb, radius)
    }

    pub fn set_local_bounds(
        &mut self,
        handle: &ObjectHandle,
        aabb: WorldBox,
        radius: FloatType,
    ) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.local_aabb.replace(lane, aabb);
        pack.local_radius.replace(lane, radius);
        pack.world_aabb_valid[lane] = false;
        Ok(())
    }

    pub fn local_aabb(&self, handle: &ObjectHandle) -> Result<WorldBox, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.local_aabb.extract(lane))
    }

    pub fn visibility_flags(&self, handle: &ObjectHandle) -> Result<u32, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.visibility_flags[lane])
    }

    pub fn set_visibility_flags(
        &mut self,
        handle: &ObjectHandle,
        flags: u32,
    ) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.visibility_flags[lane] = flags;
        Ok(())
    }

    /// Flags matched by [`query_frustum`](crate::culling::query_frustum), independent of
    /// the visibility flags.
    pub fn query_flags(&self, handle: &ObjectHandle) -> Result<u32, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.query_flags[lane])
    }

    pub fn set_query_flags(
        &mut self,
        handle: &ObjectHandle,
        flags: u32,
    ) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.query_flags[lane] = flags;
        Ok(())
    }

    pub fn visible(&self, handle: &ObjectHandle) -> Result<bool, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.visible[lane])
    }

    /// Hidden objects keep their flags but are skipped by frustum and light culling.
    pub fn set_visible(&mut self, handle: &ObjectHandle, visible: bool) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.visible[lane] = visible;
        Ok(())
    }

    pub fn light_mask(&self, handle: &ObjectHandle) -> Result<u32, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.light_mask[lane])
    }

    pub fn set_light_mask(&mut self, handle: &ObjectHandle, mask: u32) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.light_mask[lane] = mask;
        Ok(())
    }

    /// Marks the cached world bounds as stale, for example after the parent node moved.
    pub fn notify_moved(&mut self, handle: &ObjectHandle) -> Result<(), ObjectError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.world_aabb_valid[lane] = false;
        Ok(())
    }

    /// World box computed by the last bounds update.
    pub fn world_aabb(&self, handle: &ObjectHandle) -> Result<WorldBox, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        if !pack.world_aabb_valid[lane] {
            return Err(ObjectError::AabbOutOfDate(*handle));
        }
        Ok(pack.world_aabb.extract(lane))
    }

    pub fn world_radius(&self, handle: &ObjectHandle) -> Result<FloatType, ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        if !pack.world_aabb_valid[lane] {
            return Err(ObjectError::AabbOutOfDate(*handle));
        }
        Ok(pack.world_radius.extract(lane))
    }

    /// Recomputes the world bounds of a single object from its parent's derived transform.
    pub fn world_aabb_updated(
        &mut self,
        handle: &ObjectHandle,
        arena: &NodeMemoryManager,
    ) -> Result<WorldBox, ObjectError> {
        let (matrix, scale) = match self.parent(handle)? {
            ParentRef::Detached => (WorldMatrix::identity(), WorldVector::repeat(1.0)),
            ParentRef::Node(node) => (arena.derived_matrix(&node)?, arena.derived_scale(&node)?),
        };

        let (pack, lane) = self.lane_mut(handle)?;
        let world_aabb = pack.local_aabb.extract(lane).transform_affine(&matrix);
        let world_radius = pack.local_radius.extract(lane) * max_component(&scale);

        pack.world_aabb.replace(lane, world_aabb.clone());
        pack.world_radius.replace(lane, world_radius);
        pack.world_aabb_valid[lane] = true;
        Ok(world_aabb)
    }

    /// Lights affecting the object, as sorted by the last light list build.
    pub fn light_list(&self, handle: &ObjectHandle) -> Result<&[LightClosest], ObjectError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(&pack.light_lists[lane])
    }

    fn for_each_parent(&mut self, mut f: impl FnMut(&mut ParentRef) -> bool) {
        for pack in self.slab.used_packs_mut() {
            for (parent, valid) in pack.parents.iter_mut().zip(pack.world_aabb_valid.iter_mut()) {
                if f(parent) {
                    *valid = false;
                }
            }
        }
    }
}

/// Keeps the parent references of objects pointing at the right node slots.
impl RebaseListener for ObjectMemoryManager {
    fn on_node_rebase(&mut self, depth: DepthIdx, rebase: &Rebase) {
        self.for_each_parent(|parent| {
            parent.apply_rebase(depth, rebase);
            false
        });
    }

    fn on_node_moved(&mut self, old: TransformHandle, new: TransformHandle) {
        self.for_each_parent(|parent| parent.replace(&old, ParentRef::Node(new)));
    }

    fn on_node_destroyed(&mut self, handle: TransformHandle) {
        self.for_each_parent(|parent| parent.replace(&handle, ParentRef::Detached));
    }
}
