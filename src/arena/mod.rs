//! Node transforms bucketed by hierarchy depth.
//!
//! Every depth owns one slab of [`TransformPack`]s. Depth 0 holds nodes that are not
//! attached to the hierarchy, attaching a node moves its transform into the bucket of
//! its depth. Parents always live in a shallower bucket than their children, so
//! propagating derived transforms bucket by bucket sees finished parents.

mod handle;

use index_vec::IndexVec;
use nalgebra::UnitQuaternion;
use simba::simd::SimdValue as _;
use thiserror::Error;

pub use handle::{DepthIdx, NodeId, NoRebaseListener, RebaseListener, TransformHandle};

use crate::geometry::{SimdFloatType, WorldMatrix, WorldQuaternion8, WorldVector, WorldVector8};
use crate::slab::{ArraySlab, PackIdx, Rebase, SlabConfig, SlabError};
use crate::transform::{ParentRef, Transform, TransformLane, TransformPack, compose_matrix};
use crate::util::simd_bool_from_lanes;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Depth {0:?} was never grown")]
    DepthNotGrown(DepthIdx),

    #[error("Node at depth {0:?} is already attached")]
    NotUnattached(DepthIdx),

    #[error("Node is not attached")]
    NotAttached,

    #[error("Nodes can not be attached to depth 0")]
    AttachToUnattachedDepth,

    #[error("Parent at depth {parent:?} must be shallower than its child at depth {child:?}")]
    InvalidParent { parent: DepthIdx, child: DepthIdx },

    #[error(transparent)]
    Slab(#[from] SlabError),
}

#[derive(Debug)]
pub struct NodeMemoryManager {
    config: SlabConfig,
    buckets: IndexVec<DepthIdx, ArraySlab<TransformPack>>,
}

impl NodeMemoryManager {
    pub fn new(config: SlabConfig) -> Self {
        NodeMemoryManager {
            config,
            buckets: IndexVec::new(),
        }
    }

    /// Makes sure buckets for all depths up to and including `depth` exist.
    pub fn grow_to_depth(&mut self, depth: DepthIdx) -> Result<(), ArenaError> {
        while self.buckets.len() <= depth.index() {
            let bucket = ArraySlab::new(self.config)?;
            let new_depth = self.buckets.push(bucket);
            log::debug!("Created node bucket for depth {}", new_depth.index());
        }
        Ok(())
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// One past the deepest bucket that holds any node, at least 1.
    pub fn num_depths(&self) -> usize {
        self.buckets
            .iter()
            .rposition(|bucket| bucket.used_slots() > 0)
            .map_or(1, |last| last + 1)
    }

    pub fn live_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.live_count()).sum()
    }

    pub fn bucket_capacity(&self, depth: DepthIdx) -> Result<usize, ArenaError> {
        Ok(self.bucket(depth)?.capacity())
    }

    /// Used packs of a bucket, empty if the depth does not exist.
    pub fn packs(&self, depth: DepthIdx) -> &[TransformPack] {
        self.buckets
            .get(depth)
            .map(ArraySlab::used_packs)
            .unwrap_or_default()
    }

    /// Handle of the lowest live slot at a depth.
    pub fn first_node(&self, depth: DepthIdx) -> Result<Option<TransformHandle>, ArenaError> {
        let bucket = self.bucket(depth)?;
        Ok(bucket.live_slots().next().map(|slot| TransformHandle {
            depth,
            slot,
            generation: bucket.generation(),
        }))
    }

    /// Handles of all live nodes at a depth, in slot order.
    pub fn nodes(&self, depth: DepthIdx) -> Result<Vec<TransformHandle>, ArenaError> {
        let bucket = self.bucket(depth)?;
        Ok(bucket
            .live_slots()
            .map(|slot| TransformHandle {
                depth,
                slot,
                generation: bucket.generation(),
            })
            .collect())
    }

    /// Allocates a transform slot for a new node at `depth`, initialized to identity.
    pub fn node_created(
        &mut self,
        owner: NodeId,
        depth: DepthIdx,
        listener: &mut impl RebaseListener,
    ) -> Result<TransformHandle, ArenaError> {
        self.grow_to_depth(depth)?;
        let (slot, rebase) = self.buckets[depth].allocate()?;
        if let Some(rebase) = &rebase {
            self.rebased(depth, rebase, listener);
        }

        self.buckets[depth].write(slot, TransformLane::new(owner));
        Ok(TransformHandle {
            depth,
            slot,
            generation: self.buckets[depth].generation(),
        })
    }

    /// Moves an unattached node into the bucket of `depth`, which must be at least 1.
    pub fn node_attached(
        &mut self,
        handle: &mut TransformHandle,
        depth: DepthIdx,
        listener: &mut impl RebaseListener,
    ) -> Result<(), ArenaError> {
        self.check(handle)?;
        if handle.depth != DepthIdx::new(0) {
            return Err(ArenaError::NotUnattached(handle.depth));
        }
        if depth == DepthIdx::new(0) {
            return Err(ArenaError::AttachToUnattachedDepth);
        }
        self.grow_to_depth(depth)?;
        self.move_node(handle, depth, listener)
    }

    /// Moves an attached node back to the unattached bucket. The node loses its parent.
    pub fn node_detached(
        &mut self,
        handle: &mut TransformHandle,
        listener: &mut impl RebaseListener,
    ) -> Result<(), ArenaError> {
        self.check(handle)?;
        if handle.depth == DepthIdx::new(0) {
            return Err(ArenaError::NotAttached);
        }
        self.move_node(handle, DepthIdx::new(0), listener)?;
        self.buckets[handle.depth].pack_mut(handle.slot).parents[handle.slot.lane()] =
            ParentRef::Detached;
        Ok(())
    }

    /// Releases the node's slot. Children and objects referencing the node become detached.
    pub fn node_destroyed(
        &mut self,
        handle: TransformHandle,
        listener: &mut impl RebaseListener,
    ) -> Result<(), ArenaError> {
        self.check(&handle)?;
        let rebase = self.buckets[handle.depth].free(handle.slot)?;

        self.replace_parents(&handle, ParentRef::Detached);
        listener.on_node_destroyed(handle);

        if let Some(rebase) = &rebase {
            self.rebased(handle.depth, rebase, listener);
        }
        Ok(())
    }

    /// Allocates at the target depth, copies, then frees the old slot.
    /// Children that would end up no deeper than the moved node are detached.
    fn move_node(
        &mut self,
        handle: &mut TransformHandle,
        depth: DepthIdx,
        listener: &mut impl RebaseListener,
    ) -> Result<(), ArenaError> {
        let (slot, rebase) = self.buckets[depth].allocate()?;
        if let Some(rebase) = &rebase {
            self.rebased(depth, rebase, listener);
            handle.apply_rebase(depth, rebase);
        }

        let lane = self.buckets[handle.depth].read(handle.slot);
        self.buckets[depth].write(slot, lane);

        let old = *handle;
        *handle = TransformHandle {
            depth,
            slot,
            generation: self.buckets[depth].generation(),
        };
        self.move_children(&old, handle);
        listener.on_node_moved(old, *handle);

        let rebase = self.buckets[old.depth].free(old.slot)?;
        if let Some(rebase) = &rebase {
            self.rebased(old.depth, rebase, listener);
            handle.apply_rebase(old.depth, rebase);
        }
        Ok(())
    }

    fn rebased(&mut self, depth: DepthIdx, rebase: &Rebase, listener: &mut impl RebaseListener) {
        log::debug!(
            "Node bucket {} rebased to generation {}, {} slots moved",
            depth.index(),
            rebase.generation,
            rebase.moved.len()
        );
        for bucket in self.buckets.iter_mut() {
            for pack in bucket.used_packs_mut() {
                for parent in pack.parents.iter_mut() {
                    parent.apply_rebase(depth, rebase);
                }
            }
        }
        listener.on_node_rebase(depth, rebase);
    }

    fn replace_parents(&mut self, old: &TransformHandle, new: ParentRef) {
        // Children always live deeper than their parent
        for bucket in self.buckets.iter_mut().skip(old.depth.index() + 1) {
            Self::replace_in_bucket(bucket, old, new);
        }
    }

    fn move_children(&mut self, old: &TransformHandle, new: &TransformHandle) {
        let buckets = self.buckets.iter_mut_enumerated().skip(old.depth.index() + 1);
        for (child_depth, bucket) in buckets {
            let replacement = if child_depth > new.depth {
                ParentRef::Node(*new)
            } else {
                ParentRef::Detached
            };
            Self::replace_in_bucket(bucket, old, replacement);
        }
    }

    fn replace_in_bucket(
        bucket: &mut ArraySlab<TransformPack>,
        old: &TransformHandle,
        new: ParentRef,
    ) {
        for pack in bucket.used_packs_mut() {
            for parent in pack.parents.iter_mut() {
                parent.replace(old, new);
            }
        }
    }

    fn bucket(&self, depth: DepthIdx) -> Result<&ArraySlab<TransformPack>, ArenaError> {
        self.buckets
            .get(depth)
            .ok_or(ArenaError::DepthNotGrown(depth))
    }

    /// Validates that the handle points to a live slot of the current bucket generation.
    pub fn check(&self, handle: &TransformHandle) -> Result<(), ArenaError> {
        self.bucket(handle.depth)?
            .check(handle.slot, handle.generation)
            .inspect_err(|e| {
                if let SlabError::StaleHandle { .. } = e {
                    log::warn!("Rejected stale node handle {handle:?}: {e}");
                }
            })?;
        Ok(())
    }

    fn lane(&self, handle: &TransformHandle) -> Result<(&TransformPack, usize), ArenaError> {
        self.check(handle)?;
        Ok((self.buckets[handle.depth].pack(handle.slot), handle.slot.lane()))
    }

    fn lane_mut(
        &mut self,
        handle: &TransformHandle,
    ) -> Result<(&mut TransformPack, usize), ArenaError> {
        self.check(handle)?;
        Ok((
            self.buckets[handle.depth].pack_mut(handle.slot),
            handle.slot.lane(),
        ))
    }

    pub fn local_transform(&self, handle: &TransformHandle) -> Result<Transform, ArenaError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.local(lane))
    }

    pub fn set_local_transform(
        &mut self,
        handle: &TransformHandle,
        transform: &Transform,
    ) -> Result<(), ArenaError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.set_local(lane, transform);
        Ok(())
    }

    pub fn derived_transform(&self, handle: &TransformHandle) -> Result<Transform, ArenaError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.derived(lane))
    }

    /// Overrides the derived transform, for hierarchies that compute it on their own.
    pub fn set_derived_transform(
        &mut self,
        handle: &TransformHandle,
        transform: &Transform,
    ) -> Result<(), ArenaError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.set_derived(lane, transform);
        Ok(())
    }

    pub fn derived_matrix(&self, handle: &TransformHandle) -> Result<WorldMatrix, ArenaError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.derived_matrix(lane))
    }

    pub fn derived_scale(&self, handle: &TransformHandle) -> Result<WorldVector, ArenaError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.derived_scale.extract(lane))
    }

    pub fn parent(&self, handle: &TransformHandle) -> Result<ParentRef, ArenaError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.parents[lane])
    }

    pub fn set_parent(
        &mut self,
        handle: &TransformHandle,
        parent: ParentRef,
    ) -> Result<(), ArenaError> {
        if let ParentRef::Node(parent_handle) = &parent {
            self.check(parent_handle)?;
            if parent_handle.depth >= handle.depth {
                return Err(ArenaError::InvalidParent {
                    parent: parent_handle.depth,
                    child: handle.depth,
                });
            }
        }
        let (pack, lane) = self.lane_mut(handle)?;
        pack.parents[lane] = parent;
        Ok(())
    }

    pub fn set_inherit_orientation(
        &mut self,
        handle: &TransformHandle,
        inherit: bool,
    ) -> Result<(), ArenaError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.inherit_orientation[lane] = inherit;
        Ok(())
    }

    pub fn set_inherit_scale(
        &mut self,
        handle: &TransformHandle,
        inherit: bool,
    ) -> Result<(), ArenaError> {
        let (pack, lane) = self.lane_mut(handle)?;
        pack.inherit_scale[lane] = inherit;
        Ok(())
    }

    pub fn owner(&self, handle: &TransformHandle) -> Result<Option<NodeId>, ArenaError> {
        let (pack, lane) = self.lane(handle)?;
        Ok(pack.owners[lane])
    }

    /// Recomputes derived transforms of all nodes, shallowest bucket first.
    pub fn update_all_transforms(&mut self) -> Result<(), ArenaError> {
        for depth in (0..self.buckets.len()).map(DepthIdx::from_usize) {
            let pack_count = self.buckets[depth].used_packs().len();
            for pack_idx in (0..pack_count).map(PackIdx::from_usize) {
                let parents = self.gather_parents(depth, pack_idx)?;
                let pack = &mut self.buckets[depth].used_packs_mut()[pack_idx.index()];
                parents.apply_to(pack);
            }
        }
        Ok(())
    }

    /// Derived transforms of the parents of one pack, packed lane by lane.
    fn gather_parents(
        &self,
        depth: DepthIdx,
        pack_idx: PackIdx,
    ) -> Result<ParentPack, ArenaError> {
        let mut gathered = ParentPack::default();
        let pack = &self.buckets[depth].used_packs()[pack_idx.index()];

        for (lane, parent) in pack.parents.iter().enumerate() {
            let Some(parent) = parent.node() else {
                continue;
            };
            if parent.depth >= depth {
                return Err(ArenaError::InvalidParent {
                    parent: parent.depth,
                    child: depth,
                });
            }
            let (parent_pack, parent_lane) = self.lane(&parent)?;
            gathered.position.replace(lane, parent_pack.derived_position.extract(parent_lane));
            gathered
                .orientation
                .replace(lane, parent_pack.derived_orientation.extract(parent_lane));
            gathered.scale.replace(lane, parent_pack.derived_scale.extract(parent_lane));
        }
        Ok(gathered)
    }
}

/// Per lane parent derived values, identity for detached lanes.
struct ParentPack {
    position: WorldVector8,
    orientation: WorldQuaternion8,
    scale: WorldVector8,
}

impl Default for ParentPack {
    fn default() -> Self {
        ParentPack {
            position: WorldVector8::repeat(SimdFloatType::splat(0.0)),
            orientation: WorldQuaternion8::identity(),
            scale: WorldVector8::repeat(SimdFloatType::splat(1.0)),
        }
    }
}

impl ParentPack {
    fn apply_to(&self, pack: &mut TransformPack) {
        let inherit_orientation = simd_bool_from_lanes(&pack.inherit_orientation);
        let inherit_scale = simd_bool_from_lanes(&pack.inherit_scale);

        let orientation = (self.orientation * pack.orientation)
            .select(inherit_orientation, pack.orientation);
        let scale = self
            .scale
            .component_mul(&pack.scale)
            .select(inherit_scale, pack.scale);
        let position = UnitQuaternion::new_unchecked(self.orientation)
            * self.scale.component_mul(&pack.position)
            + self.position;

        pack.derived_matrix =
            compose_matrix(&position, &UnitQuaternion::new_unchecked(orientation), &scale);
        pack.derived_position = position;
        pack.derived_orientation = orientation;
        pack.derived_scale = scale;
    }
}
