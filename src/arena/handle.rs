use crate::slab::{Rebase, SlotIdx};

index_vec::define_index_type! {
    /// Hierarchy depth of a node, 0 holds the unattached nodes.
    pub struct DepthIdx = u32;
}

index_vec::define_index_type! {
    /// Back reference to the scene node owning a transform slot.
    pub struct NodeId = u32;
}

/// Location of a node's transform inside the arena.
///
/// A handle is only valid for the bucket generation it was issued for; every rebase
/// of that bucket must be applied to it (see [`RebaseListener`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransformHandle {
    pub depth: DepthIdx,
    pub slot: SlotIdx,
    pub generation: u32,
}

impl TransformHandle {
    pub fn apply_rebase(&mut self, depth: DepthIdx, rebase: &Rebase) {
        if self.depth == depth {
            self.slot = rebase.relocate(self.slot);
            self.generation = rebase.generation;
        }
    }
}

/// Receives structural changes of the arena and the object manager.
/// Everything holding handles across a mutating call must listen.
pub trait RebaseListener {
    fn on_node_rebase(&mut self, _depth: DepthIdx, _rebase: &Rebase) {}

    fn on_object_rebase(&mut self, _rebase: &Rebase) {}

    /// A node was moved to a different bucket by attaching or detaching it.
    fn on_node_moved(&mut self, _old: TransformHandle, _new: TransformHandle) {}

    fn on_node_destroyed(&mut self, _handle: TransformHandle) {}
}

/// Listener for callers that hold no handles across the call.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoRebaseListener;

impl RebaseListener for NoRebaseListener {}

impl RebaseListener for Vec<TransformHandle> {
    fn on_node_rebase(&mut self, depth: DepthIdx, rebase: &Rebase) {
        for handle in self.iter_mut() {
            handle.apply_rebase(depth, rebase);
        }
    }

    fn on_node_moved(&mut self, old: TransformHandle, new: TransformHandle) {
        for handle in self.iter_mut().filter(|h| **h == old) {
            *handle = new;
        }
    }
}

impl<L: RebaseListener + ?Sized> RebaseListener for &mut L {
    fn on_node_rebase(&mut self, depth: DepthIdx, rebase: &Rebase) {
        (**self).on_node_rebase(depth, rebase)
    }

    fn on_object_rebase(&mut self, rebase: &Rebase) {
        (**self).on_object_rebase(rebase)
    }

    fn on_node_moved(&mut self, old: TransformHandle, new: TransformHandle) {
        (**self).on_node_moved(old, new)
    }

    fn on_node_destroyed(&mut self, handle: TransformHandle) {
        (**self).on_node_destroyed(handle)
    }
}

impl<A: RebaseListener, B: RebaseListener> RebaseListener for (A, B) {
    fn on_node_rebase(&mut self, depth: DepthIdx, rebase: &Rebase) {
        self.0.on_node_rebase(depth, rebase);
        self.1.on_node_rebase(depth, rebase);
    }

    fn on_object_rebase(&mut self, rebase: &Rebase) {
        self.0.on_object_rebase(rebase);
        self.1.on_object_rebase(rebase);
    }

    fn on_node_moved(&mut self, old: TransformHandle, new: TransformHandle) {
        self.0.on_node_moved(old, new);
        self.1.on_node_moved(old, new);
    }

    fn on_node_destroyed(&mut self, handle: TransformHandle) {
        self.0.on_node_destroyed(handle);
        self.1.on_node_destroyed(handle);
    }
}
