//! Scene transforms and culling data stored as structures of arrays, processed
//! `LANES` objects at a time.
//!
//! Node transforms live in a [`NodeMemoryManager`], bucketed by hierarchy depth. Objects
//! attached to the nodes live in an [`ObjectMemoryManager`]. Once per frame the
//! [`culling`] functions turn them into world bounds, visible object lists and per object
//! light lists.

pub mod arena;
pub mod culling;
pub mod geometry;
pub mod object;
pub mod slab;
pub mod transform;
mod util;

pub use arena::{
    ArenaError, DepthIdx, NoRebaseListener, NodeId, NodeMemoryManager, RebaseListener,
    TransformHandle,
};
pub use object::{
    LightClosest, LightType, ObjectData, ObjectDataMut, ObjectError, ObjectHandle, ObjectId,
    ObjectKind, ObjectMemoryManager, ObjectOwner,
};
pub use slab::{Rebase, SlabConfig, SlabError};
pub use transform::{ParentRef, Transform};
