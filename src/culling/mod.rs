//! Batch visibility queries over [`ObjectData`](crate::object::ObjectData).
//!
//! The queries run once per frame in order: [`update_all_bounds`], then
//! [`cull_frustum`] and [`cull_lights`], then [`build_light_list`]. All of them
//! process `LANES` objects per step and only fall back to scalar code for pushing
//! results of the lanes that passed.

mod bounds;
mod frustum;
mod light_list;
mod lights;

pub use bounds::update_all_bounds;
pub use frustum::{cull_frustum, query_frustum};
pub use light_list::build_light_list;
pub use lights::{LightListInfo, LightRef, cull_lights};
