use simba::simd::SimdValue as _;

use crate::arena::{ArenaError, NodeMemoryManager};
use crate::geometry::{SimdFloatType, WorldMatrix8, WorldVector8};
use crate::object::ObjectDataMut;
use crate::transform::ParentRef;
use crate::util::simba::max_component;

/// Recomputes world boxes and world radii of all objects from the derived transforms
/// of their parent nodes. Detached objects use an identity parent.
pub fn update_all_bounds(
    objects: &mut ObjectDataMut,
    arena: &NodeMemoryManager,
) -> Result<(), ArenaError> {
    for pack in objects.packs.iter_mut() {
        let mut parent_matrix = WorldMatrix8::identity();
        let mut parent_scale = WorldVector8::repeat(SimdFloatType::splat(1.0));

        // Parents differ per lane, gather them one by one
        for (lane, parent) in pack.parents.iter().enumerate() {
            if let ParentRef::Node(node) = parent {
                parent_matrix.replace(lane, arena.derived_matrix(node)?);
                parent_scale.replace(lane, arena.derived_scale(node)?);
            }
        }

        pack.world_aabb = pack.local_aabb.transform_affine(&parent_matrix);
        pack.world_radius = pack.local_radius * max_component(&parent_scale);
        pack.world_aabb_valid = pack.owners.map(|owner| owner.is_some());
    }
    Ok(())
}
