use crate::geometry::{Frustum, LANES, PackedFrustum};
use crate::object::{ObjectData, ObjectId, ObjectPack};
use crate::util::{bit_iter, flags_test_mask, lane_mask, simd_bool_from_lanes};

/// Appends owners of visible objects that are at least partially inside the frustum and
/// share a visibility bit with `scene_flags`. Output order follows storage order.
pub fn cull_frustum(
    objects: ObjectData,
    frustum: &Frustum,
    scene_flags: u32,
    out: &mut Vec<ObjectId>,
) {
    let scene_flags = [scene_flags; LANES];
    let kept = collect_inside(objects, frustum, out, |pack| {
        flags_test_mask(&pack.visibility_flags, &scene_flags)
            & lane_mask(simd_bool_from_lanes(&pack.visible))
    });
    log::trace!("Frustum culling kept {kept} objects");
}

/// Like [`cull_frustum`], but matches `query_mask` against the query flags and ignores
/// visibility flags and the visible switch.
pub fn query_frustum(
    objects: ObjectData,
    frustum: &Frustum,
    query_mask: u32,
    out: &mut Vec<ObjectId>,
) {
    let query_mask = [query_mask; LANES];
    let found = collect_inside(objects, frustum, out, |pack| {
        flags_test_mask(&pack.query_flags, &query_mask)
    });
    log::trace!("Frustum query found {found} objects");
}

fn collect_inside(
    objects: ObjectData,
    frustum: &Frustum,
    out: &mut Vec<ObjectId>,
    mut lanes: impl FnMut(&ObjectPack) -> u64,
) -> usize {
    let planes = PackedFrustum::new(frustum);
    let initial_len = out.len();

    for pack in objects.packs {
        let inside = lane_mask(!planes.outside(&pack.world_aabb));
        let mask = inside & lanes(pack);

        // Removed slots have zero flags and never get here
        out.extend(bit_iter(mask).filter_map(|lane| pack.owners[lane].map(|owner| owner.id)));
    }
    out.len() - initial_len
}
