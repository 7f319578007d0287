use simba::simd::SimdValue as _;

use super::LightListInfo;
use crate::geometry::{LANES, WorldSphere8};
use crate::object::{LightClosest, ObjectDataMut};
use crate::util::{bit_iter, flags_test_mask, lane_mask};

/// Fills the light list of every object with the lights touching its bounding sphere,
/// directional lights first, then the closest.
///
/// A light affects an object only if the object's light mask shares a bit with the
/// light's visibility mask. Lights at equal distance keep their order in `lights`.
pub fn build_light_list(objects: &mut ObjectDataMut, lights: &LightListInfo) {
    for pack in objects.packs.iter_mut() {
        for list in pack.light_lists.iter_mut() {
            list.clear();
        }

        let object_spheres = WorldSphere8::new(pack.world_aabb.center, pack.world_radius);

        for (light, visibility_mask, sphere) in lights.iter() {
            let light_sphere = WorldSphere8::splat(sphere.clone());
            let touching = lane_mask(light_sphere.intersects(&object_spheres));
            // Removed slots have zero light mask
            let mask = touching & flags_test_mask(&pack.light_mask, &[visibility_mask; LANES]);
            if mask == 0 {
                continue;
            }

            let sq_distance = object_spheres.squared_distance(&light_sphere);
            for lane in bit_iter(mask) {
                pack.light_lists[lane].push(LightClosest {
                    light: light.id,
                    light_type: light.light_type,
                    sq_distance: sq_distance.extract(lane),
                });
            }
        }

        for list in pack.light_lists.iter_mut() {
            list.sort_by_key(LightClosest::sort_key);
        }
    }
}

#[cfg(test)]
mod test {
    use assert2::assert;
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;
    use crate::arena::{NoRebaseListener, NodeMemoryManager};
    use crate::culling::{LightRef, update_all_bounds};
    use crate::geometry::{WorldBox, WorldPoint, WorldSphere, WorldVector};
    use crate::object::{
        LightType, ObjectHandle, ObjectId, ObjectKind, ObjectMemoryManager, ObjectOwner,
    };
    use crate::slab::SlabConfig;

    fn objects_at(centers: &[WorldPoint]) -> (ObjectMemoryManager, Vec<ObjectHandle>) {
        let mut objects = ObjectMemoryManager::new(SlabConfig::default()).unwrap();
        let handles = centers
            .iter()
            .enumerate()
            .map(|(i, center)| {
                let owner = ObjectOwner {
                    id: ObjectId::new(i),
                    kind: ObjectKind::Renderable,
                };
                let handle = objects.object_created(owner, &mut NoRebaseListener).unwrap();
                objects
                    .set_local_aabb(&handle, WorldBox::new(*center, WorldVector::repeat(1.0)))
                    .unwrap();
                handle
            })
            .collect();
        update_all_bounds(
            &mut objects.batch_mut(),
            &NodeMemoryManager::new(SlabConfig::default()),
        )
        .unwrap();
        (objects, handles)
    }

    #[test]
    fn removed_objects_are_never_lit() {
        let config = SlabConfig::builder()
            .growth_increment(8)
            .cleanup_threshold(2)
            .build();
        let mut objects = ObjectMemoryManager::new(config).unwrap();
        let mut handles = Vec::new();
        for id in 0..20 {
            let owner = ObjectOwner {
                id: ObjectId::new(id),
                kind: ObjectKind::Renderable,
            };
            let handle = objects.object_created(owner, &mut handles).unwrap();
            let aabb = WorldBox::new(WorldPoint::origin(), WorldVector::repeat(1.0));
            objects.set_local_aabb(&handle, aabb).unwrap();
            handles.push(handle);
        }
        for index in [15, 7, 3, 0] {
            let removed = handles.remove(index);
            objects.object_destroyed(removed, &mut handles).unwrap();
        }
        update_all_bounds(&mut objects.batch_mut(), &NodeMemoryManager::new(config)).unwrap();

        let mut lights = LightListInfo::default();
        lights.push(
            light(100, LightType::Point),
            0xFFFF_FFFF,
            WorldSphere::new(WorldPoint::origin(), 5.0),
        );
        build_light_list(&mut objects.batch_mut(), &lights);

        let mut lit = 0;
        for pack in objects.batch().packs {
            for (owner, list) in pack.owners.iter().zip(&pack.light_lists) {
                match owner {
                    Some(owner) => {
                        assert!(![0, 3, 7, 15].contains(&owner.id.index()));
                        assert!(list.len() == 1);
                        lit += 1;
                    }
                    None => assert!(list.is_empty()),
                }
            }
        }
        assert!(lit == 16);
        for handle in &handles {
            assert!(ids(&objects, handle) == vec![100]);
        }
    }

    fn light(id: usize, light_type: LightType) -> LightRef {
        LightRef {
            id: ObjectId::new(id),
            light_type,
        }
    }

    fn ids(objects: &ObjectMemoryManager, handle: &ObjectHandle) -> Vec<usize> {
        objects
            .light_list(handle)
            .unwrap()
            .iter()
            .map(|l| l.light.index())
            .collect()
    }

    #[test]
    fn directional_light_sorts_before_closer_point_light() {
        let (mut objects, handles) = objects_at(&[WorldPoint::origin()]);
        let mut lights = LightListInfo::default();
        lights.push(
            light(1, LightType::Point),
            0xFFFF_FFFF,
            WorldSphere::new(WorldPoint::new(5.0f32.sqrt(), 0.0, 0.0), 10.0),
        );
        lights.push(
            light(0, LightType::Directional),
            0xFFFF_FFFF,
            WorldSphere::new(WorldPoint::new(1e4, 0.0, 0.0), f32::INFINITY),
        );

        build_light_list(&mut objects.batch_mut(), &lights);

        assert!(ids(&objects, &handles[0]) == vec![0, 1]);
        let list = objects.light_list(&handles[0]).unwrap();
        assert!((list[1].sq_distance - 5.0).abs() < 1e-4);
    }

    #[test]
    fn equal_distances_keep_input_order() {
        let (mut objects, handles) = objects_at(&[WorldPoint::origin()]);
        let mut lights = LightListInfo::default();
        for id in [7, 3] {
            lights.push(
                light(id, LightType::Point),
                0xFFFF_FFFF,
                WorldSphere::new(WorldPoint::new(0.0, 2.0, 0.0), 1.0),
            );
        }

        build_light_list(&mut objects.batch_mut(), &lights);

        assert!(ids(&objects, &handles[0]) == vec![7, 3]);
    }

    #[test]
    fn masks_and_distance_filter_lights() {
        let (mut objects, handles) = objects_at(&[
            WorldPoint::origin(),
            WorldPoint::new(100.0, 0.0, 0.0),
            WorldPoint::new(0.0, 0.5, 0.0),
        ]);
        objects.set_light_mask(&handles[2], 0b01).unwrap();

        let mut lights = LightListInfo::default();
        lights.push(
            light(0, LightType::Spotlight),
            0b10,
            WorldSphere::new(WorldPoint::new(0.0, 1.0, 0.0), 1.0),
        );

        build_light_list(&mut objects.batch_mut(), &lights);

        assert!(ids(&objects, &handles[0]) == vec![0]);
        assert!(ids(&objects, &handles[1]).is_empty());
        assert!(ids(&objects, &handles[2]).is_empty());
    }

    #[test]
    fn rebuild_replaces_previous_list() {
        let (mut objects, handles) = objects_at(&[WorldPoint::origin()]);
        let mut lights = LightListInfo::default();
        lights.push(
            light(0, LightType::Point),
            0xFFFF_FFFF,
            WorldSphere::new(WorldPoint::origin(), 1.0),
        );

        build_light_list(&mut objects.batch_mut(), &lights);
        build_light_list(&mut objects.batch_mut(), &lights);
        assert!(ids(&objects, &handles[0]) == vec![0]);

        lights.clear();
        build_light_list(&mut objects.batch_mut(), &lights);
        assert!(ids(&objects, &handles[0]).is_empty());
    }

    fn light_setup_strategy() -> impl Strategy<Value = Vec<(f32, f32, f32, bool)>> {
        proptest::collection::vec(
            (-20.0f32..20.0, -20.0f32..20.0, 0.5f32..10.0, any::<bool>()),
            0..12,
        )
    }

    /// Every list is sorted, directional lights first, and contains exactly the
    /// touching lights.
    #[proptest]
    fn lists_are_sorted_and_complete(
        #[strategy(light_setup_strategy())] light_setup: Vec<(f32, f32, f32, bool)>,
    ) {
        let centers: Vec<_> = (0..11)
            .map(|i| WorldPoint::new(i as f32 * 3.0 - 15.0, 0.0, 0.0))
            .collect();
        let (mut objects, handles) = objects_at(&centers);

        let mut lights = LightListInfo::default();
        for (i, (x, y, radius, directional)) in light_setup.iter().enumerate() {
            let light_type = if *directional {
                LightType::Directional
            } else {
                LightType::Point
            };
            lights.push(
                light(i, light_type),
                0xFFFF_FFFF,
                WorldSphere::new(WorldPoint::new(*x, *y, 0.0), *radius),
            );
        }

        build_light_list(&mut objects.batch_mut(), &lights);

        for (handle, center) in handles.iter().zip(&centers) {
            let list = objects.light_list(handle).unwrap();
            let object_sphere = WorldSphere::new(*center, 3.0f32.sqrt());

            let expected: Vec<usize> = lights
                .iter()
                .enumerate()
                .filter(|(_, (_, _, sphere))| sphere.intersects(&object_sphere))
                .map(|(i, _)| i)
                .collect();
            let mut actual: Vec<usize> = list.iter().map(|l| l.light.index()).collect();
            actual.sort_unstable();
            prop_assert_eq!(actual, expected);

            prop_assert!(list.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key()));
        }
    }
}
