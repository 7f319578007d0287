use std::array;

use simba::simd::{SimdPartialOrd as _, SimdValue};

use super::{
    FloatType, SimdBoolType, SimdFloatType, WorldBox, WorldBox8, WorldMatrix, WorldPoint,
    WorldVector, WorldVector8,
};
use crate::util::simba::fma_dot;

/// Plane `normal . p + d = 0`, points with non-negative distance are on the inner side.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Plane {
    pub normal: WorldVector,
    pub d: FloatType,
}

impl Plane {
    pub fn new(normal: WorldVector, d: FloatType) -> Plane {
        Plane { normal, d }
    }

    pub fn from_point_normal(point: &WorldPoint, normal: WorldVector) -> Plane {
        let normal = normal.normalize();
        Plane {
            d: -normal.dot(&point.coords),
            normal,
        }
    }

    pub fn signed_distance(&self, point: &WorldPoint) -> FloatType {
        self.normal.dot(&point.coords) + self.d
    }

    /// Componentwise +-1 with the sign of the normal. Zero components count as positive.
    fn sign_flip(&self) -> WorldVector {
        self.normal.map(|x| if x < 0.0 { -1.0 } else { 1.0 })
    }

    /// Box corner that is furthest along the normal.
    fn positive_vertex(&self, aabb: &WorldBox) -> WorldVector {
        aabb.center.coords + aabb.half_size.component_mul(&self.sign_flip())
    }
}

/// Six inward facing planes bounding a view volume.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    pub fn from_planes(planes: [Plane; 6]) -> Frustum {
        Frustum { planes }
    }

    /// View volume of a camera sitting in the origin, looking down -Z with Y up.
    /// `fov_y` is the full vertical field of view in radians.
    pub fn perspective(
        fov_y: FloatType,
        aspect: FloatType,
        near: FloatType,
        far: FloatType,
    ) -> Frustum {
        let tan_y = (fov_y / 2.0).tan();
        let tan_x = tan_y * aspect;
        let origin = WorldPoint::origin();

        Frustum {
            planes: [
                Plane::from_point_normal(&origin, WorldVector::new(1.0, 0.0, -tan_x)),
                Plane::from_point_normal(&origin, WorldVector::new(-1.0, 0.0, -tan_x)),
                Plane::from_point_normal(&origin, WorldVector::new(0.0, 1.0, -tan_y)),
                Plane::from_point_normal(&origin, WorldVector::new(0.0, -1.0, -tan_y)),
                Plane::new(WorldVector::new(0.0, 0.0, -1.0), -near),
                Plane::new(WorldVector::new(0.0, 0.0, 1.0), far),
            ],
        }
    }

    /// Extracts the planes from a combined view-projection matrix with clip space
    /// depth in -w..w.
    pub fn from_view_projection(m: &WorldMatrix) -> Frustum {
        let row = |i: usize| m.row(i).transpose();
        let combinations = [
            row(3) + row(0),
            row(3) - row(0),
            row(3) + row(1),
            row(3) - row(1),
            row(3) + row(2),
            row(3) - row(2),
        ];

        Frustum {
            planes: combinations.map(|p| {
                let normal = p.xyz();
                let length = normal.norm();
                Plane::new(normal / length, p.w / length)
            }),
        }
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Scalar reference version of the packed test.
    /// Boxes that are only partially inside count as visible.
    pub fn is_visible(&self, aabb: &WorldBox) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.normal.dot(&plane.positive_vertex(aabb)) >= -plane.d)
    }
}

#[derive(Clone, Debug)]
struct PackedPlane {
    normal: WorldVector8,
    sign_flip: WorldVector8,
    neg_d: SimdFloatType,
}

impl PackedPlane {
    fn new(plane: &Plane) -> PackedPlane {
        PackedPlane {
            normal: plane.normal.map(SimdFloatType::splat),
            sign_flip: plane.sign_flip().map(SimdFloatType::splat),
            neg_d: SimdFloatType::splat(-plane.d),
        }
    }

    fn outside(&self, boxes: &WorldBox8) -> SimdBoolType {
        let positive_vertex = boxes.center.coords + boxes.half_size.component_mul(&self.sign_flip);
        fma_dot(&self.normal, &positive_vertex).simd_lt(self.neg_d)
    }
}

/// Frustum planes broadcast to all lanes, with precomputed sign flips.
#[derive(Clone, Debug)]
pub struct PackedFrustum {
    planes: [PackedPlane; 6],
}

impl PackedFrustum {
    pub fn new(frustum: &Frustum) -> PackedFrustum {
        PackedFrustum {
            planes: array::from_fn(|i| PackedPlane::new(&frustum.planes[i])),
        }
    }

    /// Lanes whose box lies completely behind at least one plane.
    pub fn outside(&self, boxes: &WorldBox8) -> SimdBoolType {
        self.planes
            .iter()
            .fold(SimdBoolType::splat(false), |mask, plane| {
                mask | plane.outside(boxes)
            })
    }
}
