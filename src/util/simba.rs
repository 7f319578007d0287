use nalgebra::{Scalar, Vector3};
use simba::simd::{SimdPartialOrd, WideF32x8};

use crate::geometry::{SimdFloatType, WorldVector8};

pub fn fma_dot(a: &WorldVector8, b: &WorldVector8) -> SimdFloatType {
    WideF32x8(a.z.0.mul_add(b.z.0, a.y.0.mul_add(b.y.0, a.x.0 * b.x.0)))
}

/// Largest of the three components, per lane.
pub fn max_component<T: Scalar + SimdPartialOrd>(v: &Vector3<T>) -> T {
    v.x.clone().simd_max(v.y.clone()).simd_max(v.z.clone())
}
