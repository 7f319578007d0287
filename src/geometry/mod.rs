mod aabb;
mod frustum;
mod sphere;

use nalgebra::{Matrix4, Point3, Quaternion, UnitQuaternion, Vector3};
use simba::simd::{SimdValue, WideF32x8};

pub use aabb::Aabb;
pub use frustum::{Frustum, PackedFrustum, Plane};
pub use sphere::Sphere;

pub type FloatType = f32;
pub type SimdFloatType = WideF32x8;
pub type SimdBoolType = <SimdFloatType as SimdValue>::SimdBool;

/// Number of objects processed together by one vector operation.
pub const LANES: usize = 8;
const _: () = assert!(LANES == <SimdFloatType as SimdValue>::LANES);

pub const EPSILON: FloatType = 1e-6;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldMatrix = Matrix4<FloatType>;
pub type WorldQuaternion = UnitQuaternion<FloatType>;
pub type WorldBox = Aabb<FloatType>;
pub type WorldSphere = Sphere<FloatType>;

pub type WorldPoint8 = Point3<SimdFloatType>;
pub type WorldVector8 = Vector3<SimdFloatType>;
pub type WorldMatrix8 = Matrix4<SimdFloatType>;
pub type WorldQuaternion8 = Quaternion<SimdFloatType>;
pub type WorldBox8 = Aabb<SimdFloatType>;
pub type WorldSphere8 = Sphere<SimdFloatType>;
