use nalgebra::{Matrix3, Matrix4, Point3, Scalar, Vector3};
use num_traits::Zero;
use simba::simd::{SimdRealField, SimdSigned, SimdValue};

/// Axis aligned box stored as center and half size.
/// With a SIMD scalar type this is a pack of `LANES` independent boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct Aabb<T: Scalar> {
    pub center: Point3<T>,
    pub half_size: Vector3<T>,
}

impl<T: Scalar> Aabb<T> {
    pub fn new(center: Point3<T>, half_size: Vector3<T>) -> Aabb<T> {
        Aabb { center, half_size }
    }

    pub fn map_coords<T2: Scalar, F: FnMut(T) -> T2>(&self, mut f: F) -> Aabb<T2> {
        Aabb {
            center: self.center.map(&mut f),
            half_size: self.half_size.map(&mut f),
        }
    }

    pub fn zip_map_coords<T2: Scalar, T3: Scalar, F: FnMut(T, T2) -> T3>(
        &self,
        rhs: &Aabb<T2>,
        mut f: F,
    ) -> Aabb<T3> {
        Aabb {
            center: self.center.coords.zip_map(&rhs.center.coords, &mut f).into(),
            half_size: self.half_size.zip_map(&rhs.half_size, &mut f),
        }
    }

    pub fn zip_apply_coords<T2: Scalar, F: FnMut(&mut T, T2)>(&mut self, rhs: &Aabb<T2>, mut f: F) {
        self.center.coords.zip_apply(&rhs.center.coords, &mut f);
        self.half_size.zip_apply(&rhs.half_size, &mut f);
    }
}

impl<T: SimdRealField> Aabb<T> {
    pub fn from_min_max(min: &Point3<T>, max: &Point3<T>) -> Aabb<T> {
        let two = T::one() + T::one();
        Aabb {
            center: Point3::from((min.coords.clone() + max.coords.clone()) / two.clone()),
            half_size: (max - min) / two,
        }
    }

    pub fn min(&self) -> Point3<T> {
        &self.center - &self.half_size
    }

    pub fn max(&self) -> Point3<T> {
        &self.center + &self.half_size
    }

    /// Radius of the sphere around the box center that encloses the box.
    pub fn radius(&self) -> T {
        self.half_size.norm()
    }

    /// Applies rotation, scale and translation of `m` (the projective row is ignored)
    /// and returns the axis aligned box enclosing the result.
    pub fn transform_affine(&self, m: &Matrix4<T>) -> Aabb<T> {
        let linear: Matrix3<T> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let translation: Vector3<T> = m.fixed_view::<3, 1>(0, 3).into_owned();
        let abs_linear = linear.map(|x| SimdSigned::simd_abs(&x));

        Aabb {
            center: Point3::from(&linear * &self.center.coords + translation),
            half_size: abs_linear * &self.half_size,
        }
    }
}

impl<T: Scalar + Zero> Default for Aabb<T> {
    fn default() -> Self {
        Aabb {
            center: Point3::origin(),
            half_size: Vector3::zeros(),
        }
    }
}

impl<T: SimdValue + Scalar> SimdValue for Aabb<T>
where
    T::Element: SimdValue + Scalar,
{
    const LANES: usize = T::LANES;

    type Element = Aabb<T::Element>;

    type SimdBool = T::SimdBool;

    fn splat(val: Self::Element) -> Self {
        val.map_coords(|x| T::splat(x))
    }

    fn extract(&self, i: usize) -> Self::Element {
        self.map_coords(|x| x.extract(i))
    }

    unsafe fn extract_unchecked(&self, i: usize) -> Self::Element {
        unsafe { self.map_coords(|x| x.extract_unchecked(i)) }
    }

    fn replace(&mut self, i: usize, val: Self::Element) {
        self.zip_apply_coords(&val, |x, y| x.replace(i, y));
    }

    unsafe fn replace_unchecked(&mut self, i: usize, val: Self::Element) {
        unsafe {
            self.zip_apply_coords(&val, |x, y| x.replace_unchecked(i, y));
        }
    }

    fn select(self, cond: Self::SimdBool, other: Self) -> Self {
        self.zip_map_coords(&other, |x, y| x.select(cond, y))
    }
}
