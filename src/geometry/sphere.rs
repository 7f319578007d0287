use nalgebra::{Point3, Scalar};
use simba::simd::{SimdRealField, SimdValue};

#[derive(Clone, Debug, PartialEq)]
pub struct Sphere<T: Scalar> {
    pub center: Point3<T>,
    pub radius: T,
}

impl<T: Scalar> Sphere<T> {
    pub fn new(center: Point3<T>, radius: T) -> Sphere<T> {
        Sphere { center, radius }
    }
}

impl<T: SimdRealField> Sphere<T> {
    pub fn squared_distance(&self, other: &Sphere<T>) -> T {
        (&self.center - &other.center).norm_squared()
    }

    /// Spheres touching at a single point count as intersecting.
    pub fn intersects(&self, other: &Sphere<T>) -> T::SimdBool {
        let radius_sum = self.radius.clone() + other.radius.clone();
        self.squared_distance(other)
            .simd_le(radius_sum.clone() * radius_sum)
    }
}

impl<T: SimdValue + Scalar> SimdValue for Sphere<T>
where
    T::Element: SimdValue + Scalar,
{
    const LANES: usize = T::LANES;

    type Element = Sphere<T::Element>;

    type SimdBool = T::SimdBool;

    fn splat(val: Self::Element) -> Self {
        Sphere {
            center: val.center.map(|x| T::splat(x)),
            radius: T::splat(val.radius),
        }
    }

    fn extract(&self, i: usize) -> Self::Element {
        Sphere {
            center: self.center.map(|x| x.extract(i)),
            radius: self.radius.extract(i),
        }
    }

    unsafe fn extract_unchecked(&self, i: usize) -> Self::Element {
        unsafe {
            Sphere {
                center: self.center.map(|x| x.extract_unchecked(i)),
                radius: self.radius.extract_unchecked(i),
            }
        }
    }

    fn replace(&mut self, i: usize, val: Self::Element) {
        self.center
            .coords
            .zip_apply(&val.center.coords, |x, y| x.replace(i, y));
        self.radius.replace(i, val.radius);
    }

    unsafe fn replace_unchecked(&mut self, i: usize, val: Self::Element) {
        unsafe {
            self.center
                .coords
                .zip_apply(&val.center.coords, |x, y| x.replace_unchecked(i, y));
            self.radius.replace_unchecked(i, val.radius);
        }
    }

    fn select(self, cond: Self::SimdBool, other: Self) -> Self {
        Sphere {
            center: self
                .center
                .coords
                .zip_map(&other.center.coords, |x, y| x.select(cond, y))
                .into(),
            radius: self.radius.select(cond, other.radius),
        }
    }
}

#[cfg(test)]
mod test {
    use assert2::assert;
    use test_case::test_case;

    use super::*;
    use crate::geometry::{WorldPoint, WorldSphere, WorldSphere8};
    use crate::util::lane_mask;

    #[test_case(0.0, 1.0, 1.0, true ; "concentric")]
    #[test_case(1.5, 1.0, 1.0, true ; "overlapping")]
    #[test_case(2.0, 1.0, 1.0, true ; "touching")]
    #[test_case(2.5, 1.0, 1.0, false ; "separate")]
    #[test_case(1e6, f32::INFINITY, 0.0, true ; "infinite_radius")]
    fn scalar_intersection(offset: f32, r1: f32, r2: f32, expected: bool) {
        let a = WorldSphere::new(WorldPoint::new(0.0, 0.0, 0.0), r1);
        let b = WorldSphere::new(WorldPoint::new(offset, 0.0, 0.0), r2);

        assert!(a.intersects(&b) == expected);
        assert!(b.intersects(&a) == expected);
    }

    #[test]
    fn pack_intersection_per_lane() {
        let mut pack = WorldSphere8::splat(WorldSphere::new(WorldPoint::new(100.0, 0.0, 0.0), 1.0));
        pack.replace(2, WorldSphere::new(WorldPoint::new(1.0, 0.0, 0.0), 1.0));
        pack.replace(5, WorldSphere::new(WorldPoint::new(0.0, 3.0, 0.0), 0.5));

        let query = WorldSphere8::splat(WorldSphere::new(WorldPoint::origin(), 1.0));
        let mask = query.intersects(&pack);

        assert!(lane_mask(mask) == 0b100);
        assert!(query.squared_distance(&pack).extract(5) == 9.0);
    }
}
