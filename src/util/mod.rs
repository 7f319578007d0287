pub mod simba;

use wide::i32x8;

use crate::geometry::{LANES, SimdBoolType};

/// Bitmask with one set bit for each of the `LANES` lanes.
#[cfg(test)]
pub const ALL_LANES: u64 = (1 << LANES) - 1;

pub fn bit_iter(bits: u64) -> BitIter {
    BitIter { bits }
}

#[derive(Copy, Clone, Debug)]
pub struct BitIter {
    bits: u64,
}

impl Iterator for BitIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.bits == 0 {
            return None;
        }
        let tz = self.bits.trailing_zeros() as usize;
        self.bits &= self.bits - 1;
        Some(tz)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.bits.count_ones() as usize;
        (count, Some(count))
    }
}

/// Scalar bitmask of the lanes set in a vector boolean.
pub fn lane_mask(mask: SimdBoolType) -> u64 {
    mask.0.move_mask() as u64
}

/// Vector boolean built from per-lane flags.
pub fn simd_bool_from_lanes(lanes: &[bool; LANES]) -> SimdBoolType {
    use ::simba::simd::SimdValue as _;

    let mut mask = SimdBoolType::splat(false);
    for (i, &lane) in lanes.iter().enumerate() {
        mask.replace(i, lane);
    }
    mask
}

/// Bitmask of lanes where `flags & test` has at least one bit set.
pub fn flags_test_mask(flags: &[u32; LANES], test: &[u32; LANES]) -> u64 {
    let to_simd = |v: &[u32; LANES]| i32x8::new((*v).map(|x| x as i32));
    let combined = (to_simd(flags) & to_simd(test)).to_array();

    combined
        .iter()
        .enumerate()
        .filter(|(_, x)| **x != 0)
        .fold(0, |mask, (i, _)| mask | 1 << i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use test_case::test_case;

    #[test]
    fn bit_iter_basic() {
        let result: Vec<usize> = bit_iter(0b10101000u64).collect();
        assert!(result == vec![3, 5, 7]);
    }

    #[test]
    fn bit_iter_all_bits() {
        let result: Vec<usize> = bit_iter(u64::MAX).collect();
        assert!(result == (0..(u64::BITS as usize)).collect::<Vec<_>>());
    }

    #[test]
    fn bit_iter_empty() {
        let result: Vec<usize> = bit_iter(0).collect();
        assert!(result.is_empty());
    }

    #[test]
    fn lane_mask_matches_flags() {
        let lanes = [true, false, false, true, false, false, false, true];
        assert!(lane_mask(simd_bool_from_lanes(&lanes)) == 0b1000_1001);
        assert!(lane_mask(simd_bool_from_lanes(&[true; LANES])) == ALL_LANES);
    }

    #[test_case(0xFFFF_FFFF, 0b1100_1111 ; "all_set_flags_pass")]
    #[test_case(0, 0 ; "nothing_passes")]
    #[test_case(0x8000_0000, 0b0100_0000 ; "high_bit")]
    #[test_case(0b10, 0b0000_0110 ; "second_bit")]
    fn flags_test(test: u32, expected: u64) {
        let flags = [1, 2, 2, 4, 0, 0, 0x8000_0000, 0xF0];
        assert!(flags_test_mask(&flags, &[test; LANES]) == expected);
    }
}
