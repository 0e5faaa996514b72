//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Small helpers shared throughout the crate.

mod constant_time_ops {
    use std::cmp::Ordering;

    fn expand_top_bit(a: u8) -> u8 {
        0u8.wrapping_sub(a >> 7)
    }

    fn ct_is_zero(a: u8) -> u8 {
        expand_top_bit(!a & a.wrapping_sub(1))
    }

    fn ct_is_eq(a: u8, b: u8) -> u8 {
        ct_is_zero(a ^ b)
    }

    fn ct_is_lt(a: u8, b: u8) -> u8 {
        expand_top_bit(a ^ ((a ^ b) | (a.wrapping_sub(b) ^ a)))
    }

    fn ct_select(mask: u8, a: u8, b: u8) -> u8 {
        debug_assert!(mask == 0 || mask == 0xFF);
        b ^ (mask & (a ^ b))
    }

    /// Compare the byte slices `x` and `y` without an early exit that would leak where the
    /// first differing byte sits.
    ///
    /// Slices of unequal length are ordered by length alone, and translating the accumulated
    /// result into an [Ordering] necessarily leaks the final verdict. Neither reveals key
    /// contents.
    pub fn constant_time_cmp(x: &[u8], y: &[u8]) -> Ordering {
        if x.len() != y.len() {
            return x.len().cmp(&y.len());
        }

        let mut result: u8 = 0;

        for i in 0..x.len() {
            let a = x[x.len() - 1 - i];
            let b = y[x.len() - 1 - i];

            let is_eq = ct_is_eq(a, b);
            let is_lt = ct_is_lt(a, b);

            result = ct_select(is_eq, result, ct_select(is_lt, 1, 255));
        }

        debug_assert!(result == 0 || result == 1 || result == 255);

        match result {
            0 => Ordering::Equal,
            1 => Ordering::Less,
            _ => Ordering::Greater,
        }
    }
}
pub(crate) use constant_time_ops::constant_time_cmp;

pub(crate) mod unwrap {
    pub fn no_encoding_error(result: Result<(), prost::EncodeError>) {
        // prost documents the only possible encoding error as insufficient space, which cannot
        // happen when encoding into a Vec.
        result.expect("No encoding error")
    }

    pub fn no_hmac_varkey_error<E: std::fmt::Debug>(
        result: Result<hmac::Hmac<sha2::Sha256>, E>,
    ) -> hmac::Hmac<sha2::Sha256> {
        result.expect("HMAC-SHA256 should accept any size key")
    }
}

#[cfg(test)]
mod tests {
    use super::constant_time_cmp;
    use std::cmp::Ordering;

    #[test]
    fn test_constant_time_cmp() {
        use rand::Rng;

        assert_eq!(constant_time_cmp(&[1], &[1]), Ordering::Equal);
        assert_eq!(constant_time_cmp(&[0, 1], &[1]), Ordering::Greater);
        assert_eq!(constant_time_cmp(&[1], &[0, 1]), Ordering::Less);
        assert_eq!(constant_time_cmp(&[1], &[2]), Ordering::Less);

        let mut rng = rand::rngs::OsRng;
        for len in 1..64 {
            let x: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let y: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            assert_eq!(constant_time_cmp(&x, &y), x.cmp(&y));
            assert_eq!(constant_time_cmp(&y, &x), y.cmp(&x));
        }
    }
}
