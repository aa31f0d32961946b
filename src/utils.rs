use crate::Modulus;
use itertools::Itertools;
use num_bigint::BigUint;

/// Generator of the rotation group of Z_{2N}^*.
pub const GALOIS_GENERATOR: usize = 5;

/// Returns [a^-1]_q for prime q
pub fn mod_inverse_biguint_u64(a: &BigUint, q: u64) -> u64 {
    let a_modq = (a % q).iter_u64_digits().next().unwrap_or(0);
    Modulus::new(q).inv(a_modq)
}

/// base^e mod m for m a power of two not larger than 2^32
pub fn pow_mod_pow2(mut base: usize, mut e: usize, m: usize) -> usize {
    debug_assert!(m.is_power_of_two());
    let mask = m - 1;
    let mut r = 1usize;
    base &= mask;
    while e != 0 {
        if e & 1 == 1 {
            r = (r * base) & mask;
        }
        base = (base * base) & mask;
        e >>= 1;
    }
    r & mask
}

/// Returns galois element corresponding to left rotation of the slots by `k`
/// in a ring of degree `n`: 5^(k mod n/2) mod 2n. Negative `k` rotates right.
pub fn rot_to_galois_element(k: isize, n: usize) -> usize {
    let k = k.rem_euclid((n >> 1) as isize) as usize;
    pow_mod_pow2(GALOIS_GENERATOR, k, n << 1)
}

/// Rotation amounts needed by inner sum over `n` batches of `batch_size` slots.
///
/// Union of the doubling steps `2^i * batch_size` and the offsets of the set
/// bits of `n`, sorted.
pub fn rotations_for_inner_sum(batch_size: usize, n: usize) -> Vec<usize> {
    let mut rotations = vec![];
    let mut i = 1;
    while i < n {
        let k = i * batch_size;
        if k != 0 && !rotations.contains(&k) {
            rotations.push(k);
        }

        let k = (n - (n & ((i << 1) - 1))) * batch_size;
        if k != 0 && !rotations.contains(&k) {
            rotations.push(k);
        }
        i <<= 1;
    }
    rotations.into_iter().sorted().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn galois_el_works() {
        let n = 1 << 4;
        assert_eq!(rot_to_galois_element(0, n), 1);
        assert_eq!(rot_to_galois_element(1, n), 5);
        assert_eq!(rot_to_galois_element(2, n), 25);
        assert_eq!(rot_to_galois_element(3, n), 125 % 32);
        // rotation by n/2 is the identity
        assert_eq!(rot_to_galois_element(8, n), 1);
        // right rotation by 1 is left rotation by n/2 - 1
        assert_eq!(rot_to_galois_element(-1, n), rot_to_galois_element(7, n));
    }

    #[test]
    fn inner_sum_rotations_work() {
        assert_eq!(rotations_for_inner_sum(2, 4), vec![2, 4, 8]);
        assert_eq!(rotations_for_inner_sum(1, 8), vec![1, 2, 4, 8]);
        assert_eq!(rotations_for_inner_sum(1, 6), vec![1, 2, 4, 6]);
        assert_eq!(rotations_for_inner_sum(3, 5), vec![3, 6, 12]);
        assert!(rotations_for_inner_sum(4, 1).is_empty());
    }

    #[test]
    fn mod_inverse_works() {
        let q = 97u64;
        let a = BigUint::from(1234567891011u64);
        let inv = mod_inverse_biguint_u64(&a, q);
        assert_eq!(((1234567891011u64 % q) * inv) % q, 1);
    }
}
