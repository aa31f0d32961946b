use itertools::izip;
use num_bigint_dig::{prime::probably_prime, BigUint};
use num_traits::{One, ToPrimitive};
use rand::{distributions::Uniform, CryptoRng, Rng, RngCore};

/// Arithmetic modulo a word-size prime.
///
/// Values are kept in `[0, modulus)`. Multiplication is available in Barrett
/// form (`mul_mod_fast`) and in Montgomery form (`mred`), where operands
/// carry an extra factor `2^64`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modulus {
    mu_hi: u64,
    mu_lo: u64,
    mu: u64,
    mred_constant: u64,
    modulus: u64,
    mod_bits: u64,
}

impl Modulus {
    pub fn new(modulus: u64) -> Modulus {
        debug_assert!(modulus > 2);

        // mu = 2^(2n+3) / modulus
        let n = 64 - (modulus.leading_zeros() as u64);
        let mu = (1u128 << (2 * n + 3)) / (modulus as u128);

        // mu for 128 bits by 64 bits barrett reduction
        // mu = floor(2^128 / m)
        let mu_u128 = ((BigUint::one() << 128usize) / modulus)
            .to_u128()
            .unwrap_or(u128::MAX);

        // q^-1 mod 2^64 with Newton iterations. q*q = 1 mod 8 for odd q, every
        // iteration doubles the number of correct bits.
        let mut mred_constant = modulus;
        for _ in 0..5 {
            mred_constant =
                mred_constant.wrapping_mul(2u64.wrapping_sub(modulus.wrapping_mul(mred_constant)));
        }

        Modulus {
            mu_hi: (mu_u128 >> 64) as u64,
            mu_lo: mu_u128 as u64,
            mu: mu as u64,
            mred_constant,
            modulus,
            mod_bits: n,
        }
    }

    pub const fn modulus(&self) -> u64 {
        self.modulus
    }

    pub const fn bits(&self) -> u64 {
        self.mod_bits
    }

    /// q^-1 mod 2^64
    pub const fn mred_constant(&self) -> u64 {
        self.mred_constant
    }

    /// Computes modulus exponentiation using binary exponentiation
    pub fn exp(&self, mut a: u64, mut e: usize) -> u64 {
        let mut r = 1u64;
        a = self.reduce(a);
        while e != 0 {
            if e & 1 == 1 {
                r = self.mul_mod_fast(r, a);
            }
            a = self.mul_mod_fast(a, a);
            e >>= 1;
        }
        r
    }

    /// Computes multiplicative inverse of a with Fermat's little theorem
    ///
    /// modulus must be prime
    pub fn inv(&self, a: u64) -> u64 {
        debug_assert!(probably_prime(&BigUint::from(self.modulus), 0));
        debug_assert!(a % self.modulus != 0);
        self.exp(a, (self.modulus - 2) as usize)
    }

    /// Modulus addition
    ///
    /// Assumes both a and b are smaller than modulus
    pub const fn add_mod_fast(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.modulus);
        debug_assert!(b < self.modulus);

        let mut c = a + b;
        if c >= self.modulus {
            c -= self.modulus;
        }
        c
    }

    /// Modulus subtraction
    ///
    /// Assumes both a and b < modulus
    pub const fn sub_mod_fast(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.modulus);
        debug_assert!(b < self.modulus);

        if a >= b {
            a - b
        } else {
            (a + self.modulus) - b
        }
    }

    pub const fn neg_mod_fast(&self, a: u64) -> u64 {
        debug_assert!(a < self.modulus);

        if a == 0 {
            0
        } else {
            self.modulus - a
        }
    }

    /// Barrett modulur multiplication. Assumes that a and b are < modulus.
    pub const fn mul_mod_fast(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.modulus);
        debug_assert!(b < self.modulus);

        let mut ab = a as u128 * b as u128;
        let n = self.mod_bits;
        let alpha = n + 3;
        // beta = -2

        let mut q = ab >> (n - 2);
        q *= self.mu as u128;
        q >>= alpha + 2;

        ab -= q * (self.modulus as u128);
        let mut ab = ab as u64;

        // correction
        if ab >= self.modulus {
            ab -= self.modulus;
        }

        ab
    }

    /// Barrett modulus reduction of 64 bits value.
    pub const fn reduce(&self, a: u64) -> u64 {
        let n = self.mod_bits;
        let alpha = n + 3;
        // beta = -2

        let mut a = a as u128;
        let mut q = a >> (n - 2);
        q *= self.mu as u128;
        q >>= alpha + 2;

        a -= q * (self.modulus as u128);
        let mut a = a as u64;

        // correction
        if a >= self.modulus {
            a -= self.modulus;
        }
        a
    }

    /// BarretReduction of 128 bits value by 64 bits modulus
    /// Source: Menezes, Alfred; Oorschot, Paul; Vanstone, Scott. Handbook of Applied Cryptography, Section 14.3.3.
    pub const fn barret_reduction_u128(&self, a: u128) -> u64 {
        // We need to calculate a * mu / 2^128
        // Notice that we don't need lower 128 bits of 256 bit product
        let a_hi = (a >> 64) as u64;
        let a_lo = a as u64;

        let mu_lo_a_lo_hi = ((self.mu_lo as u128 * a_lo as u128) >> 64) as u64;

        // carry part 1
        let middle = self.mu_hi as u128 * a_lo as u128;
        let middle_lo = middle as u64;
        let mut middle_hi = (middle >> 64) as u64;
        let (carry_acc, carry) = middle_lo.overflowing_add(mu_lo_a_lo_hi);
        middle_hi += carry as u64;

        // carry part 2
        let middle = a_hi as u128 * self.mu_lo as u128;
        let middle_lo = middle as u64;
        let mut middle_hi2 = (middle >> 64) as u64;
        let (_, carry2) = middle_lo.overflowing_add(carry_acc);
        middle_hi2 += carry2 as u64;

        // we only need lower 64 bits from higher 128 bits of (a*m / 2^128)
        let tmp = a_hi
            .wrapping_mul(self.mu_hi)
            .wrapping_add(middle_hi)
            .wrapping_add(middle_hi2);
        let mut result = a_lo.wrapping_sub(tmp.wrapping_mul(self.modulus));

        while result >= self.modulus {
            result -= self.modulus;
        }

        result
    }

    /// Switches a into Montgomery form: a * 2^64 mod modulus
    pub const fn mform(&self, a: u64) -> u64 {
        self.barret_reduction_u128((a as u128) << 64)
    }

    /// Montgomery reduction of a*b, ie returns a * b * 2^-64 mod modulus.
    ///
    /// Assumes a and b are smaller than modulus. If either operand is in Montgomery
    /// form the result is the plain product.
    pub const fn mred(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.modulus);
        debug_assert!(b < self.modulus);

        let ab = a as u128 * b as u128;
        let ab_hi = (ab >> 64) as u64;
        let ab_lo = ab as u64;

        let m = ab_lo.wrapping_mul(self.mred_constant);
        let mq_hi = ((m as u128 * self.modulus as u128) >> 64) as u64;

        // ab_lo - (m*q)_lo is 0 by construction, so no borrow into the high word
        let mut r = ab_hi + self.modulus - mq_hi;
        if r >= self.modulus {
            r -= self.modulus;
        }
        r
    }

    /// 2^64 mod modulus, ie 1 in Montgomery form
    pub const fn montgomery_one(&self) -> u64 {
        self.mform(1)
    }

    /// Montgomery form of a^-1, computed with Fermat's little theorem.
    pub fn inv_mform(&self, a: u64) -> u64 {
        self.mform(self.inv(self.reduce(a)))
    }

    pub fn add_mod_fast_vec(&self, a: &mut [u64], b: &[u64]) {
        izip!(a.iter_mut(), b.iter()).for_each(|(va, vb)| *va = self.add_mod_fast(*va, *vb));
    }

    /// Modulus subtraction
    ///
    /// Assumes each element in vec a and b are smaller than modulus
    pub fn sub_mod_fast_vec(&self, a: &mut [u64], b: &[u64]) {
        izip!(a.iter_mut(), b.iter()).for_each(|(va, vb)| *va = self.sub_mod_fast(*va, *vb));
    }

    pub fn neg_mod_fast_vec(&self, a: &mut [u64]) {
        a.iter_mut().for_each(|va| *va = self.neg_mod_fast(*va));
    }

    pub fn mul_mod_fast_vec(&self, a: &mut [u64], b: &[u64]) {
        izip!(a.iter_mut(), b.iter()).for_each(|(va, vb)| *va = self.mul_mod_fast(*va, *vb));
    }

    /// Barrett modulus multiplication of scalar with vector a
    ///
    /// Assumes scalar and all elements in a are smaller than modulus
    pub fn scalar_mul_mod_fast_vec(&self, a: &mut [u64], b: u64) {
        a.iter_mut().for_each(|v| {
            *v = self.mul_mod_fast(*v, b);
        });
    }

    pub fn mul_mod_montgomery_vec(&self, a: &mut [u64], b: &[u64]) {
        izip!(a.iter_mut(), b.iter()).for_each(|(va, vb)| *va = self.mred(*va, *vb));
    }

    /// a = a * b * 2^-64. With b = mform(c) this is a plain scalar multiplication by c.
    pub fn scalar_mul_mod_montgomery_vec(&self, a: &mut [u64], b: u64) {
        a.iter_mut().for_each(|v| {
            *v = self.mred(*v, b);
        });
    }

    /// r += a * b * 2^-64
    pub fn fma_montgomery_vec(&self, r: &mut [u64], a: &[u64], b: &[u64]) {
        izip!(r.iter_mut(), a.iter(), b.iter()).for_each(|(vr, va, vb)| {
            *vr = self.add_mod_fast(*vr, self.mred(*va, *vb));
        });
    }

    pub fn mform_vec(&self, a: &mut [u64]) {
        a.iter_mut().for_each(|v| *v = self.mform(*v));
    }

    pub fn reduce_vec(&self, a: &mut [u64]) {
        a.iter_mut().for_each(|v| {
            *v = self.reduce(*v);
        });
    }

    /// Modulus reduction of i64 values with small bound
    ///
    /// Assumes magnitude of all values is smaller than modulus
    pub fn reduce_vec_i64_small(&self, a: &[i64]) -> Vec<u64> {
        a.iter()
            .map(|v| {
                if *v < 0 {
                    ((self.modulus as i64) + *v) as u64
                } else {
                    *v as u64
                }
            })
            .collect()
    }

    pub fn random_vec<R: CryptoRng + RngCore>(&self, size: usize, rng: &mut R) -> Vec<u64> {
        rng.sample_iter(Uniform::new(0, self.modulus))
            .take(size)
            .collect()
    }
}
