use crate::utils::mod_inverse_biguint_u64;
use crate::Poly;
use crate::{modulus::Modulus, Representation, Substitution};
use itertools::izip;
use ndarray::{s, Array2, ArrayView2, Axis};
use num_bigint::BigUint;
use num_traits::{identities::One, Zero};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use seq_macro::seq;
use traits::Ntt;

/// Borrowed view of an RNS basis.
///
/// The basis is the concatenation of two moduli slices so that Q and P limbs
/// owned by [`crate::parameters::Parameters`] can be viewed as a single QP basis
/// without copying.
#[derive(PartialEq, Debug)]
pub struct PolyContext<'a, T: Ntt> {
    pub(crate) moduli_ops: (&'a [Modulus], &'a [Modulus]),
    pub(crate) ntt_ops: (&'a [T], &'a [T]),
    pub(crate) moduli_count: usize,
    pub(crate) degree: usize,
}

impl<T> PolyContext<'_, T>
where
    T: Ntt,
{
    pub fn iter_moduli_ops(&self) -> impl Iterator<Item = &Modulus> {
        self.moduli_ops.0.iter().chain(self.moduli_ops.1.iter())
    }

    pub fn iter_ntt_ops(&self) -> impl Iterator<Item = &T> {
        self.ntt_ops.0.iter().chain(self.ntt_ops.1.iter())
    }

    pub fn big_q(&self) -> BigUint {
        let mut q = BigUint::one();
        self.iter_moduli_ops().for_each(|qi| {
            q *= qi.modulus();
        });
        q
    }

    /// Moduli of a single-slice context
    pub fn moduli_ops(&self) -> &[Modulus] {
        debug_assert!(self.moduli_ops.1.is_empty());
        self.moduli_ops.0
    }

    pub fn moduli_count(&self) -> usize {
        self.moduli_count
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl<T> PolyContext<'_, T>
where
    T: Ntt,
{
    pub fn new(&self, coefficients: Array2<u64>, representation: Representation) -> Poly {
        debug_assert!(coefficients.shape() == [self.moduli_count, self.degree]);
        Poly {
            coefficients,
            representation,
        }
    }

    /// Creates zero polynomial with a given context and representation
    pub fn zero(&self, representation: Representation) -> Poly {
        Poly {
            coefficients: Array2::zeros((self.moduli_count, self.degree)),
            representation,
        }
    }

    /// Creates a polynomial with random values for given context and representation
    pub fn random<R: RngCore + CryptoRng>(
        &self,
        representation: Representation,
        rng: &mut R,
    ) -> Poly {
        let mut poly = self.zero(representation);
        izip!(poly.coefficients.outer_iter_mut(), self.iter_moduli_ops()).for_each(
            |(mut coefficients, q)| {
                coefficients
                    .as_slice_mut()
                    .unwrap()
                    .copy_from_slice(q.random_vec(self.degree, rng).as_slice());
            },
        );
        poly
    }

    /// Same as `random` with values expanded from `seed`
    pub fn random_with_seed(&self, representation: Representation, seed: [u8; 32]) -> Poly {
        let mut rng = ChaCha8Rng::from_seed(seed);
        self.random(representation, &mut rng)
    }

    /// Changes representation of the polynomial to `to` representation
    pub fn change_representation(&self, poly: &mut Poly, to: Representation) {
        debug_assert!(poly.moduli_count() == self.moduli_count);
        match (poly.representation, to) {
            (Representation::Evaluation, Representation::Coefficient) => {
                izip!(poly.coefficients.outer_iter_mut(), self.iter_ntt_ops()).for_each(
                    |(mut coefficients, ntt)| ntt.backward(coefficients.as_slice_mut().unwrap()),
                );
                poly.representation = Representation::Coefficient;
            }
            (Representation::Coefficient, Representation::Evaluation) => {
                izip!(poly.coefficients.outer_iter_mut(), self.iter_ntt_ops()).for_each(
                    |(mut coefficients, ntt)| ntt.forward(coefficients.as_slice_mut().unwrap()),
                );
                poly.representation = Representation::Evaluation;
            }
            _ => {}
        }
    }

    /// Given polynomial p(X) returns p(X^i) for substitution exponent i.
    ///
    /// The map is applied in coefficient form. Polynomials in Evaluation form
    /// are switched back and forth, output has the representation of the input.
    pub fn substitute(&self, poly: &Poly, subs: &Substitution) -> Poly {
        debug_assert!(self.degree == subs.degree);

        let mut input = poly.clone();
        self.change_representation(&mut input, Representation::Coefficient);

        let mut p = self.zero(Representation::Coefficient);
        let mask = self.degree - 1;
        for j in 0..self.degree {
            let exponent = subs.power[j];
            izip!(
                input.coefficients.slice(s![.., j]),
                p.coefficients.slice_mut(s![.., mask & exponent]),
                self.iter_moduli_ops()
            )
            .for_each(|(qxi, pxi, modqi)| {
                if exponent & self.degree != 0 {
                    *pxi = modqi.neg_mod_fast(*qxi);
                } else {
                    *pxi = *qxi;
                }
            });
        }

        self.change_representation(&mut p, poly.representation);
        p
    }

    /// Switches CRT basis from Q to P approximately.
    ///
    /// Computes `sum_i [x_i * (Q/q_i)^-1]_{q_i} * (Q/q_i) mod p_j`, ie the result
    /// equals x + u*Q for some small u < |Q|.
    ///
    /// `q_hat_modp` has one row per output modulus and one column per input modulus.
    pub fn approx_switch_crt_basis(
        q_coefficients: &ArrayView2<u64>,
        q_moduli_ops: &[Modulus],
        degree: usize,
        q_hat_inv_modq: &[u64],
        q_hat_modp: &Array2<u64>,
        p_moduli_ops: &[Modulus],
    ) -> Array2<u64> {
        debug_assert!(q_moduli_ops.len() == q_coefficients.shape()[0]);
        debug_assert!(q_moduli_ops.len() <= 32);
        debug_assert!(degree % 8 == 0);

        let p_size = p_moduli_ops.len();
        let q_size = q_moduli_ops.len();

        let mut p_coeffs = Array2::<u64>::zeros((p_size, degree));
        let mut tmp = vec![0u64; q_size * 8];

        for ri in (0..degree).step_by(8) {
            for i in 0..q_size {
                let modq = &q_moduli_ops[i];
                let op = q_hat_inv_modq[i];

                seq!(N in 0..8 {
                    tmp[i * 8 + N] = modq.mul_mod_fast(q_coefficients[(i, ri + N)], op);
                });
            }

            for j in 0..p_size {
                seq!(N in 0..8 {
                    let mut s~N = 0u128;
                });

                for i in 0..q_size {
                    let op = q_hat_modp[(j, i)] as u128;
                    seq!(N in 0..8 {
                        s~N += tmp[i * 8 + N] as u128 * op;
                    });
                }

                let modpj = &p_moduli_ops[j];
                seq!(N in 0..8 {
                    p_coeffs[(j, ri + N)] = modpj.barret_reduction_u128(s~N);
                });
            }
        }

        p_coeffs
    }

    /// Approx mod down
    ///
    /// `self` is the Q context and (`q_poly`, `p_poly`) are the two halves of a QP
    /// polynomial in Evaluation form. Returns `(q_poly, p_poly) / P` in Q, in
    /// Evaluation form. The `uP` overflow of the approximate P to Q switch turns
    /// into an additive error u < |P| after the division by P.
    #[allow(clippy::too_many_arguments)]
    pub fn approx_mod_down(
        &self,
        p_context: &PolyContext<'_, T>,
        q_poly: &Poly,
        p_poly: &Poly,
        p_hat_inv_modp: &[u64],
        p_hat_modq: &Array2<u64>,
        p_inv_modq: &[u64],
    ) -> Poly {
        debug_assert!(q_poly.representation == Representation::Evaluation);
        debug_assert!(p_poly.representation == Representation::Evaluation);
        debug_assert!(q_poly.moduli_count() == self.moduli_count);
        debug_assert!(p_poly.moduli_count() == p_context.moduli_count);

        let mut p_coefficients = p_poly.clone();
        p_context.change_representation(&mut p_coefficients, Representation::Coefficient);

        let mut p_to_q_coefficients = PolyContext::<T>::approx_switch_crt_basis(
            &p_coefficients.coefficients.view(),
            p_context.moduli_ops(),
            self.degree,
            p_hat_inv_modp,
            p_hat_modq,
            self.moduli_ops(),
        );

        // Back to Evaluation so that the subtraction and the scaling by 1/P happen in the same form as q_poly
        izip!(p_to_q_coefficients.outer_iter_mut(), self.iter_ntt_ops()).for_each(
            |(mut v, ntt_op)| {
                ntt_op.forward(v.as_slice_mut().unwrap());
            },
        );

        let mut out = q_poly.clone();
        izip!(
            out.coefficients.outer_iter_mut(),
            p_to_q_coefficients.outer_iter(),
            self.iter_moduli_ops(),
            p_inv_modq.iter(),
        )
        .for_each(|(mut v, switched_v, modqi, p_inv_modqi)| {
            modqi.sub_mod_fast_vec(v.as_slice_mut().unwrap(), switched_v.as_slice().unwrap());
            modqi.scalar_mul_mod_fast_vec(v.as_slice_mut().unwrap(), *p_inv_modqi);
        });
        out
    }

    pub fn neg_assign(&self, p0: &mut Poly) {
        izip!(p0.coefficients.outer_iter_mut(), self.iter_moduli_ops()).for_each(
            |(mut coeffs, modqi)| {
                modqi.neg_mod_fast_vec(coeffs.as_slice_mut().unwrap());
            },
        );
    }

    pub fn add_assign(&self, lhs: &mut Poly, rhs: &Poly) {
        debug_assert!(lhs.representation == rhs.representation);

        izip!(
            lhs.coefficients.outer_iter_mut(),
            rhs.coefficients.outer_iter(),
            self.iter_moduli_ops()
        )
        .for_each(|(mut p1, p2, q)| {
            q.add_mod_fast_vec(p1.as_slice_mut().unwrap(), p2.as_slice().unwrap())
        });
    }

    pub fn add(&self, lhs: &Poly, rhs: &Poly) -> Poly {
        let mut lhs = lhs.clone();
        self.add_assign(&mut lhs, rhs);
        lhs
    }

    pub fn sub_assign(&self, lhs: &mut Poly, rhs: &Poly) {
        debug_assert!(lhs.representation == rhs.representation);
        izip!(
            lhs.coefficients.outer_iter_mut(),
            rhs.coefficients.outer_iter(),
            self.iter_moduli_ops()
        )
        .for_each(|(mut p1, p2, q)| {
            q.sub_mod_fast_vec(p1.as_slice_mut().unwrap(), p2.as_slice().unwrap())
        });
    }

    pub fn sub(&self, lhs: &Poly, rhs: &Poly) -> Poly {
        let mut lhs = lhs.clone();
        self.sub_assign(&mut lhs, rhs);
        lhs
    }

    /// Barrett multiplication, both operands in Evaluation form
    pub fn mul_assign(&self, lhs: &mut Poly, rhs: &Poly) {
        debug_assert!(lhs.representation == rhs.representation);
        debug_assert!(lhs.representation == Representation::Evaluation);

        izip!(
            lhs.coefficients.outer_iter_mut(),
            rhs.coefficients.outer_iter(),
            self.iter_moduli_ops()
        )
        .for_each(|(mut p, p2, modqi)| {
            modqi.mul_mod_fast_vec(p.as_slice_mut().unwrap(), p2.as_slice().unwrap());
        });
    }

    /// lhs = lhs * rhs * 2^-64. With rhs in Montgomery form this is the plain product.
    pub fn mul_montgomery_assign(&self, lhs: &mut Poly, rhs: &Poly) {
        debug_assert!(lhs.representation == rhs.representation);
        debug_assert!(lhs.representation == Representation::Evaluation);

        izip!(
            lhs.coefficients.outer_iter_mut(),
            rhs.coefficients.outer_iter(),
            self.iter_moduli_ops()
        )
        .for_each(|(mut p, p2, modqi)| {
            modqi.mul_mod_montgomery_vec(p.as_slice_mut().unwrap(), p2.as_slice().unwrap());
        });
    }

    /// acc += a * b * 2^-64
    pub fn fma_montgomery(&self, acc: &mut Poly, a: &Poly, b: &Poly) {
        debug_assert!(a.representation == b.representation);
        izip!(
            acc.coefficients.outer_iter_mut(),
            a.coefficients.outer_iter(),
            b.coefficients.outer_iter(),
            self.iter_moduli_ops()
        )
        .for_each(|(mut r, a, b, modqi)| {
            modqi.fma_montgomery_vec(
                r.as_slice_mut().unwrap(),
                a.as_slice().unwrap(),
                b.as_slice().unwrap(),
            )
        });
    }

    pub fn mform_assign(&self, p: &mut Poly) {
        izip!(p.coefficients.outer_iter_mut(), self.iter_moduli_ops()).for_each(
            |(mut coeffs, modqi)| {
                modqi.mform_vec(coeffs.as_slice_mut().unwrap());
            },
        );
    }

    /// Multiplies limb i by `scalars[i] * 2^-64`
    pub fn scalar_mul_montgomery_assign(&self, p: &mut Poly, scalars: &[u64]) {
        debug_assert!(scalars.len() >= self.moduli_count);
        izip!(
            p.coefficients.outer_iter_mut(),
            self.iter_moduli_ops(),
            scalars.iter()
        )
        .for_each(|(mut coeffs, modqi, scalar)| {
            modqi.scalar_mul_mod_montgomery_vec(coeffs.as_slice_mut().unwrap(), *scalar);
        });
    }
}

impl<T> PolyContext<'_, T>
where
    T: Ntt,
{
    /// Constructs a polynomial with given i64 values with small bound and assumes the given representation.
    ///
    /// Panics if length of values is not equal to polynomial degree
    pub fn try_convert_from_i64_small(
        &self,
        values: &[i64],
        representation: Representation,
    ) -> Poly {
        assert!(values.len() == self.degree);
        let mut p = self.zero(representation);
        izip!(p.coefficients.outer_iter_mut(), self.iter_moduli_ops()).for_each(
            |(mut qi_values, qi)| {
                qi_values
                    .as_slice_mut()
                    .unwrap()
                    .copy_from_slice(qi.reduce_vec_i64_small(values).as_slice());
            },
        );
        p
    }

    /// CRT reconstruction of every coefficient in `[0, Q)`
    pub fn try_convert_to_biguint(&self, p: &Poly) -> Vec<BigUint> {
        assert!(p.representation == Representation::Coefficient);

        let big_q = self.big_q();
        let mut q_hat = vec![];
        let mut q_hat_inv = vec![];
        self.iter_moduli_ops().for_each(|modqi| {
            let qi = modqi.modulus();
            let qi_hat = &big_q / qi;
            let qi_hat_inv = mod_inverse_biguint_u64(&qi_hat, qi);
            q_hat.push(qi_hat);
            q_hat_inv.push(qi_hat_inv);
        });

        let mut values = vec![];
        p.coefficients.axis_iter(Axis(1)).for_each(|rests| {
            let mut v = BigUint::zero();
            izip!(
                rests.iter(),
                q_hat.iter(),
                q_hat_inv.iter(),
                self.iter_moduli_ops()
            )
            .for_each(|(xi, qi_hat, qi_hat_inv, modqi)| {
                v += qi_hat * modqi.mul_mod_fast(*xi, *qi_hat_inv);
            });
            values.push(v % &big_q);
        });
        values
    }
}
