use crate::evaluation_key::EvaluationKey;
use crate::gadget_ciphertext::PolyQP;
use crate::parameters::PolyType;
use crate::{
    Ciphertext, Parameters, Plaintext, Poly, PolyContext, Representation, Substitution,
};
use itertools::Itertools;
use rand::{CryptoRng, Rng, RngCore};

/// Variance of the centered binomial error distribution
const ERROR_VARIANCE: usize = 10;

#[derive(Clone, PartialEq, Debug)]
pub struct SecretKey {
    pub(crate) coefficients: Box<[i64]>,
}

/// Samples `size` values from the centered binomial distribution of the given variance.
pub fn sample_vec_cbd<R: CryptoRng + RngCore>(
    size: usize,
    variance: usize,
    rng: &mut R,
) -> Vec<i64> {
    (0..size)
        .map(|_| {
            let mut v = 0i64;
            for _ in 0..2 * variance {
                v += rng.gen::<bool>() as i64;
                v -= rng.gen::<bool>() as i64;
            }
            v
        })
        .collect()
}

impl SecretKey {
    /// Generates a random ternary secret key with fixed hamming weight `hw`.
    pub fn random<R: CryptoRng + RngCore>(degree: usize, hw: usize, rng: &mut R) -> SecretKey {
        let mut sk = vec![0i64; degree];

        // sample `hw` distinct indices from this set
        let mut indices = (0..degree).collect_vec();

        for i in 0..hw {
            let sampled_index = rng.gen_range(0..degree - i);
            sk[indices[sampled_index]] = if rng.gen::<bool>() { 1 } else { -1 };

            let last = indices.len() - 1;
            indices.swap(sampled_index, last);
            indices.truncate(last);
        }

        SecretKey {
            coefficients: sk.into_boxed_slice(),
        }
    }

    /// Secret key polynomial in the given context, in Evaluation form
    pub fn to_poly(&self, ctx: &PolyContext<'_, crate::NttOperator>) -> Poly {
        let mut p = ctx.try_convert_from_i64_small(&self.coefficients, Representation::Coefficient);
        ctx.change_representation(&mut p, Representation::Evaluation);
        p
    }

    fn error<R: CryptoRng + RngCore>(ctx: &PolyContext<'_, crate::NttOperator>, rng: &mut R) -> Poly {
        let mut e = ctx.try_convert_from_i64_small(
            &sample_vec_cbd(ctx.degree(), ERROR_VARIANCE, rng),
            Representation::Coefficient,
        );
        ctx.change_representation(&mut e, Representation::Evaluation);
        e
    }

    /// Encrypts `pt` as `(-a*s + e + m, a)`
    pub fn encrypt<R: CryptoRng + RngCore>(
        &self,
        params: &Parameters,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Ciphertext {
        let ctx = params.poly_ctx(&PolyType::Q, pt.level());
        let m = pt.value().q.as_ref().unwrap();
        assert!(m.representation == Representation::Evaluation && !pt.is_montgomery());

        let a = ctx.random(Representation::Evaluation, rng);
        let mut c0 = a.clone();
        ctx.mul_assign(&mut c0, &self.to_poly(&ctx));
        ctx.neg_assign(&mut c0);
        ctx.add_assign(&mut c0, &SecretKey::error(&ctx, rng));
        ctx.add_assign(&mut c0, m);

        Ciphertext::new(vec![c0, a], pt.level(), pt.log_slots(), pt.scale())
    }

    /// Returns `c0 + c1*s` as a plaintext in Evaluation form
    pub fn decrypt(&self, params: &Parameters, ct: &Ciphertext) -> Plaintext {
        assert!(ct.degree() == 1);
        let ctx = params.poly_ctx(&PolyType::Q, ct.level());

        let mut m = ct.c[1].clone();
        ctx.mul_assign(&mut m, &self.to_poly(&ctx));
        ctx.add_assign(&mut m, &ct.c[0]);

        Plaintext::new(
            PolyQP { q: Some(m), p: None },
            ct.level(),
            ct.log_slots(),
            ct.scale(),
            false,
        )
    }

    /// Key switching key from `s_in` to `self`.
    ///
    /// `s_in` is in Evaluation form with at least `level_q + 1` Q limbs.
    pub fn gen_evaluation_key<R: CryptoRng + RngCore>(
        &self,
        params: &Parameters,
        s_in: &Poly,
        level_q: usize,
        level_p: usize,
        rng: &mut R,
    ) -> EvaluationKey {
        let q_ctx = params.poly_ctx(&PolyType::Q, level_q);
        let p_ctx = params.poly_ctx(&PolyType::P, level_p);
        let s_out_q = self.to_poly(&q_ctx);
        let s_out_p = self.to_poly(&p_ctx);

        let big_p = p_ctx.big_q();
        let p_modq = q_ctx
            .iter_moduli_ops()
            .map(|qi| (&big_p % qi.modulus()).iter_u64_digits().next().unwrap_or(0))
            .collect_vec();

        let mut key = EvaluationKey::new(params, level_q, level_p).unwrap();
        let alpha = level_p + 1;
        let q_count = level_q + 1;

        for (i, row) in key.0.value.iter_mut().enumerate() {
            let start = i * alpha;
            let end = std::cmp::min(start + alpha, q_count);

            for (j, element) in row.iter_mut().enumerate() {
                let a_q = q_ctx.random(Representation::Evaluation, rng);
                let a_p = p_ctx.random(Representation::Evaluation, rng);

                let mut b_q = a_q.clone();
                q_ctx.mul_assign(&mut b_q, &s_out_q);
                q_ctx.neg_assign(&mut b_q);
                let mut b_p = a_p.clone();
                p_ctx.mul_assign(&mut b_p, &s_out_p);
                p_ctx.neg_assign(&mut b_p);

                // same error on both halves
                let e = sample_vec_cbd(params.degree, ERROR_VARIANCE, rng);
                let mut e_q = q_ctx.try_convert_from_i64_small(&e, Representation::Coefficient);
                let mut e_p = p_ctx.try_convert_from_i64_small(&e, Representation::Coefficient);
                q_ctx.change_representation(&mut e_q, Representation::Evaluation);
                p_ctx.change_representation(&mut e_p, Representation::Evaluation);
                q_ctx.add_assign(&mut b_q, &e_q);
                p_ctx.add_assign(&mut b_p, &e_p);

                // + P * 2^(w*j) * s_in on the limbs of group i
                for k in start..end {
                    let modqk = &params.q_moduli_ops[k];
                    let mut factor = p_modq[k];
                    if params.pow2_base != 0 {
                        let pw2 = modqk.reduce(1u64 << (params.pow2_base * j));
                        factor = modqk.mul_mod_fast(factor, pw2);
                    }
                    b_q.coefficients
                        .row_mut(k)
                        .iter_mut()
                        .zip(s_in.coefficients.row(k).iter())
                        .for_each(|(b, s)| {
                            *b = modqk.add_mod_fast(*b, modqk.mul_mod_fast(*s, factor))
                        });
                }

                let mut polys = [b_q, a_q, b_p, a_p];
                polys[..2].iter_mut().for_each(|p| q_ctx.mform_assign(p));
                polys[2..].iter_mut().for_each(|p| p_ctx.mform_assign(p));
                let [b_q, a_q, b_p, a_p] = polys;

                element.value[0] = PolyQP {
                    q: Some(b_q),
                    p: Some(b_p),
                };
                element.value[1] = PolyQP {
                    q: Some(a_q),
                    p: Some(a_p),
                };
            }
        }
        key
    }

    /// Key switching `φ_g(s)` back to `s`, as consumed by automorphisms
    pub fn gen_rotation_key<R: CryptoRng + RngCore>(
        &self,
        params: &Parameters,
        galois_element: usize,
        level_q: usize,
        level_p: usize,
        rng: &mut R,
    ) -> EvaluationKey {
        let q_ctx = params.poly_ctx(&PolyType::Q, level_q);
        let s_in = q_ctx.substitute(
            &self.to_poly(&q_ctx),
            &Substitution::new(galois_element, params.degree),
        );
        self.gen_evaluation_key(params, &s_in, level_q, level_p, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParametersLiteral;
    use rand::thread_rng;

    #[test]
    fn hamming_weight_works() {
        let mut rng = thread_rng();
        let sk = SecretKey::random(1 << 10, 1 << 8, &mut rng);
        assert_eq!(sk.coefficients.iter().filter(|c| **c != 0).count(), 1 << 8);
        assert!(sk.coefficients.iter().all(|c| (-1..=1).contains(c)));
    }

    #[test]
    fn cbd_is_bounded() {
        let mut rng = thread_rng();
        let v = sample_vec_cbd(1 << 10, ERROR_VARIANCE, &mut rng);
        assert!(v.iter().all(|x| x.abs() <= 2 * ERROR_VARIANCE as i64));
    }

    #[test]
    fn decrypt_of_encryption_is_close() {
        let mut rng = thread_rng();
        let params = Parameters::new(&ParametersLiteral {
            log_n: 5,
            log_q: vec![50, 40],
            log_p: vec![50],
            ..Default::default()
        })
        .unwrap();
        let sk = SecretKey::random(params.degree, params.degree / 2, &mut rng);
        let ctx = params.poly_ctx(&PolyType::Q, 1);

        let m = ctx.random(Representation::Evaluation, &mut rng);
        let pt = Plaintext::new(PolyQP { q: Some(m.clone()), p: None }, 1, 4, 1.0, false);
        let ct = sk.encrypt(&params, &pt, &mut rng);

        let mut diff = sk.decrypt(&params, &ct).value().q.clone().unwrap();
        ctx.sub_assign(&mut diff, &m);
        ctx.change_representation(&mut diff, Representation::Coefficient);
        let big_q = ctx.big_q();
        ctx.try_convert_to_biguint(&diff).iter().for_each(|v| {
            let v = std::cmp::min(v.clone(), &big_q - v);
            assert!(v.bits() <= 6);
        });
    }
}
