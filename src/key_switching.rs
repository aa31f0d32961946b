use crate::error::{Error, Result};
use crate::gadget_ciphertext::{CiphertextQP, GadgetCiphertext};
use crate::parameters::{Parameters, PolyType};
use crate::{Poly, PolyContext, Representation};
use ndarray::{s, Array2};
use tracing::{debug, instrument};
use traits::Ntt;

/// Hybrid key switching of `c` against `gct`.
///
/// Decomposes `c` (in Q at `level_q`, any representation) with the gadget of
/// `gct`, multiplies each digit with the matching gadget element in QP and
/// divides both accumulators by P. Returns `(d0, d1)` in Q at `level_q`, in
/// Evaluation form, with `d0 + d1 * s_out ≈ c * s_in`.
#[instrument(skip_all, fields(level_q = level_q, level_p = gct.level_p()))]
pub fn gadget_product<T: Ntt>(
    params: &Parameters<T>,
    level_q: usize,
    c: &Poly,
    gct: &GadgetCiphertext,
) -> Result<(Poly, Poly)> {
    let level_p = gct.level_p();
    if level_q > gct.level_q() {
        return Err(Error::InvalidLevel { level_q, level_p });
    }
    if c.moduli_count() <= level_q {
        return Err(Error::InvalidOperand(format!(
            "polynomial has {} limbs, key switching at level {level_q} needs {}",
            c.moduli_count(),
            level_q + 1
        )));
    }

    let decomp_rns = params.decomp_rns(level_q, level_p);
    let decomp_pw2 = params.decomp_pw2(level_q, level_p);
    if gct.decomp_rns() < decomp_rns || gct.decomp_pw2() < decomp_pw2 {
        return Err(Error::InvalidOperand(format!(
            "gadget ciphertext of shape {}x{} cannot decompose {decomp_rns}x{decomp_pw2}",
            gct.decomp_rns(),
            gct.decomp_pw2()
        )));
    }
    debug!(decomp_rns, decomp_pw2, "gadget product");

    let q_ctx = params.poly_ctx(&PolyType::Q, level_q);
    let p_ctx = params.poly_ctx(&PolyType::P, level_p);
    let ksp = params.key_switching_parameters(level_q, level_p)?;

    let mut c_coeff = c.clone();
    c_coeff.truncate(level_q);
    q_ctx.change_representation(&mut c_coeff, Representation::Coefficient);

    let mut acc = Accumulator::new(&q_ctx, &p_ctx);

    if decomp_pw2 == 1 {
        let q_count = level_q + 1;
        for i in 0..decomp_rns {
            let start = i * ksp.alpha;
            let end = std::cmp::min(start + ksp.alpha, q_count);
            let group_len = end - start;

            // ModUp of Q_i to Q \ Q_i ∪ P
            let switched = PolyContext::<T>::approx_switch_crt_basis(
                &c_coeff.coefficients.slice(s![start..end, ..]),
                &params.q_moduli_ops[start..end],
                params.degree,
                &ksp.qj_hat_inv_modqj_parts[i],
                &ksp.qj_hat_modqpj_parts[i],
                &ksp.qpj_moduli_ops_parts[i],
            );

            let mut d_q = Array2::zeros((q_count, params.degree));
            d_q.slice_mut(s![..start, ..])
                .assign(&switched.slice(s![..start, ..]));
            d_q.slice_mut(s![start..end, ..])
                .assign(&c_coeff.coefficients.slice(s![start..end, ..]));
            d_q.slice_mut(s![end.., ..])
                .assign(&switched.slice(s![start..q_count - group_len, ..]));
            let d_p = switched.slice(s![q_count - group_len.., ..]).to_owned();

            let mut d_q = q_ctx.new(d_q, Representation::Coefficient);
            let mut d_p = p_ctx.new(d_p, Representation::Coefficient);
            q_ctx.change_representation(&mut d_q, Representation::Evaluation);
            p_ctx.change_representation(&mut d_p, Representation::Evaluation);

            acc.fma(&d_q, &d_p, element(gct, i, 0)?)?;
        }
    } else {
        // level_p == 0: one limb per group, split in base 2^pow2_base digits
        let qp_ctx = params.qp_ctx(level_q, level_p);
        let q_count = level_q + 1;
        let w = params.pow2_base;
        let mask = (1u64 << w) - 1;

        for i in 0..decomp_rns {
            let limb = c_coeff.coefficients.row(i);
            for j in 0..decomp_pw2 {
                // digits are smaller than every modulus, lifting is exact
                let digits =
                    Array2::from_shape_fn((qp_ctx.moduli_count(), params.degree), |(_, k)| {
                        (limb[k] >> (j * w)) & mask
                    });
                let mut d = qp_ctx.new(digits, Representation::Coefficient);
                qp_ctx.change_representation(&mut d, Representation::Evaluation);

                let d_q = q_ctx.new(
                    d.coefficients.slice(s![..q_count, ..]).to_owned(),
                    Representation::Evaluation,
                );
                let d_p = p_ctx.new(
                    d.coefficients.slice(s![q_count.., ..]).to_owned(),
                    Representation::Evaluation,
                );

                acc.fma(&d_q, &d_p, element(gct, i, j)?)?;
            }
        }
    }

    Ok(acc.mod_down(&q_ctx, &p_ctx, ksp))
}

fn element(gct: &GadgetCiphertext, i: usize, j: usize) -> Result<&CiphertextQP> {
    gct.value
        .get(i)
        .and_then(|row| row.get(j))
        .ok_or_else(|| {
            Error::InvalidOperand(format!("gadget ciphertext has no element ({i}, {j})"))
        })
}

/// Pair of QP accumulators of the gadget product.
struct Accumulator<'a, 'b, T: Ntt> {
    q_ctx: &'a PolyContext<'b, T>,
    p_ctx: &'a PolyContext<'b, T>,
    q: [Poly; 2],
    p: [Poly; 2],
}

impl<'a, 'b, T: Ntt> Accumulator<'a, 'b, T> {
    fn new(q_ctx: &'a PolyContext<'b, T>, p_ctx: &'a PolyContext<'b, T>) -> Self {
        Accumulator {
            q_ctx,
            p_ctx,
            q: [
                q_ctx.zero(Representation::Evaluation),
                q_ctx.zero(Representation::Evaluation),
            ],
            p: [
                p_ctx.zero(Representation::Evaluation),
                p_ctx.zero(Representation::Evaluation),
            ],
        }
    }

    /// acc_k += d * key_k, key in Montgomery form
    fn fma(&mut self, d_q: &Poly, d_p: &Poly, key: &CiphertextQP) -> Result<()> {
        for (k, value) in key.value.iter().enumerate() {
            let (key_q, key_p) = match (value.q.as_ref(), value.p.as_ref()) {
                (Some(q), Some(p)) => (q, p),
                _ => {
                    return Err(Error::InvalidOperand(
                        "gadget ciphertext element without Q or P part".into(),
                    ))
                }
            };
            let q_ok = key_q.degree() == self.q_ctx.degree()
                && key_q.moduli_count() >= self.q_ctx.moduli_count();
            let p_ok = key_p.degree() == self.p_ctx.degree()
                && key_p.moduli_count() == self.p_ctx.moduli_count();
            if !q_ok || !p_ok {
                return Err(Error::InvalidOperand(format!(
                    "gadget ciphertext element of shape Q {}x{}, P {}x{} does not match Q {}x{}, P {}x{}",
                    key_q.moduli_count(),
                    key_q.degree(),
                    key_p.moduli_count(),
                    key_p.degree(),
                    self.q_ctx.moduli_count(),
                    self.q_ctx.degree(),
                    self.p_ctx.moduli_count(),
                    self.p_ctx.degree()
                )));
            }
            self.q_ctx.fma_montgomery(&mut self.q[k], d_q, key_q);
            self.p_ctx.fma_montgomery(&mut self.p[k], d_p, key_p);
        }
        Ok(())
    }

    fn mod_down(
        self,
        q_ctx: &PolyContext<'_, T>,
        p_ctx: &PolyContext<'_, T>,
        ksp: &crate::parameters::KeySwitchingParameters,
    ) -> (Poly, Poly) {
        let [q0, q1] = self.q;
        let [p0, p1] = self.p;
        let mod_down = |q: &Poly, p: &Poly| {
            q_ctx.approx_mod_down(
                p_ctx,
                q,
                p,
                &ksp.p_hat_inv_modp,
                &ksp.p_hat_modq,
                &ksp.p_inv_modq,
            )
        };
        (mod_down(&q0, &p0), mod_down(&q1, &p1))
    }
}
