use crate::error::{Error, Result};
use crate::evaluation_key::RotationKeySet;
use crate::key_switching::gadget_product;
use crate::linear_transform::LinearTransform;
use crate::parameters::PolyType;
use crate::{Ciphertext, Parameters, Plaintext, Poly, Representation, Substitution};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{debug, instrument, trace};

pub struct Evaluator {
    pub(crate) params: Parameters,
    pub(crate) rtks: RotationKeySet,
}

impl Evaluator {
    pub fn new(params: Parameters, rtks: RotationKeySet) -> Evaluator {
        Evaluator { params, rtks }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn rotation_keys(&self) -> &RotationKeySet {
        &self.rtks
    }

    fn check_linear(ct: &Ciphertext, name: &str) -> Result<()> {
        if ct.degree() != 1 {
            return Err(Error::InvalidOperand(format!(
                "{name} has degree {}, expected 1",
                ct.degree()
            )));
        }
        Ok(())
    }

    /// Applies X -> X^galois_element to the plaintext of `ct`.
    ///
    /// Both components are substituted, then the substituted `c1` is switched
    /// from `φ_g(s)` back to `s` with the key registered for the element.
    #[instrument(skip_all, fields(galois_element = galois_element))]
    pub fn automorphism(&self, ct: &Ciphertext, galois_element: usize) -> Result<Ciphertext> {
        Evaluator::check_linear(ct, "ciphertext")?;
        if galois_element == 1 {
            return Ok(ct.clone());
        }
        let key = self.rtks.get(galois_element)?;

        let level = ct.level;
        let ctx = self.params.poly_ctx(&PolyType::Q, level);
        let subs = Substitution::new(galois_element, self.params.degree);

        let c1 = ctx.substitute(&ct.c[1], &subs);
        let (mut d0, mut d1) =
            gadget_product(&self.params, level, &c1, key.gadget_ciphertext())?;

        let mut c0 = ctx.substitute(&ct.c[0], &subs);
        ctx.change_representation(&mut c0, Representation::Evaluation);
        ctx.add_assign(&mut d0, &c0);

        let representation = ct.c[0].representation;
        ctx.change_representation(&mut d0, representation);
        ctx.change_representation(&mut d1, representation);

        Ok(Ciphertext::new(vec![d0, d1], level, ct.log_slots, ct.scale))
    }

    /// Rotates the slots left by `k`. Negative `k` rotates right.
    #[instrument(skip_all, fields(k = k))]
    pub fn rotate(&self, ct: &Ciphertext, k: isize) -> Result<Ciphertext> {
        let galois_element = self.params.galois_element_for_column_rotation_by(k);
        self.automorphism(ct, galois_element)
    }

    /// Complex conjugation of every slot
    pub fn conjugate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.automorphism(ct, self.params.galois_element_for_row_rotation())
    }

    fn check_log_slots(&self, ct: &Ciphertext) -> Result<()> {
        if ct.log_slots > self.params.log_max_slots() {
            return Err(Error::InvalidOperand(format!(
                "ciphertext claims 2^{} slots, ring has 2^{}",
                ct.log_slots,
                self.params.log_max_slots()
            )));
        }
        Ok(())
    }

    fn check_same_degree(lhs: &Ciphertext, rhs: &Ciphertext) -> Result<()> {
        if lhs.degree() != rhs.degree() {
            return Err(Error::InvalidOperand(format!(
                "ciphertexts of degree {} and {}",
                lhs.degree(),
                rhs.degree()
            )));
        }
        Ok(())
    }

    /// lhs += rhs at the lower of both levels
    pub fn add_assign(&self, lhs: &mut Ciphertext, rhs: &Ciphertext) -> Result<()> {
        Evaluator::check_same_degree(lhs, rhs)?;
        lhs.drop_to_level(rhs.level);
        let ctx = self.params.poly_ctx(&PolyType::Q, lhs.level);
        lhs.c
            .iter_mut()
            .zip(rhs.c.iter())
            .for_each(|(l, r)| ctx.add_assign(l, r));
        Ok(())
    }

    pub fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        let mut out = lhs.clone();
        self.add_assign(&mut out, rhs)?;
        Ok(out)
    }

    pub fn sub_assign(&self, lhs: &mut Ciphertext, rhs: &Ciphertext) -> Result<()> {
        Evaluator::check_same_degree(lhs, rhs)?;
        lhs.drop_to_level(rhs.level);
        let ctx = self.params.poly_ctx(&PolyType::Q, lhs.level);
        lhs.c
            .iter_mut()
            .zip(rhs.c.iter())
            .for_each(|(l, r)| ctx.sub_assign(l, r));
        Ok(())
    }

    pub fn sub(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        let mut out = lhs.clone();
        self.sub_assign(&mut out, rhs)?;
        Ok(out)
    }

    /// Multiplies every component by `poly`, in Montgomery form when `montgomery` is set.
    fn mul_poly(&self, ct: &Ciphertext, poly: &Poly, montgomery: bool) -> Ciphertext {
        let level = std::cmp::min(ct.level, poly.level());
        let ctx = self.params.poly_ctx(&PolyType::Q, level);

        let mut poly = poly.clone();
        poly.truncate(level);
        ctx.change_representation(&mut poly, Representation::Evaluation);

        let mut out = ct.clone();
        out.drop_to_level(level);
        out.c.iter_mut().for_each(|c| {
            let representation = c.representation;
            ctx.change_representation(c, Representation::Evaluation);
            if montgomery {
                ctx.mul_montgomery_assign(c, &poly);
            } else {
                ctx.mul_assign(c, &poly);
            }
            ctx.change_representation(c, representation);
        });
        out
    }

    /// Slot-wise product with a plaintext. The output scale is the product of both scales.
    pub fn mul_plaintext(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        let poly = pt
            .value
            .q
            .as_ref()
            .ok_or_else(|| Error::InvalidOperand("plaintext without Q part".into()))?;
        let mut out = self.mul_poly(ct, poly, pt.is_montgomery);
        out.scale = ct.scale * pt.scale;
        Ok(out)
    }

    /// Maps the plaintext `m(X)` to `sum_g m(X^g)` for g in the subgroup fixing
    /// `2^log_slots` slots, divided by its order. Coefficients at multiples of
    /// `N / 2^(log_slots + 1)` are kept, all others are zeroed.
    #[instrument(skip_all, fields(log_slots = log_slots))]
    pub fn trace(
        &self,
        ct_in: &Ciphertext,
        log_slots: usize,
        ct_out: &mut Ciphertext,
    ) -> Result<()> {
        Evaluator::check_linear(ct_in, "input")?;
        Evaluator::check_linear(ct_out, "output")?;
        if log_slots > self.params.log_max_slots() {
            return Err(Error::InvalidParameter(format!(
                "cannot trace to {log_slots} log slots, ring has {}",
                self.params.log_max_slots()
            )));
        }

        let level = std::cmp::min(ct_in.level, ct_out.level);
        let mut gap = 1usize << (self.params.log_degree - 1 - log_slots);
        if log_slots == 0 {
            gap <<= 1;
        }

        let mut acc = ct_in.clone();
        acc.drop_to_level(level);

        if gap > 1 {
            let ctx = self.params.poly_ctx(&PolyType::Q, level);
            let inv_gap = ctx
                .iter_moduli_ops()
                .map(|modqi| modqi.inv_mform(gap as u64))
                .collect_vec();
            trace!(gap, ?inv_gap, "trace pre-scaling");
            acc.c
                .iter_mut()
                .for_each(|c| ctx.scalar_mul_montgomery_assign(c, &inv_gap));

            for galois_element in self.params.galois_elements_for_trace(log_slots) {
                debug!(galois_element, "trace step");
                let rotated = self.automorphism(&acc, galois_element)?;
                self.add_assign(&mut acc, &rotated)?;
            }
        }

        *ct_out = acc;
        Ok(())
    }

    pub fn trace_new(&self, ct_in: &Ciphertext, log_slots: usize) -> Result<Ciphertext> {
        let mut ct_out = Ciphertext::zero(
            &self.params,
            1,
            ct_in.level,
            ct_in.log_slots,
            ct_in.scale,
        );
        self.trace(ct_in, log_slots, &mut ct_out)?;
        Ok(ct_out)
    }

    /// Sums `n` consecutive batches of `batch_size` slots. Every slot `p` of
    /// the output holds `sum_{t < n} ct_in[p + t * batch_size]`.
    ///
    /// Needs the keys of `Parameters::rotations_for_inner_sum(batch_size, n)`.
    #[instrument(skip_all, fields(batch_size = batch_size, n = n))]
    pub fn inner_sum(
        &self,
        ct_in: &Ciphertext,
        batch_size: usize,
        n: usize,
        ct_out: &mut Ciphertext,
    ) -> Result<()> {
        Evaluator::check_linear(ct_in, "input")?;
        Evaluator::check_linear(ct_out, "output")?;
        self.check_log_slots(ct_in)?;
        let slots = 1usize << ct_in.log_slots;
        if batch_size == 0
            || n == 0
            || batch_size.checked_mul(n).map_or(true, |total| total > slots)
        {
            return Err(Error::InvalidParameter(format!(
                "cannot sum {n} batches of {batch_size} slots over {slots} slots"
            )));
        }

        if n == 1 {
            *ct_out = ct_in.clone();
            return Ok(());
        }

        let mut c = ct_in.clone();
        let mut acc: Option<Ciphertext> = None;
        let mut result: Option<Ciphertext> = None;

        let mut i = 0;
        let mut j = n;
        while j > 0 {
            if j & 1 == 1 {
                let k = (n - (n & ((2 << i) - 1))) * batch_size;
                if k != 0 {
                    debug!(k, "inner sum accumulate");
                    let rotated = self.rotate(&c, k as isize)?;
                    match acc.as_mut() {
                        Some(acc) => self.add_assign(acc, &rotated)?,
                        None => acc = Some(rotated),
                    }
                } else {
                    result = Some(match acc.take() {
                        Some(acc) => self.add(&acc, &c)?,
                        None => c.clone(),
                    });
                }
            }

            if result.is_none() {
                let k = (1 << i) * batch_size;
                debug!(k, "inner sum doubling");
                let rotated = self.rotate(&c, k as isize)?;
                self.add_assign(&mut c, &rotated)?;
            }

            i += 1;
            j >>= 1;
        }

        // the lowest set bit of n always produces k = 0
        *ct_out = result.unwrap_or(c);
        Ok(())
    }

    /// Replaces every batch of `2^log_batch_size` slots by the average of all batches.
    #[instrument(skip_all, fields(log_batch_size = log_batch_size))]
    pub fn average(
        &self,
        ct_in: &Ciphertext,
        log_batch_size: usize,
        ct_out: &mut Ciphertext,
    ) -> Result<()> {
        if ct_in.degree() != 1 || ct_out.degree() != 1 {
            return Err(Error::InvalidOperand(format!(
                "average needs degree 1 operands, got {} and {}",
                ct_in.degree(),
                ct_out.degree()
            )));
        }
        self.check_log_slots(ct_in)?;
        if log_batch_size > ct_in.log_slots {
            return Err(Error::InvalidParameter(format!(
                "batch of 2^{log_batch_size} slots exceeds 2^{} slots",
                ct_in.log_slots
            )));
        }

        let level = std::cmp::min(ct_in.level, ct_out.level);
        let n = 1usize << (ct_in.log_slots - log_batch_size);

        // pre-multiplication by n^-1
        let ctx = self.params.poly_ctx(&PolyType::Q, level);
        let inv_n = ctx
            .iter_moduli_ops()
            .map(|modqi| modqi.inv_mform(n as u64))
            .collect_vec();
        let mut scaled = ct_in.clone();
        scaled.drop_to_level(level);
        scaled
            .c
            .iter_mut()
            .for_each(|c| ctx.scalar_mul_montgomery_assign(c, &inv_n));

        self.inner_sum(&scaled, 1 << log_batch_size, n, ct_out)
    }

    /// Evaluates the plaintext matrix `lt` on the slots of `ct`.
    #[instrument(skip_all, fields(bsgs = lt.is_bsgs()))]
    pub fn linear_transform(&self, ct: &Ciphertext, lt: &LinearTransform) -> Result<Ciphertext> {
        Evaluator::check_linear(ct, "ciphertext")?;
        let level = std::cmp::min(ct.level, lt.level);
        let mut ct = ct.clone();
        ct.drop_to_level(level);

        let mut acc: Option<Ciphertext> = None;
        if lt.is_bsgs() {
            let mut babies: HashMap<usize, Ciphertext> = HashMap::new();
            for (giant, steps) in lt.bsgs_groups() {
                let mut inner: Option<Ciphertext> = None;
                for baby in steps {
                    if !babies.contains_key(&baby) {
                        babies.insert(baby, self.rotate(&ct, baby as isize)?);
                    }
                    let term = self.mul_poly(&babies[&baby], diagonal(lt, giant + baby)?, true);
                    match inner.as_mut() {
                        Some(inner) => self.add_assign(inner, &term)?,
                        None => inner = Some(term),
                    }
                }

                if let Some(inner) = inner {
                    let term = self.rotate(&inner, giant as isize)?;
                    match acc.as_mut() {
                        Some(acc) => self.add_assign(acc, &term)?,
                        None => acc = Some(term),
                    }
                }
            }
        } else {
            for k in lt.diagonals.keys().sorted() {
                let rotated = self.rotate(&ct, *k as isize)?;
                let term = self.mul_poly(&rotated, diagonal(lt, *k)?, true);
                match acc.as_mut() {
                    Some(acc) => self.add_assign(acc, &term)?,
                    None => acc = Some(term),
                }
            }
        }

        let mut out = acc.unwrap_or_else(|| {
            Ciphertext::zero(&self.params, 1, level, ct.log_slots, ct.scale)
        });
        out.scale = ct.scale * lt.scale;
        Ok(out)
    }
}

fn diagonal(lt: &LinearTransform, k: usize) -> Result<&Poly> {
    lt.diagonals
        .get(&k)
        .and_then(|pt| pt.q.as_ref())
        .ok_or_else(|| Error::InvalidOperand(format!("diagonal {k} has no Q part")))
}
