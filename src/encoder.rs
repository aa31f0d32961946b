use crate::error::{Error, Result};
use crate::gadget_ciphertext::PolyQP;
use crate::modulus::Modulus;
use crate::parameters::{Parameters, PolyType};
use crate::plaintext::Plaintext;
use crate::utils::GALOIS_GENERATOR;
use crate::{Poly, PolyContext, Representation};
use num_bigint::{BigInt, Sign};
use num_complex::Complex64;
use num_traits::{FromPrimitive, ToPrimitive};
use std::f64::consts::PI;
use std::fmt::Debug;
use traits::Ntt;

/// Numeric type that can be placed in a plaintext slot.
pub trait SlotValue: Copy + Default + Debug + Send + Sync {
    fn to_complex(self) -> Complex64;
}

impl SlotValue for f64 {
    fn to_complex(self) -> Complex64 {
        Complex64::new(self, 0.0)
    }
}

impl SlotValue for Complex64 {
    fn to_complex(self) -> Complex64 {
        self
    }
}

/// Embedding of slot values into ring polynomials.
pub trait Embed<V: SlotValue> {
    /// Largest number of slots a plaintext can hold
    fn max_slots(&self) -> usize;

    /// Embeds `values` (zero padded to `2^log_slots`) scaled by `scale` into
    /// every limb of `output`. Polynomials in Evaluation form receive the NTT
    /// of the embedding. With `montgomery` set the limbs end in Montgomery form.
    fn embed(
        &self,
        values: &[V],
        log_slots: usize,
        scale: f64,
        montgomery: bool,
        output: &mut PolyQP,
    ) -> Result<()>;
}

/// CKKS encoder over the canonical embedding, evaluated with the special FFT.
#[derive(Debug)]
pub struct Encoder<'a, T: Ntt> {
    params: &'a Parameters<T>,
    m: usize,
    rot_group: Vec<usize>,
    roots: Vec<Complex64>,
}

impl<'a, T: Ntt> Encoder<'a, T> {
    pub fn new(params: &'a Parameters<T>) -> Encoder<'a, T> {
        let m = params.degree << 1;

        let mut rot_group = Vec::with_capacity(m >> 2);
        let mut g = 1usize;
        for _ in 0..m >> 2 {
            rot_group.push(g);
            g = (g * GALOIS_GENERATOR) & (m - 1);
        }

        let roots = (0..=m)
            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * (k as f64) / (m as f64)))
            .collect();

        Encoder {
            params,
            m,
            rot_group,
            roots,
        }
    }

    pub fn params(&self) -> &Parameters<T> {
        self.params
    }

    /// Encodes `values` on `2^log_slots` slots in Q at `level`, Evaluation form.
    pub fn encode<V: SlotValue>(
        &self,
        values: &[V],
        log_slots: usize,
        scale: f64,
        level: usize,
    ) -> Result<Plaintext> {
        if level > self.params.max_level_q() {
            return Err(Error::InvalidParameter(format!(
                "level {level} exceeds the maximum Q level {}",
                self.params.max_level_q()
            )));
        }
        let mut value = PolyQP::new(self.params, level, None, Representation::Evaluation);
        self.embed(values, log_slots, scale, false, &mut value)?;
        Ok(Plaintext::new(value, level, log_slots, scale, false))
    }

    /// Decodes the first `2^log_slots` slots of a Q polynomial (any representation).
    pub fn decode(&self, poly: &Poly, log_slots: usize, scale: f64) -> Result<Vec<Complex64>> {
        self.check_log_slots(log_slots)?;
        let slots = 1 << log_slots;
        let ctx = self.params.poly_ctx(&PolyType::Q, poly.level());

        let mut p = poly.clone();
        ctx.change_representation(&mut p, Representation::Coefficient);
        let coefficients = centered_f64(&ctx, &p);

        let half = self.params.degree >> 1;
        let gap = half / slots;
        let mut values = (0..slots)
            .map(|i| {
                Complex64::new(coefficients[i * gap], coefficients[half + i * gap]) / scale
            })
            .collect::<Vec<_>>();
        self.special_fft(&mut values);
        Ok(values)
    }

    fn check_log_slots(&self, log_slots: usize) -> Result<()> {
        if log_slots > self.params.log_max_slots() {
            return Err(Error::InvalidParameter(format!(
                "log_slots {log_slots} exceeds {}",
                self.params.log_max_slots()
            )));
        }
        Ok(())
    }

    /// Slots to coefficients of the canonical embedding, in place.
    fn special_inv_fft(&self, values: &mut [Complex64]) {
        let n = values.len();
        let log_n = n.trailing_zeros() as usize;
        let log_m = self.m.trailing_zeros() as usize;

        for log_len in (1..=log_n).rev() {
            let len = 1 << log_len;
            let len_h = len >> 1;
            let len_q = len << 2;
            let log_gap = log_m - 2 - log_len;
            let mask = len_q - 1;
            for i in (0..n).step_by(len) {
                for j in 0..len_h {
                    let k = i + j;
                    let u = values[k] + values[k + len_h];
                    let v = (values[k] - values[k + len_h])
                        * self.roots[(len_q - (self.rot_group[j] & mask)) << log_gap];
                    values[k] = u;
                    values[k + len_h] = v;
                }
            }
        }

        values.iter_mut().for_each(|v| *v /= n as f64);
        bit_reverse_in_place(values);
    }

    /// Coefficients to slots, inverse of `special_inv_fft`.
    fn special_fft(&self, values: &mut [Complex64]) {
        let n = values.len();
        let log_n = n.trailing_zeros() as usize;
        let log_m = self.m.trailing_zeros() as usize;

        bit_reverse_in_place(values);
        for log_len in 1..=log_n {
            let len = 1 << log_len;
            let len_h = len >> 1;
            let len_q = len << 2;
            let log_gap = log_m - 2 - log_len;
            let mask = len_q - 1;
            for i in (0..n).step_by(len) {
                for j in 0..len_h {
                    let k = i + j;
                    let u = values[k];
                    let v = values[k + len_h] * self.roots[(self.rot_group[j] & mask) << log_gap];
                    values[k] = u + v;
                    values[k + len_h] = u - v;
                }
            }
        }
    }

    /// Writes the rounded coefficients into every limb of `poly`.
    fn write_coefficients(
        &self,
        ctx: &PolyContext<'_, T>,
        coefficients: &[Rounded],
        montgomery: bool,
        poly: &mut Poly,
    ) {
        let representation = poly.representation;
        poly.representation = Representation::Coefficient;

        for (mut row, modqi) in poly
            .coefficients
            .outer_iter_mut()
            .zip(ctx.iter_moduli_ops())
        {
            row.iter_mut()
                .zip(coefficients.iter())
                .for_each(|(r, c)| *r = c.reduce(modqi));
        }

        ctx.change_representation(poly, representation);
        if montgomery {
            ctx.mform_assign(poly);
        }
    }
}

impl<'a, T: Ntt, V: SlotValue> Embed<V> for Encoder<'a, T> {
    fn max_slots(&self) -> usize {
        self.params.max_slots()
    }

    fn embed(
        &self,
        values: &[V],
        log_slots: usize,
        scale: f64,
        montgomery: bool,
        output: &mut PolyQP,
    ) -> Result<()> {
        self.check_log_slots(log_slots)?;
        let slots = 1 << log_slots;
        if values.len() > slots {
            return Err(Error::InvalidParameter(format!(
                "{} values do not fit in {slots} slots",
                values.len()
            )));
        }

        let mut buffer = vec![Complex64::default(); slots];
        buffer
            .iter_mut()
            .zip(values.iter())
            .for_each(|(b, v)| *b = v.to_complex());
        self.special_inv_fft(&mut buffer);

        let degree = self.params.degree;
        let half = degree >> 1;
        let gap = half / slots;
        let mut coefficients = vec![Rounded::Small(0); degree];
        buffer.iter().enumerate().for_each(|(i, v)| {
            coefficients[i * gap] = Rounded::new(v.re * scale);
            coefficients[half + i * gap] = Rounded::new(v.im * scale);
        });

        if let Some(q) = output.q.as_mut() {
            let ctx = self.params.poly_ctx(&PolyType::Q, q.level());
            self.write_coefficients(&ctx, &coefficients, montgomery, q);
        }
        if let Some(p) = output.p.as_mut() {
            let ctx = self.params.poly_ctx(&PolyType::P, p.level());
            self.write_coefficients(&ctx, &coefficients, montgomery, p);
        }
        Ok(())
    }
}

/// Scaled and rounded coefficient. Values beyond 2^63 keep arbitrary precision.
#[derive(Clone, Debug)]
enum Rounded {
    Small(i64),
    Big(BigInt),
}

impl Rounded {
    fn new(x: f64) -> Rounded {
        let x = x.round();
        if x.abs() < 9.223372036854775807e18 {
            Rounded::Small(x as i64)
        } else {
            Rounded::Big(BigInt::from_f64(x).unwrap_or_default())
        }
    }

    fn reduce(&self, modqi: &Modulus) -> u64 {
        let q = modqi.modulus();
        let (negative, r) = match self {
            Rounded::Small(v) => (*v < 0, v.unsigned_abs() % q),
            Rounded::Big(v) => (
                v.sign() == Sign::Minus,
                (v.magnitude() % q).to_u64().unwrap_or(0),
            ),
        };
        if negative {
            modqi.neg_mod_fast(r)
        } else {
            r
        }
    }
}

/// CRT reconstruction centered in (-Q/2, Q/2], as f64
fn centered_f64<T: Ntt>(ctx: &PolyContext<'_, T>, p: &Poly) -> Vec<f64> {
    let big_q = ctx.big_q();
    let half_q = &big_q >> 1usize;
    ctx.try_convert_to_biguint(p)
        .into_iter()
        .map(|v| {
            if v > half_q {
                -(&big_q - v).to_f64().unwrap_or(f64::INFINITY)
            } else {
                v.to_f64().unwrap_or(f64::INFINITY)
            }
        })
        .collect()
}

fn bit_reverse_in_place<V>(values: &mut [V]) {
    let n = values.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            values.swap(i, j);
        }
    }
}
