use crate::error::{Error, Result};
use crate::modulus::Modulus;
use crate::nb_theory::generate_primes_vec;
use crate::poly::poly_context::PolyContext;
use crate::utils::{mod_inverse_biguint_u64, pow_mod_pow2, rot_to_galois_element};
use crate::utils::{rotations_for_inner_sum, GALOIS_GENERATOR};
use itertools::Itertools;
use ndarray::Array2;
use num_bigint::BigUint;
use num_bigint_dig::{prime::probably_prime, BigUint as BigUintDig};
use num_traits::{One, ToPrimitive};
use serde::{Deserialize, Serialize};
use traits::Ntt;

#[derive(PartialEq, Debug, Clone)]
pub enum PolyType {
    Q,
    P,
}

/// Serializable description of a parameter set.
///
/// Moduli are given either explicitly (`q`, `p`) or as bit sizes (`log_q`,
/// `log_p`) from which NTT friendly primes are generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametersLiteral {
    pub log_n: usize,
    pub q: Vec<u64>,
    pub p: Vec<u64>,
    pub log_q: Vec<usize>,
    pub log_p: Vec<usize>,
    pub pow2_base: usize,
    pub log_default_scale: usize,
}

impl Default for ParametersLiteral {
    fn default() -> Self {
        ParametersLiteral {
            log_n: 12,
            q: vec![],
            p: vec![],
            log_q: vec![55, 45, 45],
            log_p: vec![56],
            pow2_base: 0,
            log_default_scale: 45,
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
pub struct Parameters<T: Ntt> {
    pub degree: usize,
    pub log_degree: usize,

    pub q_moduli: Vec<u64>,
    pub p_moduli: Vec<u64>,
    pub q_moduli_ops: Vec<Modulus>,
    pub p_moduli_ops: Vec<Modulus>,
    pub q_ntt_ops: Vec<T>,
    pub p_ntt_ops: Vec<T>,

    pub pow2_base: usize,
    pub default_scale: f64,

    // indexed by [level_q][level_p]
    ksk_parameters: Vec<Vec<KeySwitchingParameters>>,
}

impl<T> Parameters<T>
where
    T: Ntt,
{
    pub fn new(literal: &ParametersLiteral) -> Result<Parameters<T>> {
        if literal.log_n < 4 || literal.log_n > 17 {
            return Err(Error::InvalidParameter(format!(
                "log_n = {} is outside [4, 17]",
                literal.log_n
            )));
        }
        let degree = 1usize << literal.log_n;

        let q_moduli = Self::moduli_from_literal("Q", &literal.q, &literal.log_q, degree, &[])?;
        let p_moduli =
            Self::moduli_from_literal("P", &literal.p, &literal.log_p, degree, &q_moduli)?;

        if q_moduli.len() > 255 {
            return Err(Error::InvalidParameter(format!(
                "{} Q moduli, at most 255 are supported",
                q_moduli.len()
            )));
        }
        if p_moduli.len() > 32 {
            return Err(Error::InvalidParameter(format!(
                "{} P moduli, at most 32 are supported",
                p_moduli.len()
            )));
        }

        let all = q_moduli.iter().chain(p_moduli.iter()).collect_vec();
        if all.iter().unique().count() != all.len() {
            return Err(Error::InvalidParameter("moduli must be distinct".into()));
        }
        for qi in all.iter() {
            if **qi >= (1 << 61) || **qi % (2 * degree as u64) != 1 {
                return Err(Error::InvalidParameter(format!(
                    "modulus {qi} must be smaller than 2^61 and congruent to 1 mod {}",
                    2 * degree
                )));
            }
            if !probably_prime(&BigUintDig::from(**qi), 20) {
                return Err(Error::InvalidParameter(format!("modulus {qi} is not prime")));
            }
            if literal.pow2_base != 0 && literal.pow2_base as u64 >= 64 - qi.leading_zeros() as u64
            {
                return Err(Error::InvalidParameter(format!(
                    "pow2_base {} is not smaller than the bit size of {qi}",
                    literal.pow2_base
                )));
            }
        }

        if literal.log_default_scale == 0 || literal.log_default_scale > 120 {
            return Err(Error::InvalidParameter(format!(
                "log_default_scale = {} is outside [1, 120]",
                literal.log_default_scale
            )));
        }

        let q_moduli_ops = q_moduli.iter().map(|qi| Modulus::new(*qi)).collect_vec();
        let p_moduli_ops = p_moduli.iter().map(|pi| Modulus::new(*pi)).collect_vec();
        let q_ntt_ops = Self::ntt_ops(&q_moduli, degree)?;
        let p_ntt_ops = Self::ntt_ops(&p_moduli, degree)?;

        let mut params = Parameters {
            degree,
            log_degree: literal.log_n,
            q_moduli,
            p_moduli,
            q_moduli_ops,
            p_moduli_ops,
            q_ntt_ops,
            p_ntt_ops,
            pow2_base: literal.pow2_base,
            default_scale: 2f64.powi(literal.log_default_scale as i32),
            ksk_parameters: vec![],
        };

        let ksk_parameters = (0..params.q_moduli.len())
            .map(|level_q| {
                (0..params.p_moduli.len())
                    .map(|level_p| {
                        KeySwitchingParameters::new(
                            &params.poly_ctx(&PolyType::Q, level_q),
                            &params.poly_ctx(&PolyType::P, level_p),
                        )
                    })
                    .collect_vec()
            })
            .collect_vec();
        params.ksk_parameters = ksk_parameters;

        Ok(params)
    }

    fn moduli_from_literal(
        name: &str,
        moduli: &[u64],
        sizes: &[usize],
        degree: usize,
        skip_list: &[u64],
    ) -> Result<Vec<u64>> {
        match (moduli.is_empty(), sizes.is_empty()) {
            (false, true) => Ok(moduli.to_vec()),
            (true, false) => generate_primes_vec(sizes, degree, skip_list),
            (false, false) => Err(Error::InvalidParameter(format!(
                "both {name} moduli and {name} moduli sizes are set"
            ))),
            (true, true) => Err(Error::InvalidParameter(format!(
                "at least one {name} modulus is required"
            ))),
        }
    }

    fn ntt_ops(moduli: &[u64], degree: usize) -> Result<Vec<T>> {
        moduli
            .iter()
            .map(|qi| {
                T::new(degree, *qi).ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "no NTT of degree {degree} exists modulo {qi}"
                    ))
                })
            })
            .collect()
    }

    pub fn max_level_q(&self) -> usize {
        self.q_moduli.len() - 1
    }

    pub fn max_level_p(&self) -> usize {
        self.p_moduli.len() - 1
    }

    pub fn max_slots(&self) -> usize {
        self.degree >> 1
    }

    pub fn log_max_slots(&self) -> usize {
        self.log_degree - 1
    }

    /// Largest bit size among Q[..=level_q] and P[..=level_p]. Levels above
    /// the maximum are clamped.
    pub fn max_bit(&self, level_q: usize, level_p: usize) -> usize {
        let q_count = std::cmp::min(level_q + 1, self.q_moduli.len());
        let p_count = std::cmp::min(level_p + 1, self.p_moduli.len());
        self.q_moduli[..q_count]
            .iter()
            .chain(self.p_moduli[..p_count].iter())
            .map(|qi| (64 - qi.leading_zeros()) as usize)
            .max()
            .unwrap_or(0)
    }

    /// Number of RNS groups of the gadget decomposition, ceil((level_q + 1) / (level_p + 1))
    pub fn decomp_rns(&self, level_q: usize, level_p: usize) -> usize {
        (level_q + level_p + 1) / (level_p + 1)
    }

    /// Number of base 2^pow2_base digits per RNS group
    pub fn decomp_pw2(&self, level_q: usize, level_p: usize) -> usize {
        if self.pow2_base == 0 || level_p > 0 {
            1
        } else {
            (self.max_bit(level_q, level_p) + self.pow2_base - 1) / self.pow2_base
        }
    }

    /// Context of Q (resp. P) limbs `0..=level`
    pub fn poly_ctx(&self, poly_type: &PolyType, level: usize) -> PolyContext<'_, T> {
        match poly_type {
            PolyType::Q => PolyContext {
                moduli_ops: (&self.q_moduli_ops[..=level], &[]),
                ntt_ops: (&self.q_ntt_ops[..=level], &[]),
                moduli_count: level + 1,
                degree: self.degree,
            },
            PolyType::P => PolyContext {
                moduli_ops: (&self.p_moduli_ops[..=level], &[]),
                ntt_ops: (&self.p_ntt_ops[..=level], &[]),
                moduli_count: level + 1,
                degree: self.degree,
            },
        }
    }

    /// Context of Q[..=level_q] followed by P[..=level_p]
    pub fn qp_ctx(&self, level_q: usize, level_p: usize) -> PolyContext<'_, T> {
        PolyContext {
            moduli_ops: (
                &self.q_moduli_ops[..=level_q],
                &self.p_moduli_ops[..=level_p],
            ),
            ntt_ops: (&self.q_ntt_ops[..=level_q], &self.p_ntt_ops[..=level_p]),
            moduli_count: level_q + level_p + 2,
            degree: self.degree,
        }
    }

    pub fn key_switching_parameters(
        &self,
        level_q: usize,
        level_p: usize,
    ) -> Result<&KeySwitchingParameters> {
        self.ksk_parameters
            .get(level_q)
            .and_then(|v| v.get(level_p))
            .ok_or(Error::InvalidLevel { level_q, level_p })
    }

    /// Galois element of the left rotation of the slots by `k`
    pub fn galois_element_for_column_rotation_by(&self, k: isize) -> usize {
        rot_to_galois_element(k, self.degree)
    }

    /// Galois element of the complex conjugation of the slots
    pub fn galois_element_for_row_rotation(&self) -> usize {
        2 * self.degree - 1
    }

    pub fn inverse_galois_element(&self, galois_element: usize) -> usize {
        // Z_2N^* has exponent N/2
        pow_mod_pow2(galois_element, self.degree / 2 - 1, 2 * self.degree)
    }

    /// Galois elements consumed by trace down to `2^log_slots` slots
    pub fn galois_elements_for_trace(&self, log_slots: usize) -> Vec<usize> {
        let mut galois_elements = (log_slots..self.log_degree - 1)
            .map(|i| pow_mod_pow2(GALOIS_GENERATOR, 1 << i, 2 * self.degree))
            .collect_vec();
        if log_slots == 0 {
            galois_elements.push(self.galois_element_for_row_rotation());
        }
        galois_elements
    }

    pub fn rotations_for_inner_sum(&self, batch_size: usize, n: usize) -> Vec<usize> {
        rotations_for_inner_sum(batch_size, n)
    }

    pub fn galois_elements_for_inner_sum(&self, batch_size: usize, n: usize) -> Vec<usize> {
        self.rotations_for_inner_sum(batch_size, n)
            .iter()
            .map(|k| self.galois_element_for_column_rotation_by(*k as isize))
            .filter(|g| *g != 1)
            .unique()
            .collect()
    }
}

/// Precomputation of the hybrid key switching at one `(level_q, level_p)`.
///
/// Q limbs are split into groups of `alpha = level_p + 1` consecutive limbs.
/// Group j is extended to `Q \ Q_j ∪ P` with moduli ordered as
/// `Q[..start] ++ Q[end..] ++ P`.
#[derive(PartialEq, Clone, Debug)]
pub struct KeySwitchingParameters {
    pub(crate) alpha: usize,
    pub(crate) decomp_rns: usize,

    // approx_switch_crt_basis //
    pub(crate) qj_hat_inv_modqj_parts: Vec<Vec<u64>>,
    pub(crate) qj_hat_modqpj_parts: Vec<Array2<u64>>,
    pub(crate) qpj_moduli_ops_parts: Vec<Vec<Modulus>>,

    // approx_mod_down //
    pub(crate) p_hat_inv_modp: Vec<u64>,
    pub(crate) p_hat_modq: Array2<u64>,
    pub(crate) p_inv_modq: Vec<u64>,
}

impl KeySwitchingParameters {
    pub fn new<T: Ntt>(
        q_ctx: &PolyContext<'_, T>,
        p_ctx: &PolyContext<'_, T>,
    ) -> KeySwitchingParameters {
        let alpha = p_ctx.moduli_count;
        let q_moduli_ops = q_ctx.moduli_ops();
        let p_moduli_ops = p_ctx.moduli_ops();
        let p = p_ctx.big_q();

        let mut qj_hat_inv_modqj_parts = vec![];
        let mut qj_hat_modqpj_parts = vec![];
        let mut qpj_moduli_ops_parts = vec![];

        q_moduli_ops
            .chunks(alpha)
            .enumerate()
            .for_each(|(chunk_index, qj_moduli_ops)| {
                let start = chunk_index * alpha;
                let end = start + qj_moduli_ops.len();

                // Qj
                let mut qj = BigUint::one();
                qj_moduli_ops.iter().for_each(|modqi| qj *= modqi.modulus());

                // [(Qj/qji)^-1]_qji
                let qj_hat_inv_modqj = qj_moduli_ops
                    .iter()
                    .map(|modqji| mod_inverse_biguint_u64(&(&qj / modqji.modulus()), modqji.modulus()))
                    .collect_vec();

                let mut qpj_moduli_ops = vec![];
                qpj_moduli_ops.extend_from_slice(&q_moduli_ops[..start]);
                qpj_moduli_ops.extend_from_slice(&q_moduli_ops[end..]);
                qpj_moduli_ops.extend_from_slice(p_moduli_ops);

                // [Qj/qji]_qpjk, rows qpjk, cols qji
                let qj_hat_modqpj = Array2::from_shape_fn(
                    (qpj_moduli_ops.len(), qj_moduli_ops.len()),
                    |(k, i)| {
                        ((&qj / qj_moduli_ops[i].modulus()) % qpj_moduli_ops[k].modulus())
                            .to_u64()
                            .unwrap_or_default()
                    },
                );

                qj_hat_inv_modqj_parts.push(qj_hat_inv_modqj);
                qj_hat_modqpj_parts.push(qj_hat_modqpj);
                qpj_moduli_ops_parts.push(qpj_moduli_ops);
            });

        // Precompute for P to Q (used for approx_switch_crt_basis in approx_mod_down)
        let p_hat_inv_modp = p_moduli_ops
            .iter()
            .map(|modpi| mod_inverse_biguint_u64(&(&p / modpi.modulus()), modpi.modulus()))
            .collect_vec();
        let p_hat_modq = Array2::from_shape_fn((q_moduli_ops.len(), alpha), |(j, i)| {
            ((&p / p_moduli_ops[i].modulus()) % q_moduli_ops[j].modulus())
                .to_u64()
                .unwrap_or_default()
        });
        // Precompute for dividing values in basis Q by P (approx_mod_down)
        let p_inv_modq = q_moduli_ops
            .iter()
            .map(|modqi| mod_inverse_biguint_u64(&p, modqi.modulus()))
            .collect_vec();

        KeySwitchingParameters {
            alpha,
            decomp_rns: qj_hat_inv_modqj_parts.len(),
            qj_hat_inv_modqj_parts,
            qj_hat_modqpj_parts,
            qpj_moduli_ops_parts,
            p_hat_inv_modp,
            p_hat_modq,
            p_inv_modq,
        }
    }
}
