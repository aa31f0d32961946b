use crate::encoder::{Embed, SlotValue};
use crate::error::{Error, Result};
use crate::gadget_ciphertext::PolyQP;
use crate::parameters::Parameters;
use crate::Representation;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use traits::Ntt;

/// Encodes the diagonals of a plaintext matrix, optionally pre-rotated.
///
/// Diagonal `k` of a `slots x slots` matrix `M` is `d_k[p] = M[p][(p + k) mod slots]`.
/// Keys may be given in `[0, slots)` or as negative offsets `k - slots`.
pub struct LinearTransformEncoder<'a, V: SlotValue> {
    encoder: &'a dyn Embed<V>,
    diagonals: HashMap<isize, Vec<V>>,
    values: Vec<V>,
}

impl<'a, V: SlotValue> LinearTransformEncoder<'a, V> {
    pub fn new(
        encoder: &'a dyn Embed<V>,
        diagonals: HashMap<isize, Vec<V>>,
    ) -> LinearTransformEncoder<'a, V> {
        LinearTransformEncoder {
            encoder,
            values: vec![V::default(); encoder.max_slots()],
            diagonals,
        }
    }

    /// Keys of the stored diagonals, in no particular order
    pub fn non_zero_diagonals(&self) -> Vec<isize> {
        self.diagonals.keys().copied().collect()
    }

    /// Embeds diagonal `i` as is, in Montgomery form.
    pub fn encode_diagonal_naive(
        &self,
        i: isize,
        scale: f64,
        log_slots: usize,
        output: &mut PolyQP,
    ) -> Result<()> {
        let diagonal = self.diagonals.get(&i).ok_or(Error::DiagonalNotFound(i))?;
        let slots = std::cmp::min(diagonal.len(), 1 << log_slots);
        self.encoder
            .embed(&diagonal[..slots], log_slots, scale, true, output)
    }

    /// Embeds diagonal `i` rotated left by `rot` slots, in Montgomery form.
    ///
    /// Falls back to the key `i - slots` when `i` is absent. `rot` is taken
    /// modulo the slot count, so negative values rotate right.
    pub fn encode_diagonal_rotated(
        &mut self,
        i: isize,
        rot: isize,
        scale: f64,
        log_slots: usize,
        output: &mut PolyQP,
    ) -> Result<()> {
        let slots = 1usize << log_slots;
        if slots > self.values.len() {
            return Err(Error::InvalidParameter(format!(
                "{slots} slots exceed the {} available",
                self.values.len()
            )));
        }

        let v = self
            .diagonals
            .get(&i)
            .or_else(|| self.diagonals.get(&(i - slots as isize)))
            .ok_or(Error::DiagonalNotFound(i))?;
        if v.len() < slots {
            return Err(Error::InvalidParameter(format!(
                "diagonal {i} has {} values, {slots} slots needed",
                v.len()
            )));
        }

        let rot = (rot & (slots as isize - 1)) as usize;
        if rot == 0 {
            return self
                .encoder
                .embed(&v[..slots], log_slots, scale, true, output);
        }

        self.values[..slots - rot].copy_from_slice(&v[rot..slots]);
        self.values[slots - rot..slots].copy_from_slice(&v[..rot]);
        self.encoder
            .embed(&self.values[..slots], log_slots, scale, true, output)
    }
}

/// Giant step of `k` for baby step count `n1`, and the baby step
fn bsgs_index(k: usize, slots: usize, n1: usize) -> (usize, usize) {
    let k = k & (slots - 1);
    ((k / n1) * n1, k & (n1 - 1))
}

/// Largest power of two `n1` for which the ratio of baby steps to giant steps
/// stays below `2^log_max_ratio`.
pub fn find_best_bsgs_ratio(diagonals: &[isize], slots: usize, log_max_ratio: usize) -> usize {
    let max_ratio = (1usize << log_max_ratio) as f64;
    let mut n1 = 1;
    while n1 < slots {
        let mut giants = HashSet::new();
        let mut babies = HashSet::new();
        diagonals.iter().for_each(|k| {
            let (g, b) = bsgs_index(k.rem_euclid(slots as isize) as usize, slots, n1);
            giants.insert(g);
            babies.insert(b);
        });

        let n_giants = giants.len().saturating_sub(1) as f64;
        let n_babies = babies.len().saturating_sub(1) as f64;
        let ratio = n_babies / n_giants;
        if ratio == max_ratio {
            return n1;
        }
        if ratio > max_ratio {
            return std::cmp::max(n1 / 2, 1);
        }
        n1 <<= 1;
    }
    1
}

/// Plaintext matrix ready to be applied to ciphertexts.
///
/// Diagonals are keyed by their index in `[0, slots)`. With `n1 == 0` every
/// diagonal is applied after its own rotation. Otherwise diagonals are grouped
/// by giant step and pre-rotated right by it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTransform {
    pub(crate) level: usize,
    pub(crate) log_slots: usize,
    pub(crate) scale: f64,
    pub(crate) n1: usize,
    pub(crate) diagonals: HashMap<usize, PolyQP>,
}

impl LinearTransform {
    /// One encoded diagonal per rotation.
    pub fn new_naive<T: Ntt, V: SlotValue>(
        params: &Parameters<T>,
        encoder: &LinearTransformEncoder<'_, V>,
        level: usize,
        scale: f64,
        log_slots: usize,
    ) -> Result<LinearTransform> {
        let slots = check_shape(params, level, log_slots)?;

        let mut diagonals = HashMap::new();
        for k in encoder.non_zero_diagonals() {
            let index = k.rem_euclid(slots as isize) as usize;
            let mut pt = PolyQP::new(params, level, None, Representation::Evaluation);
            encoder.encode_diagonal_naive(k, scale, log_slots, &mut pt)?;
            if diagonals.insert(index, pt).is_some() {
                return Err(Error::InvalidParameter(format!(
                    "diagonal {index} given twice"
                )));
            }
        }

        Ok(LinearTransform {
            level,
            log_slots,
            scale,
            n1: 0,
            diagonals,
        })
    }

    /// Baby-step giant-step form with `n1` picked by [`find_best_bsgs_ratio`].
    pub fn new_bsgs<T: Ntt, V: SlotValue>(
        params: &Parameters<T>,
        encoder: &mut LinearTransformEncoder<'_, V>,
        level: usize,
        scale: f64,
        log_slots: usize,
        log_bsgs_ratio: usize,
    ) -> Result<LinearTransform> {
        let slots = check_shape(params, level, log_slots)?;
        let keys = encoder.non_zero_diagonals();
        let n1 = find_best_bsgs_ratio(&keys, slots, log_bsgs_ratio);
        debug!(n1, diagonals = keys.len(), "baby-step giant-step split");

        let mut diagonals = HashMap::new();
        for k in keys {
            let index = k.rem_euclid(slots as isize) as usize;
            let (giant, _) = bsgs_index(index, slots, n1);
            let mut pt = PolyQP::new(params, level, None, Representation::Evaluation);
            encoder.encode_diagonal_rotated(
                index as isize,
                -(giant as isize),
                scale,
                log_slots,
                &mut pt,
            )?;
            if diagonals.insert(index, pt).is_some() {
                return Err(Error::InvalidParameter(format!(
                    "diagonal {index} given twice"
                )));
            }
        }

        Ok(LinearTransform {
            level,
            log_slots,
            scale,
            n1,
            diagonals,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn log_slots(&self) -> usize {
        self.log_slots
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_bsgs(&self) -> bool {
        self.n1 != 0
    }

    /// Diagonal indices grouped by giant step, baby steps ascending
    pub(crate) fn bsgs_groups(&self) -> Vec<(usize, Vec<usize>)> {
        let slots = 1 << self.log_slots;
        self.diagonals
            .keys()
            .map(|k| bsgs_index(*k, slots, self.n1))
            .into_group_map()
            .into_iter()
            .map(|(giant, babies)| (giant, babies.into_iter().sorted().collect()))
            .sorted()
            .collect()
    }

    /// Left rotations the evaluation needs keys for, ascending, 0 excluded
    pub fn rotations(&self) -> Vec<usize> {
        let rotations = if self.is_bsgs() {
            self.bsgs_groups()
                .into_iter()
                .flat_map(|(giant, babies)| std::iter::once(giant).chain(babies))
                .collect_vec()
        } else {
            self.diagonals.keys().copied().collect_vec()
        };
        rotations
            .into_iter()
            .filter(|r| *r != 0)
            .unique()
            .sorted()
            .collect()
    }
}

fn check_shape<T: Ntt>(params: &Parameters<T>, level: usize, log_slots: usize) -> Result<usize> {
    if level > params.max_level_q() {
        return Err(Error::InvalidParameter(format!(
            "level {level} exceeds the maximum Q level {}",
            params.max_level_q()
        )));
    }
    if log_slots > params.log_max_slots() {
        return Err(Error::InvalidParameter(format!(
            "log_slots {log_slots} exceeds {}",
            params.log_max_slots()
        )));
    }
    Ok(1 << log_slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::{parameters::ParametersLiteral, Parameters};
    use num_complex::Complex64;

    fn params() -> Parameters {
        Parameters::new(&ParametersLiteral {
            log_n: 5,
            log_q: vec![50, 40],
            log_p: vec![50],
            ..Default::default()
        })
        .unwrap()
    }

    fn embed<V: SlotValue>(
        params: &Parameters,
        encoder: &Encoder<'_, crate::NttOperator>,
        values: &[V],
        log_slots: usize,
    ) -> PolyQP {
        let mut out = PolyQP::new(params, 1, Some(0), Representation::Evaluation);
        encoder
            .embed(values, log_slots, 1e6, true, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn rotated_diagonal_works() {
        let params = params();
        let encoder = Encoder::new(&params);
        let diagonals = HashMap::from([(0isize, vec![1.0f64, 2.0, 3.0, 4.0])]);
        let mut lt_encoder = LinearTransformEncoder::new(&encoder, diagonals);

        let mut out = PolyQP::new(&params, 1, Some(0), Representation::Evaluation);
        lt_encoder
            .encode_diagonal_rotated(0, 1, 1e6, 2, &mut out)
            .unwrap();
        assert_eq!(out, embed(&params, &encoder, &[2.0, 3.0, 4.0, 1.0], 2));

        // rotations are taken modulo the slot count
        for (rot, expected) in [
            (5, [2.0, 3.0, 4.0, 1.0]),
            (-1, [4.0, 1.0, 2.0, 3.0]),
            (2, [3.0, 4.0, 1.0, 2.0]),
        ] {
            lt_encoder
                .encode_diagonal_rotated(0, rot, 1e6, 2, &mut out)
                .unwrap();
            assert_eq!(out, embed(&params, &encoder, &expected, 2));
        }
    }

    #[test]
    fn unrotated_equals_naive() {
        let params = params();
        let encoder = Encoder::new(&params);
        let diagonal = (0..8)
            .map(|i| Complex64::new(i as f64, -(i as f64) / 2.0))
            .collect::<Vec<_>>();
        let mut lt_encoder =
            LinearTransformEncoder::new(&encoder, HashMap::from([(3isize, diagonal)]));

        let mut naive = PolyQP::new(&params, 1, Some(0), Representation::Evaluation);
        let mut rotated = naive.clone();
        lt_encoder
            .encode_diagonal_naive(3, 1e6, 3, &mut naive)
            .unwrap();
        lt_encoder
            .encode_diagonal_rotated(3, 0, 1e6, 3, &mut rotated)
            .unwrap();
        assert_eq!(naive, rotated);
        lt_encoder
            .encode_diagonal_rotated(3, 8, 1e6, 3, &mut rotated)
            .unwrap();
        assert_eq!(naive, rotated);
    }

    #[test]
    fn negative_alias_works() {
        let params = params();
        let encoder = Encoder::new(&params);
        let diagonal = vec![1.0f64, -2.0, 3.0, -4.0];
        let mut lt_encoder =
            LinearTransformEncoder::new(&encoder, HashMap::from([(-1isize, diagonal)]));

        let mut aliased = PolyQP::new(&params, 1, Some(0), Representation::Evaluation);
        let mut naive = aliased.clone();
        lt_encoder
            .encode_diagonal_rotated(3, 0, 1e6, 2, &mut aliased)
            .unwrap();
        lt_encoder
            .encode_diagonal_naive(-1, 1e6, 2, &mut naive)
            .unwrap();
        assert_eq!(aliased, naive);

        // the naive encoding does not look up aliases
        assert_eq!(
            lt_encoder.encode_diagonal_naive(3, 1e6, 2, &mut naive),
            Err(Error::DiagonalNotFound(3))
        );
    }

    #[test]
    fn missing_diagonal_leaves_output() {
        let params = params();
        let encoder = Encoder::new(&params);
        let mut lt_encoder = LinearTransformEncoder::new(
            &encoder,
            HashMap::from([(0isize, vec![1.0f64, 2.0, 3.0, 4.0])]),
        );
        assert_eq!(lt_encoder.non_zero_diagonals(), vec![0]);

        let mut out = embed(&params, &encoder, &[5.0f64, 6.0], 1);
        let before = out.clone();
        assert_eq!(
            lt_encoder.encode_diagonal_rotated(1, 1, 1e6, 2, &mut out),
            Err(Error::DiagonalNotFound(1))
        );
        assert_eq!(
            lt_encoder.encode_diagonal_naive(2, 1e6, 2, &mut out),
            Err(Error::DiagonalNotFound(2))
        );
        assert_eq!(out, before);

        // diagonal shorter than the slot count
        assert!(matches!(
            lt_encoder.encode_diagonal_rotated(0, 1, 1e6, 3, &mut out),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(out, before);
    }

    #[test]
    fn bsgs_ratio_works() {
        // 16 consecutive diagonals: 4 babies and 4 giants
        let keys = (0..16).collect_vec();
        assert_eq!(find_best_bsgs_ratio(&keys, 16, 0), 4);
        assert_eq!(find_best_bsgs_ratio(&keys, 16, 2), 4);
        assert_eq!(find_best_bsgs_ratio(&keys[..8], 16, 0), 2);

        // single diagonal never grows the baby steps
        assert_eq!(find_best_bsgs_ratio(&[0], 16, 1), 1);
        assert_eq!(bsgs_index(13, 16, 4), (12, 1));
        assert_eq!(bsgs_index(17, 16, 4), (0, 1));
    }

    #[test]
    fn rotations_work() {
        let params = params();
        let encoder = Encoder::new(&params);
        let diagonals = (-2isize..=2)
            .map(|k| (k, vec![1.0f64; 8]))
            .collect::<HashMap<_, _>>();
        let mut lt_encoder = LinearTransformEncoder::new(&encoder, diagonals);

        let naive = LinearTransform::new_naive(&params, &lt_encoder, 1, 1e6, 3).unwrap();
        assert!(!naive.is_bsgs());
        assert_eq!(naive.rotations(), vec![1, 2, 6, 7]);

        let bsgs = LinearTransform::new_bsgs(&params, &mut lt_encoder, 1, 1e6, 3, 1).unwrap();
        assert!(bsgs.is_bsgs());
        assert_eq!(bsgs.n1, 2);
        assert_eq!(bsgs.diagonals.len(), 5);
        assert_eq!(
            bsgs.bsgs_groups(),
            vec![(0, vec![0, 1]), (2, vec![0]), (6, vec![0, 1])]
        );
        assert_eq!(bsgs.rotations(), vec![1, 2, 6]);

        // Q-only level beyond the parameters
        assert!(matches!(
            LinearTransform::new_naive(&params, &lt_encoder, 2, 1e6, 3),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            LinearTransform::new_bsgs(&params, &mut lt_encoder, 2, 1e6, 3, 1),
            Err(Error::InvalidParameter(_))
        ));
    }
}
