use crate::parameters::{Parameters, PolyType};
use crate::{Poly, Representation};
use traits::Ntt;

/// CKKS ciphertext over Q. Polynomials are kept in Evaluation form.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
    pub(crate) c: Vec<Poly>,
    pub(crate) level: usize,
    pub(crate) log_slots: usize,
    pub(crate) scale: f64,
}

impl Ciphertext {
    pub fn new(c: Vec<Poly>, level: usize, log_slots: usize, scale: f64) -> Ciphertext {
        Ciphertext {
            c,
            level,
            log_slots,
            scale,
        }
    }

    /// `degree + 1` zero polynomials at `level`
    pub fn zero<T: Ntt>(
        params: &Parameters<T>,
        degree: usize,
        level: usize,
        log_slots: usize,
        scale: f64,
    ) -> Ciphertext {
        let ctx = params.poly_ctx(&PolyType::Q, level);
        Ciphertext {
            c: (0..=degree)
                .map(|_| ctx.zero(Representation::Evaluation))
                .collect(),
            level,
            log_slots,
            scale,
        }
    }

    pub fn degree(&self) -> usize {
        self.c.len().saturating_sub(1)
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

    pub fn c_ref(&self) -> &[Poly] {
        &self.c
    }

    /// Drops every limb above `level`. No-op if the ciphertext is already lower.
    pub fn drop_to_level(&mut self, level: usize) {
        if level < self.level {
            self.c.iter_mut().for_each(|p| p.truncate(level));
            self.level = level;
        }
    }
}
