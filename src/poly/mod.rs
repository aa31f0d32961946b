use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use itertools::{izip, Itertools};
use ndarray::{s, Array2};
use traits::WireFormat;

pub mod poly_context;

pub use poly_context::PolyContext;

/// Largest ring degree accepted on the wire, 2^17.
pub(crate) const MAX_LOG_DEGREE: u8 = 17;

#[derive(Clone, Copy, PartialEq, Debug, Eq, Default)]
pub enum Representation {
    Evaluation,
    #[default]
    Coefficient,
}

/// Index map of the ring automorphism X -> X^exponent.
///
/// `power[j] = j * exponent mod 2N`. Coefficient j lands on `power[j] mod N`,
/// negated when `power[j] >= N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    exponent: usize,
    power: Box<[usize]>,
    degree: usize,
}

impl Substitution {
    /// exponent must be odd. It is reduced modulo 2 * degree.
    pub fn new(exponent: usize, degree: usize) -> Substitution {
        debug_assert!(exponent & 1 == 1);
        debug_assert!(degree.is_power_of_two());
        let mask = (degree << 1) - 1;
        let exponent = exponent & mask;
        let power = (0..degree)
            .map(|j| (j * exponent) & mask)
            .collect_vec()
            .into_boxed_slice();

        Substitution {
            exponent,
            power,
            degree,
        }
    }

    pub fn exponent(&self) -> usize {
        self.exponent
    }
}

/// Polynomial in RNS form. Row `i` holds the residues modulo the i-th prime of
/// the context the polynomial was created with.
#[derive(Clone, PartialEq, Debug, Eq)]
pub struct Poly {
    pub coefficients: Array2<u64>,
    pub representation: Representation,
}

impl Default for Poly {
    fn default() -> Self {
        Poly {
            coefficients: Array2::zeros((0, 0)),
            representation: Representation::Coefficient,
        }
    }
}

impl Poly {
    pub fn degree(&self) -> usize {
        self.coefficients.ncols()
    }

    pub fn moduli_count(&self) -> usize {
        self.coefficients.nrows()
    }

    /// Index of the last limb
    pub fn level(&self) -> usize {
        self.moduli_count().saturating_sub(1)
    }

    /// Drops every limb above `level`
    pub fn truncate(&mut self, level: usize) {
        if level + 1 < self.moduli_count() {
            self.coefficients.slice_collapse(s![..level + 1, ..]);
        }
    }

    /// Shape equality, used to check deserialized values against each other.
    pub fn same_shape(&self, other: &Poly) -> bool {
        self.coefficients.shape() == other.coefficients.shape()
    }
}

/// `[log2 N : u8][level : u8]` followed by the limbs, limb-major, as little-endian u64.
///
/// The representation is not part of the encoding; the owner of the polynomial
/// records it.
impl WireFormat for Poly {
    type Error = Error;

    fn serialized_size(&self) -> usize {
        2 + 8 * self.coefficients.len()
    }

    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize> {
        let needed = self.serialized_size();
        if buffer.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                got: buffer.len(),
            });
        }

        let degree = self.degree();
        if self.moduli_count() == 0 || self.moduli_count() > 256 || !degree.is_power_of_two() {
            return Err(Error::MalformedData(format!(
                "cannot encode polynomial of shape {:?}",
                self.coefficients.shape()
            )));
        }

        buffer[0] = degree.trailing_zeros() as u8;
        buffer[1] = self.level() as u8;
        izip!(buffer[2..needed].chunks_exact_mut(8), self.coefficients.iter())
            .for_each(|(b, v)| LittleEndian::write_u64(b, *v));

        Ok(needed)
    }

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize> {
        if buffer.len() < 2 {
            return Err(Error::MalformedData("truncated polynomial header".into()));
        }

        let log_degree = buffer[0];
        if log_degree > MAX_LOG_DEGREE {
            return Err(Error::MalformedData(format!(
                "ring degree 2^{log_degree} is too large"
            )));
        }
        let degree = 1usize << log_degree;
        let moduli_count = buffer[1] as usize + 1;

        let needed = 2 + 8 * degree * moduli_count;
        if buffer.len() < needed {
            return Err(Error::MalformedData(format!(
                "truncated polynomial: need {needed} bytes, got {}",
                buffer.len()
            )));
        }

        let values = buffer[2..needed]
            .chunks_exact(8)
            .map(LittleEndian::read_u64)
            .collect_vec();
        self.coefficients = Array2::from_shape_vec((moduli_count, degree), values)
            .map_err(|e| Error::MalformedData(e.to_string()))?;

        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, Rng};

    fn random_poly(moduli_count: usize, degree: usize) -> Poly {
        let mut rng = thread_rng();
        Poly {
            coefficients: Array2::from_shape_fn((moduli_count, degree), |_| rng.gen()),
            representation: Representation::Evaluation,
        }
    }

    #[test]
    fn serialization_works() {
        let p = random_poly(3, 1 << 4);
        let bytes = p.serialize().unwrap();
        assert_eq!(bytes.len(), 2 + 3 * 16 * 8);
        assert_eq!(bytes[0], 4);
        assert_eq!(bytes[1], 2);

        let mut q = Poly {
            representation: Representation::Evaluation,
            ..Default::default()
        };
        assert_eq!(q.deserialize_from(&bytes).unwrap(), bytes.len());
        assert_eq!(p, q);
    }

    #[test]
    fn deserialization_rejects_truncated_input() {
        let p = random_poly(2, 1 << 4);
        let bytes = p.serialize().unwrap();
        let mut q = Poly::default();
        assert!(matches!(
            q.deserialize_from(&bytes[..bytes.len() - 1]),
            Err(Error::MalformedData(_))
        ));
        assert!(matches!(
            q.deserialize_from(&bytes[..1]),
            Err(Error::MalformedData(_))
        ));
    }

    #[test]
    fn truncate_works() {
        let mut p = random_poly(4, 1 << 4);
        let expected = p.coefficients.slice(s![..2, ..]).to_owned();
        p.truncate(1);
        assert_eq!(p.level(), 1);
        assert_eq!(p.coefficients, expected);
        assert!(p.coefficients.row(0).as_slice().is_some());
    }

    #[test]
    fn substitution_map_works() {
        let subs = Substitution::new(5 + 64, 1 << 5);
        assert_eq!(subs.exponent(), 5);
        assert_eq!(subs.power[3], 15);
        assert_eq!(subs.power[13], 65 & 63);
    }
}
