use crate::error::{Error, Result};
use crate::gadget_ciphertext::GadgetCiphertext;
use crate::parameters::Parameters;
use byteorder::{ByteOrder, LittleEndian};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::warn;
use traits::{Ntt, WireFormat};

/// Key switching key re-encrypting ciphertexts under `s_in` to `s_out`.
///
/// Holds a gadget ciphertext whose `(i, j)` element encrypts
/// `P * 2^(pow2_base * j) * s_in` on the i-th group of Q limbs under `s_out`.
/// The wrapper adds no data of its own, so equality, copies and the binary
/// encoding are those of the gadget ciphertext.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct EvaluationKey(pub GadgetCiphertext);

impl EvaluationKey {
    /// Zero valued key for ciphertexts at `level_q` switched through P limbs `0..=level_p`.
    pub fn new<T: Ntt>(
        params: &Parameters<T>,
        level_q: usize,
        level_p: usize,
    ) -> Result<EvaluationKey> {
        if level_q > params.max_level_q() || level_p > params.max_level_p() {
            return Err(Error::InvalidLevel { level_q, level_p });
        }
        Ok(EvaluationKey(GadgetCiphertext::new(
            params,
            level_q,
            level_p,
            params.decomp_rns(level_q, level_p),
            params.decomp_pw2(level_q, level_p),
        )?))
    }

    pub fn gadget_ciphertext(&self) -> &GadgetCiphertext {
        &self.0
    }

    pub fn level_q(&self) -> usize {
        self.0.level_q()
    }

    pub fn level_p(&self) -> usize {
        self.0.level_p()
    }
}

impl WireFormat for EvaluationKey {
    type Error = Error;

    fn serialized_size(&self) -> usize {
        self.0.serialized_size()
    }

    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize> {
        self.0.serialize_into(buffer)
    }

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize> {
        self.0.deserialize_from(buffer)
    }
}

/// Evaluation keys of ring automorphisms, indexed by galois element.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RotationKeySet {
    keys: HashMap<usize, EvaluationKey>,
}

impl RotationKeySet {
    pub fn new() -> RotationKeySet {
        RotationKeySet::default()
    }

    /// Registers the key switching from `φ_g(s)` to `s` for galois element g.
    pub fn insert(&mut self, galois_element: usize, key: EvaluationKey) -> Option<EvaluationKey> {
        self.keys.insert(galois_element, key)
    }

    pub fn get(&self, galois_element: usize) -> Result<&EvaluationKey> {
        self.keys.get(&galois_element).ok_or_else(|| {
            warn!(galois_element, "rotation key missing");
            Error::MissingRotationKey(galois_element)
        })
    }

    pub fn contains(&self, galois_element: usize) -> bool {
        self.keys.contains_key(&galois_element)
    }

    /// Registered galois elements in ascending order
    pub fn galois_elements(&self) -> Vec<usize> {
        self.keys.keys().copied().sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `[count : u32]` then `[galois element : u64][key]` in ascending galois element order.
impl WireFormat for RotationKeySet {
    type Error = Error;

    fn serialized_size(&self) -> usize {
        4 + self
            .keys
            .values()
            .map(|k| 8 + k.serialized_size())
            .sum::<usize>()
    }

    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize> {
        let needed = self.serialized_size();
        if buffer.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                got: buffer.len(),
            });
        }

        LittleEndian::write_u32(&mut buffer[..4], self.keys.len() as u32);
        let mut offset = 4;
        for galois_element in self.galois_elements() {
            LittleEndian::write_u64(&mut buffer[offset..offset + 8], galois_element as u64);
            offset += 8;
            offset += self.keys[&galois_element].serialize_into(&mut buffer[offset..])?;
        }
        Ok(offset)
    }

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize> {
        if buffer.len() < 4 {
            return Err(Error::MalformedData("truncated key set header".into()));
        }
        let count = LittleEndian::read_u32(&buffer[..4]) as usize;

        let mut offset = 4;
        let mut keys = HashMap::new();
        for _ in 0..count {
            if buffer.len() < offset + 8 {
                return Err(Error::MalformedData("truncated galois element".into()));
            }
            let galois_element = LittleEndian::read_u64(&buffer[offset..offset + 8]) as usize;
            offset += 8;

            let mut key = EvaluationKey::default();
            offset += key.deserialize_from(&buffer[offset..])?;
            if keys.insert(galois_element, key).is_some() {
                return Err(Error::MalformedData(format!(
                    "duplicated galois element {galois_element}"
                )));
            }
        }

        self.keys = keys;
        Ok(offset)
    }
}
