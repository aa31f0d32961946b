use crate::error::{Error, Result};
use crate::parameters::{Parameters, PolyType};
use crate::{Poly, Representation};
use byteorder::{ByteOrder, LittleEndian};
use itertools::Itertools;
use traits::{Ntt, WireFormat};

/// Polynomial over QP kept as its Q and P halves. Either half may be absent.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PolyQP {
    pub q: Option<Poly>,
    pub p: Option<Poly>,
}

impl PolyQP {
    pub fn new<T: Ntt>(
        params: &Parameters<T>,
        level_q: usize,
        level_p: Option<usize>,
        representation: Representation,
    ) -> PolyQP {
        PolyQP {
            q: Some(params.poly_ctx(&PolyType::Q, level_q).zero(representation)),
            p: level_p.map(|level_p| params.poly_ctx(&PolyType::P, level_p).zero(representation)),
        }
    }

    fn set_representation(&mut self, representation: Representation) {
        self.q
            .iter_mut()
            .chain(self.p.iter_mut())
            .for_each(|p| p.representation = representation);
    }
}

/// `[has_q : u8][has_p : u8]` then the present halves, Q first.
impl WireFormat for PolyQP {
    type Error = Error;

    fn serialized_size(&self) -> usize {
        2 + self
            .q
            .iter()
            .chain(self.p.iter())
            .map(|p| p.serialized_size())
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

        buffer[0] = self.q.is_some() as u8;
        buffer[1] = self.p.is_some() as u8;
        let mut offset = 2;
        for p in self.q.iter().chain(self.p.iter()) {
            offset += p.serialize_into(&mut buffer[offset..])?;
        }
        Ok(offset)
    }

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize> {
        if buffer.len() < 2 {
            return Err(Error::MalformedData("truncated ring QP header".into()));
        }
        let has_q = read_flag(buffer[0])?;
        let has_p = read_flag(buffer[1])?;

        let mut offset = 2;
        let mut read_half = |present: bool| -> Result<Option<Poly>> {
            if !present {
                return Ok(None);
            }
            let mut p = Poly::default();
            offset += p.deserialize_from(&buffer[offset..])?;
            Ok(Some(p))
        };
        let q = read_half(has_q)?;
        let p = read_half(has_p)?;

        self.q = q;
        self.p = p;
        Ok(offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetaData {
    pub scale: f64,
    pub is_ntt: bool,
    pub is_montgomery: bool,
}

impl Default for MetaData {
    fn default() -> Self {
        MetaData {
            scale: 1.0,
            is_ntt: true,
            is_montgomery: true,
        }
    }
}

const METADATA_SIZE: usize = 10;

impl MetaData {
    fn write_to(&self, buffer: &mut [u8]) {
        LittleEndian::write_f64(&mut buffer[..8], self.scale);
        buffer[8] = self.is_ntt as u8;
        buffer[9] = self.is_montgomery as u8;
    }

    fn read_from(buffer: &[u8]) -> Result<MetaData> {
        if buffer.len() < METADATA_SIZE {
            return Err(Error::MalformedData("truncated metadata".into()));
        }
        Ok(MetaData {
            scale: LittleEndian::read_f64(&buffer[..8]),
            is_ntt: read_flag(buffer[8])?,
            is_montgomery: read_flag(buffer[9])?,
        })
    }
}

fn read_flag(byte: u8) -> Result<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(Error::MalformedData(format!("invalid flag byte {v}"))),
    }
}

/// Degree one ciphertext over QP.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CiphertextQP {
    pub meta: MetaData,
    pub value: [PolyQP; 2],
}

impl WireFormat for CiphertextQP {
    type Error = Error;

    fn serialized_size(&self) -> usize {
        METADATA_SIZE + self.value[0].serialized_size() + self.value[1].serialized_size()
    }

    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize> {
        let needed = self.serialized_size();
        if buffer.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                got: buffer.len(),
            });
        }

        self.meta.write_to(buffer);
        let mut offset = METADATA_SIZE;
        offset += self.value[0].serialize_into(&mut buffer[offset..])?;
        offset += self.value[1].serialize_into(&mut buffer[offset..])?;
        Ok(offset)
    }

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize> {
        let meta = MetaData::read_from(buffer)?;
        let mut offset = METADATA_SIZE;

        let mut value: [PolyQP; 2] = Default::default();
        for v in value.iter_mut() {
            offset += v.deserialize_from(&buffer[offset..])?;
            v.set_representation(if meta.is_ntt {
                Representation::Evaluation
            } else {
                Representation::Coefficient
            });
        }

        self.meta = meta;
        self.value = value;
        Ok(offset)
    }
}

/// Encryption of `P * 2^(pow2_base * j) * s_in` restricted to the i-th group of
/// Q limbs, for every `(i, j)` in `decomp_rns x decomp_pw2`.
///
/// Values are stored in NTT and Montgomery form.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GadgetCiphertext {
    pub value: Vec<Vec<CiphertextQP>>,
}

impl GadgetCiphertext {
    pub fn new<T: Ntt>(
        params: &Parameters<T>,
        level_q: usize,
        level_p: usize,
        decomp_rns: usize,
        decomp_pw2: usize,
    ) -> Result<GadgetCiphertext> {
        if level_q > params.max_level_q() || level_p > params.max_level_p() {
            return Err(Error::InvalidLevel { level_q, level_p });
        }
        if decomp_rns == 0 || decomp_pw2 == 0 || decomp_rns > 255 || decomp_pw2 > 255 {
            return Err(Error::InvalidParameter(format!(
                "decomposition {decomp_rns}x{decomp_pw2} is outside [1, 255]x[1, 255]"
            )));
        }

        let element = CiphertextQP {
            meta: MetaData {
                scale: 1.0,
                is_ntt: true,
                is_montgomery: true,
            },
            value: [
                PolyQP::new(params, level_q, Some(level_p), Representation::Evaluation),
                PolyQP::new(params, level_q, Some(level_p), Representation::Evaluation),
            ],
        };

        Ok(GadgetCiphertext {
            value: vec![vec![element; decomp_pw2]; decomp_rns],
        })
    }

    fn first_half(&self, f: impl Fn(&PolyQP) -> Option<&Poly>) -> Option<&Poly> {
        self.value
            .first()
            .and_then(|v| v.first())
            .and_then(|ct| f(&ct.value[0]))
    }

    pub fn level_q(&self) -> usize {
        self.first_half(|p| p.q.as_ref())
            .map(|p| p.level())
            .unwrap_or_default()
    }

    pub fn level_p(&self) -> usize {
        self.first_half(|p| p.p.as_ref())
            .map(|p| p.level())
            .unwrap_or_default()
    }

    pub fn decomp_rns(&self) -> usize {
        self.value.len()
    }

    pub fn decomp_pw2(&self) -> usize {
        self.value.first().map(|v| v.len()).unwrap_or_default()
    }
}

/// `[decomp_rns : u8][decomp_pw2 : u8]` then the elements, RNS index outer.
impl WireFormat for GadgetCiphertext {
    type Error = Error;

    fn serialized_size(&self) -> usize {
        2 + self
            .value
            .iter()
            .flatten()
            .map(|ct| ct.serialized_size())
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

        let decomp_rns = self.decomp_rns();
        let decomp_pw2 = self.decomp_pw2();
        if decomp_rns == 0
            || decomp_rns > 255
            || decomp_pw2 == 0
            || decomp_pw2 > 255
            || self.value.iter().any(|v| v.len() != decomp_pw2)
        {
            return Err(Error::MalformedData(format!(
                "cannot encode a {decomp_rns}x{decomp_pw2} gadget ciphertext"
            )));
        }

        buffer[0] = decomp_rns as u8;
        buffer[1] = decomp_pw2 as u8;
        let mut offset = 2;
        for ct in self.value.iter().flatten() {
            offset += ct.serialize_into(&mut buffer[offset..])?;
        }
        Ok(offset)
    }

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize> {
        if buffer.len() < 2 {
            return Err(Error::MalformedData("truncated gadget header".into()));
        }
        let decomp_rns = buffer[0] as usize;
        let decomp_pw2 = buffer[1] as usize;
        if decomp_rns == 0 || decomp_pw2 == 0 {
            return Err(Error::MalformedData(format!(
                "empty {decomp_rns}x{decomp_pw2} gadget decomposition"
            )));
        }

        let mut offset = 2;
        let mut value = Vec::with_capacity(decomp_rns);
        for _ in 0..decomp_rns {
            let mut row = Vec::with_capacity(decomp_pw2);
            for _ in 0..decomp_pw2 {
                let mut ct = CiphertextQP::default();
                offset += ct.deserialize_from(&buffer[offset..])?;
                row.push(ct);
            }
            value.push(row);
        }

        check_dimensions(&value)?;

        self.value = value;
        Ok(offset)
    }
}

/// Every Q half (resp. P half) must have the shape of the first one.
fn check_dimensions(value: &[Vec<CiphertextQP>]) -> Result<()> {
    let halves = value
        .iter()
        .flatten()
        .flat_map(|ct| ct.value.iter())
        .collect_vec();

    let (first_q, first_p) = match halves.first() {
        Some(first) => (first.q.as_ref(), first.p.as_ref()),
        None => return Ok(()),
    };

    let same = |a: Option<&Poly>, b: Option<&Poly>| match (a, b) {
        (Some(a), Some(b)) => a.same_shape(b),
        (None, None) => true,
        _ => false,
    };

    if halves
        .iter()
        .all(|h| same(h.q.as_ref(), first_q) && same(h.p.as_ref(), first_p))
    {
        Ok(())
    } else {
        Err(Error::MalformedData(
            "gadget ciphertext elements have mismatching dimensions".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parameters::ParametersLiteral, Parameters};
    use rand::thread_rng;

    fn params() -> Parameters {
        Parameters::new(&ParametersLiteral {
            log_n: 5,
            log_q: vec![50, 40, 40],
            log_p: vec![50, 50],
            pow2_base: 0,
            ..Default::default()
        })
        .unwrap()
    }

    fn random_gadget(params: &Parameters, level_q: usize, level_p: usize) -> GadgetCiphertext {
        let mut rng = thread_rng();
        let mut gct = GadgetCiphertext::new(
            params,
            level_q,
            level_p,
            params.decomp_rns(level_q, level_p),
            params.decomp_pw2(level_q, level_p),
        )
        .unwrap();
        let q_ctx = params.poly_ctx(&PolyType::Q, level_q);
        let p_ctx = params.poly_ctx(&PolyType::P, level_p);
        gct.value.iter_mut().flatten().for_each(|ct| {
            ct.value.iter_mut().for_each(|v| {
                v.q = Some(q_ctx.random(Representation::Evaluation, &mut rng));
                v.p = Some(p_ctx.random(Representation::Evaluation, &mut rng));
            })
        });
        gct
    }

    #[test]
    fn new_works() {
        let params = params();
        let gct = GadgetCiphertext::new(&params, 2, 1, 2, 1).unwrap();
        assert_eq!(gct.decomp_rns(), 2);
        assert_eq!(gct.decomp_pw2(), 1);
        assert_eq!(gct.level_q(), 2);
        assert_eq!(gct.level_p(), 1);
        assert!(gct.value[1][0].meta.is_ntt);
        assert_eq!(
            gct.value[1][0].value[1].p.as_ref().unwrap().coefficients.shape(),
            &[2, params.degree]
        );

        assert_eq!(
            GadgetCiphertext::new(&params, 3, 0, 1, 1),
            Err(Error::InvalidLevel {
                level_q: 3,
                level_p: 0
            })
        );
        assert_eq!(
            GadgetCiphertext::new(&params, 0, 2, 1, 1),
            Err(Error::InvalidLevel {
                level_q: 0,
                level_p: 2
            })
        );
    }

    #[test]
    fn serialization_works() {
        let params = params();
        for (level_q, level_p) in [(2, 1), (2, 0), (0, 0)] {
            let gct = random_gadget(&params, level_q, level_p);
            let bytes = gct.serialize().unwrap();
            assert_eq!(bytes.len(), gct.serialized_size());
            assert_eq!(bytes[0] as usize, params.decomp_rns(level_q, level_p));

            let back = GadgetCiphertext::deserialize(&bytes).unwrap();
            assert_eq!(gct, back);
            assert_eq!(
                back.value[0][0].value[0].q.as_ref().unwrap().representation,
                Representation::Evaluation
            );
        }
    }

    #[test]
    fn deserialization_rejects_bad_flags() {
        let params = params();
        let gct = random_gadget(&params, 1, 0);
        let mut bytes = gct.serialize().unwrap();
        // is_ntt flag of the first element
        bytes[2 + 8] = 2;
        assert!(matches!(
            GadgetCiphertext::deserialize(&bytes),
            Err(Error::MalformedData(_))
        ));
    }

    #[test]
    fn deserialization_rejects_dimension_mismatch() {
        let params = params();
        let mut gct = random_gadget(&params, 2, 0);
        let q_ctx = params.poly_ctx(&PolyType::Q, 1);
        gct.value[1][0].value[0].q = Some(q_ctx.zero(Representation::Evaluation));

        let bytes = gct.serialize().unwrap();
        let mut target = random_gadget(&params, 2, 0);
        let before = target.clone();
        assert!(matches!(
            target.deserialize_from(&bytes),
            Err(Error::MalformedData(_))
        ));
        assert_eq!(target, before);
    }
}
