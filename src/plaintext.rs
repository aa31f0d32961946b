use crate::gadget_ciphertext::PolyQP;

/// Encoded message.
///
/// `value.q` is always set, `value.p` only for plaintexts meant to be
/// multiplied before the ModDown of a key switch.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    pub(crate) value: PolyQP,
    pub(crate) level: usize,
    pub(crate) log_slots: usize,
    pub(crate) scale: f64,
    pub(crate) is_montgomery: bool,
}

impl Plaintext {
    pub fn new(
        value: PolyQP,
        level: usize,
        log_slots: usize,
        scale: f64,
        is_montgomery: bool,
    ) -> Plaintext {
        Plaintext {
            value,
            level,
            log_slots,
            scale,
            is_montgomery,
        }
    }

    pub fn value(&self) -> &PolyQP {
        &self.value
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

    pub fn is_montgomery(&self) -> bool {
        self.is_montgomery
    }
}
