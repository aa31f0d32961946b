use std::fmt::Debug;

/// Negacyclic NTT over `Z_p[X]/(X^degree + 1)`.
pub trait Ntt: Sync + Send + PartialEq + Clone + Debug {
    /// Returns `None` if no 2*degree-th root of unity exists modulo `prime`
    /// or the backend does not support `degree`.
    fn new(degree: usize, prime: u64) -> Option<Self>;

    fn forward(&self, a: &mut [u64]);

    fn forward_lazy(&self, a: &mut [u64]);

    /// Inverse transform, including the multiplication by degree^-1.
    fn backward(&self, a: &mut [u64]);
}

/// Size/write/read contract of objects with a fixed binary layout.
///
/// `serialize_into` writes exactly `serialized_size()` bytes and
/// `deserialize_from` returns the number of bytes it consumed, so encodings
/// can be concatenated without length prefixes.
pub trait WireFormat: Sized {
    type Error;

    fn serialized_size(&self) -> usize;

    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    fn deserialize_from(&mut self, buffer: &[u8]) -> Result<usize, Self::Error>;

    fn serialize(&self) -> Result<Vec<u8>, Self::Error> {
        let mut buffer = vec![0u8; self.serialized_size()];
        self.serialize_into(&mut buffer)?;
        Ok(buffer)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, Self::Error>
    where
        Self: Default,
    {
        let mut value = Self::default();
        value.deserialize_from(buffer)?;
        Ok(value)
    }
}
