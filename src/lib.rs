//! RNS arithmetic and CKKS slot operations over `Z_Q[X]/(X^N + 1)`.
//!
//! Polynomials live in an RNS basis split into the ciphertext primes Q and
//! the key switching primes P. On top of that the crate provides hybrid key
//! switching, Galois automorphisms, trace/inner sum/average over slots and
//! plaintext-matrix times ciphertext-vector products with the baby-step
//! giant-step split.

mod ciphertext;
mod encoder;
mod error;
mod evaluation_key;
mod evaluator;
mod gadget_ciphertext;
mod key_switching;
mod linear_transform;
mod modulus;
mod nb_theory;
mod ntt;
mod plaintext;
mod poly;
mod utils;

pub mod parameters;

#[cfg(test)]
mod secret_key;

pub use ciphertext::Ciphertext;
pub use encoder::{Embed, Encoder, SlotValue};
pub use error::{Error, Result};
pub use evaluation_key::{EvaluationKey, RotationKeySet};
pub use evaluator::Evaluator;
pub use gadget_ciphertext::{CiphertextQP, GadgetCiphertext, MetaData, PolyQP};
pub use key_switching::gadget_product;
pub use linear_transform::{find_best_bsgs_ratio, LinearTransform, LinearTransformEncoder};
pub use modulus::Modulus;
pub use nb_theory::{generate_prime, generate_primes_vec};
pub use ntt::NttOperator;
pub use parameters::{ParametersLiteral, PolyType};
pub use plaintext::Plaintext;
pub use poly::{Poly, PolyContext, Representation, Substitution};
pub use traits::{Ntt, WireFormat};
pub use utils::{rot_to_galois_element, rotations_for_inner_sum};

/// Parameters with the default NTT backend.
pub type Parameters = parameters::Parameters<NttOperator>;
