//! Cryptographic primitives for ranmob
//!
//! Implements the AS security pieces a gNB needs across a handover:
//! - Key derivation functions (KgNB*, NH, RRC/UP keys)
//! - NIA1/NIA2/NIA3 integrity for the short MAC-I
//! - SNOW 3G, the keystream generator behind NIA1
//! - Algorithm identities

pub mod algorithm;
pub mod kdf;
pub mod nia;
pub mod snow3g;

pub use algorithm::{CipheringAlgorithm, IntegrityAlgorithm};

use thiserror::Error;

/// Errors raised by the crypto primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Unknown algorithm identity: {0}")]
    UnknownAlgorithmId(u8),

    #[error("Invalid key length, expected {expected} bytes")]
    InvalidKeyLength { expected: usize },
}
