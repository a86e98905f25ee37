//! Negotiated AS security algorithm identities (TS 33.501 Annex D)

use std::fmt;

use crate::CryptoError;

/// NR ciphering algorithm (NEA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CipheringAlgorithm {
    #[default]
    Nea0 = 0,
    Nea1 = 1,
    Nea2 = 2,
    Nea3 = 3,
}

/// NR integrity algorithm (NIA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IntegrityAlgorithm {
    #[default]
    Nia0 = 0,
    Nia1 = 1,
    Nia2 = 2,
    Nia3 = 3,
}

impl CipheringAlgorithm {
    /// 4-bit algorithm identity used as KDF input.
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Result<Self, CryptoError> {
        match id {
            0 => Ok(Self::Nea0),
            1 => Ok(Self::Nea1),
            2 => Ok(Self::Nea2),
            3 => Ok(Self::Nea3),
            other => Err(CryptoError::UnknownAlgorithmId(other)),
        }
    }
}

impl IntegrityAlgorithm {
    /// 4-bit algorithm identity used as KDF input.
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Result<Self, CryptoError> {
        match id {
            0 => Ok(Self::Nia0),
            1 => Ok(Self::Nia1),
            2 => Ok(Self::Nia2),
            3 => Ok(Self::Nia3),
            other => Err(CryptoError::UnknownAlgorithmId(other)),
        }
    }
}

impl fmt::Display for CipheringAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NEA{}", self.id())
    }
}

impl fmt::Display for IntegrityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NIA{}", self.id())
    }
}
