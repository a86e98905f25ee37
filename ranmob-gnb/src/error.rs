//! Handover error taxonomy

use ranmob_crypto::CryptoError;
use ranmob_rrc::RrcCodecError;
use thiserror::Error;

use crate::mobility::ports::HandoverCause;

/// Error returned by a gateway implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GatewayError(pub String);

impl GatewayError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors raised while driving a handover.
///
/// Every error is scoped to the transaction of one UE.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandoverError {
    /// Malformed or unsupported container; the transaction is aborted
    #[error("Decode failure: {0}")]
    Decode(String),

    #[error("Encode failure: {0}")]
    Encode(String),

    /// No identifier or no resources on the target
    #[error("Resource allocation failure: {0}")]
    ResourceAllocation(String),

    /// Unhandled forwarding mode, foreign RAT or message revision
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Event not expected in the current state; ignored
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The target side refused the handover
    #[error("Handover preparation failed: {0}")]
    PreparationFailure(HandoverCause),

    #[error("Gateway failure: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<RrcCodecError> for HandoverError {
    fn from(e: RrcCodecError) -> Self {
        match e {
            RrcCodecError::EncodeError(msg) => HandoverError::Encode(msg),
            RrcCodecError::DecodeError(msg) => HandoverError::Decode(msg),
        }
    }
}

impl HandoverError {
    /// Cause reported upstream when this error ends a transaction.
    pub fn cause(&self) -> HandoverCause {
        match self {
            HandoverError::Decode(_) | HandoverError::Encode(_) => HandoverCause::InvalidContainer,
            HandoverError::ResourceAllocation(_) => HandoverCause::NoRadioResourcesAvailable,
            HandoverError::UnsupportedFeature(_) | HandoverError::Crypto(_) => {
                HandoverCause::NotSupported
            }
            HandoverError::PreparationFailure(cause) => *cause,
            HandoverError::ProtocolViolation(_) | HandoverError::Gateway(_) => {
                HandoverCause::Unspecified
            }
        }
    }
}
