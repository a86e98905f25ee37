//! RRC (Radio Resource Control) message types for handover
//!
//! # Modules
//!
//! - `messages` - Schema value types for the handover containers
//! - `codec` - The pluggable encode/decode service and a binary reference codec

pub mod codec;
pub mod messages;

pub use codec::{BinaryRrcCodec, RrcCodec, RrcCodecError};
pub use messages::*;
