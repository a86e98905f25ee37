//! Common types and utilities for ranmob
//!
//! Shared identity types, gNB configuration, the common error type and
//! logging helpers used across all ranmob crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{CellConfig, GnbConfig, HandoverConfig, NeighborCellConfig};
pub use error::Error;
pub use logging::{
    init_logging, init_logging_with_filter, log_ngap_message, log_protocol_message, log_rrc_message,
    try_init_logging, Direction, HexDump, Interface, LogLevel, UnknownLogLevel,
};
pub use types::*;
