//! Logging for ranmob
//!
//! `tracing` subscriber setup and the helpers every crate uses to trace
//! handover messages crossing the N2 (NGAP) and Uu (RRC) interfaces.

use std::fmt;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log level '{0}' (expected trace, debug, info, warn or error)")]
pub struct UnknownLogLevel(pub String);

impl std::str::FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

/// Installs the global subscriber at `level`. `RUST_LOG` wins when set.
pub fn init_logging(level: LogLevel) {
    init_logging_with_filter(level.as_str());
}

/// Installs the global subscriber with a directive string such as
/// `"info,ranmob_gnb::mobility=debug"`.
pub fn init_logging_with_filter(filter: &str) {
    if !try_init_logging(filter, false) {
        tracing::warn!("Global tracing subscriber already installed");
    }
}

/// Installs the global subscriber unless one is already set. With
/// `test_writer`, output goes through the test harness capture.
///
/// Returns false when a subscriber was already installed.
pub fn try_init_logging(filter: &str, test_writer: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if test_writer {
        builder.with_test_writer().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Rx => "<<",
            Direction::Tx => ">>",
        })
    }
}

/// Interface a handover message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    /// gNB to core network (NGAP)
    N2,
    /// gNB to UE (RRC)
    Uu,
}

impl Interface {
    pub fn protocol(self) -> &'static str {
        match self {
            Interface::N2 => "NGAP",
            Interface::Uu => "RRC",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::N2 => f.write_str("N2"),
            Interface::Uu => f.write_str("Uu"),
        }
    }
}

/// Traces one message: a summary at debug, the payload at trace.
pub fn log_protocol_message(interface: Interface, direction: Direction, msg_type: &str, data: &[u8]) {
    tracing::debug!(
        interface = %interface,
        len = data.len(),
        "{} {} {} {}",
        interface,
        direction,
        interface.protocol(),
        msg_type
    );
    if tracing::enabled!(Level::TRACE) {
        tracing::trace!(interface = %interface, "{} payload: {}", msg_type, HexDump(data));
    }
}

pub fn log_ngap_message(direction: Direction, msg_type: &str, data: &[u8]) {
    log_protocol_message(Interface::N2, direction, msg_type, data);
}

pub fn log_rrc_message(direction: Direction, msg_type: &str, data: &[u8]) {
    log_protocol_message(Interface::Uu, direction, msg_type, data);
}

/// Formats a byte slice as lowercase hex, cut after 64 bytes.
pub struct HexDump<'a>(pub &'a [u8]);

impl HexDump<'_> {
    const MAX_BYTES: usize = 64;
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() > Self::MAX_BYTES {
            write!(f, "{}.. ({} bytes)", hex::encode(&self.0[..Self::MAX_BYTES]), self.0.len())
        } else {
            f.write_str(&hex::encode(self.0))
        }
    }
}
