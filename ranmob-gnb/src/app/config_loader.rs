//! gNB configuration loading
//!
//! Parsing lives in `ranmob-common`; this module adds the semantic checks
//! the mobility procedures depend on (identity ranges, unique PCIs, sane
//! neighbor lists).
//!
//! ```rust,ignore
//! use ranmob_gnb::app::load_and_validate_gnb_config;
//!
//! let config = load_and_validate_gnb_config("config/gnb.yaml")?;
//! ```

use std::collections::HashSet;
use std::path::Path;

use ranmob_common::{Error as CommonError, GnbConfig, Plmn, MAX_PCI};
use thiserror::Error;

/// Largest gNB id that still leaves 8 bits of cell id in a 28-bit ECI
pub const MAX_GNB_ID: u32 = 0xFFFFF;

/// Largest tracking area code (24 bits)
const MAX_TAC: u32 = 0xFF_FFFF;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read gNB configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed gNB configuration: {0}")]
    ParseError(String),

    #[error("Rejected gNB configuration: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

impl From<CommonError> for ConfigError {
    fn from(e: CommonError) -> Self {
        match e {
            CommonError::Io(e) => ConfigError::IoError(e),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

/// A configuration that parsed but cannot drive handovers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("gNB id {0:#x} does not fit in 20 bits")]
    InvalidGnbId(u32),

    #[error("TAC {0} is reserved or wider than 24 bits")]
    InvalidTac(u32),

    #[error("PLMN {0}")]
    InvalidPlmn(String),

    #[error("gNB serves no cell")]
    NoCells,

    #[error("cell list: {0}")]
    InvalidCell(String),

    #[error("neighbor list: {0}")]
    InvalidNeighbor(String),

    #[error("handover settings: {0}")]
    InvalidHandover(String),
}

/// Reads and parses a gNB configuration file without validating it.
pub fn load_gnb_config<P: AsRef<Path>>(path: P) -> Result<GnbConfig, ConfigError> {
    Ok(GnbConfig::from_yaml_file(path)?)
}

pub fn load_gnb_config_from_str(yaml: &str) -> Result<GnbConfig, ConfigError> {
    Ok(GnbConfig::from_yaml(yaml)?)
}

/// Reads, parses and validates a gNB configuration file.
pub fn load_and_validate_gnb_config<P: AsRef<Path>>(path: P) -> Result<GnbConfig, ConfigError> {
    let config = load_gnb_config(path)?;
    validate_gnb_config(&config)?;
    Ok(config)
}

/// Checks that a parsed configuration can drive handovers:
///
/// - gNB id within 20 bits, TAC non-zero and within 24 bits
/// - MCC 001-999, MNC 00-999
/// - at least one cell; cell ids and PCIs unique, PCIs at most 1007
/// - neighbors carry a valid PCI and never name the cell itself
/// - T304 non-zero
pub fn validate_gnb_config(config: &GnbConfig) -> Result<(), ConfigValidationError> {
    if config.gnb_id > MAX_GNB_ID {
        return Err(ConfigValidationError::InvalidGnbId(config.gnb_id));
    }
    if config.tac == 0 || config.tac > MAX_TAC {
        return Err(ConfigValidationError::InvalidTac(config.tac));
    }
    check_plmn(&config.plmn)?;

    if config.cells.is_empty() {
        return Err(ConfigValidationError::NoCells);
    }

    let mut cell_ids = HashSet::new();
    let mut pcis = HashSet::new();
    for cell in &config.cells {
        if !cell_ids.insert(cell.cell_id) {
            return Err(ConfigValidationError::InvalidCell(format!(
                "duplicate cell id {}",
                cell.cell_id
            )));
        }
        if cell.pci > MAX_PCI {
            return Err(ConfigValidationError::InvalidCell(format!(
                "cell {} has PCI {} above {}",
                cell.cell_id, cell.pci, MAX_PCI
            )));
        }
        if !pcis.insert(cell.pci) {
            return Err(ConfigValidationError::InvalidCell(format!(
                "PCI {} is used by more than one cell",
                cell.pci
            )));
        }

        let own = config.global_cell_id(cell.cell_id);
        for neighbor in &cell.neighbors {
            if neighbor.pci > MAX_PCI {
                return Err(ConfigValidationError::InvalidNeighbor(format!(
                    "neighbor {:#x} of cell {} has PCI {}",
                    neighbor.eci, cell.cell_id, neighbor.pci
                )));
            }
            if neighbor.global_id() == own {
                return Err(ConfigValidationError::InvalidNeighbor(format!(
                    "cell {} lists itself as a neighbor",
                    cell.cell_id
                )));
            }
        }
    }

    if config.handover.t304_ms == 0 {
        return Err(ConfigValidationError::InvalidHandover(
            "t304_ms must be non-zero".to_string(),
        ));
    }

    Ok(())
}

fn check_plmn(plmn: &Plmn) -> Result<(), ConfigValidationError> {
    match (plmn.mcc, plmn.mnc) {
        (1..=999, 0..=999) => Ok(()),
        (mcc @ (0 | 1000..), _) => Err(ConfigValidationError::InvalidPlmn(format!("MCC {mcc} outside 001-999"))),
        (_, mnc) => Err(ConfigValidationError::InvalidPlmn(format!("MNC {mnc} outside 00-999"))),
    }
}
