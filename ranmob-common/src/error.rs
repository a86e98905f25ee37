//! Errors of the common crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// A cell id that none of the gNB's configured cells carries
    #[error("gNB {gnb_id:#x} does not serve cell {cell_id}")]
    UnknownCell { gnb_id: u32, cell_id: u8 },
}
