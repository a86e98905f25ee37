//! gNB configuration
//!
//! YAML-backed description of one gNB: its identity, the cells it serves,
//! each cell's neighbor list, and the handover tunables.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{Arfcn, GlobalCellId, Pci, Plmn};

/// Configured neighbor of a served cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborCellConfig {
    /// Packed 28-bit cell identity of the neighbor
    pub eci: u32,
    /// Neighbor PCI
    pub pci: Pci,
    /// Neighbor downlink ARFCN
    pub dl_arfcn: Arfcn,
}

impl NeighborCellConfig {
    pub fn global_id(&self) -> GlobalCellId {
        GlobalCellId::from_eci(self.eci)
    }
}

/// A cell served by this gNB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    /// gNB-local cell id (low 8 bits of the cell identity)
    pub cell_id: u8,
    pub pci: Pci,
    pub dl_arfcn: Arfcn,
    /// Neighbor cells advertised to UEs camped on this cell
    #[serde(default)]
    pub neighbors: Vec<NeighborCellConfig>,
}

/// Handover tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverConfig {
    /// T304 value signalled in mobility control info (ms). Also used as the
    /// guard after which a transaction is reported as stalled.
    #[serde(default = "default_t304_ms")]
    pub t304_ms: u32,
    /// Whether a direct data forwarding path towards target gNBs exists
    #[serde(default)]
    pub direct_forwarding_path_available: bool,
    /// Offset between a core-network E-RAB id and the local DRB id
    #[serde(default = "default_erab_drb_offset")]
    pub erab_drb_offset: u8,
}

fn default_t304_ms() -> u32 {
    2000
}

fn default_erab_drb_offset() -> u8 {
    4
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            t304_ms: default_t304_ms(),
            direct_forwarding_path_available: false,
            erab_drb_offset: default_erab_drb_offset(),
        }
    }
}

/// gNB configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GnbConfig {
    /// gNB identifier (20 bits)
    pub gnb_id: u32,
    pub plmn: Plmn,
    /// Tracking Area Code (24-bit)
    pub tac: u32,
    pub cells: Vec<CellConfig>,
    #[serde(default)]
    pub handover: HandoverConfig,
}

impl GnbConfig {
    /// Global identity of one of this gNB's cells.
    pub fn global_cell_id(&self, cell_id: u8) -> GlobalCellId {
        GlobalCellId::new(self.gnb_id, cell_id)
    }

    /// Configuration of the served cell `cell_id`.
    pub fn cell(&self, cell_id: u8) -> Result<&CellConfig, Error> {
        self.cells
            .iter()
            .find(|c| c.cell_id == cell_id)
            .ok_or(Error::UnknownCell { gnb_id: self.gnb_id, cell_id })
    }

    /// Parses a gNB configuration from a YAML string.
    ///
    /// # Example
    /// ```
    /// use ranmob_common::GnbConfig;
    ///
    /// let yaml = r#"
    /// gnb_id: 411
    /// plmn: { mcc: 1, mnc: 1 }
    /// tac: 7
    /// cells:
    ///   - cell_id: 1
    ///     pci: 1
    ///     dl_arfcn: 3350
    /// "#;
    ///
    /// let config = GnbConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.cells.len(), 1);
    /// assert_eq!(config.handover.t304_ms, 2000);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a gNB configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}
