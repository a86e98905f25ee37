//! Cell registry
//!
//! Read-only lookup of the cells served by this gNB, by local PCI and by
//! global identity. The registry is built once from configuration and
//! injected wherever neighbor resolution happens.

use ranmob_common::{Arfcn, GlobalCellId, GnbConfig, NeighborCellConfig, Pci};
use ranmob_rrc::{MeasConfig, MeasIdConfig, MeasObjectConfig};

/// A cell served by this gNB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInfo {
    pub global_id: GlobalCellId,
    pub pci: Pci,
    pub dl_arfcn: Arfcn,
    pub neighbors: Vec<NeighborCellConfig>,
}

impl CellInfo {
    /// Measurement configuration advertised to UEs camped on this cell: one
    /// measurement object and one measurement id per carrier.
    pub fn meas_config(&self) -> MeasConfig {
        let mut arfcns = vec![self.dl_arfcn];
        for neighbor in &self.neighbors {
            if !arfcns.contains(&neighbor.dl_arfcn) {
                arfcns.push(neighbor.dl_arfcn);
            }
        }

        let mut config = MeasConfig::default();
        for (idx, arfcn) in arfcns.into_iter().enumerate() {
            let id = idx as u8 + 1;
            config.meas_objects.push(MeasObjectConfig { meas_object_id: id, arfcn });
            config.meas_ids.push(MeasIdConfig { meas_id: id, meas_object_id: id });
        }
        config
    }
}

/// Lookup service for locally served cells.
pub trait CellRegistry: Send + Sync {
    fn find_by_pci(&self, pci: Pci) -> Option<&CellInfo>;

    fn find_by_global_id(&self, id: GlobalCellId) -> Option<&CellInfo>;

    fn cells(&self) -> &[CellInfo];
}

/// Registry over a fixed cell list.
#[derive(Debug, Clone, Default)]
pub struct StaticCellRegistry {
    cells: Vec<CellInfo>,
}

impl StaticCellRegistry {
    pub fn new(cells: Vec<CellInfo>) -> Self {
        Self { cells }
    }

    pub fn from_config(config: &GnbConfig) -> Self {
        let cells = config
            .cells
            .iter()
            .map(|cell| CellInfo {
                global_id: config.global_cell_id(cell.cell_id),
                pci: cell.pci,
                dl_arfcn: cell.dl_arfcn,
                neighbors: cell.neighbors.clone(),
            })
            .collect();
        Self { cells }
    }
}

impl CellRegistry for StaticCellRegistry {
    fn find_by_pci(&self, pci: Pci) -> Option<&CellInfo> {
        self.cells.iter().find(|c| c.pci == pci)
    }

    fn find_by_global_id(&self, id: GlobalCellId) -> Option<&CellInfo> {
        self.cells.iter().find(|c| c.global_id == id)
    }

    fn cells(&self) -> &[CellInfo] {
        &self.cells
    }
}
