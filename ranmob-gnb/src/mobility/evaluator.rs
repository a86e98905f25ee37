//! Measurement evaluation
//!
//! Turns a measurement report into a handover decision. Candidates are
//! taken in report order and the first one whose PCI resolves to a known
//! cell other than the serving cell wins.

use ranmob_common::{Arfcn, GlobalCellId, Pci};
use ranmob_rrc::{MeasurementReport, RatType};
use tracing::{debug, info, warn};

use crate::cells::CellRegistry;
use crate::error::HandoverError;
use crate::ue_context::UeMobilityContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverKind {
    /// Target cell is served by the same gNB
    IntraGnb,
    /// Target cell is served by another gNB
    InterGnb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverDecision {
    pub kind: HandoverKind,
    pub target: GlobalCellId,
    pub target_pci: Pci,
    pub target_arfcn: Arfcn,
    pub report: MeasurementReport,
}

/// Evaluates `report` for `ue`.
///
/// Returns `Ok(None)` when the report is discarded or no candidate resolves.
pub fn evaluate(
    ue: &UeMobilityContext,
    transaction_open: bool,
    report: &MeasurementReport,
    cells: &dyn CellRegistry,
) -> Result<Option<HandoverDecision>, HandoverError> {
    if !ue.is_registered() {
        debug!("UE[{}] measurement report discarded, UE is {}", ue.ue_id, ue.rrc_state);
        return Ok(None);
    }
    if transaction_open {
        debug!("UE[{}] measurement report discarded, handover in progress", ue.ue_id);
        return Ok(None);
    }
    if report.rat != RatType::Nr {
        return Err(HandoverError::UnsupportedFeature(format!(
            "measurement report for RAT {:?}",
            report.rat
        )));
    }
    if report.neighbors.is_empty() {
        info!("UE[{}] measurement report without neighbor cells", ue.ue_id);
        return Ok(None);
    }
    if !ue.meas_config.meas_ids.is_empty() && !ue.meas_config.has_meas_id(report.meas_id) {
        warn!("UE[{}] measurement report for unknown measId {}", ue.ue_id, report.meas_id);
        return Ok(None);
    }

    for candidate in &report.neighbors {
        let Some((target, target_arfcn)) = resolve(ue, candidate.pci, cells) else {
            warn!("UE[{}] could not resolve PCI {}", ue.ue_id, candidate.pci);
            continue;
        };

        let kind = if target == ue.serving_cell {
            debug!("UE[{}] PCI {} is the serving cell", ue.ue_id, candidate.pci);
            continue;
        } else if target.same_gnb(&ue.serving_cell) {
            HandoverKind::IntraGnb
        } else {
            HandoverKind::InterGnb
        };

        info!(
            "UE[{}] handover decision: {:?} to {} (PCI {}, rsrp={}, serving rsrp={})",
            ue.ue_id, kind, target, candidate.pci, candidate.rsrp, report.serving_rsrp
        );
        return Ok(Some(HandoverDecision {
            kind,
            target,
            target_pci: candidate.pci,
            target_arfcn,
            report: report.clone(),
        }));
    }

    Ok(None)
}

/// Resolves a PCI via the UE's neighbor cache, then via the local cell list.
fn resolve(ue: &UeMobilityContext, pci: Pci, cells: &dyn CellRegistry) -> Option<(GlobalCellId, Arfcn)> {
    if let Some(neighbor) = ue.neighbors.iter().find(|n| n.pci == pci) {
        return Some((neighbor.global_id(), neighbor.dl_arfcn));
    }
    cells.find_by_pci(pci).map(|cell| (cell.global_id, cell.dl_arfcn))
}
