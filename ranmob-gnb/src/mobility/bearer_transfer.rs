//! Bearer state transfer
//!
//! The source captures the PDCP COUNT state of every E-RAB when status
//! transfer starts; the target seeds its freshly established DRBs from those
//! records before user traffic is accepted.

use ranmob_common::UeId;
use tracing::{debug, warn};

use crate::error::{GatewayError, HandoverError};
use crate::mobility::ports::BearerPlane;
use crate::ue_context::{drb_to_lcid, erab_to_drb, BearerList};

/// COUNT state of one E-RAB as carried in status transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerCounterRecord {
    pub erab_id: u8,
    pub dl_hfn: u32,
    pub dl_pdcp_sn: u32,
    pub ul_hfn: u32,
    pub ul_pdcp_sn: u32,
}

/// PDCP counters of one bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PdcpBearerState {
    pub tx_hfn: u32,
    pub next_pdcp_tx_sn: u32,
    pub rx_hfn: u32,
    pub next_pdcp_rx_sn: u32,
    pub last_submitted_pdcp_rx_sn: u32,
}

/// Why a record was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No E-RAB with this id was admitted
    UnknownErab,
    /// The E-RAB id does not map onto a DRB
    NoDrb,
}

/// Result of applying a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<u8>,
    pub skipped: Vec<(u8, SkipReason)>,
}

/// Snapshots the counters of every E-RAB of the UE that is carried on a DRB.
///
/// A bearer the PDCP layer does not know about aborts the capture.
pub fn capture(
    ue_id: UeId,
    bearers: &BearerList,
    erab_drb_offset: u8,
    plane: &dyn BearerPlane,
) -> Result<Vec<BearerCounterRecord>, HandoverError> {
    let mut records = Vec::with_capacity(bearers.erab_count());

    for erab in bearers.erabs() {
        let Some(drb_id) = erab_to_drb(erab.erab_id, erab_drb_offset) else {
            warn!("UE[{}] E-RAB {} has no DRB, not captured", ue_id, erab.erab_id);
            continue;
        };
        let lcid = drb_to_lcid(drb_id);
        let state = plane.get_bearer_state(ue_id, lcid).ok_or_else(|| {
            GatewayError::new(format!("no PDCP state for UE[{ue_id}] lcid {lcid}"))
        })?;

        debug!(
            "UE[{}] E-RAB {}: tx_hfn={} next_tx_sn={} rx_hfn={} next_rx_sn={}",
            ue_id, erab.erab_id, state.tx_hfn, state.next_pdcp_tx_sn, state.rx_hfn, state.next_pdcp_rx_sn
        );
        records.push(BearerCounterRecord {
            erab_id: erab.erab_id,
            dl_hfn: state.tx_hfn,
            dl_pdcp_sn: state.next_pdcp_tx_sn,
            ul_hfn: state.rx_hfn,
            ul_pdcp_sn: state.next_pdcp_rx_sn,
        });
    }

    Ok(records)
}

/// Seeds the target's bearers from `records`.
///
/// Records that do not map onto an admitted E-RAB and its DRB are skipped
/// and reported, not treated as fatal.
pub fn apply(
    ue_id: UeId,
    bearers: &BearerList,
    erab_drb_offset: u8,
    records: &[BearerCounterRecord],
    plane: &mut dyn BearerPlane,
) -> Result<ApplyReport, HandoverError> {
    let mut report = ApplyReport::default();

    for record in records {
        if bearers.erab(record.erab_id).is_none() {
            warn!("UE[{}] status transfer for unknown E-RAB {}", ue_id, record.erab_id);
            report.skipped.push((record.erab_id, SkipReason::UnknownErab));
            continue;
        }
        let Some(drb_id) = erab_to_drb(record.erab_id, erab_drb_offset) else {
            warn!("UE[{}] E-RAB {} does not map to a DRB", ue_id, record.erab_id);
            report.skipped.push((record.erab_id, SkipReason::NoDrb));
            continue;
        };

        let state = PdcpBearerState {
            tx_hfn: record.dl_hfn,
            next_pdcp_tx_sn: record.dl_pdcp_sn,
            rx_hfn: record.ul_hfn,
            next_pdcp_rx_sn: record.ul_pdcp_sn,
            last_submitted_pdcp_rx_sn: record.ul_pdcp_sn,
        };
        plane.set_bearer_state(ue_id, drb_to_lcid(drb_id), state)?;
        report.applied.push(record.erab_id);
    }

    Ok(report)
}
