//! Gateways between the mobility procedures and the rest of the gNB
//!
//! All calls are fire-and-forget: an `Ok` means the request was handed to
//! the collaborator, not that the peer acknowledged it.

use std::fmt;
use std::net::IpAddr;

use bytes::Bytes;
use ranmob_common::{CRnti, GlobalCellId, Plmn, UeId};
use ranmob_rrc::{DrbToAddMod, SrbToAddMod};

use crate::error::GatewayError;
use crate::mobility::bearer_transfer::{BearerCounterRecord, PdcpBearerState};
use crate::mobility::security::AsKeys;

/// Cause carried by handover failure and cancel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoverCause {
    HandoverDesirableForRadioReasons,
    HandoverCancelled,
    TxnRelocOverallExpiry,
    NoRadioResourcesAvailable,
    InvalidContainer,
    NotSupported,
    Unspecified,
}

impl fmt::Display for HandoverCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandoverCause::HandoverDesirableForRadioReasons => "handover-desirable-for-radio-reasons",
            HandoverCause::HandoverCancelled => "handover-cancelled",
            HandoverCause::TxnRelocOverallExpiry => "txnrelocoverall-expiry",
            HandoverCause::NoRadioResourcesAvailable => "no-radio-resources-available",
            HandoverCause::InvalidContainer => "invalid-container",
            HandoverCause::NotSupported => "not-supported",
            HandoverCause::Unspecified => "unspecified",
        };
        f.write_str(s)
    }
}

/// E-RAB the core network asks the target to set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErabSetupItem {
    pub erab_id: u8,
    pub qci: u8,
    pub transport_address: IpAddr,
    pub ul_teid: u32,
}

/// E-RAB admitted by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmittedErab {
    pub erab_id: u8,
    pub dl_teid: u32,
}

/// Security material the core network forwards to the target.
#[derive(Clone, PartialEq, Eq)]
pub struct ForwardedSecurityContext {
    pub nh: [u8; 32],
    pub ncc: u8,
}

impl fmt::Debug for ForwardedSecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardedSecurityContext")
            .field("ncc", &self.ncc)
            .finish_non_exhaustive()
    }
}

/// Handover request received by the target gNB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverRequest {
    /// Core-network identifier of the UE, echoed in the reply
    pub amf_ue_id: u64,
    pub target_cell: GlobalCellId,
    pub cause: HandoverCause,
    pub erabs: Vec<ErabSetupItem>,
    pub security: ForwardedSecurityContext,
    /// Encoded HandoverPreparationInformation from the source
    pub container: Bytes,
}

/// Positive reply of the target gNB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverRequestAck {
    pub amf_ue_id: u64,
    /// UE id allocated on the target
    pub ue_id: UeId,
    pub admitted: Vec<AdmittedErab>,
    pub not_admitted: Vec<u8>,
    /// Encoded HandoverCommand for the source
    pub container: Bytes,
}

/// N2 messages of the handover procedures.
pub trait NgapGateway: Send {
    fn send_handover_required(
        &mut self,
        ue_id: UeId,
        target: GlobalCellId,
        target_plmn: Plmn,
        container: Bytes,
    ) -> Result<(), GatewayError>;

    fn send_handover_request_ack(&mut self, ack: HandoverRequestAck) -> Result<(), GatewayError>;

    fn send_handover_failure(&mut self, amf_ue_id: u64, cause: HandoverCause) -> Result<(), GatewayError>;

    fn send_handover_notify(&mut self, ue_id: UeId, target: GlobalCellId) -> Result<(), GatewayError>;

    fn send_handover_cancel(&mut self, ue_id: UeId, cause: HandoverCause) -> Result<(), GatewayError>;

    fn send_status_transfer(
        &mut self,
        ue_id: UeId,
        records: Vec<BearerCounterRecord>,
    ) -> Result<(), GatewayError>;
}

/// Downlink path to the UE.
pub trait UeLink: Send {
    fn send_dl_dcch(&mut self, ue_id: UeId, pdu: Bytes) -> Result<(), GatewayError>;
}

/// The UE's association with MAC scheduler entries.
pub trait Scheduler: Send {
    /// Reserves a C-RNTI on `cell` for an incoming UE.
    fn reserve_crnti(&mut self, cell: GlobalCellId) -> Result<CRnti, GatewayError>;

    /// Returns a C-RNTI reserved with [`Scheduler::reserve_crnti`] that will
    /// not be used.
    fn release_crnti(&mut self, cell: GlobalCellId, crnti: CRnti) -> Result<(), GatewayError>;

    /// Adds `cell` to the UE's scheduler association.
    fn claim_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError>;

    /// Makes `cell` the UE's active (primary) cell.
    fn reassign_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError>;

    /// Drops `cell` from the UE's scheduler association.
    fn release_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError>;

    fn set_drb_activation(&mut self, ue_id: UeId, active: bool) -> Result<(), GatewayError>;
}

/// PDCP/RLC bearer plane.
pub trait BearerPlane: Send {
    /// Re-establishes PDCP and RLC for all bearers of the UE.
    fn reestablish(&mut self, ue_id: UeId) -> Result<(), GatewayError>;

    /// Snapshot of the PDCP counters of one bearer, taken atomically.
    fn get_bearer_state(&self, ue_id: UeId, lcid: u8) -> Option<PdcpBearerState>;

    fn set_bearer_state(&mut self, ue_id: UeId, lcid: u8, state: PdcpBearerState) -> Result<(), GatewayError>;

    fn configure_srbs(&mut self, ue_id: UeId, srbs: &[SrbToAddMod], keys: &AsKeys) -> Result<(), GatewayError>;

    fn configure_drbs(&mut self, ue_id: UeId, drbs: &[DrbToAddMod], keys: &AsKeys) -> Result<(), GatewayError>;
}

/// The outbound collaborators of one gNB.
pub struct Gateways {
    pub ngap: Box<dyn NgapGateway>,
    pub ue_link: Box<dyn UeLink>,
    pub scheduler: Box<dyn Scheduler>,
    pub bearers: Box<dyn BearerPlane>,
}

impl Gateways {
    pub fn new(
        ngap: impl NgapGateway + 'static,
        ue_link: impl UeLink + 'static,
        scheduler: impl Scheduler + 'static,
        bearers: impl BearerPlane + 'static,
    ) -> Self {
        Self {
            ngap: Box::new(ngap),
            ue_link: Box::new(ue_link),
            scheduler: Box::new(scheduler),
            bearers: Box::new(bearers),
        }
    }
}
