//! Handover orchestration state machine
//!
//! One [`HandoverFsm`] per UE context. All events for a UE go through
//! [`HandoverFsm::handle`], which runs the transition to completion and
//! reports where it went. Every state other than `Idle` belongs to exactly
//! one open [`HandoverTransaction`]; leaving it (success, failure, cancel or
//! release) drops the transaction and settles the scheduler association on
//! either the target or the source.
//!
//! # Roles
//!
//! - **Source** (inter-gNB): handover required → command → status transfer
//! - **Target** (inter-gNB): admission → status transfer / reconfiguration
//!   complete in either order → notify
//! - **Intra** (same gNB): reconfiguration → C-RNTI on target → complete
//!
//! # Reference
//! - 3GPP TS 38.300 9.2.3 (handover)
//! - 3GPP TS 38.413 8.4 (UE mobility management)

use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use ranmob_common::{log_ngap_message, log_rrc_message, CRnti, Direction, GlobalCellId, GnbConfig};
use ranmob_rrc::{
    AsConfig, DlDcchMessage, HandoverCommand, HandoverPreparationInfo, HandoverPreparationInfoR8,
    MeasurementReport, MobilityControlInfo, ReestablishmentInfo, RrcCodec, RrcReconfiguration,
    SecurityConfigHo, VarShortMacInput,
};
use tracing::{debug, error, info, warn};

use crate::cells::{CellInfo, CellRegistry};
use crate::error::{GatewayError, HandoverError};
use crate::mobility::bearer_transfer::{self, BearerCounterRecord};
use crate::mobility::evaluator::{self, HandoverDecision, HandoverKind};
use crate::mobility::ports::{AdmittedErab, Gateways, HandoverCause, HandoverRequest, HandoverRequestAck};
use crate::mobility::security::{compute_short_mac_i, derive_horizontal, derive_vertical};
use crate::ue_context::{default_capabilities, erab_to_drb, Erab, RrcState, TeidAllocator, UeMobilityContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePhase {
    /// Handover required sent, waiting for the command
    WaitCommand,
    /// Command forwarded to the UE, bearer state sent; waiting for release
    StatusTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPhase {
    /// Admission acknowledged, waiting for status transfer and completion
    WaitComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraPhase {
    /// Reconfiguration sent, waiting for the UE to show up on the target
    WaitIdentity,
    WaitComplete,
}

/// Handover state of one UE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoverState {
    #[default]
    Idle,
    SourceRole(SourcePhase),
    TargetRole(TargetPhase),
    IntraRole(IntraPhase),
}

impl fmt::Display for HandoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoverState::Idle => write!(f, "Idle"),
            HandoverState::SourceRole(p) => write!(f, "Source/{p:?}"),
            HandoverState::TargetRole(p) => write!(f, "Target/{p:?}"),
            HandoverState::IntraRole(p) => write!(f, "Intra/{p:?}"),
        }
    }
}

/// Inbound events of the handover procedures.
#[derive(Debug, Clone)]
pub enum HandoverEvent {
    MeasurementReport(MeasurementReport),
    Decision(HandoverDecision),
    /// Encoded HandoverCommand received from the core network
    HandoverCommand { container: Bytes },
    HandoverPreparationFailure { cause: HandoverCause },
    HandoverRequest(HandoverRequest),
    StatusTransfer { records: Vec<BearerCounterRecord> },
    ReconfigurationComplete { transaction_id: u8 },
    /// C-RNTI MAC CE received on the target cell
    CrntiUpdate { temp_crnti: CRnti, crnti: CRnti },
    Cancel { cause: HandoverCause },
    UeContextRelease,
}

impl HandoverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HandoverEvent::MeasurementReport(_) => "MeasurementReport",
            HandoverEvent::Decision(_) => "Decision",
            HandoverEvent::HandoverCommand { .. } => "HandoverCommand",
            HandoverEvent::HandoverPreparationFailure { .. } => "HandoverPreparationFailure",
            HandoverEvent::HandoverRequest(_) => "HandoverRequest",
            HandoverEvent::StatusTransfer { .. } => "StatusTransfer",
            HandoverEvent::ReconfigurationComplete { .. } => "ReconfigurationComplete",
            HandoverEvent::CrntiUpdate { .. } => "CrntiUpdate",
            HandoverEvent::Cancel { .. } => "Cancel",
            HandoverEvent::UeContextRelease => "UeContextRelease",
        }
    }
}

/// An open handover procedure.
#[derive(Debug, Clone)]
pub struct HandoverTransaction {
    pub state: HandoverState,
    /// Serving cell when the procedure started (unknown on the target)
    pub source: Option<GlobalCellId>,
    pub target: GlobalCellId,
    pub report: Option<MeasurementReport>,
    /// Core-network UE id of an admitted handover
    pub amf_ue_id: Option<u64>,
    /// Reconfiguration complete that arrived before status transfer
    pub deferred_complete: Option<u8>,
    pub status_transfer_applied: bool,
    pub last_temp_crnti: Option<CRnti>,
    /// C-RNTI reserved for the UE on the target cell
    pub new_crnti: Option<CRnti>,
    pub reest_info: Option<ReestablishmentInfo>,
    pub started: Instant,
    /// C-RNTI the UE held before an intra-gNB handover
    source_crnti: Option<CRnti>,
    target_claimed: bool,
    cell_reassigned: bool,
    drbs_disabled: bool,
    ack_sent: bool,
}

impl HandoverTransaction {
    fn new(state: HandoverState, source: Option<GlobalCellId>, target: GlobalCellId) -> Self {
        Self {
            state,
            source,
            target,
            report: None,
            amf_ue_id: None,
            deferred_complete: None,
            status_transfer_applied: false,
            last_temp_crnti: None,
            new_crnti: None,
            reest_info: None,
            started: Instant::now(),
            source_crnti: None,
            target_claimed: false,
            cell_reassigned: false,
            drbs_disabled: false,
            ack_sent: false,
        }
    }
}

/// What an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new transaction was opened
    Started,
    Progressed,
    /// Reconfiguration complete buffered until status transfer
    Deferred,
    Completed,
    Cancelled,
    /// The transaction ended unsuccessfully
    Failed(HandoverError),
    /// The event was dropped; nothing changed
    Rejected(HandoverError),
    /// Measurement report evaluated without a decision
    NoDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: HandoverState,
    pub to: HandoverState,
    pub outcome: Outcome,
}

impl Transition {
    /// True when this transition closed a transaction.
    pub fn closed_transaction(&self) -> bool {
        self.from != HandoverState::Idle && self.to == HandoverState::Idle
    }
}

/// Everything a transition may touch besides the UE context.
pub struct MobilityEnv<'a> {
    pub config: &'a GnbConfig,
    pub cells: &'a dyn CellRegistry,
    pub codec: &'a dyn RrcCodec,
    pub gateways: &'a mut Gateways,
    pub teids: &'a mut TeidAllocator,
}

fn resource_error(e: GatewayError) -> HandoverError {
    HandoverError::ResourceAllocation(e.0)
}

fn served_cell(cells: &dyn CellRegistry, id: GlobalCellId) -> Result<CellInfo, HandoverError> {
    cells
        .find_by_global_id(id)
        .cloned()
        .ok_or_else(|| HandoverError::ResourceAllocation(format!("cell {id} is not served here")))
}

/// Per-UE handover state machine.
#[derive(Debug, Default)]
pub struct HandoverFsm {
    txn: Option<HandoverTransaction>,
}

impl HandoverFsm {
    pub fn new() -> Self {
        Self { txn: None }
    }

    pub fn state(&self) -> HandoverState {
        self.txn.as_ref().map(|t| t.state).unwrap_or_default()
    }

    pub fn is_idle(&self) -> bool {
        self.txn.is_none()
    }

    pub fn transaction(&self) -> Option<&HandoverTransaction> {
        self.txn.as_ref()
    }

    /// Runs one event to completion.
    pub fn handle(
        &mut self,
        ue: &mut UeMobilityContext,
        event: HandoverEvent,
        env: &mut MobilityEnv<'_>,
    ) -> Transition {
        use HandoverEvent as E;
        use HandoverState as S;

        let from = self.state();
        let event_name = event.name();

        let result = match (from, event) {
            (_, E::MeasurementReport(report)) => self.on_measurement_report(ue, report, env),
            (S::Idle, E::Decision(decision)) => self.start(ue, decision, env),
            (S::Idle, E::HandoverRequest(request)) => self.admit(ue, request, env),
            (S::SourceRole(SourcePhase::WaitCommand), E::HandoverCommand { container }) => {
                self.on_handover_command(ue, &container, env)
            }
            (S::SourceRole(SourcePhase::WaitCommand), E::HandoverPreparationFailure { cause }) => {
                self.on_preparation_failure(ue, cause)
            }
            (S::SourceRole(SourcePhase::StatusTransfer), E::UeContextRelease) => {
                self.on_source_released(ue, env)
            }
            (S::TargetRole(TargetPhase::WaitComplete), E::StatusTransfer { records }) => {
                self.on_status_transfer(ue, &records, env)
            }
            (S::TargetRole(TargetPhase::WaitComplete), E::ReconfigurationComplete { transaction_id }) => {
                self.on_target_complete(ue, transaction_id, env)
            }
            (S::IntraRole(IntraPhase::WaitIdentity), E::CrntiUpdate { temp_crnti, crnti }) => {
                self.on_crnti_update(ue, temp_crnti, crnti, env)
            }
            (S::IntraRole(IntraPhase::WaitComplete), E::CrntiUpdate { temp_crnti, .. }) => {
                Err(HandoverError::ProtocolViolation(format!(
                    "duplicate C-RNTI update (temp C-RNTI {temp_crnti:#06x})"
                )))
            }
            (S::IntraRole(IntraPhase::WaitComplete), E::ReconfigurationComplete { .. }) => {
                self.on_intra_complete(ue, env)
            }
            (state, E::Cancel { cause }) if state != S::Idle => {
                info!("UE[{}] handover cancelled in {}: {}", ue.ue_id, state, cause);
                self.rollback(ue, env, cause, true);
                Ok(Outcome::Cancelled)
            }
            (state, E::UeContextRelease) if state != S::Idle => {
                info!("UE[{}] released during handover in {}", ue.ue_id, state);
                self.rollback(ue, env, HandoverCause::Unspecified, false);
                Ok(Outcome::Cancelled)
            }
            (state, event) => Err(HandoverError::ProtocolViolation(format!(
                "{} unexpected in state {}",
                event.name(),
                state
            ))),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => self.fail(ue, e, env),
        };
        let to = self.state();

        if from != to {
            info!("UE[{}] {}: {} -> {} ({:?})", ue.ue_id, event_name, from, to, outcome);
        } else {
            debug!("UE[{}] {} in {}: {:?}", ue.ue_id, event_name, from, outcome);
        }

        Transition { from, to, outcome }
    }

    fn fail(&mut self, ue: &mut UeMobilityContext, e: HandoverError, env: &mut MobilityEnv<'_>) -> Outcome {
        if matches!(e, HandoverError::ProtocolViolation(_)) {
            warn!("UE[{}] {}", ue.ue_id, e);
            return Outcome::Rejected(e);
        }
        if self.txn.is_none() {
            warn!("UE[{}] handover not started: {}", ue.ue_id, e);
            return Outcome::Rejected(e);
        }

        error!("UE[{}] handover failed in {}: {}", ue.ue_id, self.state(), e);
        self.rollback(ue, env, e.cause(), true);
        Outcome::Failed(e)
    }

    /// Closes the open transaction and hands the scheduler association back
    /// to the source. With `notify`, the core network is told as well.
    fn rollback(&mut self, ue: &mut UeMobilityContext, env: &mut MobilityEnv<'_>, cause: HandoverCause, notify: bool) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        let gw = &mut *env.gateways;

        match txn.state {
            HandoverState::SourceRole(_) => {
                if notify {
                    if let Err(e) = gw.ngap.send_handover_cancel(ue.ue_id, cause) {
                        warn!("UE[{}] failed to send handover cancel: {}", ue.ue_id, e);
                    }
                }
                if txn.drbs_disabled {
                    if let Err(e) = gw.scheduler.set_drb_activation(ue.ue_id, true) {
                        warn!("UE[{}] failed to re-enable DRBs: {}", ue.ue_id, e);
                    }
                }
            }
            HandoverState::TargetRole(_) => {
                if notify {
                    let sent = match (txn.ack_sent, txn.amf_ue_id) {
                        (false, Some(amf_ue_id)) => gw.ngap.send_handover_failure(amf_ue_id, cause),
                        _ => gw.ngap.send_handover_cancel(ue.ue_id, cause),
                    };
                    if let Err(e) = sent {
                        warn!("UE[{}] failed to report handover failure: {}", ue.ue_id, e);
                    }
                }
                if txn.target_claimed {
                    if let Err(e) = gw.scheduler.release_cell(ue.ue_id, txn.target) {
                        warn!("UE[{}] failed to release {}: {}", ue.ue_id, txn.target, e);
                    }
                }
            }
            HandoverState::IntraRole(_) => {
                if let (true, Some(source)) = (txn.cell_reassigned, txn.source) {
                    if let Err(e) = gw.scheduler.reassign_cell(ue.ue_id, source) {
                        warn!("UE[{}] failed to move back to {}: {}", ue.ue_id, source, e);
                    }
                    if let Some(crnti) = txn.source_crnti {
                        ue.c_rnti = crnti;
                    }
                }
                if txn.target_claimed {
                    if let Err(e) = gw.scheduler.release_cell(ue.ue_id, txn.target) {
                        warn!("UE[{}] failed to release {}: {}", ue.ue_id, txn.target, e);
                    }
                }
            }
            HandoverState::Idle => {}
        }

        if let Some(crnti) = txn.new_crnti {
            if let Err(e) = gw.scheduler.release_crnti(txn.target, crnti) {
                warn!("UE[{}] failed to return C-RNTI {:#06x}: {}", ue.ue_id, crnti, e);
            }
        }
    }

    fn txn_mut(&mut self) -> Result<&mut HandoverTransaction, HandoverError> {
        self.txn
            .as_mut()
            .ok_or_else(|| HandoverError::ProtocolViolation("no open handover transaction".to_string()))
    }

    fn on_measurement_report(
        &mut self,
        ue: &mut UeMobilityContext,
        report: MeasurementReport,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        match evaluator::evaluate(ue, self.txn.is_some(), &report, env.cells)? {
            Some(decision) => self.start(ue, decision, env),
            None => Ok(Outcome::NoDecision),
        }
    }

    fn start(
        &mut self,
        ue: &mut UeMobilityContext,
        decision: HandoverDecision,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        if !ue.is_registered() {
            return Err(HandoverError::ProtocolViolation(format!(
                "handover decision for UE in state {}",
                ue.rrc_state
            )));
        }
        match decision.kind {
            HandoverKind::IntraGnb => self.start_intra(ue, decision, env),
            HandoverKind::InterGnb => self.start_inter(ue, decision, env),
        }
    }

    fn start_intra(
        &mut self,
        ue: &mut UeMobilityContext,
        decision: HandoverDecision,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        let target_cell = served_cell(env.cells, decision.target)?;
        let source_arfcn = env.cells.find_by_global_id(ue.serving_cell).map(|c| c.dl_arfcn);

        let new_crnti = env
            .gateways
            .scheduler
            .reserve_crnti(target_cell.global_id)
            .map_err(resource_error)?;

        let mut txn = HandoverTransaction::new(
            HandoverState::IntraRole(IntraPhase::WaitIdentity),
            Some(ue.serving_cell),
            target_cell.global_id,
        );
        txn.new_crnti = Some(new_crnti);
        txn.source_crnti = Some(ue.c_rnti);
        txn.report = Some(decision.report);
        self.txn = Some(txn);

        env.gateways
            .scheduler
            .claim_cell(ue.ue_id, target_cell.global_id)
            .map_err(resource_error)?;
        self.txn_mut()?.target_claimed = true;

        let reconfig = RrcReconfiguration {
            transaction_id: ue.next_transaction_id(),
            mobility_control_info: Some(MobilityControlInfo {
                target_pci: target_cell.pci,
                new_ue_identity: new_crnti,
                t304_ms: env.config.handover.t304_ms,
                carrier_freq: (source_arfcn != Some(target_cell.dl_arfcn)).then_some(target_cell.dl_arfcn),
            }),
            security_config_ho: Some(SecurityConfigHo {
                key_change_indicator: false,
                next_hop_chaining_count: ue.security.ncc,
                algorithms: None,
            }),
            radio_bearer_config: Some(ue.rb_config.clone()),
            meas_config: Some(target_cell.meas_config()),
        };
        let pdu = env.codec.encode_dl_dcch(&DlDcchMessage::RrcReconfiguration(reconfig))?;
        log_rrc_message(Direction::Tx, "RRCReconfiguration", &pdu);
        env.gateways.ue_link.send_dl_dcch(ue.ue_id, pdu)?;

        info!(
            "UE[{}] intra-gNB handover {} -> {} started, new C-RNTI {:#06x}",
            ue.ue_id, ue.serving_cell, target_cell.global_id, new_crnti
        );
        Ok(Outcome::Started)
    }

    fn start_inter(
        &mut self,
        ue: &mut UeMobilityContext,
        decision: HandoverDecision,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        if env.config.handover.direct_forwarding_path_available {
            return Err(HandoverError::UnsupportedFeature(
                "direct data forwarding path".to_string(),
            ));
        }
        let source_cell = served_cell(env.cells, ue.serving_cell)?;

        let short_mac_input = VarShortMacInput {
            cell_identity: ue.serving_cell.eci(),
            phys_cell_id: source_cell.pci,
            c_rnti: ue.c_rnti,
        };
        let reest_info = ReestablishmentInfo {
            source_pci: source_cell.pci,
            target_cell_short_mac_i: compute_short_mac_i(&ue.security, &short_mac_input)?,
        };

        let ue_capabilities = if ue.capabilities.is_empty() {
            warn!("UE[{}] capabilities unknown, sending a default capability", ue.ue_id);
            default_capabilities()
        } else {
            ue.capabilities.clone()
        };

        let info = HandoverPreparationInfo::R8(HandoverPreparationInfoR8 {
            ue_capabilities,
            as_config: AsConfig {
                source_rb_config: ue.rb_config.clone(),
                source_meas_config: ue.meas_config.clone(),
                source_security: ue.security.algorithms,
                source_c_rnti: ue.c_rnti,
                source_dl_arfcn: source_cell.dl_arfcn,
            },
            reestablishment_info: Some(reest_info),
        });
        let container = env.codec.encode_handover_preparation_info(&info)?;

        log_ngap_message(Direction::Tx, "HandoverRequired", &container);
        env.gateways
            .ngap
            .send_handover_required(ue.ue_id, decision.target, env.config.plmn, container)?;

        let mut txn = HandoverTransaction::new(
            HandoverState::SourceRole(SourcePhase::WaitCommand),
            Some(ue.serving_cell),
            decision.target,
        );
        txn.report = Some(decision.report);
        txn.reest_info = Some(reest_info);
        self.txn = Some(txn);

        info!("UE[{}] inter-gNB handover {} -> {} started", ue.ue_id, ue.serving_cell, decision.target);
        Ok(Outcome::Started)
    }

    fn on_handover_command(
        &mut self,
        ue: &mut UeMobilityContext,
        container: &[u8],
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        log_ngap_message(Direction::Rx, "HandoverCommand", container);

        let dl_dcch = match env.codec.decode_handover_command(container)? {
            HandoverCommand::R8 { dl_dcch } => dl_dcch,
            HandoverCommand::Future { revision } => {
                return Err(HandoverError::UnsupportedFeature(format!(
                    "HandoverCommand critical extension {revision}"
                )));
            }
        };
        match env.codec.decode_dl_dcch(&dl_dcch)? {
            DlDcchMessage::RrcReconfiguration(RrcReconfiguration {
                mobility_control_info: Some(_),
                ..
            }) => {}
            other => {
                return Err(HandoverError::Decode(format!(
                    "HandoverCommand carries {} without mobility control info",
                    other.name()
                )));
            }
        }

        env.gateways.scheduler.set_drb_activation(ue.ue_id, false)?;
        self.txn_mut()?.drbs_disabled = true;

        log_rrc_message(Direction::Tx, "RRCReconfiguration", &dl_dcch);
        env.gateways.ue_link.send_dl_dcch(ue.ue_id, dl_dcch)?;

        self.txn_mut()?.state = HandoverState::SourceRole(SourcePhase::StatusTransfer);
        self.enter_status_transfer(ue, env)
    }

    fn enter_status_transfer(
        &mut self,
        ue: &mut UeMobilityContext,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        let records = bearer_transfer::capture(
            ue.ue_id,
            &ue.bearers,
            env.config.handover.erab_drb_offset,
            &*env.gateways.bearers,
        )?;
        info!("UE[{}] sending status transfer for {} bearer(s)", ue.ue_id, records.len());
        env.gateways.ngap.send_status_transfer(ue.ue_id, records)?;
        Ok(Outcome::Progressed)
    }

    fn on_preparation_failure(
        &mut self,
        ue: &mut UeMobilityContext,
        cause: HandoverCause,
    ) -> Result<Outcome, HandoverError> {
        warn!("UE[{}] handover preparation failed: {}", ue.ue_id, cause);
        self.txn = None;
        Ok(Outcome::Failed(HandoverError::PreparationFailure(cause)))
    }

    fn on_source_released(
        &mut self,
        ue: &mut UeMobilityContext,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        if let Err(e) = env.gateways.scheduler.release_cell(ue.ue_id, ue.serving_cell) {
            warn!("UE[{}] failed to release source cell: {}", ue.ue_id, e);
        }
        self.txn = None;
        info!("UE[{}] handover confirmed by target, source context released", ue.ue_id);
        Ok(Outcome::Completed)
    }

    fn admit(
        &mut self,
        ue: &mut UeMobilityContext,
        request: HandoverRequest,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        log_ngap_message(Direction::Rx, "HandoverRequest", &request.container);

        let mut txn = HandoverTransaction::new(
            HandoverState::TargetRole(TargetPhase::WaitComplete),
            None,
            request.target_cell,
        );
        txn.amf_ue_id = Some(request.amf_ue_id);
        self.txn = Some(txn);

        let target_cell = served_cell(env.cells, request.target_cell)?;

        let prep = match env.codec.decode_handover_preparation_info(&request.container)? {
            HandoverPreparationInfo::R8(body) => body,
            HandoverPreparationInfo::Future { revision } => {
                return Err(HandoverError::UnsupportedFeature(format!(
                    "HandoverPreparationInformation critical extension {revision}"
                )));
            }
        };
        if let Some(erab) = request.erabs.iter().find(|e| e.transport_address.is_ipv6()) {
            return Err(HandoverError::UnsupportedFeature(format!(
                "IPv6 transport address for E-RAB {}",
                erab.erab_id
            )));
        }

        let gw = &mut *env.gateways;
        let crnti = gw.scheduler.reserve_crnti(target_cell.global_id).map_err(resource_error)?;
        self.txn_mut()?.new_crnti = Some(crnti);
        gw.scheduler.claim_cell(ue.ue_id, target_cell.global_id).map_err(resource_error)?;
        self.txn_mut()?.target_claimed = true;
        ue.c_rnti = crnti;

        let offset = env.config.handover.erab_drb_offset;
        let mut admitted = Vec::with_capacity(request.erabs.len());
        let mut not_admitted = Vec::new();
        for item in &request.erabs {
            if erab_to_drb(item.erab_id, offset).is_none() {
                warn!("UE[{}] E-RAB {} cannot be carried on a DRB", ue.ue_id, item.erab_id);
                not_admitted.push(item.erab_id);
                continue;
            }
            let dl_teid = env.teids.allocate();
            ue.bearers.add_erab(Erab {
                erab_id: item.erab_id,
                qci: item.qci,
                transport_address: item.transport_address,
                ul_teid: item.ul_teid,
                dl_teid,
            });
            admitted.push(AdmittedErab { erab_id: item.erab_id, dl_teid });
        }

        if !prep.as_config.source_rb_config.srbs.is_empty() {
            ue.bearers.srbs = prep.as_config.source_rb_config.srbs.iter().map(|s| s.srb_id).collect();
        }
        ue.rb_config = ue.bearers.rb_config(offset);
        ue.meas_config = target_cell.meas_config();
        ue.capabilities = prep.ue_capabilities;

        let algorithms = prep.as_config.source_security;
        ue.security = derive_vertical(
            &request.security.nh,
            request.security.ncc,
            algorithms,
            target_cell.pci,
            target_cell.dl_arfcn,
        );
        self.txn_mut()?.reest_info = prep.reestablishment_info;

        let reconfig = RrcReconfiguration {
            transaction_id: ue.next_transaction_id(),
            mobility_control_info: Some(MobilityControlInfo {
                target_pci: target_cell.pci,
                new_ue_identity: crnti,
                t304_ms: env.config.handover.t304_ms,
                carrier_freq: (prep.as_config.source_dl_arfcn != target_cell.dl_arfcn)
                    .then_some(target_cell.dl_arfcn),
            }),
            security_config_ho: Some(SecurityConfigHo {
                key_change_indicator: false,
                next_hop_chaining_count: ue.security.ncc,
                algorithms: Some(algorithms),
            }),
            radio_bearer_config: Some(ue.rb_config.clone()),
            meas_config: Some(ue.meas_config.clone()),
        };
        let dl_dcch = env.codec.encode_dl_dcch(&DlDcchMessage::RrcReconfiguration(reconfig))?;
        let container = env.codec.encode_handover_command(&HandoverCommand::R8 { dl_dcch })?;

        let gw = &mut *env.gateways;
        gw.bearers.configure_srbs(ue.ue_id, &ue.rb_config.srbs, &ue.security.keys)?;

        log_ngap_message(Direction::Tx, "HandoverRequestAcknowledge", &container);
        info!(
            "UE[{}] admitted on {} with C-RNTI {:#06x}, {} E-RAB(s) admitted, {} rejected",
            ue.ue_id,
            target_cell.global_id,
            crnti,
            admitted.len(),
            not_admitted.len()
        );
        gw.ngap.send_handover_request_ack(HandoverRequestAck {
            amf_ue_id: request.amf_ue_id,
            ue_id: ue.ue_id,
            admitted,
            not_admitted,
            container,
        })?;
        self.txn_mut()?.ack_sent = true;

        Ok(Outcome::Started)
    }

    fn on_status_transfer(
        &mut self,
        ue: &mut UeMobilityContext,
        records: &[BearerCounterRecord],
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        if self.txn_mut()?.status_transfer_applied {
            return Err(HandoverError::ProtocolViolation("duplicate status transfer".to_string()));
        }

        let gw = &mut *env.gateways;
        gw.bearers.configure_drbs(ue.ue_id, &ue.rb_config.drbs, &ue.security.keys)?;
        let report = bearer_transfer::apply(
            ue.ue_id,
            &ue.bearers,
            env.config.handover.erab_drb_offset,
            records,
            &mut *gw.bearers,
        )?;
        if !report.skipped.is_empty() {
            warn!("UE[{}] status transfer skipped records: {:?}", ue.ue_id, report.skipped);
        }
        info!("UE[{}] status transfer applied to {} bearer(s)", ue.ue_id, report.applied.len());

        let txn = self.txn_mut()?;
        txn.status_transfer_applied = true;
        match txn.deferred_complete.take() {
            Some(transaction_id) => {
                debug!("UE[{}] replaying deferred reconfiguration complete ({})", ue.ue_id, transaction_id);
                self.complete_target(ue, env)
            }
            None => Ok(Outcome::Progressed),
        }
    }

    fn on_target_complete(
        &mut self,
        ue: &mut UeMobilityContext,
        transaction_id: u8,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        let txn = self.txn_mut()?;
        if !txn.status_transfer_applied {
            if let Some(previous) = txn.deferred_complete.replace(transaction_id) {
                warn!(
                    "UE[{}] reconfiguration complete ({}) replaces a deferred one ({})",
                    ue.ue_id, transaction_id, previous
                );
            }
            debug!("UE[{}] reconfiguration complete deferred until status transfer", ue.ue_id);
            return Ok(Outcome::Deferred);
        }
        self.complete_target(ue, env)
    }

    fn complete_target(
        &mut self,
        ue: &mut UeMobilityContext,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        let target = self.txn_mut()?.target;
        let gw = &mut *env.gateways;
        gw.scheduler.reassign_cell(ue.ue_id, target)?;
        self.txn_mut()?.cell_reassigned = true;
        gw.scheduler.set_drb_activation(ue.ue_id, true)?;
        gw.ngap.send_handover_notify(ue.ue_id, target)?;

        if let Some(cell) = env.cells.find_by_global_id(target) {
            ue.move_to_cell(cell);
        }
        ue.rrc_state = RrcState::Registered;
        self.txn = None;

        info!("UE[{}] inter-gNB handover completed on {}", ue.ue_id, target);
        Ok(Outcome::Completed)
    }

    fn on_crnti_update(
        &mut self,
        ue: &mut UeMobilityContext,
        temp_crnti: CRnti,
        crnti: CRnti,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        let txn = self.txn_mut()?;
        let target = txn.target;
        if txn.new_crnti != Some(crnti) {
            debug!("UE[{}] C-RNTI {:#06x} differs from the reserved one", ue.ue_id, crnti);
        }
        let target_cell = served_cell(env.cells, target)?;

        let gw = &mut *env.gateways;
        gw.bearers.reestablish(ue.ue_id)?;
        gw.scheduler.reassign_cell(ue.ue_id, target)?;
        self.txn_mut()?.cell_reassigned = true;

        ue.security = derive_horizontal(&ue.security, target_cell.pci, target_cell.dl_arfcn);
        gw.bearers.configure_srbs(ue.ue_id, &ue.rb_config.srbs, &ue.security.keys)?;
        gw.bearers.configure_drbs(ue.ue_id, &ue.rb_config.drbs, &ue.security.keys)?;
        ue.c_rnti = crnti;

        let txn = self.txn_mut()?;
        txn.last_temp_crnti = Some(temp_crnti);
        txn.state = HandoverState::IntraRole(IntraPhase::WaitComplete);

        info!(
            "UE[{}] identified on {} (temp C-RNTI {:#06x}), keys refreshed",
            ue.ue_id, target, temp_crnti
        );
        Ok(Outcome::Progressed)
    }

    fn on_intra_complete(
        &mut self,
        ue: &mut UeMobilityContext,
        env: &mut MobilityEnv<'_>,
    ) -> Result<Outcome, HandoverError> {
        let target_cell = served_cell(env.cells, self.txn_mut()?.target)?;
        let Some(txn) = self.txn.take() else {
            return Err(HandoverError::ProtocolViolation("no open handover transaction".to_string()));
        };

        if let Some(source) = txn.source {
            if let Err(e) = env.gateways.scheduler.release_cell(ue.ue_id, source) {
                warn!("UE[{}] failed to release source cell {}: {}", ue.ue_id, source, e);
            }
        }
        ue.move_to_cell(&target_cell);
        ue.meas_config = target_cell.meas_config();

        info!(
            "UE[{}] intra-gNB handover completed on {} in {:?}",
            ue.ue_id,
            target_cell.global_id,
            txn.started.elapsed()
        );
        Ok(Outcome::Completed)
    }
}
