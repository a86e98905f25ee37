//! Mobility manager
//!
//! Owns the UE mobility contexts of one gNB together with their handover
//! state machines, and routes events to them one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ranmob_common::{CRnti, GlobalCellId, GnbConfig, UeId, INVALID_CRNTI};
use ranmob_rrc::{BinaryRrcCodec, RrcCodec, SecurityAlgorithmConfig, UeCapabilityRatContainer};
use tracing::{debug, info, warn};

use crate::cells::{CellRegistry, StaticCellRegistry};
use crate::error::{GatewayError, HandoverError};
use crate::mobility::fsm::{HandoverEvent, HandoverFsm, HandoverState, HandoverTransaction, MobilityEnv, Outcome, Transition};
use crate::mobility::ports::{ErabSetupItem, Gateways, HandoverCause, HandoverRequest};
use crate::ue_context::{Erab, RrcState, TeidAllocator, UeMobilityContext, UeSecurityContext};

/// First downlink TEID handed out by a manager
const FIRST_DL_TEID: u32 = 0x100;

/// A UE that finished registration on one of this gNB's cells.
#[derive(Debug, Clone)]
pub struct UeRegistration {
    pub c_rnti: CRnti,
    pub cell: GlobalCellId,
    pub security: UeSecurityContext,
    pub erabs: Vec<ErabSetupItem>,
    pub capabilities: Vec<UeCapabilityRatContainer>,
}

#[derive(Debug)]
struct UeEntry {
    ctx: UeMobilityContext,
    fsm: HandoverFsm,
    /// Created by handover admission and not yet completed
    incoming: bool,
}

/// Brings up the scheduler and PDCP side of a freshly registered UE.
fn activate(gw: &mut Gateways, ctx: &UeMobilityContext) -> Result<(), GatewayError> {
    gw.scheduler.reassign_cell(ctx.ue_id, ctx.serving_cell)?;
    gw.bearers.configure_srbs(ctx.ue_id, &ctx.rb_config.srbs, &ctx.security.keys)?;
    gw.bearers.configure_drbs(ctx.ue_id, &ctx.rb_config.drbs, &ctx.security.keys)?;
    gw.scheduler.set_drb_activation(ctx.ue_id, true)
}

/// UE context host for one gNB.
pub struct MobilityManager {
    config: Arc<GnbConfig>,
    cells: Arc<dyn CellRegistry>,
    codec: Arc<dyn RrcCodec>,
    gateways: Gateways,
    teids: TeidAllocator,
    ues: HashMap<UeId, UeEntry>,
    next_ue_id: UeId,
}

impl MobilityManager {
    pub fn new(
        config: Arc<GnbConfig>,
        cells: Arc<dyn CellRegistry>,
        codec: Arc<dyn RrcCodec>,
        gateways: Gateways,
    ) -> Self {
        Self {
            config,
            cells,
            codec,
            gateways,
            teids: TeidAllocator::new(FIRST_DL_TEID),
            ues: HashMap::new(),
            next_ue_id: 1,
        }
    }

    /// Manager over the configured cells using the reference codec.
    pub fn from_config(config: GnbConfig, gateways: Gateways) -> Self {
        let cells = Arc::new(StaticCellRegistry::from_config(&config));
        Self::new(Arc::new(config), cells, Arc::new(BinaryRrcCodec::new()), gateways)
    }

    pub fn config(&self) -> &GnbConfig {
        &self.config
    }

    pub fn cells(&self) -> &dyn CellRegistry {
        self.cells.as_ref()
    }

    fn allocate_ue_id(&mut self) -> UeId {
        while self.ues.contains_key(&self.next_ue_id) {
            self.next_ue_id = self.next_ue_id.checked_add(1).unwrap_or(1);
        }
        let ue_id = self.next_ue_id;
        self.next_ue_id = self.next_ue_id.checked_add(1).unwrap_or(1);
        ue_id
    }

    /// Creates the context of a registered UE on `registration.cell`.
    pub fn register_ue(&mut self, registration: UeRegistration) -> Result<UeId, HandoverError> {
        let cell = self
            .cells
            .find_by_global_id(registration.cell)
            .cloned()
            .ok_or_else(|| {
                HandoverError::ResourceAllocation(format!("cell {} is not served here", registration.cell))
            })?;

        let ue_id = self.allocate_ue_id();
        let offset = self.config.handover.erab_drb_offset;
        let mut ctx = UeMobilityContext::new(ue_id, registration.c_rnti, &cell, registration.security);
        for item in registration.erabs {
            ctx.bearers.add_erab(Erab {
                erab_id: item.erab_id,
                qci: item.qci,
                transport_address: item.transport_address,
                ul_teid: item.ul_teid,
                dl_teid: self.teids.allocate(),
            });
        }
        ctx.capabilities = registration.capabilities;
        ctx.rb_config = ctx.bearers.rb_config(offset);
        ctx.rrc_state = RrcState::Registered;

        let gw = &mut self.gateways;
        gw.scheduler.claim_cell(ue_id, cell.global_id)?;
        if let Err(e) = activate(gw, &ctx) {
            if let Err(release) = gw.scheduler.release_cell(ue_id, cell.global_id) {
                warn!("UE[{}] failed to release {}: {}", ue_id, cell.global_id, release);
            }
            return Err(e.into());
        }

        info!(
            "UE[{}] registered on {} (C-RNTI {:#06x}, {} E-RAB(s))",
            ue_id,
            cell.global_id,
            ctx.c_rnti,
            ctx.bearers.erab_count()
        );
        self.ues.insert(ue_id, UeEntry { ctx, fsm: HandoverFsm::new(), incoming: false });
        Ok(ue_id)
    }

    /// Routes one event to the UE's state machine.
    ///
    /// A UE context release closes the context; a release while a handover
    /// is running cancels it first.
    pub fn handle_event(&mut self, ue_id: UeId, event: HandoverEvent) -> Result<Transition, HandoverError> {
        let Some(entry) = self.ues.get_mut(&ue_id) else {
            return Err(HandoverError::ProtocolViolation(format!(
                "{} for unknown UE[{}]",
                event.name(),
                ue_id
            )));
        };

        let release = matches!(event, HandoverEvent::UeContextRelease);
        if release && entry.fsm.is_idle() {
            self.release_ue(ue_id);
            return Ok(Transition {
                from: HandoverState::Idle,
                to: HandoverState::Idle,
                outcome: Outcome::Completed,
            });
        }

        let mut env = MobilityEnv {
            config: &self.config,
            cells: self.cells.as_ref(),
            codec: self.codec.as_ref(),
            gateways: &mut self.gateways,
            teids: &mut self.teids,
        };
        let transition = entry.fsm.handle(&mut entry.ctx, event, &mut env);

        let ended = transition.to == HandoverState::Idle && !matches!(transition.outcome, Outcome::Rejected(_));
        if entry.incoming && ended {
            if transition.outcome == Outcome::Completed {
                entry.incoming = false;
            } else {
                info!("UE[{}] incoming handover ended ({:?}), dropping context", ue_id, transition.outcome);
                self.ues.remove(&ue_id);
            }
        } else if release && ended {
            if let Some(entry) = self.ues.remove(&ue_id) {
                if transition.outcome == Outcome::Cancelled {
                    if let Err(e) = self.gateways.scheduler.release_cell(ue_id, entry.ctx.serving_cell) {
                        warn!("UE[{}] failed to release {}: {}", ue_id, entry.ctx.serving_cell, e);
                    }
                }
            }
            debug!("UE[{}] context released", ue_id);
        }

        Ok(transition)
    }

    /// Admits an incoming handover on the target cell named in `request`.
    ///
    /// Returns the UE id allocated for the incoming UE. When the admission
    /// fails, the context is dropped again and the failure has already been
    /// reported upstream.
    pub fn handle_handover_request(
        &mut self,
        request: HandoverRequest,
    ) -> Result<(UeId, Transition), HandoverError> {
        let Some(cell) = self.cells.find_by_global_id(request.target_cell).cloned() else {
            warn!("Handover request for unknown cell {}", request.target_cell);
            self.gateways
                .ngap
                .send_handover_failure(request.amf_ue_id, HandoverCause::NoRadioResourcesAvailable)?;
            return Err(HandoverError::ResourceAllocation(format!(
                "cell {} is not served here",
                request.target_cell
            )));
        };

        let ue_id = self.allocate_ue_id();
        let placeholder = UeSecurityContext::new([0; 32], [0; 32], 0, SecurityAlgorithmConfig::default());
        let ctx = UeMobilityContext::new(ue_id, INVALID_CRNTI, &cell, placeholder);
        self.ues.insert(ue_id, UeEntry { ctx, fsm: HandoverFsm::new(), incoming: true });

        let transition = self.handle_event(ue_id, HandoverEvent::HandoverRequest(request))?;
        Ok((ue_id, transition))
    }

    /// Drops a UE context, cancelling any running handover first.
    pub fn release_ue(&mut self, ue_id: UeId) -> Option<UeMobilityContext> {
        let busy = self.ues.get(&ue_id).map(|e| !e.fsm.is_idle())?;
        if busy {
            if let Err(e) = self.handle_event(ue_id, HandoverEvent::UeContextRelease) {
                warn!("UE[{}] release failed: {}", ue_id, e);
            }
            return None;
        }

        let entry = self.ues.remove(&ue_id)?;
        if let Err(e) = self.gateways.scheduler.release_cell(ue_id, entry.ctx.serving_cell) {
            warn!("UE[{}] failed to release {}: {}", ue_id, entry.ctx.serving_cell, e);
        }
        info!("UE[{}] released from {}", ue_id, entry.ctx.serving_cell);
        Some(entry.ctx)
    }

    pub fn ue(&self, ue_id: UeId) -> Option<&UeMobilityContext> {
        self.ues.get(&ue_id).map(|e| &e.ctx)
    }

    pub fn state(&self, ue_id: UeId) -> Option<HandoverState> {
        self.ues.get(&ue_id).map(|e| e.fsm.state())
    }

    pub fn transaction(&self, ue_id: UeId) -> Option<&HandoverTransaction> {
        self.ues.get(&ue_id).and_then(|e| e.fsm.transaction())
    }

    /// UEs whose handover has been open for at least T304.
    pub fn stalled_transactions(&self, now: Instant) -> Vec<UeId> {
        let guard = Duration::from_millis(u64::from(self.config.handover.t304_ms));
        let mut stalled: Vec<UeId> = self
            .ues
            .iter()
            .filter_map(|(ue_id, e)| {
                let txn = e.fsm.transaction()?;
                (now.saturating_duration_since(txn.started) >= guard).then_some(*ue_id)
            })
            .collect();
        stalled.sort_unstable();
        stalled
    }

    pub fn ue_count(&self) -> usize {
        self.ues.len()
    }

    pub fn ue_ids(&self) -> Vec<UeId> {
        let mut ids: Vec<UeId> = self.ues.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
