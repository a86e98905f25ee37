//! Mock AMF for integration testing
//!
//! Relays the N2 handover procedures between the [`TestGnb`]s it owns. The
//! relay is synchronous: [`MockAmf::pump`] drains every gNB's outbound queue
//! and feeds the resulting inbound events to the peer gNB until nothing is
//! left to route, so tests observe a deterministic message order.

use std::collections::{BTreeMap, HashMap};

use ranmob_common::{GlobalCellId, UeId};
use ranmob_crypto::kdf::derive_nh;
use ranmob_gnb::mobility::{
    ErabSetupItem, ForwardedSecurityContext, HandoverCause, HandoverRequest, Transition,
};
use ranmob_gnb::{HandoverEvent, NgapOutbound};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::test_fixtures::TestGnb;

/// KAMF the mock uses to compute NH values
pub const MOCK_KAMF: [u8; 32] = [0x5A; 32];

/// Mock AMF errors
#[derive(Debug, Error)]
pub enum MockAmfError {
    #[error("gNB {0:#x} not connected")]
    UnknownGnb(u32),
    #[error("UE[{1}] unknown on gNB {0:#x}")]
    UnknownUe(u32, UeId),
    #[error("Routing stalled after {0} messages")]
    RoutingLoop(usize),
}

/// Events emitted by the mock AMF
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAmfEvent {
    /// Handover required received from the source
    HandoverRequired { gnb_id: u32, ue_id: UeId, target: GlobalCellId },
    /// Handover request forwarded to the target gNB
    HandoverRequestSent { amf_ue_id: u64, target_gnb: u32, ncc: u8 },
    /// Target admitted the UE
    RequestAcknowledged { amf_ue_id: u64, target_ue: UeId, admitted: usize },
    /// Target refused, or no target gNB is connected
    PreparationFailed { amf_ue_id: u64, cause: HandoverCause },
    StatusTransferForwarded { amf_ue_id: u64, records: usize },
    /// Target confirmed the UE arrived; source released
    HandoverNotified { amf_ue_id: u64, target: GlobalCellId },
    HandoverCancelled { gnb_id: u32, ue_id: UeId, cause: HandoverCause },
    /// An inbound event was handed to a gNB
    Delivered { gnb_id: u32, ue_id: UeId, event: &'static str, transition: Transition },
}

/// Relocation tracked by the mock AMF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandover {
    pub amf_ue_id: u64,
    pub source: (u32, UeId),
    /// Known once the target acknowledged
    pub target: Option<(u32, UeId)>,
    pub target_cell: GlobalCellId,
    pub nh: [u8; 32],
    pub ncc: u8,
}

/// Upper bound on messages routed by one pump
const MAX_ROUTED: usize = 1024;

/// Mock AMF relaying handover signalling between gNBs
pub struct MockAmf {
    gnbs: BTreeMap<u32, TestGnb>,
    handovers: HashMap<u64, MockHandover>,
    next_amf_ue_id: u64,
    events: Vec<MockAmfEvent>,
    /// Hold status transfers instead of forwarding them
    hold_status_transfer: bool,
    held: Vec<(u32, UeId, HandoverEvent)>,
}

impl Default for MockAmf {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAmf {
    pub fn new() -> Self {
        Self {
            gnbs: BTreeMap::new(),
            handovers: HashMap::new(),
            next_amf_ue_id: 1,
            events: Vec::new(),
            hold_status_transfer: false,
            held: Vec::new(),
        }
    }

    pub fn connect_gnb(&mut self, gnb: TestGnb) {
        info!("gNB {:#x} connected to mock AMF", gnb.gnb_id());
        self.gnbs.insert(gnb.gnb_id(), gnb);
    }

    pub fn gnb(&self, gnb_id: u32) -> &TestGnb {
        self.gnbs.get(&gnb_id).expect("gNB connected")
    }

    pub fn gnb_mut(&mut self, gnb_id: u32) -> &mut TestGnb {
        self.gnbs.get_mut(&gnb_id).expect("gNB connected")
    }

    pub fn events(&self) -> &[MockAmfEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<MockAmfEvent> {
        std::mem::take(&mut self.events)
    }

    /// AMF UE id and target UE id of the most recent acknowledged request.
    pub fn last_acknowledged(&self) -> Option<(u64, UeId)> {
        self.events.iter().rev().find_map(|e| match e {
            MockAmfEvent::RequestAcknowledged { amf_ue_id, target_ue, .. } => Some((*amf_ue_id, *target_ue)),
            _ => None,
        })
    }

    /// Keeps status transfers back until [`MockAmf::release_held`], so the
    /// UE's reconfiguration complete can reach the target first.
    pub fn hold_status_transfer(&mut self, hold: bool) {
        self.hold_status_transfer = hold;
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Forwards every held message, then routes whatever follows.
    pub fn release_held(&mut self) -> Result<usize, MockAmfError> {
        let held = std::mem::take(&mut self.held);
        let count = held.len();
        for (gnb_id, ue_id, event) in held {
            self.deliver_logged(gnb_id, ue_id, event);
        }
        self.pump()?;
        Ok(count)
    }

    /// Relocations started and not yet notified, failed or cancelled
    pub fn active_handovers(&self) -> usize {
        self.handovers.len()
    }

    pub fn handover(&self, amf_ue_id: u64) -> Option<&MockHandover> {
        self.handovers.get(&amf_ue_id)
    }

    /// Hands `event` to a UE of one gNB, then routes whatever follows.
    pub fn inject(
        &mut self,
        gnb_id: u32,
        ue_id: UeId,
        event: HandoverEvent,
    ) -> Result<Transition, MockAmfError> {
        let transition = self.deliver(gnb_id, ue_id, event)?;
        self.pump()?;
        Ok(transition)
    }

    /// Routes queued N2 messages until every gNB's queue is empty.
    pub fn pump(&mut self) -> Result<usize, MockAmfError> {
        let mut routed = 0;
        loop {
            let mut progressed = false;
            let ids: Vec<u32> = self.gnbs.keys().copied().collect();
            for gnb_id in ids {
                while let Some(msg) = self.gnb_mut(gnb_id).next_ngap() {
                    routed += 1;
                    if routed > MAX_ROUTED {
                        return Err(MockAmfError::RoutingLoop(routed));
                    }
                    progressed = true;
                    self.route(gnb_id, msg);
                }
            }
            if !progressed {
                return Ok(routed);
            }
        }
    }

    fn deliver(&mut self, gnb_id: u32, ue_id: UeId, event: HandoverEvent) -> Result<Transition, MockAmfError> {
        let name = event.name();
        let gnb = self.gnbs.get_mut(&gnb_id).ok_or(MockAmfError::UnknownGnb(gnb_id))?;
        let transition = gnb
            .manager
            .handle_event(ue_id, event)
            .map_err(|_| MockAmfError::UnknownUe(gnb_id, ue_id))?;
        debug!("gNB {:#x} UE[{}] {}: {:?}", gnb_id, ue_id, name, transition);
        self.events.push(MockAmfEvent::Delivered { gnb_id, ue_id, event: name, transition: transition.clone() });
        Ok(transition)
    }

    fn deliver_logged(&mut self, gnb_id: u32, ue_id: UeId, event: HandoverEvent) {
        if let Err(e) = self.deliver(gnb_id, ue_id, event) {
            warn!("Mock AMF delivery failed: {}", e);
        }
    }

    fn find_by_source(&self, gnb_id: u32, ue_id: UeId) -> Option<u64> {
        self.handovers
            .values()
            .find(|h| h.source == (gnb_id, ue_id))
            .map(|h| h.amf_ue_id)
    }

    fn find_by_target(&self, gnb_id: u32, ue_id: UeId) -> Option<u64> {
        self.handovers
            .values()
            .find(|h| h.target == Some((gnb_id, ue_id)))
            .map(|h| h.amf_ue_id)
    }

    fn route(&mut self, gnb_id: u32, msg: NgapOutbound) {
        debug!("Mock AMF <- gNB {:#x}: {}", gnb_id, msg.name());
        match msg {
            NgapOutbound::HandoverRequired { ue_id, target, container, .. } => {
                self.events.push(MockAmfEvent::HandoverRequired { gnb_id, ue_id, target });
                self.on_handover_required(gnb_id, ue_id, target, container);
            }
            NgapOutbound::HandoverRequestAck(ack) => {
                let Some(handover) = self.handovers.get_mut(&ack.amf_ue_id) else {
                    warn!("Acknowledge for unknown AMF UE {}", ack.amf_ue_id);
                    return;
                };
                handover.target = Some((gnb_id, ack.ue_id));
                let (source_gnb, source_ue) = handover.source;
                self.events.push(MockAmfEvent::RequestAcknowledged {
                    amf_ue_id: ack.amf_ue_id,
                    target_ue: ack.ue_id,
                    admitted: ack.admitted.len(),
                });
                self.deliver_logged(source_gnb, source_ue, HandoverEvent::HandoverCommand { container: ack.container });
            }
            NgapOutbound::HandoverFailure { amf_ue_id, cause } => {
                let Some(handover) = self.handovers.remove(&amf_ue_id) else {
                    warn!("Handover failure for unknown AMF UE {}", amf_ue_id);
                    return;
                };
                self.events.push(MockAmfEvent::PreparationFailed { amf_ue_id, cause });
                let (source_gnb, source_ue) = handover.source;
                self.deliver_logged(source_gnb, source_ue, HandoverEvent::HandoverPreparationFailure { cause });
            }
            NgapOutbound::StatusTransfer { ue_id, records } => {
                let Some(amf_ue_id) = self.find_by_source(gnb_id, ue_id) else {
                    warn!("Status transfer for unknown UE[{}] of gNB {:#x}", ue_id, gnb_id);
                    return;
                };
                let Some((target_gnb, target_ue)) = self.handovers[&amf_ue_id].target else {
                    warn!("Status transfer before the target acknowledged");
                    return;
                };
                self.events.push(MockAmfEvent::StatusTransferForwarded { amf_ue_id, records: records.len() });
                let event = HandoverEvent::StatusTransfer { records };
                if self.hold_status_transfer {
                    debug!("Holding status transfer for AMF UE {}", amf_ue_id);
                    self.held.push((target_gnb, target_ue, event));
                } else {
                    self.deliver_logged(target_gnb, target_ue, event);
                }
            }
            NgapOutbound::HandoverNotify { ue_id, target } => {
                let Some(amf_ue_id) = self.find_by_target(gnb_id, ue_id) else {
                    warn!("Handover notify for unknown UE[{}] of gNB {:#x}", ue_id, gnb_id);
                    return;
                };
                let Some(handover) = self.handovers.remove(&amf_ue_id) else {
                    return;
                };
                self.events.push(MockAmfEvent::HandoverNotified { amf_ue_id, target });
                let (source_gnb, source_ue) = handover.source;
                self.deliver_logged(source_gnb, source_ue, HandoverEvent::UeContextRelease);
            }
            NgapOutbound::HandoverCancel { ue_id, cause } => {
                self.events.push(MockAmfEvent::HandoverCancelled { gnb_id, ue_id, cause });
                if let Some(amf_ue_id) = self.find_by_source(gnb_id, ue_id) {
                    let Some(handover) = self.handovers.remove(&amf_ue_id) else {
                        return;
                    };
                    if let Some((target_gnb, target_ue)) = handover.target {
                        self.deliver_logged(target_gnb, target_ue, HandoverEvent::Cancel { cause });
                    }
                } else if let Some(amf_ue_id) = self.find_by_target(gnb_id, ue_id) {
                    info!("Target cancelled AMF UE {}, source left to its own timer", amf_ue_id);
                    self.handovers.remove(&amf_ue_id);
                }
            }
        }
    }

    fn on_handover_required(&mut self, gnb_id: u32, ue_id: UeId, target: GlobalCellId, container: bytes::Bytes) {
        let amf_ue_id = self.next_amf_ue_id;
        self.next_amf_ue_id += 1;

        let Some(source) = self.gnbs.get(&gnb_id).and_then(|g| g.manager.ue(ue_id)) else {
            warn!("Handover required for unknown UE[{}]", ue_id);
            return;
        };
        let nh = derive_nh(&MOCK_KAMF, &source.security.nh);
        let ncc = (source.security.ncc + 1) & 0x07;
        let erabs: Vec<ErabSetupItem> = source
            .bearers
            .erabs()
            .map(|e| ErabSetupItem {
                erab_id: e.erab_id,
                qci: e.qci,
                transport_address: e.transport_address,
                ul_teid: e.ul_teid,
            })
            .collect();

        self.handovers.insert(
            amf_ue_id,
            MockHandover { amf_ue_id, source: (gnb_id, ue_id), target: None, target_cell: target, nh, ncc },
        );

        let Some(target_gnb) = self.gnbs.get_mut(&target.gnb_id) else {
            warn!("No gNB {:#x} connected for {}", target.gnb_id, target);
            self.handovers.remove(&amf_ue_id);
            let cause = HandoverCause::NoRadioResourcesAvailable;
            self.events.push(MockAmfEvent::PreparationFailed { amf_ue_id, cause });
            self.deliver_logged(gnb_id, ue_id, HandoverEvent::HandoverPreparationFailure { cause });
            return;
        };

        let request = HandoverRequest {
            amf_ue_id,
            target_cell: target,
            cause: HandoverCause::HandoverDesirableForRadioReasons,
            erabs,
            security: ForwardedSecurityContext { nh, ncc },
            container,
        };
        self.events.push(MockAmfEvent::HandoverRequestSent { amf_ue_id, target_gnb: target.gnb_id, ncc });
        match target_gnb.manager.handle_handover_request(request) {
            Ok((target_ue, transition)) => {
                self.events.push(MockAmfEvent::Delivered {
                    gnb_id: target.gnb_id,
                    ue_id: target_ue,
                    event: "HandoverRequest",
                    transition,
                });
            }
            Err(e) => debug!("Target gNB {:#x} refused AMF UE {}: {}", target.gnb_id, amf_ue_id, e),
        }
    }
}
