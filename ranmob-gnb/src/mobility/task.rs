//! Mobility Task Implementation
//!
//! Hosts the [`MobilityManager`] of one gNB. Every UE event is processed in
//! arrival order; a periodic check cancels transactions that outlived T304.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use ranmob_common::UeId;

use crate::error::HandoverError;
use crate::mobility::fsm::{HandoverEvent, HandoverState, Transition};
use crate::mobility::manager::{MobilityManager, UeRegistration};
use crate::mobility::ports::{HandoverCause, HandoverRequest};
use crate::tasks::{Task, TaskMessage};

/// Default period of the stalled-transaction check (ms)
pub const STALL_CHECK_INTERVAL_MS: u64 = 500;

/// Messages for the mobility task.
#[derive(Debug)]
pub enum MobilityMessage {
    /// A UE finished registration
    RegisterUe {
        registration: UeRegistration,
        reply: Option<oneshot::Sender<Result<UeId, HandoverError>>>,
    },
    /// Event for an existing UE context
    Event { ue_id: UeId, event: HandoverEvent },
    /// Incoming handover from the core network
    HandoverRequest(HandoverRequest),
    ReleaseUe { ue_id: UeId },
    /// Cancel transactions older than T304 now
    CheckStalled,
    GetUeState {
        ue_id: UeId,
        reply: oneshot::Sender<Option<HandoverState>>,
    },
}

/// One processed event, as published to an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub ue_id: UeId,
    pub event: &'static str,
    pub transition: Transition,
}

/// Mobility task for one gNB
pub struct MobilityTask {
    manager: MobilityManager,
    stall_check_interval: Duration,
    observer: Option<mpsc::Sender<TransitionReport>>,
}

impl MobilityTask {
    pub fn new(manager: MobilityManager) -> Self {
        Self {
            manager,
            stall_check_interval: Duration::from_millis(STALL_CHECK_INTERVAL_MS),
            observer: None,
        }
    }

    pub fn with_stall_check_interval(mut self, period: Duration) -> Self {
        self.stall_check_interval = period;
        self
    }

    /// Publishes every transition on `tx`. Reports are dropped when the
    /// observer falls behind.
    pub fn with_observer(mut self, tx: mpsc::Sender<TransitionReport>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn manager(&self) -> &MobilityManager {
        &self.manager
    }

    fn publish(&self, ue_id: UeId, event: &'static str, transition: Transition) {
        if let Some(tx) = &self.observer {
            if let Err(e) = tx.try_send(TransitionReport { ue_id, event, transition }) {
                debug!("Transition report for UE[{}] dropped: {}", ue_id, e);
            }
        }
    }

    fn handle_event(&mut self, ue_id: UeId, event: HandoverEvent) {
        let name = event.name();
        match self.manager.handle_event(ue_id, event) {
            Ok(transition) => self.publish(ue_id, name, transition),
            Err(e) => warn!("UE[{}] {} dropped: {}", ue_id, name, e),
        }
    }

    fn handle_message(&mut self, msg: MobilityMessage) {
        match msg {
            MobilityMessage::RegisterUe { registration, reply } => {
                let result = self.manager.register_ue(registration);
                if let Err(e) = &result {
                    error!("UE registration failed: {}", e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            MobilityMessage::Event { ue_id, event } => self.handle_event(ue_id, event),
            MobilityMessage::HandoverRequest(request) => {
                let amf_ue_id = request.amf_ue_id;
                match self.manager.handle_handover_request(request) {
                    Ok((ue_id, transition)) => self.publish(ue_id, "HandoverRequest", transition),
                    Err(e) => warn!("Handover request (AMF UE {}) rejected: {}", amf_ue_id, e),
                }
            }
            MobilityMessage::ReleaseUe { ue_id } => {
                if self.manager.release_ue(ue_id).is_none() {
                    debug!("UE[{}] release: no idle context", ue_id);
                }
            }
            MobilityMessage::CheckStalled => self.cancel_stalled(),
            MobilityMessage::GetUeState { ue_id, reply } => {
                let _ = reply.send(self.manager.state(ue_id));
            }
        }
    }

    fn cancel_stalled(&mut self) {
        for ue_id in self.manager.stalled_transactions(Instant::now()) {
            warn!("UE[{}] handover exceeded T304, cancelling", ue_id);
            self.handle_event(
                ue_id,
                HandoverEvent::Cancel {
                    cause: HandoverCause::TxnRelocOverallExpiry,
                },
            );
        }
    }
}

#[async_trait::async_trait]
impl Task for MobilityTask {
    const NAME: &'static str = "mobility";
    type Message = MobilityMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!("Mobility task started with {} cell(s)", self.manager.cells().cells().len());

        let mut stall_timer = interval(self.stall_check_interval);

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(TaskMessage::Message(msg)) => self.handle_message(msg),
                        Some(TaskMessage::Shutdown) => {
                            info!("Mobility task received shutdown signal");
                            break;
                        }
                        None => {
                            info!("Mobility task channel closed");
                            break;
                        }
                    }
                }
                _ = stall_timer.tick() => self.cancel_stalled(),
            }
        }

        info!("Mobility task stopped with {} UE contexts", self.manager.ue_count());
    }
}
