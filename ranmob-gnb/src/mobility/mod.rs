//! Mobility (handover) module for gNB
//!
//! This module moves an active UE from one cell to another, within this gNB
//! or towards a neighbor gNB through the core network, without losing its
//! bearers, keys or in-flight PDCP state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Mobility Task                           │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  Mobility Manager                       │  │
//! │  │   UE context + HandoverFsm per UE                       │  │
//! │  │                                                         │  │
//! │  │   evaluator ──► fsm ──► security / bearer_transfer      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!        │              │               │              │
//!        ▼              ▼               ▼              ▼
//!   NgapGateway      UeLink         Scheduler      BearerPlane
//!    (N2/AMF)        (Uu)          (MAC entries)    (PDCP/RLC)
//! ```
//!
//! # Handover State Machine
//!
//! ```text
//!                         ┌──────────┐
//!         ┌───────────────│   Idle   │───────────────┐
//!         │ decision      └────┬─────┘   handover    │
//!         │ (inter)            │ decision   request  │
//!         ▼                    │ (intra)             ▼
//!  ┌─────────────┐             ▼              ┌─────────────┐
//!  │ Source/     │      ┌─────────────┐       │ Target/     │
//!  │ WaitCommand │      │ Intra/      │       │ WaitComplete│
//!  └──────┬──────┘      │ WaitIdentity│       └─────────────┘
//!         │ command     └──────┬──────┘
//!         ▼                    │ C-RNTI
//!  ┌─────────────┐             ▼
//!  │ Source/     │      ┌─────────────┐
//!  │ StatusXfer  │      │ Intra/      │
//!  └─────────────┘      │ WaitComplete│
//!                       └─────────────┘
//! ```
//!
//! Every non-idle state leaves back to `Idle` on success, failure, cancel or
//! release.

pub mod bearer_transfer;
pub mod channel;
pub mod evaluator;
pub mod fsm;
pub mod local;
pub mod manager;
pub mod ports;
pub mod security;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use bearer_transfer::{ApplyReport, BearerCounterRecord, PdcpBearerState, SkipReason};
pub use channel::{ChannelNgapGateway, ChannelUeLink, NgapOutbound, UeDelivery};
pub use evaluator::{evaluate, HandoverDecision, HandoverKind};
pub use fsm::{
    HandoverEvent, HandoverFsm, HandoverState, HandoverTransaction, IntraPhase, MobilityEnv, Outcome,
    SourcePhase, TargetPhase, Transition,
};
pub use local::{LocalBearerPlane, LocalScheduler, UeAssociation};
pub use manager::{MobilityManager, UeRegistration};
pub use ports::{
    AdmittedErab, BearerPlane, ErabSetupItem, ForwardedSecurityContext, Gateways, HandoverCause,
    HandoverRequest, HandoverRequestAck, NgapGateway, Scheduler, UeLink,
};
pub use security::{compute_short_mac_i, derive_as_keys, derive_horizontal, derive_vertical, AsKeys};
pub use task::{MobilityMessage, MobilityTask, TransitionReport};
