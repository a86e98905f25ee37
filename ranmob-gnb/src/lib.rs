//! ranmob-gnb - gNB handover orchestration
#![allow(missing_docs)]
//!
//! This crate moves connected UEs between cells while keeping their bearers,
//! security context and PDCP counters intact. It covers:
//!
//! - Measurement report evaluation and target selection
//! - Horizontal and vertical KgNB derivation, short MAC-I computation
//! - PDCP bearer state capture and application (status transfer)
//! - The per-UE handover state machine for intra-gNB handover and for both
//!   sides of an inter-gNB (N2) handover
//!
//! # Architecture
//!
//! The mobility procedures run inside one actor-style task per gNB that
//! owns every UE context. Collaborators (core network, UE link, MAC
//! scheduler, PDCP/RLC) sit behind gateway traits so they can be real
//! protocol stacks, channels or test doubles.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                    gNB                       │
//! │  ┌──────────────┐        ┌──────────────┐   │
//! │  │     App      │───────►│   Mobility   │   │
//! │  │ (config/ops) │        │     Task     │   │
//! │  └──────────────┘        └──────┬───────┘   │
//! │                                 │           │
//! │            ┌──────────┬─────────┼─────────┐ │
//! │            ▼          ▼         ▼         ▼ │
//! │         NgapGw     UeLink   Scheduler  Bearers
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Configuration Loading
//!
//! ```rust,ignore
//! use ranmob_gnb::app::{load_gnb_config, validate_gnb_config};
//!
//! let config = load_gnb_config("config/gnb.yaml")?;
//! validate_gnb_config(&config)?;
//! ```

pub mod app;
pub mod cells;
pub mod error;
pub mod mobility;
pub mod tasks;
pub mod ue_context;

pub use app::{
    load_and_validate_gnb_config, load_gnb_config, load_gnb_config_from_str, load_scenario,
    validate_gnb_config, ConfigError, ConfigValidationError, Scenario, ScenarioError, ScenarioStep,
};
pub use cells::{CellInfo, CellRegistry, StaticCellRegistry};
pub use error::{GatewayError, HandoverError};
pub use mobility::{
    ChannelNgapGateway, ChannelUeLink, Gateways, HandoverEvent, HandoverState, LocalBearerPlane,
    LocalScheduler, MobilityManager, MobilityMessage, MobilityTask, NgapOutbound, Outcome,
    TransitionReport, UeDelivery, UeRegistration,
};
pub use tasks::{spawn_task, Task, TaskError, TaskHandle, TaskMessage, DEFAULT_CHANNEL_CAPACITY};
pub use ue_context::{RrcState, UeMobilityContext, UeSecurityContext};
