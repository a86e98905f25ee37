//! Scenario files for replaying UE activity against one gNB
//!
//! A scenario lists the UEs to register and a sequence of steps. Each step
//! becomes one [`HandoverEvent`] for a registered UE, or a pause.
//!
//! ```yaml
//! ues:
//!   - c_rnti: 0x4601
//!     cell_id: 1
//!     k_gnb: "1111111111111111111111111111111111111111111111111111111111111111"
//!     erabs:
//!       - { erab_id: 5, qci: 9, transport_address: 10.0.0.1, ul_teid: 16 }
//! steps:
//!   - { event: measurement_report, ue: 0, serving_rsrp: 20, neighbors: [[6, 30]] }
//!   - { event: crnti_update, ue: 0, temp_crnti: 0x4602, crnti: 0x4602 }
//!   - { event: wait, ms: 50 }
//!   - { event: reconfiguration_complete, ue: 0, transaction_id: 0 }
//! ```

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use ranmob_common::{CRnti, GnbConfig};
use ranmob_crypto::{CipheringAlgorithm, IntegrityAlgorithm};
use ranmob_rrc::{MeasurementReport, SecurityAlgorithmConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::mobility::fsm::HandoverEvent;
use crate::mobility::manager::UeRegistration;
use crate::mobility::ports::{ErabSetupItem, HandoverCause};
use crate::ue_context::{default_capabilities, UeSecurityContext};

const CAUSES: [HandoverCause; 7] = [
    HandoverCause::HandoverDesirableForRadioReasons,
    HandoverCause::HandoverCancelled,
    HandoverCause::TxnRelocOverallExpiry,
    HandoverCause::NoRadioResourcesAvailable,
    HandoverCause::InvalidContainer,
    HandoverCause::NotSupported,
    HandoverCause::Unspecified,
];

/// Errors raised while loading a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse scenario: {0}")]
    ParseError(String),

    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioErab {
    pub erab_id: u8,
    #[serde(default = "default_qci")]
    pub qci: u8,
    pub transport_address: IpAddr,
    pub ul_teid: u32,
}

fn default_qci() -> u8 {
    9
}

fn default_ncc() -> u8 {
    1
}

fn default_nea() -> u8 {
    2
}

fn default_true() -> bool {
    true
}

/// A UE registered before the steps run.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioUe {
    pub c_rnti: CRnti,
    pub cell_id: u8,
    /// KgNB, 64 hex digits
    pub k_gnb: String,
    /// Next-hop key, defaults to KgNB
    #[serde(default)]
    pub nh: Option<String>,
    #[serde(default = "default_ncc")]
    pub ncc: u8,
    #[serde(default = "default_nea")]
    pub ciphering: u8,
    #[serde(default = "default_nea")]
    pub integrity: u8,
    #[serde(default)]
    pub erabs: Vec<ScenarioErab>,
    /// Whether the UE already reported its capabilities
    #[serde(default = "default_true")]
    pub capabilities: bool,
}

impl ScenarioUe {
    pub fn to_registration(&self, config: &GnbConfig) -> Result<UeRegistration, ScenarioError> {
        let kgnb = parse_key(&self.k_gnb)?;
        let nh = match &self.nh {
            Some(nh) => parse_key(nh)?,
            None => kgnb,
        };
        let algorithms = SecurityAlgorithmConfig {
            ciphering: CipheringAlgorithm::from_id(self.ciphering)
                .map_err(|e| ScenarioError::Invalid(e.to_string()))?,
            integrity: IntegrityAlgorithm::from_id(self.integrity)
                .map_err(|e| ScenarioError::Invalid(e.to_string()))?,
        };

        let cell = config.cell(self.cell_id).map_err(|e| ScenarioError::Invalid(e.to_string()))?;

        Ok(UeRegistration {
            c_rnti: self.c_rnti,
            cell: config.global_cell_id(cell.cell_id),
            security: UeSecurityContext::new(kgnb, nh, self.ncc, algorithms),
            erabs: self
                .erabs
                .iter()
                .map(|e| ErabSetupItem {
                    erab_id: e.erab_id,
                    qci: e.qci,
                    transport_address: e.transport_address,
                    ul_teid: e.ul_teid,
                })
                .collect(),
            capabilities: if self.capabilities { default_capabilities() } else { vec![] },
        })
    }
}

/// One scenario step. `ue` indexes the scenario's UE list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScenarioStep {
    MeasurementReport {
        ue: usize,
        #[serde(default = "default_ncc")]
        meas_id: u8,
        serving_rsrp: u8,
        /// `[pci, rsrp]` pairs, strongest first
        neighbors: Vec<(u16, u8)>,
    },
    /// HandoverCommand container from the core network, hex encoded
    HandoverCommand { ue: usize, container: String },
    PreparationFailure {
        ue: usize,
        #[serde(default)]
        cause: Option<String>,
    },
    CrntiUpdate { ue: usize, temp_crnti: CRnti, crnti: CRnti },
    ReconfigurationComplete { ue: usize, transaction_id: u8 },
    Cancel {
        ue: usize,
        #[serde(default)]
        cause: Option<String>,
    },
    Release { ue: usize },
    Wait { ms: u64 },
}

impl ScenarioStep {
    /// Pause requested by the step, if any.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            ScenarioStep::Wait { ms } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// The UE index and event the step delivers, `None` for a pause.
    pub fn to_event(&self) -> Result<Option<(usize, HandoverEvent)>, ScenarioError> {
        let step = match self {
            ScenarioStep::MeasurementReport { ue, meas_id, serving_rsrp, neighbors } => (
                *ue,
                HandoverEvent::MeasurementReport(MeasurementReport::nr(*meas_id, *serving_rsrp, neighbors)),
            ),
            ScenarioStep::HandoverCommand { ue, container } => {
                let container = hex::decode(container.trim())
                    .map_err(|e| ScenarioError::Invalid(format!("container: {e}")))?;
                (*ue, HandoverEvent::HandoverCommand { container: Bytes::from(container) })
            }
            ScenarioStep::PreparationFailure { ue, cause } => (
                *ue,
                HandoverEvent::HandoverPreparationFailure { cause: parse_cause(cause.as_deref())? },
            ),
            ScenarioStep::CrntiUpdate { ue, temp_crnti, crnti } => (
                *ue,
                HandoverEvent::CrntiUpdate { temp_crnti: *temp_crnti, crnti: *crnti },
            ),
            ScenarioStep::ReconfigurationComplete { ue, transaction_id } => (
                *ue,
                HandoverEvent::ReconfigurationComplete { transaction_id: *transaction_id },
            ),
            ScenarioStep::Cancel { ue, cause } => {
                (*ue, HandoverEvent::Cancel { cause: parse_cause(cause.as_deref())? })
            }
            ScenarioStep::Release { ue } => (*ue, HandoverEvent::UeContextRelease),
            ScenarioStep::Wait { .. } => return Ok(None),
        };
        Ok(Some(step))
    }

    fn ue(&self) -> Option<usize> {
        match self {
            ScenarioStep::MeasurementReport { ue, .. }
            | ScenarioStep::HandoverCommand { ue, .. }
            | ScenarioStep::PreparationFailure { ue, .. }
            | ScenarioStep::CrntiUpdate { ue, .. }
            | ScenarioStep::ReconfigurationComplete { ue, .. }
            | ScenarioStep::Cancel { ue, .. }
            | ScenarioStep::Release { ue } => Some(*ue),
            ScenarioStep::Wait { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub ues: Vec<ScenarioUe>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario =
            serde_yaml::from_str(yaml).map_err(|e| ScenarioError::ParseError(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        for (i, step) in self.steps.iter().enumerate() {
            if let Some(ue) = step.ue() {
                if ue >= self.ues.len() {
                    return Err(ScenarioError::Invalid(format!(
                        "step {i} refers to UE {ue}, only {} declared",
                        self.ues.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario, ScenarioError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Scenario::from_yaml(&contents)
}

fn parse_key(text: &str) -> Result<[u8; 32], ScenarioError> {
    let bytes = hex::decode(text.trim()).map_err(|e| ScenarioError::Invalid(format!("key: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ScenarioError::Invalid(format!("key is {} bytes, expected 32", b.len())))
}

fn parse_cause(text: Option<&str>) -> Result<HandoverCause, ScenarioError> {
    let Some(text) = text else {
        return Ok(HandoverCause::Unspecified);
    };
    CAUSES
        .into_iter()
        .find(|c| c.to_string() == text)
        .ok_or_else(|| ScenarioError::Invalid(format!("unknown cause {text}")))
}
