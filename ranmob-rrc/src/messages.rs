//! RRC message value types used by the handover procedures
//!
//! These are plain schema types: they carry the fields the mobility
//! procedures read and write and say nothing about bit-level packing, which
//! is the job of an [`RrcCodec`](crate::codec::RrcCodec).

use bytes::Bytes;
use ranmob_crypto::{CipheringAlgorithm, IntegrityAlgorithm};

/// Radio access technology of a capability container or measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RatType {
    Nr = 0,
    Eutra = 1,
}

impl RatType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Nr),
            1 => Some(Self::Eutra),
            _ => None,
        }
    }
}

/// One neighbor entry of a measurement report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborMeasurement {
    pub pci: u16,
    /// RSRP range value (0..=127)
    pub rsrp: u8,
}

/// Measurement report as received from the UE.
///
/// Neighbors are listed in the order the UE reported them, strongest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementReport {
    pub meas_id: u8,
    pub serving_rsrp: u8,
    pub rat: RatType,
    pub neighbors: Vec<NeighborMeasurement>,
}

impl MeasurementReport {
    /// NR report with the given `(pci, rsrp)` neighbors.
    pub fn nr(meas_id: u8, serving_rsrp: u8, neighbors: &[(u16, u8)]) -> Self {
        Self {
            meas_id,
            serving_rsrp,
            rat: RatType::Nr,
            neighbors: neighbors
                .iter()
                .map(|&(pci, rsrp)| NeighborMeasurement { pci, rsrp })
                .collect(),
        }
    }
}

/// RAT-tagged UE capability container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeCapabilityRatContainer {
    pub rat: RatType,
    pub container: Bytes,
}

/// Negotiated AS security algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityAlgorithmConfig {
    pub ciphering: CipheringAlgorithm,
    pub integrity: IntegrityAlgorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrbToAddMod {
    pub srb_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrbToAddMod {
    pub drb_id: u8,
    /// Core-network E-RAB this DRB carries
    pub erab_id: u8,
    pub lcid: u8,
}

/// Radio bearer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RadioBearerConfig {
    pub srbs: Vec<SrbToAddMod>,
    pub drbs: Vec<DrbToAddMod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasObjectConfig {
    pub meas_object_id: u8,
    pub arfcn: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasIdConfig {
    pub meas_id: u8,
    pub meas_object_id: u8,
}

/// Measurement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasConfig {
    pub meas_objects: Vec<MeasObjectConfig>,
    pub meas_ids: Vec<MeasIdConfig>,
}

impl MeasConfig {
    pub fn has_meas_id(&self, meas_id: u8) -> bool {
        self.meas_ids.iter().any(|m| m.meas_id == meas_id)
    }
}

/// Information the target needs to validate a later reestablishment request
/// that references this handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReestablishmentInfo {
    pub source_pci: u16,
    pub target_cell_short_mac_i: u16,
}

/// Source-side AS configuration forwarded to the target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsConfig {
    pub source_rb_config: RadioBearerConfig,
    pub source_meas_config: MeasConfig,
    pub source_security: SecurityAlgorithmConfig,
    pub source_c_rnti: u16,
    pub source_dl_arfcn: u32,
}

/// Release 8 body of the handover preparation information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandoverPreparationInfoR8 {
    pub ue_capabilities: Vec<UeCapabilityRatContainer>,
    pub as_config: AsConfig,
    pub reestablishment_info: Option<ReestablishmentInfo>,
}

/// HandoverPreparationInformation, the source-to-target transparent container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoverPreparationInfo {
    R8(HandoverPreparationInfoR8),
    /// A critical extension this node does not understand
    Future { revision: u8 },
}

/// HandoverCommand, the target-to-source transparent container wrapping an
/// encoded DL-DCCH message for the UE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoverCommand {
    R8 { dl_dcch: Bytes },
    Future { revision: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobilityControlInfo {
    pub target_pci: u16,
    /// C-RNTI the UE uses on the target cell
    pub new_ue_identity: u16,
    pub t304_ms: u32,
    /// Present only when the target carrier differs from the source
    pub carrier_freq: Option<u32>,
}

/// Security configuration for handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfigHo {
    pub key_change_indicator: bool,
    pub next_hop_chaining_count: u8,
    /// Set when the target selects algorithms (inter-gNB)
    pub algorithms: Option<SecurityAlgorithmConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RrcReconfiguration {
    /// RRC transaction identifier (0..=3)
    pub transaction_id: u8,
    pub mobility_control_info: Option<MobilityControlInfo>,
    pub security_config_ho: Option<SecurityConfigHo>,
    pub radio_bearer_config: Option<RadioBearerConfig>,
    pub meas_config: Option<MeasConfig>,
}

/// Downlink DCCH message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DlDcchMessage {
    RrcReconfiguration(RrcReconfiguration),
    RrcRelease { transaction_id: u8 },
}

impl DlDcchMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RrcReconfiguration(_) => "RRCReconfiguration",
            Self::RrcRelease { .. } => "RRCRelease",
        }
    }
}

/// VarShortMAC-Input: the fixed-layout input of the short MAC-I.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarShortMacInput {
    /// 28-bit cell identity of the source cell
    pub cell_identity: u32,
    pub phys_cell_id: u16,
    pub c_rnti: u16,
}

impl VarShortMacInput {
    pub const ENCODED_SIZE: usize = 8;

    /// Encodes the input: cell identity as a 28-bit string left-aligned in
    /// four octets, then PCI and C-RNTI as two octets each.
    pub fn encode(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut out = [0u8; Self::ENCODED_SIZE];
        out[..4].copy_from_slice(&((self.cell_identity & 0x0FFF_FFFF) << 4).to_be_bytes());
        out[4..6].copy_from_slice(&self.phys_cell_id.to_be_bytes());
        out[6..].copy_from_slice(&self.c_rnti.to_be_bytes());
        out
    }
}
