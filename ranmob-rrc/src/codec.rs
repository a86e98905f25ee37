//! RRC encode/decode boundary
//!
//! [`RrcCodec`] is the service the handover procedures use for every payload
//! that crosses the gNB-to-gNB or gNB-to-UE boundary. [`BinaryRrcCodec`] is
//! a compact length-prefixed binary encoding of the schema types in
//! [`crate::messages`]. It is not ASN.1 PER, but it is strict: any truncated,
//! unknown or trailing input is a decode error.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ranmob_crypto::{CipheringAlgorithm, IntegrityAlgorithm};
use thiserror::Error;

use crate::messages::*;

/// RRC codec error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RrcCodecError {
    /// Error during encoding
    #[error("RRC encoding error: {0}")]
    EncodeError(String),

    /// Error during decoding
    #[error("RRC decoding error: {0}")]
    DecodeError(String),
}

/// Encode/decode service for the handover containers.
pub trait RrcCodec: Send + Sync {
    fn encode_handover_preparation_info(
        &self,
        msg: &HandoverPreparationInfo,
    ) -> Result<Bytes, RrcCodecError>;

    fn decode_handover_preparation_info(
        &self,
        data: &[u8],
    ) -> Result<HandoverPreparationInfo, RrcCodecError>;

    fn encode_handover_command(&self, msg: &HandoverCommand) -> Result<Bytes, RrcCodecError>;

    fn decode_handover_command(&self, data: &[u8]) -> Result<HandoverCommand, RrcCodecError>;

    fn encode_dl_dcch(&self, msg: &DlDcchMessage) -> Result<Bytes, RrcCodecError>;

    fn decode_dl_dcch(&self, data: &[u8]) -> Result<DlDcchMessage, RrcCodecError>;
}

const TAG_HANDOVER_PREPARATION_INFO: u8 = 0x01;
const TAG_HANDOVER_COMMAND: u8 = 0x02;
const TAG_DL_DCCH: u8 = 0x03;

const REVISION_R8: u8 = 0;

const DL_DCCH_RRC_RECONFIGURATION: u8 = 0;
const DL_DCCH_RRC_RELEASE: u8 = 1;

/// Reference binary codec.
///
/// Layout: one message tag octet, then the body. Lists carry a one-octet
/// count, opaque containers a two-octet length, optional fields a presence
/// octet. All integers are big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryRrcCodec;

impl BinaryRrcCodec {
    pub fn new() -> Self {
        Self
    }
}

impl RrcCodec for BinaryRrcCodec {
    fn encode_handover_preparation_info(
        &self,
        msg: &HandoverPreparationInfo,
    ) -> Result<Bytes, RrcCodecError> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(TAG_HANDOVER_PREPARATION_INFO);
        match msg {
            HandoverPreparationInfo::R8(body) => {
                buf.put_u8(REVISION_R8);
                put_count(&mut buf, body.ue_capabilities.len(), "ue-CapabilityRAT-ContainerList")?;
                for cap in &body.ue_capabilities {
                    buf.put_u8(cap.rat as u8);
                    put_container(&mut buf, &cap.container)?;
                }
                put_as_config(&mut buf, &body.as_config)?;
                put_option(&mut buf, body.reestablishment_info.as_ref(), |buf, info| {
                    buf.put_u16(info.source_pci);
                    buf.put_u16(info.target_cell_short_mac_i);
                    Ok(())
                })?;
            }
            HandoverPreparationInfo::Future { revision } => put_future_revision(&mut buf, *revision)?,
        }
        Ok(buf.freeze())
    }

    fn decode_handover_preparation_info(
        &self,
        data: &[u8],
    ) -> Result<HandoverPreparationInfo, RrcCodecError> {
        let mut buf = data;
        expect_tag(&mut buf, TAG_HANDOVER_PREPARATION_INFO, "HandoverPreparationInformation")?;

        let revision = get_u8(&mut buf)?;
        let msg = if revision == REVISION_R8 {
            let cap_count = get_u8(&mut buf)?;
            let mut ue_capabilities = Vec::with_capacity(cap_count as usize);
            for _ in 0..cap_count {
                let rat_raw = get_u8(&mut buf)?;
                let rat = RatType::from_u8(rat_raw)
                    .ok_or_else(|| decode_error(format!("invalid RAT type {rat_raw}")))?;
                let container = get_container(&mut buf)?;
                ue_capabilities.push(UeCapabilityRatContainer { rat, container });
            }
            let as_config = get_as_config(&mut buf)?;
            let reestablishment_info = get_option(&mut buf, |buf| {
                Ok(ReestablishmentInfo {
                    source_pci: get_u16(buf)?,
                    target_cell_short_mac_i: get_u16(buf)?,
                })
            })?;
            HandoverPreparationInfo::R8(HandoverPreparationInfoR8 {
                ue_capabilities,
                as_config,
                reestablishment_info,
            })
        } else {
            HandoverPreparationInfo::Future { revision }
        };

        expect_end(buf)?;
        Ok(msg)
    }

    fn encode_handover_command(&self, msg: &HandoverCommand) -> Result<Bytes, RrcCodecError> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(TAG_HANDOVER_COMMAND);
        match msg {
            HandoverCommand::R8 { dl_dcch } => {
                buf.put_u8(REVISION_R8);
                put_container(&mut buf, dl_dcch)?;
            }
            HandoverCommand::Future { revision } => put_future_revision(&mut buf, *revision)?,
        }
        Ok(buf.freeze())
    }

    fn decode_handover_command(&self, data: &[u8]) -> Result<HandoverCommand, RrcCodecError> {
        let mut buf = data;
        expect_tag(&mut buf, TAG_HANDOVER_COMMAND, "HandoverCommand")?;

        let revision = get_u8(&mut buf)?;
        let msg = if revision == REVISION_R8 {
            HandoverCommand::R8 {
                dl_dcch: get_container(&mut buf)?,
            }
        } else {
            HandoverCommand::Future { revision }
        };

        expect_end(buf)?;
        Ok(msg)
    }

    fn encode_dl_dcch(&self, msg: &DlDcchMessage) -> Result<Bytes, RrcCodecError> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(TAG_DL_DCCH);
        match msg {
            DlDcchMessage::RrcReconfiguration(reconfig) => {
                buf.put_u8(DL_DCCH_RRC_RECONFIGURATION);
                put_rrc_reconfiguration(&mut buf, reconfig)?;
            }
            DlDcchMessage::RrcRelease { transaction_id } => {
                buf.put_u8(DL_DCCH_RRC_RELEASE);
                buf.put_u8(*transaction_id);
            }
        }
        Ok(buf.freeze())
    }

    fn decode_dl_dcch(&self, data: &[u8]) -> Result<DlDcchMessage, RrcCodecError> {
        let mut buf = data;
        expect_tag(&mut buf, TAG_DL_DCCH, "DL-DCCH-Message")?;

        let msg = match get_u8(&mut buf)? {
            DL_DCCH_RRC_RECONFIGURATION => {
                DlDcchMessage::RrcReconfiguration(get_rrc_reconfiguration(&mut buf)?)
            }
            DL_DCCH_RRC_RELEASE => DlDcchMessage::RrcRelease {
                transaction_id: get_u8(&mut buf)?,
            },
            other => return Err(decode_error(format!("unknown DL-DCCH message type {other}"))),
        };

        expect_end(buf)?;
        Ok(msg)
    }
}

fn decode_error(msg: impl Into<String>) -> RrcCodecError {
    RrcCodecError::DecodeError(msg.into())
}

fn put_future_revision(buf: &mut BytesMut, revision: u8) -> Result<(), RrcCodecError> {
    if revision == REVISION_R8 {
        return Err(RrcCodecError::EncodeError(
            "future critical extension cannot use the r8 revision".to_string(),
        ));
    }
    buf.put_u8(revision);
    Ok(())
}

fn put_count(buf: &mut BytesMut, len: usize, what: &str) -> Result<(), RrcCodecError> {
    let count = u8::try_from(len)
        .map_err(|_| RrcCodecError::EncodeError(format!("{what}: too many entries ({len})")))?;
    buf.put_u8(count);
    Ok(())
}

fn put_container(buf: &mut BytesMut, data: &[u8]) -> Result<(), RrcCodecError> {
    let len = u16::try_from(data.len()).map_err(|_| {
        RrcCodecError::EncodeError(format!("container too large ({} bytes)", data.len()))
    })?;
    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

fn put_option<T>(
    buf: &mut BytesMut,
    value: Option<&T>,
    put: impl FnOnce(&mut BytesMut, &T) -> Result<(), RrcCodecError>,
) -> Result<(), RrcCodecError> {
    match value {
        Some(v) => {
            buf.put_u8(1);
            put(buf, v)
        }
        None => {
            buf.put_u8(0);
            Ok(())
        }
    }
}

fn put_security_algorithms(buf: &mut BytesMut, algorithms: &SecurityAlgorithmConfig) {
    buf.put_u8((algorithms.ciphering.id() << 4) | algorithms.integrity.id());
}

fn put_rb_config(buf: &mut BytesMut, config: &RadioBearerConfig) -> Result<(), RrcCodecError> {
    put_count(buf, config.srbs.len(), "srb-ToAddModList")?;
    for srb in &config.srbs {
        buf.put_u8(srb.srb_id);
    }
    put_count(buf, config.drbs.len(), "drb-ToAddModList")?;
    for drb in &config.drbs {
        buf.put_u8(drb.drb_id);
        buf.put_u8(drb.erab_id);
        buf.put_u8(drb.lcid);
    }
    Ok(())
}

fn put_meas_config(buf: &mut BytesMut, config: &MeasConfig) -> Result<(), RrcCodecError> {
    put_count(buf, config.meas_objects.len(), "measObjectToAddModList")?;
    for obj in &config.meas_objects {
        buf.put_u8(obj.meas_object_id);
        buf.put_u32(obj.arfcn);
    }
    put_count(buf, config.meas_ids.len(), "measIdToAddModList")?;
    for id in &config.meas_ids {
        buf.put_u8(id.meas_id);
        buf.put_u8(id.meas_object_id);
    }
    Ok(())
}

fn put_as_config(buf: &mut BytesMut, config: &AsConfig) -> Result<(), RrcCodecError> {
    put_rb_config(buf, &config.source_rb_config)?;
    put_meas_config(buf, &config.source_meas_config)?;
    put_security_algorithms(buf, &config.source_security);
    buf.put_u16(config.source_c_rnti);
    buf.put_u32(config.source_dl_arfcn);
    Ok(())
}

fn put_rrc_reconfiguration(buf: &mut BytesMut, msg: &RrcReconfiguration) -> Result<(), RrcCodecError> {
    if msg.transaction_id > 3 {
        return Err(RrcCodecError::EncodeError(format!(
            "rrc-TransactionIdentifier out of range: {}",
            msg.transaction_id
        )));
    }
    buf.put_u8(msg.transaction_id);

    put_option(buf, msg.mobility_control_info.as_ref(), |buf, info| {
        buf.put_u16(info.target_pci);
        buf.put_u16(info.new_ue_identity);
        buf.put_u32(info.t304_ms);
        put_option(buf, info.carrier_freq.as_ref(), |buf, freq| {
            buf.put_u32(*freq);
            Ok(())
        })
    })?;
    put_option(buf, msg.security_config_ho.as_ref(), |buf, sec| {
        buf.put_u8(sec.key_change_indicator as u8);
        buf.put_u8(sec.next_hop_chaining_count);
        put_option(buf, sec.algorithms.as_ref(), |buf, alg| {
            put_security_algorithms(buf, alg);
            Ok(())
        })
    })?;
    put_option(buf, msg.radio_bearer_config.as_ref(), put_rb_config)?;
    put_option(buf, msg.meas_config.as_ref(), put_meas_config)
}

fn ensure_remaining(buf: &[u8], needed: usize) -> Result<(), RrcCodecError> {
    if buf.remaining() < needed {
        return Err(decode_error(format!(
            "buffer too short: need {needed} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_u8(buf: &mut &[u8]) -> Result<u8, RrcCodecError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Result<u16, RrcCodecError> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32, RrcCodecError> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_bool(buf: &mut &[u8]) -> Result<bool, RrcCodecError> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(decode_error(format!("invalid boolean {other}"))),
    }
}

fn get_container(buf: &mut &[u8]) -> Result<Bytes, RrcCodecError> {
    let len = get_u16(buf)? as usize;
    ensure_remaining(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

fn get_option<T>(
    buf: &mut &[u8],
    get: impl FnOnce(&mut &[u8]) -> Result<T, RrcCodecError>,
) -> Result<Option<T>, RrcCodecError> {
    if get_bool(buf)? {
        get(buf).map(Some)
    } else {
        Ok(None)
    }
}

fn expect_tag(buf: &mut &[u8], tag: u8, name: &str) -> Result<(), RrcCodecError> {
    let actual = get_u8(buf)?;
    if actual != tag {
        return Err(decode_error(format!("expected {name} (tag {tag:#04x}), got tag {actual:#04x}")));
    }
    Ok(())
}

fn expect_end(buf: &[u8]) -> Result<(), RrcCodecError> {
    if buf.has_remaining() {
        return Err(decode_error(format!("{} trailing bytes", buf.remaining())));
    }
    Ok(())
}

fn get_security_algorithms(buf: &mut &[u8]) -> Result<SecurityAlgorithmConfig, RrcCodecError> {
    let octet = get_u8(buf)?;
    let ciphering = CipheringAlgorithm::from_id(octet >> 4)
        .map_err(|e| decode_error(format!("cipheringAlgorithm: {e}")))?;
    let integrity = IntegrityAlgorithm::from_id(octet & 0x0F)
        .map_err(|e| decode_error(format!("integrityProtAlgorithm: {e}")))?;
    Ok(SecurityAlgorithmConfig { ciphering, integrity })
}

fn get_rb_config(buf: &mut &[u8]) -> Result<RadioBearerConfig, RrcCodecError> {
    let srb_count = get_u8(buf)?;
    let mut srbs = Vec::with_capacity(srb_count as usize);
    for _ in 0..srb_count {
        srbs.push(SrbToAddMod { srb_id: get_u8(buf)? });
    }

    let drb_count = get_u8(buf)?;
    let mut drbs = Vec::with_capacity(drb_count as usize);
    for _ in 0..drb_count {
        drbs.push(DrbToAddMod {
            drb_id: get_u8(buf)?,
            erab_id: get_u8(buf)?,
            lcid: get_u8(buf)?,
        });
    }

    Ok(RadioBearerConfig { srbs, drbs })
}

fn get_meas_config(buf: &mut &[u8]) -> Result<MeasConfig, RrcCodecError> {
    let obj_count = get_u8(buf)?;
    let mut meas_objects = Vec::with_capacity(obj_count as usize);
    for _ in 0..obj_count {
        meas_objects.push(MeasObjectConfig {
            meas_object_id: get_u8(buf)?,
            arfcn: get_u32(buf)?,
        });
    }

    let id_count = get_u8(buf)?;
    let mut meas_ids = Vec::with_capacity(id_count as usize);
    for _ in 0..id_count {
        meas_ids.push(MeasIdConfig {
            meas_id: get_u8(buf)?,
            meas_object_id: get_u8(buf)?,
        });
    }

    Ok(MeasConfig { meas_objects, meas_ids })
}

fn get_as_config(buf: &mut &[u8]) -> Result<AsConfig, RrcCodecError> {
    Ok(AsConfig {
        source_rb_config: get_rb_config(buf)?,
        source_meas_config: get_meas_config(buf)?,
        source_security: get_security_algorithms(buf)?,
        source_c_rnti: get_u16(buf)?,
        source_dl_arfcn: get_u32(buf)?,
    })
}

fn get_rrc_reconfiguration(buf: &mut &[u8]) -> Result<RrcReconfiguration, RrcCodecError> {
    let transaction_id = get_u8(buf)?;
    if transaction_id > 3 {
        return Err(decode_error(format!(
            "rrc-TransactionIdentifier out of range: {transaction_id}"
        )));
    }

    let mobility_control_info = get_option(buf, |buf| {
        Ok(MobilityControlInfo {
            target_pci: get_u16(buf)?,
            new_ue_identity: get_u16(buf)?,
            t304_ms: get_u32(buf)?,
            carrier_freq: get_option(buf, get_u32)?,
        })
    })?;
    let security_config_ho = get_option(buf, |buf| {
        Ok(SecurityConfigHo {
            key_change_indicator: get_bool(buf)?,
            next_hop_chaining_count: get_u8(buf)?,
            algorithms: get_option(buf, get_security_algorithms)?,
        })
    })?;
    let radio_bearer_config = get_option(buf, get_rb_config)?;
    let meas_config = get_option(buf, get_meas_config)?;

    Ok(RrcReconfiguration {
        transaction_id,
        mobility_control_info,
        security_config_ho,
        radio_bearer_config,
        meas_config,
    })
}
