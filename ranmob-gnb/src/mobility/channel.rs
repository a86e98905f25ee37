//! Channel-backed gateways
//!
//! Outbound N2 and Uu traffic handed to other tasks over bounded tokio
//! channels. Sends never wait: a full or closed channel is a gateway error.

use bytes::Bytes;
use ranmob_common::{GlobalCellId, Plmn, UeId};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::mobility::bearer_transfer::BearerCounterRecord;
use crate::mobility::ports::{HandoverCause, HandoverRequestAck, NgapGateway, UeLink};

/// N2 message emitted by the mobility procedures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NgapOutbound {
    HandoverRequired {
        ue_id: UeId,
        target: GlobalCellId,
        target_plmn: Plmn,
        container: Bytes,
    },
    HandoverRequestAck(HandoverRequestAck),
    HandoverFailure {
        amf_ue_id: u64,
        cause: HandoverCause,
    },
    HandoverNotify {
        ue_id: UeId,
        target: GlobalCellId,
    },
    HandoverCancel {
        ue_id: UeId,
        cause: HandoverCause,
    },
    StatusTransfer {
        ue_id: UeId,
        records: Vec<BearerCounterRecord>,
    },
}

impl NgapOutbound {
    pub fn name(&self) -> &'static str {
        match self {
            NgapOutbound::HandoverRequired { .. } => "HandoverRequired",
            NgapOutbound::HandoverRequestAck(_) => "HandoverRequestAcknowledge",
            NgapOutbound::HandoverFailure { .. } => "HandoverFailure",
            NgapOutbound::HandoverNotify { .. } => "HandoverNotify",
            NgapOutbound::HandoverCancel { .. } => "HandoverCancel",
            NgapOutbound::StatusTransfer { .. } => "UplinkRanStatusTransfer",
        }
    }
}

/// DL-DCCH PDU for one UE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeDelivery {
    pub ue_id: UeId,
    pub pdu: Bytes,
}

#[derive(Debug, Clone)]
pub struct ChannelNgapGateway {
    tx: mpsc::Sender<NgapOutbound>,
}

impl ChannelNgapGateway {
    pub fn new(tx: mpsc::Sender<NgapOutbound>) -> Self {
        Self { tx }
    }

    fn push(&self, msg: NgapOutbound) -> Result<(), GatewayError> {
        let name = msg.name();
        self.tx
            .try_send(msg)
            .map_err(|e| GatewayError::new(format!("failed to queue {name}: {e}")))
    }
}

impl NgapGateway for ChannelNgapGateway {
    fn send_handover_required(
        &mut self,
        ue_id: UeId,
        target: GlobalCellId,
        target_plmn: Plmn,
        container: Bytes,
    ) -> Result<(), GatewayError> {
        self.push(NgapOutbound::HandoverRequired { ue_id, target, target_plmn, container })
    }

    fn send_handover_request_ack(&mut self, ack: HandoverRequestAck) -> Result<(), GatewayError> {
        self.push(NgapOutbound::HandoverRequestAck(ack))
    }

    fn send_handover_failure(&mut self, amf_ue_id: u64, cause: HandoverCause) -> Result<(), GatewayError> {
        self.push(NgapOutbound::HandoverFailure { amf_ue_id, cause })
    }

    fn send_handover_notify(&mut self, ue_id: UeId, target: GlobalCellId) -> Result<(), GatewayError> {
        self.push(NgapOutbound::HandoverNotify { ue_id, target })
    }

    fn send_handover_cancel(&mut self, ue_id: UeId, cause: HandoverCause) -> Result<(), GatewayError> {
        self.push(NgapOutbound::HandoverCancel { ue_id, cause })
    }

    fn send_status_transfer(&mut self, ue_id: UeId, records: Vec<BearerCounterRecord>) -> Result<(), GatewayError> {
        self.push(NgapOutbound::StatusTransfer { ue_id, records })
    }
}

#[derive(Debug, Clone)]
pub struct ChannelUeLink {
    tx: mpsc::Sender<UeDelivery>,
}

impl ChannelUeLink {
    pub fn new(tx: mpsc::Sender<UeDelivery>) -> Self {
        Self { tx }
    }
}

impl UeLink for ChannelUeLink {
    fn send_dl_dcch(&mut self, ue_id: UeId, pdu: Bytes) -> Result<(), GatewayError> {
        self.tx
            .try_send(UeDelivery { ue_id, pdu })
            .map_err(|e| GatewayError::new(format!("failed to queue DL-DCCH for UE[{ue_id}]: {e}")))
    }
}
