//! Recording gateways and a two-gNB fixture for unit tests

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ranmob_common::{CRnti, GlobalCellId, GnbConfig, Plmn, UeId};
use ranmob_crypto::{CipheringAlgorithm, IntegrityAlgorithm};
use ranmob_rrc::{BinaryRrcCodec, DrbToAddMod, SecurityAlgorithmConfig, SrbToAddMod};

use crate::cells::{CellRegistry, StaticCellRegistry};
use crate::error::GatewayError;
use crate::mobility::bearer_transfer::{BearerCounterRecord, PdcpBearerState};
use crate::mobility::fsm::{HandoverEvent, HandoverFsm, MobilityEnv, Transition};
use crate::mobility::ports::{
    BearerPlane, Gateways, HandoverCause, HandoverRequestAck, NgapGateway, Scheduler, UeLink,
};
use crate::mobility::security::AsKeys;
use crate::ue_context::{Erab, RrcState, TeidAllocator, UeMobilityContext, UeSecurityContext};

pub const SOURCE_GNB: u32 = 0x19B;
pub const TARGET_GNB: u32 = 0x19C;

pub const SOURCE_YAML: &str = r#"
gnb_id: 0x19B
plmn: { mcc: 1, mnc: 1 }
tac: 7
cells:
  - cell_id: 1
    pci: 1
    dl_arfcn: 3350
    neighbors:
      - { eci: 0x19B02, pci: 6, dl_arfcn: 3350 }
      - { eci: 0x19C01, pci: 9, dl_arfcn: 3400 }
  - cell_id: 2
    pci: 6
    dl_arfcn: 3350
"#;

pub const TARGET_YAML: &str = r#"
gnb_id: 0x19C
plmn: { mcc: 1, mnc: 1 }
tac: 7
cells:
  - cell_id: 1
    pci: 9
    dl_arfcn: 3400
    neighbors:
      - { eci: 0x19B01, pci: 1, dl_arfcn: 3350 }
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    HandoverRequired { ue_id: UeId, target: GlobalCellId, plmn: Plmn, container: Bytes },
    RequestAck(HandoverRequestAck),
    HandoverFailure { amf_ue_id: u64, cause: HandoverCause },
    HandoverNotify { ue_id: UeId, target: GlobalCellId },
    HandoverCancel { ue_id: UeId, cause: HandoverCause },
    StatusTransfer { ue_id: UeId, records: Vec<BearerCounterRecord> },
    DlDcch { ue_id: UeId, pdu: Bytes },
    ReleaseCrnti { cell: GlobalCellId, crnti: CRnti },
    ClaimCell { ue_id: UeId, cell: GlobalCellId },
    ReassignCell { ue_id: UeId, cell: GlobalCellId },
    ReleaseCell { ue_id: UeId, cell: GlobalCellId },
    DrbActivation { ue_id: UeId, active: bool },
    Reestablish { ue_id: UeId },
    ConfigureSrbs { ue_id: UeId, count: usize },
    ConfigureDrbs { ue_id: UeId, count: usize },
    SetBearerState { ue_id: UeId, lcid: u8, state: PdcpBearerState },
}

#[derive(Default)]
struct RecorderState {
    log: Vec<Record>,
    bearer_states: HashMap<(UeId, u8), PdcpBearerState>,
    next_crnti: CRnti,
    fail_reservations: bool,
    fail_bearer_config: bool,
}

/// Implements every gateway and records each call.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    fn push(&self, record: Record) {
        self.state.lock().unwrap().log.push(record);
    }

    pub fn records(&self) -> Vec<Record> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.state.lock().unwrap().log.contains(record)
    }

    pub fn count(&self, pred: impl Fn(&Record) -> bool) -> usize {
        self.state.lock().unwrap().log.iter().filter(|r| pred(r)).count()
    }

    pub fn dl_dcch(&self, ue_id: UeId) -> Vec<Bytes> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::DlDcch { ue_id: id, pdu } if id == ue_id => Some(pdu),
                _ => None,
            })
            .collect()
    }

    pub fn handover_required(&self, ue_id: UeId) -> Option<(GlobalCellId, Bytes)> {
        self.records().into_iter().find_map(|r| match r {
            Record::HandoverRequired { ue_id: id, target, container, .. } if id == ue_id => {
                Some((target, container))
            }
            _ => None,
        })
    }

    pub fn request_ack(&self) -> Option<HandoverRequestAck> {
        self.records().into_iter().find_map(|r| match r {
            Record::RequestAck(ack) => Some(ack),
            _ => None,
        })
    }

    pub fn status_transfer(&self, ue_id: UeId) -> Option<Vec<BearerCounterRecord>> {
        self.records().into_iter().find_map(|r| match r {
            Record::StatusTransfer { ue_id: id, records } if id == ue_id => Some(records),
            _ => None,
        })
    }

    pub fn fail_reservations(&self) {
        self.state.lock().unwrap().fail_reservations = true;
    }

    /// Makes every SRB/DRB configuration fail from now on.
    pub fn fail_bearer_config(&self) {
        self.state.lock().unwrap().fail_bearer_config = true;
    }

    fn bearer_config_result(&self) -> Result<(), GatewayError> {
        if self.state.lock().unwrap().fail_bearer_config {
            return Err(GatewayError::new("PDCP configuration rejected"));
        }
        Ok(())
    }

    pub fn seed_bearer_state(&self, ue_id: UeId, lcid: u8, state: PdcpBearerState) {
        self.state.lock().unwrap().bearer_states.insert((ue_id, lcid), state);
    }

    pub fn bearer_state(&self, ue_id: UeId, lcid: u8) -> Option<PdcpBearerState> {
        self.state.lock().unwrap().bearer_states.get(&(ue_id, lcid)).copied()
    }

    pub fn gateways(&self) -> Gateways {
        Gateways::new(self.clone(), self.clone(), self.clone(), self.clone())
    }
}

impl NgapGateway for Recorder {
    fn send_handover_required(
        &mut self,
        ue_id: UeId,
        target: GlobalCellId,
        plmn: Plmn,
        container: Bytes,
    ) -> Result<(), GatewayError> {
        self.push(Record::HandoverRequired { ue_id, target, plmn, container });
        Ok(())
    }

    fn send_handover_request_ack(&mut self, ack: HandoverRequestAck) -> Result<(), GatewayError> {
        self.push(Record::RequestAck(ack));
        Ok(())
    }

    fn send_handover_failure(&mut self, amf_ue_id: u64, cause: HandoverCause) -> Result<(), GatewayError> {
        self.push(Record::HandoverFailure { amf_ue_id, cause });
        Ok(())
    }

    fn send_handover_notify(&mut self, ue_id: UeId, target: GlobalCellId) -> Result<(), GatewayError> {
        self.push(Record::HandoverNotify { ue_id, target });
        Ok(())
    }

    fn send_handover_cancel(&mut self, ue_id: UeId, cause: HandoverCause) -> Result<(), GatewayError> {
        self.push(Record::HandoverCancel { ue_id, cause });
        Ok(())
    }

    fn send_status_transfer(&mut self, ue_id: UeId, records: Vec<BearerCounterRecord>) -> Result<(), GatewayError> {
        self.push(Record::StatusTransfer { ue_id, records });
        Ok(())
    }
}

impl UeLink for Recorder {
    fn send_dl_dcch(&mut self, ue_id: UeId, pdu: Bytes) -> Result<(), GatewayError> {
        self.push(Record::DlDcch { ue_id, pdu });
        Ok(())
    }
}

impl Scheduler for Recorder {
    fn reserve_crnti(&mut self, _cell: GlobalCellId) -> Result<CRnti, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reservations {
            return Err(GatewayError::new("no free C-RNTI"));
        }
        state.next_crnti += 1;
        Ok(0x4650 + state.next_crnti)
    }

    fn release_crnti(&mut self, cell: GlobalCellId, crnti: CRnti) -> Result<(), GatewayError> {
        self.push(Record::ReleaseCrnti { cell, crnti });
        Ok(())
    }

    fn claim_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError> {
        self.push(Record::ClaimCell { ue_id, cell });
        Ok(())
    }

    fn reassign_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError> {
        self.push(Record::ReassignCell { ue_id, cell });
        Ok(())
    }

    fn release_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError> {
        self.push(Record::ReleaseCell { ue_id, cell });
        Ok(())
    }

    fn set_drb_activation(&mut self, ue_id: UeId, active: bool) -> Result<(), GatewayError> {
        self.push(Record::DrbActivation { ue_id, active });
        Ok(())
    }
}

impl BearerPlane for Recorder {
    fn reestablish(&mut self, ue_id: UeId) -> Result<(), GatewayError> {
        self.push(Record::Reestablish { ue_id });
        Ok(())
    }

    fn get_bearer_state(&self, ue_id: UeId, lcid: u8) -> Option<PdcpBearerState> {
        self.bearer_state(ue_id, lcid)
    }

    fn set_bearer_state(&mut self, ue_id: UeId, lcid: u8, state: PdcpBearerState) -> Result<(), GatewayError> {
        self.seed_bearer_state(ue_id, lcid, state);
        self.push(Record::SetBearerState { ue_id, lcid, state });
        Ok(())
    }

    fn configure_srbs(&mut self, ue_id: UeId, srbs: &[SrbToAddMod], _keys: &AsKeys) -> Result<(), GatewayError> {
        self.bearer_config_result()?;
        self.push(Record::ConfigureSrbs { ue_id, count: srbs.len() });
        Ok(())
    }

    fn configure_drbs(&mut self, ue_id: UeId, drbs: &[DrbToAddMod], _keys: &AsKeys) -> Result<(), GatewayError> {
        self.bearer_config_result()?;
        self.push(Record::ConfigureDrbs { ue_id, count: drbs.len() });
        Ok(())
    }
}

pub fn algorithms() -> SecurityAlgorithmConfig {
    SecurityAlgorithmConfig {
        ciphering: CipheringAlgorithm::Nea2,
        integrity: IntegrityAlgorithm::Nia2,
    }
}

/// One gNB with recording gateways and a set of UEs driven directly
/// through their state machines.
pub struct Fixture {
    pub config: GnbConfig,
    pub cells: StaticCellRegistry,
    pub codec: BinaryRrcCodec,
    pub recorder: Recorder,
    pub gateways: Gateways,
    pub teids: TeidAllocator,
    ues: HashMap<UeId, (UeMobilityContext, HandoverFsm)>,
    next_ue_id: UeId,
}

impl Fixture {
    pub fn new(yaml: &str) -> Self {
        let config = GnbConfig::from_yaml(yaml).unwrap();
        let recorder = Recorder::default();
        Self {
            cells: StaticCellRegistry::from_config(&config),
            config,
            codec: BinaryRrcCodec::new(),
            gateways: recorder.gateways(),
            recorder,
            teids: TeidAllocator::new(0x100),
            ues: HashMap::new(),
            next_ue_id: 1,
        }
    }

    pub fn source() -> Self {
        Self::new(SOURCE_YAML)
    }

    pub fn target() -> Self {
        Self::new(TARGET_YAML)
    }

    fn insert(&mut self, ue: UeMobilityContext) -> UeId {
        let ue_id = ue.ue_id;
        self.ues.insert(ue_id, (ue, HandoverFsm::new()));
        self.next_ue_id += 1;
        ue_id
    }

    /// Registered UE on the first cell with E-RAB 5 established.
    pub fn add_registered_ue(&mut self) -> UeId {
        let ue_id = self.next_ue_id;
        let security = UeSecurityContext::new([0x11; 32], [0x22; 32], 1, algorithms());
        let mut ue = UeMobilityContext::new(ue_id, 0x4600 + ue_id as u16, &self.cells.cells()[0], security);
        ue.rrc_state = RrcState::Registered;
        ue.bearers.add_erab(Erab {
            erab_id: 5,
            qci: 9,
            transport_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            ul_teid: 0x1005,
            dl_teid: self.teids.allocate(),
        });
        ue.rb_config = ue.bearers.rb_config(self.config.handover.erab_drb_offset);
        self.insert(ue)
    }

    /// Empty context for an incoming handover on the first cell.
    pub fn add_admitted_ue(&mut self) -> UeId {
        let ue_id = self.next_ue_id;
        let security = UeSecurityContext::new([0; 32], [0; 32], 0, SecurityAlgorithmConfig::default());
        let ue = UeMobilityContext::new(ue_id, 0, &self.cells.cells()[0], security);
        self.insert(ue)
    }

    pub fn ue(&self, ue_id: UeId) -> &UeMobilityContext {
        &self.ues[&ue_id].0
    }

    pub fn fsm(&self, ue_id: UeId) -> &HandoverFsm {
        &self.ues[&ue_id].1
    }

    pub fn handle(&mut self, ue_id: UeId, event: HandoverEvent) -> Transition {
        let (ue, fsm) = self.ues.get_mut(&ue_id).unwrap();
        let mut env = MobilityEnv {
            config: &self.config,
            cells: &self.cells,
            codec: &self.codec,
            gateways: &mut self.gateways,
            teids: &mut self.teids,
        };
        fsm.handle(ue, event, &mut env)
    }
}
