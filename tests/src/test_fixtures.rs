//! Test fixtures and configuration helpers
//!
//! Provides the gNB layouts used across the handover tests and a
//! [`TestGnb`] wrapper that keeps the outbound channels and local
//! scheduler/bearer plane of a mobility manager within reach of the test.

use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use ranmob_common::{CRnti, GlobalCellId, GnbConfig, UeId};
use ranmob_crypto::{CipheringAlgorithm, IntegrityAlgorithm};
use ranmob_gnb::mobility::{ErabSetupItem, PdcpBearerState};
use ranmob_gnb::{
    ChannelNgapGateway, ChannelUeLink, Gateways, HandoverError, LocalBearerPlane, LocalScheduler,
    MobilityManager, NgapOutbound, UeDelivery, UeRegistration, UeSecurityContext,
};
use ranmob_gnb::ue_context::default_capabilities;
use ranmob_rrc::SecurityAlgorithmConfig;
use tokio::sync::mpsc;

/// gNB hosting the UEs before handover
pub const SOURCE_GNB_ID: u32 = 0x19B;
/// Neighbor gNB reachable through the core network
pub const TARGET_GNB_ID: u32 = 0x19C;

/// Capacity of the outbound channels of a [`TestGnb`]
const OUTBOUND_CAPACITY: usize = 64;

/// Source gNB: two co-channel cells (PCI 1 and 6) and one neighbor on the
/// target gNB (PCI 9, different carrier).
pub const SOURCE_GNB_YAML: &str = r#"
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
    neighbors:
      - { eci: 0x19B01, pci: 1, dl_arfcn: 3350 }
      - { eci: 0x19C01, pci: 9, dl_arfcn: 3400 }
handover:
  t304_ms: 2000
"#;

/// Target gNB with a single cell (PCI 9).
pub const TARGET_GNB_YAML: &str = r#"
gnb_id: 0x19C
plmn: { mcc: 1, mnc: 1 }
tac: 7
cells:
  - cell_id: 1
    pci: 9
    dl_arfcn: 3400
    neighbors:
      - { eci: 0x19B01, pci: 1, dl_arfcn: 3350 }
handover:
  t304_ms: 2000
"#;

pub fn source_config() -> GnbConfig {
    GnbConfig::from_yaml(SOURCE_GNB_YAML).expect("source gNB YAML")
}

pub fn target_config() -> GnbConfig {
    GnbConfig::from_yaml(TARGET_GNB_YAML).expect("target gNB YAML")
}

/// Test UE configuration
#[derive(Debug, Clone)]
pub struct TestUeConfig {
    pub c_rnti: CRnti,
    pub cell: GlobalCellId,
    pub kgnb: [u8; 32],
    pub nh: [u8; 32],
    pub ncc: u8,
    pub algorithms: SecurityAlgorithmConfig,
    /// E-RAB ids set up at registration
    pub erabs: Vec<u8>,
    pub capabilities_known: bool,
}

impl Default for TestUeConfig {
    fn default() -> Self {
        Self {
            c_rnti: 0x1001,
            cell: GlobalCellId::new(SOURCE_GNB_ID, 1),
            kgnb: [0x11; 32],
            nh: [0x22; 32],
            ncc: 1,
            algorithms: SecurityAlgorithmConfig {
                ciphering: CipheringAlgorithm::Nea2,
                integrity: IntegrityAlgorithm::Nia2,
            },
            erabs: vec![5],
            capabilities_known: true,
        }
    }
}

impl TestUeConfig {
    pub fn with_c_rnti(mut self, c_rnti: CRnti) -> Self {
        self.c_rnti = c_rnti;
        self
    }

    pub fn with_erabs(mut self, erabs: &[u8]) -> Self {
        self.erabs = erabs.to_vec();
        self
    }

    pub fn with_kgnb(mut self, kgnb: [u8; 32]) -> Self {
        self.kgnb = kgnb;
        self
    }

    pub fn without_capabilities(mut self) -> Self {
        self.capabilities_known = false;
        self
    }

    pub fn registration(&self) -> UeRegistration {
        UeRegistration {
            c_rnti: self.c_rnti,
            cell: self.cell,
            security: UeSecurityContext::new(self.kgnb, self.nh, self.ncc, self.algorithms),
            erabs: self
                .erabs
                .iter()
                .map(|&erab_id| ErabSetupItem {
                    erab_id,
                    qci: 9,
                    transport_address: IpAddr::V4(Ipv4Addr::new(10, 45, 0, 1)),
                    ul_teid: 0x1000 + u32::from(erab_id),
                })
                .collect(),
            capabilities: if self.capabilities_known { default_capabilities() } else { vec![] },
        }
    }
}

/// A mobility manager wired to channel gateways and local MAC/PDCP doubles.
pub struct TestGnb {
    pub manager: MobilityManager,
    pub scheduler: LocalScheduler,
    pub bearers: LocalBearerPlane,
    ngap_rx: mpsc::Receiver<NgapOutbound>,
    ue_rx: mpsc::Receiver<UeDelivery>,
}

impl TestGnb {
    pub fn new(config: GnbConfig) -> Self {
        Self::with_scheduler(config, LocalScheduler::new())
    }

    pub fn with_scheduler(config: GnbConfig, scheduler: LocalScheduler) -> Self {
        let (ngap_tx, ngap_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (ue_tx, ue_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let bearers = LocalBearerPlane::new();
        let gateways = Gateways::new(
            ChannelNgapGateway::new(ngap_tx),
            ChannelUeLink::new(ue_tx),
            scheduler.clone(),
            bearers.clone(),
        );
        Self {
            manager: MobilityManager::from_config(config, gateways),
            scheduler,
            bearers,
            ngap_rx,
            ue_rx,
        }
    }

    pub fn gnb_id(&self) -> u32 {
        self.manager.config().gnb_id
    }

    pub fn register(&mut self, ue: &TestUeConfig) -> Result<UeId, HandoverError> {
        self.manager.register_ue(ue.registration())
    }

    /// Next queued N2 message, if any.
    pub fn next_ngap(&mut self) -> Option<NgapOutbound> {
        self.ngap_rx.try_recv().ok()
    }

    /// Every DL-DCCH PDU queued for `ue_id` so far. PDUs of other UEs are
    /// dropped.
    pub fn take_dl_dcch(&mut self, ue_id: UeId) -> Vec<Bytes> {
        let mut pdus = Vec::new();
        while let Ok(delivery) = self.ue_rx.try_recv() {
            if delivery.ue_id == ue_id {
                pdus.push(delivery.pdu);
            }
        }
        pdus
    }

    /// Sets the PDCP counters of the DRB carrying `erab_id`.
    pub fn set_pdcp_state(&self, ue_id: UeId, erab_id: u8, state: PdcpBearerState) {
        let lcid = self.lcid(erab_id);
        self.bearers.advance(ue_id, lcid, state).expect("bearer configured");
    }

    pub fn pdcp_state(&self, ue_id: UeId, erab_id: u8) -> Option<PdcpBearerState> {
        self.bearers.bearer_state(ue_id, self.lcid(erab_id))
    }

    fn lcid(&self, erab_id: u8) -> u8 {
        let offset = self.manager.config().handover.erab_drb_offset;
        let drb_id = ranmob_gnb::ue_context::erab_to_drb(erab_id, offset).expect("E-RAB maps to a DRB");
        ranmob_gnb::ue_context::drb_to_lcid(drb_id)
    }
}
