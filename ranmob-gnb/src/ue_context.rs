//! UE mobility context
//!
//! Everything the mobility procedures need to know about one active UE:
//! identity, serving cell and its neighbors, bearers, AS security and the
//! current radio configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use bytes::Bytes;
use ranmob_common::{CRnti, GlobalCellId, NeighborCellConfig, UeId};
use ranmob_rrc::{
    DrbToAddMod, MeasConfig, RadioBearerConfig, RatType, SecurityAlgorithmConfig, SrbToAddMod,
    UeCapabilityRatContainer,
};

use crate::cells::CellInfo;
use crate::mobility::security::{derive_as_keys, AsKeys};

/// RRC connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RrcState {
    #[default]
    Idle,
    /// RRC connection established, registration not finished
    Connected,
    /// Registered with the core network; eligible for handover
    Registered,
    Releasing,
}

impl fmt::Display for RrcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrcState::Idle => write!(f, "Idle"),
            RrcState::Connected => write!(f, "Connected"),
            RrcState::Registered => write!(f, "Registered"),
            RrcState::Releasing => write!(f, "Releasing"),
        }
    }
}

/// E-RAB (data radio access bearer) as established with the core network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erab {
    pub erab_id: u8,
    /// QoS class identifier
    pub qci: u8,
    /// Core-network transport address for uplink traffic
    pub transport_address: IpAddr,
    /// Uplink TEID towards the core network
    pub ul_teid: u32,
    /// Downlink TEID allocated by this gNB
    pub dl_teid: u32,
}

/// Maps a core-network E-RAB id onto the local DRB id.
///
/// Returns `None` for E-RAB ids below the offset range.
pub fn erab_to_drb(erab_id: u8, offset: u8) -> Option<u8> {
    erab_id.checked_sub(offset).filter(|drb| *drb >= 1)
}

/// Logical channel carrying a DRB.
pub fn drb_to_lcid(drb_id: u8) -> u8 {
    drb_id + 2
}

/// Signalling and data bearers of a UE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerList {
    pub srbs: Vec<u8>,
    erabs: BTreeMap<u8, Erab>,
}

impl BearerList {
    pub fn new() -> Self {
        Self {
            srbs: vec![1, 2],
            erabs: BTreeMap::new(),
        }
    }

    pub fn add_erab(&mut self, erab: Erab) {
        self.erabs.insert(erab.erab_id, erab);
    }

    pub fn erab(&self, erab_id: u8) -> Option<&Erab> {
        self.erabs.get(&erab_id)
    }

    pub fn erabs(&self) -> impl Iterator<Item = &Erab> {
        self.erabs.values()
    }

    pub fn erab_count(&self) -> usize {
        self.erabs.len()
    }

    /// Radio bearer configuration for these bearers.
    pub fn rb_config(&self, erab_drb_offset: u8) -> RadioBearerConfig {
        RadioBearerConfig {
            srbs: self.srbs.iter().map(|&srb_id| SrbToAddMod { srb_id }).collect(),
            drbs: self
                .erabs
                .values()
                .filter_map(|erab| {
                    erab_to_drb(erab.erab_id, erab_drb_offset).map(|drb_id| DrbToAddMod {
                        drb_id,
                        erab_id: erab.erab_id,
                        lcid: drb_to_lcid(drb_id),
                    })
                })
                .collect(),
        }
    }
}

/// Allocator for downlink TEIDs.
#[derive(Debug, Clone)]
pub struct TeidAllocator {
    next: u32,
}

impl TeidAllocator {
    pub fn new(first: u32) -> Self {
        Self { next: first.max(1) }
    }

    pub fn allocate(&mut self) -> u32 {
        let teid = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        teid
    }
}

impl Default for TeidAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

/// AS security context.
#[derive(Clone, PartialEq, Eq)]
pub struct UeSecurityContext {
    pub kgnb: [u8; 32],
    /// Next-hop key
    pub nh: [u8; 32],
    /// Next-hop chaining count (0..=7)
    pub ncc: u8,
    pub algorithms: SecurityAlgorithmConfig,
    /// RRC/UP keys derived from `kgnb`
    pub keys: AsKeys,
}

impl UeSecurityContext {
    pub fn new(kgnb: [u8; 32], nh: [u8; 32], ncc: u8, algorithms: SecurityAlgorithmConfig) -> Self {
        Self {
            kgnb,
            nh,
            ncc: ncc & 0x07,
            algorithms,
            keys: derive_as_keys(&kgnb, &algorithms),
        }
    }
}

impl fmt::Debug for UeSecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UeSecurityContext")
            .field("ncc", &self.ncc)
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

/// Placeholder NR capability container used when the UE never reported one.
pub fn default_capabilities() -> Vec<UeCapabilityRatContainer> {
    vec![UeCapabilityRatContainer {
        rat: RatType::Nr,
        container: Bytes::from_static(&[0x00]),
    }]
}

/// Mobility context of one UE.
#[derive(Debug, Clone)]
pub struct UeMobilityContext {
    pub ue_id: UeId,
    pub c_rnti: CRnti,
    pub rrc_state: RrcState,
    pub serving_cell: GlobalCellId,
    /// Neighbor list of the serving cell
    pub neighbors: Vec<NeighborCellConfig>,
    pub bearers: BearerList,
    pub security: UeSecurityContext,
    /// Empty until the UE reports its capabilities
    pub capabilities: Vec<UeCapabilityRatContainer>,
    pub rb_config: RadioBearerConfig,
    pub meas_config: MeasConfig,
    transaction_id: u8,
}

impl UeMobilityContext {
    pub fn new(ue_id: UeId, c_rnti: CRnti, cell: &CellInfo, security: UeSecurityContext) -> Self {
        Self {
            ue_id,
            c_rnti,
            rrc_state: RrcState::Connected,
            serving_cell: cell.global_id,
            neighbors: cell.neighbors.clone(),
            bearers: BearerList::new(),
            security,
            capabilities: Vec::new(),
            rb_config: RadioBearerConfig::default(),
            meas_config: cell.meas_config(),
            transaction_id: 0,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.rrc_state == RrcState::Registered
    }

    /// Next RRC transaction identifier (mod 4).
    pub fn next_transaction_id(&mut self) -> u8 {
        let id = self.transaction_id;
        self.transaction_id = (self.transaction_id + 1) % 4;
        id
    }

    /// Makes `cell` the serving cell and refreshes the neighbor cache.
    pub fn move_to_cell(&mut self, cell: &CellInfo) {
        self.serving_cell = cell.global_id;
        self.neighbors = cell.neighbors.clone();
    }
}
