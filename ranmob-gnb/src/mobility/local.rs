//! In-process scheduler and bearer plane
//!
//! Bookkeeping implementations of [`Scheduler`] and [`BearerPlane`] for a
//! gNB without MAC or PDCP layers attached (scenario replay, integration
//! tests). State is shared behind a mutex so the owner can inspect it while
//! the mobility manager holds the gateway.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ranmob_common::{CRnti, GlobalCellId, UeId};
use ranmob_rrc::{DrbToAddMod, SrbToAddMod};
use tracing::{debug, trace};

use crate::error::GatewayError;
use crate::mobility::bearer_transfer::PdcpBearerState;
use crate::mobility::ports::{BearerPlane, Scheduler};
use crate::mobility::security::AsKeys;

/// First C-RNTI handed out
pub const FIRST_CRNTI: CRnti = 0x4601;
/// Last assignable C-RNTI
pub const LAST_CRNTI: CRnti = 0xFFEF;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler entries of one UE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UeAssociation {
    /// Cells holding an entry for the UE
    pub cells: BTreeSet<GlobalCellId>,
    /// Cell currently serving the UE
    pub active: Option<GlobalCellId>,
    pub drbs_active: bool,
}

fn next_crnti(crnti: CRnti) -> CRnti {
    if crnti >= LAST_CRNTI {
        FIRST_CRNTI
    } else {
        crnti + 1
    }
}

#[derive(Debug)]
struct SchedulerState {
    next_crnti: CRnti,
    /// Reservations still allowed under a budget
    remaining: Option<usize>,
    reserved: BTreeSet<CRnti>,
    ues: HashMap<UeId, UeAssociation>,
}

#[derive(Debug, Clone)]
pub struct LocalScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                next_crnti: FIRST_CRNTI,
                remaining: None,
                reserved: BTreeSet::new(),
                ues: HashMap::new(),
            })),
        }
    }

    /// Scheduler that holds at most `count` C-RNTIs reserved at a time.
    pub fn with_crnti_budget(count: usize) -> Self {
        let scheduler = Self::new();
        lock(&scheduler.state).remaining = Some(count);
        scheduler
    }

    pub fn association(&self, ue_id: UeId) -> Option<UeAssociation> {
        lock(&self.state).ues.get(&ue_id).cloned()
    }

    pub fn reserved_crntis(&self) -> usize {
        lock(&self.state).reserved.len()
    }

    /// Number of UEs holding an entry on `cell`.
    pub fn ue_count_on(&self, cell: GlobalCellId) -> usize {
        lock(&self.state).ues.values().filter(|a| a.cells.contains(&cell)).count()
    }
}

impl Scheduler for LocalScheduler {
    fn reserve_crnti(&mut self, cell: GlobalCellId) -> Result<CRnti, GatewayError> {
        let mut state = lock(&self.state);
        let pool = usize::from(LAST_CRNTI - FIRST_CRNTI) + 1;
        if state.remaining == Some(0) || state.reserved.len() >= pool {
            return Err(GatewayError::new(format!("no C-RNTI left on {cell}")));
        }

        let mut crnti = state.next_crnti;
        while state.reserved.contains(&crnti) {
            crnti = next_crnti(crnti);
        }
        state.next_crnti = next_crnti(crnti);
        state.reserved.insert(crnti);
        if let Some(n) = state.remaining.as_mut() {
            *n -= 1;
        }
        debug!("C-RNTI {:#06x} reserved on {}", crnti, cell);
        Ok(crnti)
    }

    fn release_crnti(&mut self, cell: GlobalCellId, crnti: CRnti) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        if !state.reserved.remove(&crnti) {
            return Err(GatewayError::new(format!("C-RNTI {crnti:#06x} is not reserved on {cell}")));
        }
        if let Some(n) = state.remaining.as_mut() {
            *n += 1;
        }
        debug!("C-RNTI {:#06x} returned on {}", crnti, cell);
        Ok(())
    }

    fn claim_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        let entry = state.ues.entry(ue_id).or_default();
        if !entry.cells.insert(cell) {
            return Err(GatewayError::new(format!("UE[{ue_id}] already holds an entry on {cell}")));
        }
        trace!("UE[{}] claimed {}", ue_id, cell);
        Ok(())
    }

    fn reassign_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        let entry = state
            .ues
            .get_mut(&ue_id)
            .filter(|e| e.cells.contains(&cell))
            .ok_or_else(|| GatewayError::new(format!("UE[{ue_id}] has no entry on {cell}")))?;
        entry.active = Some(cell);
        trace!("UE[{}] active on {}", ue_id, cell);
        Ok(())
    }

    fn release_cell(&mut self, ue_id: UeId, cell: GlobalCellId) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        let Some(entry) = state.ues.get_mut(&ue_id) else {
            return Err(GatewayError::new(format!("UE[{ue_id}] unknown to the scheduler")));
        };
        if !entry.cells.remove(&cell) {
            return Err(GatewayError::new(format!("UE[{ue_id}] has no entry on {cell}")));
        }
        if entry.active == Some(cell) {
            entry.active = None;
        }
        if entry.cells.is_empty() {
            state.ues.remove(&ue_id);
        }
        trace!("UE[{}] released {}", ue_id, cell);
        Ok(())
    }

    fn set_drb_activation(&mut self, ue_id: UeId, active: bool) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        let entry = state
            .ues
            .get_mut(&ue_id)
            .ok_or_else(|| GatewayError::new(format!("UE[{ue_id}] unknown to the scheduler")))?;
        entry.drbs_active = active;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct UeBearers {
    srbs: BTreeSet<u8>,
    /// PDCP state per DRB logical channel
    drbs: HashMap<u8, PdcpBearerState>,
    reestablishments: u32,
}

/// PDCP/RLC bookkeeping per UE.
#[derive(Debug, Clone, Default)]
pub struct LocalBearerPlane {
    state: Arc<Mutex<HashMap<UeId, UeBearers>>>,
}

impl LocalBearerPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bearer_state(&self, ue_id: UeId, lcid: u8) -> Option<PdcpBearerState> {
        lock(&self.state).get(&ue_id).and_then(|b| b.drbs.get(&lcid).copied())
    }

    /// Moves the counters of a configured bearer as if traffic had flowed.
    pub fn advance(&self, ue_id: UeId, lcid: u8, state: PdcpBearerState) -> Result<(), GatewayError> {
        let mut ues = lock(&self.state);
        let slot = ues
            .get_mut(&ue_id)
            .and_then(|b| b.drbs.get_mut(&lcid))
            .ok_or_else(|| GatewayError::new(format!("UE[{ue_id}] lcid {lcid} not configured")))?;
        *slot = state;
        Ok(())
    }

    pub fn srb_count(&self, ue_id: UeId) -> usize {
        lock(&self.state).get(&ue_id).map_or(0, |b| b.srbs.len())
    }

    pub fn drb_count(&self, ue_id: UeId) -> usize {
        lock(&self.state).get(&ue_id).map_or(0, |b| b.drbs.len())
    }

    pub fn reestablish_count(&self, ue_id: UeId) -> u32 {
        lock(&self.state).get(&ue_id).map_or(0, |b| b.reestablishments)
    }
}

impl BearerPlane for LocalBearerPlane {
    fn reestablish(&mut self, ue_id: UeId) -> Result<(), GatewayError> {
        let mut ues = lock(&self.state);
        let bearers = ues
            .get_mut(&ue_id)
            .ok_or_else(|| GatewayError::new(format!("UE[{ue_id}] has no bearers")))?;
        bearers.reestablishments += 1;
        Ok(())
    }

    fn get_bearer_state(&self, ue_id: UeId, lcid: u8) -> Option<PdcpBearerState> {
        self.bearer_state(ue_id, lcid)
    }

    fn set_bearer_state(&mut self, ue_id: UeId, lcid: u8, state: PdcpBearerState) -> Result<(), GatewayError> {
        self.advance(ue_id, lcid, state)
    }

    fn configure_srbs(&mut self, ue_id: UeId, srbs: &[SrbToAddMod], _keys: &AsKeys) -> Result<(), GatewayError> {
        let mut ues = lock(&self.state);
        let bearers = ues.entry(ue_id).or_default();
        bearers.srbs.extend(srbs.iter().map(|s| s.srb_id));
        Ok(())
    }

    fn configure_drbs(&mut self, ue_id: UeId, drbs: &[DrbToAddMod], _keys: &AsKeys) -> Result<(), GatewayError> {
        let mut ues = lock(&self.state);
        let bearers = ues.entry(ue_id).or_default();
        for drb in drbs {
            bearers.drbs.entry(drb.lcid).or_default();
        }
        Ok(())
    }
}
