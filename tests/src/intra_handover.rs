//! Intra-gNB handover integration tests
//!
//! Cell changes between the two cells of the source gNB, driven through the
//! mobility manager with the local scheduler and bearer plane.

use integration_tests::{
    decode_reconfiguration, init_test_logging, source_config, TestGnb, TestUeConfig, SOURCE_GNB_ID,
};
use ranmob_common::GlobalCellId;
use ranmob_crypto::kdf::derive_kgnb_star;
use ranmob_gnb::mobility::{IntraPhase, LocalScheduler};
use ranmob_gnb::{HandoverError, HandoverEvent, HandoverState, Outcome};
use ranmob_rrc::MeasurementReport;

const CELL_1: GlobalCellId = GlobalCellId::new(SOURCE_GNB_ID, 1);
const CELL_2: GlobalCellId = GlobalCellId::new(SOURCE_GNB_ID, 2);

fn report_towards(pci: u16) -> HandoverEvent {
    HandoverEvent::MeasurementReport(MeasurementReport::nr(1, 20, &[(pci, 30)]))
}

/// Full intra-gNB handover from PCI 1 to PCI 6
#[test]
fn test_intra_handover_completes() {
    init_test_logging();

    let mut gnb = TestGnb::new(source_config());
    let ue_id = gnb.register(&TestUeConfig::default()).unwrap();

    let t = gnb.manager.handle_event(ue_id, report_towards(6)).unwrap();
    assert_eq!(t.outcome, Outcome::Started);
    assert_eq!(gnb.manager.state(ue_id), Some(HandoverState::IntraRole(IntraPhase::WaitIdentity)));

    // The UE is told to move with a fresh C-RNTI, same carrier
    let pdus = gnb.take_dl_dcch(ue_id);
    assert_eq!(pdus.len(), 1);
    let reconfig = decode_reconfiguration(&pdus[0]).unwrap();
    let mci = reconfig.mobility_control_info.expect("mobility control info");
    assert_eq!(mci.target_pci, 6);
    assert_eq!(mci.t304_ms, 2000);
    assert_eq!(mci.carrier_freq, None);
    let security = reconfig.security_config_ho.expect("security config");
    assert!(!security.key_change_indicator);
    assert_eq!(security.next_hop_chaining_count, 1);

    // Both cells hold an entry while the UE is on its way
    let assoc = gnb.scheduler.association(ue_id).unwrap();
    assert!(assoc.cells.contains(&CELL_1) && assoc.cells.contains(&CELL_2));
    assert_eq!(assoc.active, Some(CELL_1));

    let new_crnti = mci.new_ue_identity;
    let t = gnb
        .manager
        .handle_event(ue_id, HandoverEvent::CrntiUpdate { temp_crnti: new_crnti, crnti: new_crnti })
        .unwrap();
    assert_eq!(t.outcome, Outcome::Progressed);
    assert_eq!(gnb.manager.state(ue_id), Some(HandoverState::IntraRole(IntraPhase::WaitComplete)));
    assert_eq!(gnb.bearers.reestablish_count(ue_id), 1);
    assert_eq!(gnb.scheduler.association(ue_id).unwrap().active, Some(CELL_2));

    let ue = gnb.manager.ue(ue_id).unwrap();
    assert_eq!(ue.security.kgnb, derive_kgnb_star(&[0x11; 32], 6, 3350));
    assert_eq!(ue.security.ncc, 1);
    assert_eq!(ue.c_rnti, new_crnti);

    let t = gnb
        .manager
        .handle_event(ue_id, HandoverEvent::ReconfigurationComplete { transaction_id: reconfig.transaction_id })
        .unwrap();
    assert_eq!(t.outcome, Outcome::Completed);
    assert!(t.closed_transaction());

    let ue = gnb.manager.ue(ue_id).unwrap();
    assert_eq!(ue.serving_cell, CELL_2);
    let assoc = gnb.scheduler.association(ue_id).unwrap();
    assert_eq!(assoc.cells.len(), 1);
    assert!(assoc.cells.contains(&CELL_2));

    // No N2 signalling for an intra-gNB handover
    assert!(gnb.next_ngap().is_none());
}

/// A cancel after the UE showed up on the target cell puts it back on the source
#[test]
fn test_intra_handover_cancel_returns_to_source() {
    init_test_logging();

    let mut gnb = TestGnb::new(source_config());
    let ue_id = gnb.register(&TestUeConfig::default()).unwrap();

    gnb.manager.handle_event(ue_id, report_towards(6)).unwrap();
    let crnti = gnb.manager.transaction(ue_id).and_then(|t| t.new_crnti).unwrap();
    gnb.manager
        .handle_event(ue_id, HandoverEvent::CrntiUpdate { temp_crnti: crnti, crnti })
        .unwrap();

    let t = gnb
        .manager
        .handle_event(
            ue_id,
            HandoverEvent::Cancel { cause: ranmob_gnb::mobility::HandoverCause::HandoverCancelled },
        )
        .unwrap();
    assert_eq!(t.outcome, Outcome::Cancelled);
    assert_eq!(gnb.manager.state(ue_id), Some(HandoverState::Idle));

    let assoc = gnb.scheduler.association(ue_id).unwrap();
    assert_eq!(assoc.active, Some(CELL_1));
    assert!(!assoc.cells.contains(&CELL_2));
    assert_eq!(gnb.manager.ue(ue_id).unwrap().c_rnti, TestUeConfig::default().c_rnti);
    assert_eq!(gnb.scheduler.reserved_crntis(), 0);
}

/// A cancelled handover hands its C-RNTI back, so the next attempt still gets one
#[test]
fn test_cancelled_handover_returns_crnti() {
    init_test_logging();

    let mut gnb = TestGnb::with_scheduler(source_config(), LocalScheduler::with_crnti_budget(1));
    let ue_id = gnb.register(&TestUeConfig::default()).unwrap();

    for _ in 0..3 {
        let t = gnb.manager.handle_event(ue_id, report_towards(6)).unwrap();
        assert_eq!(t.outcome, Outcome::Started);
        assert_eq!(gnb.scheduler.reserved_crntis(), 1);

        let cancel = HandoverEvent::Cancel { cause: ranmob_gnb::mobility::HandoverCause::HandoverCancelled };
        let t = gnb.manager.handle_event(ue_id, cancel).unwrap();
        assert_eq!(t.outcome, Outcome::Cancelled);
        assert_eq!(gnb.scheduler.reserved_crntis(), 0);
        gnb.take_dl_dcch(ue_id);
    }
}

/// Reports that arrive while a handover runs are dropped
#[test]
fn test_report_during_handover_ignored() {
    init_test_logging();

    let mut gnb = TestGnb::new(source_config());
    let ue_id = gnb.register(&TestUeConfig::default()).unwrap();

    gnb.manager.handle_event(ue_id, report_towards(6)).unwrap();
    let t = gnb.manager.handle_event(ue_id, report_towards(6)).unwrap();
    assert_eq!(t.outcome, Outcome::NoDecision);
    assert_eq!(gnb.manager.state(ue_id), Some(HandoverState::IntraRole(IntraPhase::WaitIdentity)));
    assert_eq!(gnb.take_dl_dcch(ue_id).len(), 1);
}

/// Candidates are tried in report order; unknown PCIs and the serving cell are skipped
#[test]
fn test_first_resolvable_candidate_wins() {
    init_test_logging();

    let mut gnb = TestGnb::new(source_config());
    let ue_id = gnb.register(&TestUeConfig::default()).unwrap();

    let report = MeasurementReport::nr(1, 20, &[(77, 40), (1, 35), (6, 10)]);
    let t = gnb.manager.handle_event(ue_id, HandoverEvent::MeasurementReport(report)).unwrap();
    assert_eq!(t.outcome, Outcome::Started);
    assert_eq!(gnb.manager.transaction(ue_id).unwrap().target, CELL_2);

    let mut other = TestGnb::new(source_config());
    let ue_id = other.register(&TestUeConfig::default()).unwrap();
    let report = MeasurementReport::nr(1, 20, &[(77, 40), (501, 35)]);
    let t = other.manager.handle_event(ue_id, HandoverEvent::MeasurementReport(report)).unwrap();
    assert_eq!(t.outcome, Outcome::NoDecision);
    assert_eq!(other.manager.state(ue_id), Some(HandoverState::Idle));
}

/// Without a C-RNTI on the target cell the handover never starts
#[test]
fn test_crnti_exhaustion_rejects_decision() {
    init_test_logging();

    let mut gnb = TestGnb::with_scheduler(source_config(), LocalScheduler::with_crnti_budget(0));
    let ue_id = gnb.register(&TestUeConfig::default()).unwrap();

    let t = gnb.manager.handle_event(ue_id, report_towards(6)).unwrap();
    assert!(matches!(t.outcome, Outcome::Rejected(HandoverError::ResourceAllocation(_))));
    assert_eq!(gnb.manager.state(ue_id), Some(HandoverState::Idle));
    assert!(gnb.take_dl_dcch(ue_id).is_empty());
    assert_eq!(gnb.scheduler.association(ue_id).unwrap().cells.len(), 1);
}
