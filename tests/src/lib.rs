//! Integration test framework for ranmob
#![allow(missing_docs)]
//!
//! This crate provides test utilities and mock components for integration
//! testing of the handover procedures across one or two gNBs.
//!
//! # Components
//!
//! - [`mock_amf`] - Mock AMF relaying N2 handover signalling between gNBs
//! - [`test_fixtures`] - gNB layouts, test UEs and the [`TestGnb`] wrapper
//! - [`test_utils`] - Utility functions for test setup and assertions
//!
//! # Test Categories
//!
//! 1. **Intra-gNB Handover Tests** - Cell change within one gNB
//! 2. **Inter-gNB Handover Tests** - Relocation through the mock AMF
//! 3. **Failure Tests** - Preparation failure, cancel, decode errors
//! 4. **Multi-UE Tests** - Independent transactions per UE

pub mod mock_amf;
pub mod test_fixtures;

pub use mock_amf::{MockAmf, MockAmfError, MockAmfEvent, MockHandover, MOCK_KAMF};
pub use test_fixtures::{
    source_config, target_config, TestGnb, TestUeConfig, SOURCE_GNB_ID, SOURCE_GNB_YAML, TARGET_GNB_ID,
    TARGET_GNB_YAML,
};
pub use test_utils::{
    decode_reconfiguration, init_test_logging, recv_within, wait_for_state, TestResult, DEFAULT_POLL_INTERVAL,
    DEFAULT_TEST_TIMEOUT,
};
