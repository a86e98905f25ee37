//! gNB Application Module
//!
//! Configuration loading and validation, plus the scenario files the
//! binary replays against a running mobility task.

mod config_loader;
mod scenario;

pub use config_loader::{
    load_and_validate_gnb_config, load_gnb_config, load_gnb_config_from_str, validate_gnb_config,
    ConfigError, ConfigValidationError, MAX_GNB_ID,
};

pub use scenario::{load_scenario, Scenario, ScenarioErab, ScenarioError, ScenarioStep, ScenarioUe};
