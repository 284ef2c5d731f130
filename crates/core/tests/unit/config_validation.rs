//! `Config::validate` is exercised through the public crate boundary, as a
//! caller loading a config file would see it.

use mcpsim_core::config::{Config, SimMode};

#[test]
fn default_config_is_valid() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn unsupported_standard_is_rejected() {
    let mut config = Config::default();
    config.standard = "DDR4".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn offload_mode_without_mcp_cores_is_rejected() {
    let mut config = Config::default();
    config.sim_mode = SimMode::AllOffload;
    config.number_mcp_cores = 0;
    assert!(config.validate().is_err());
}

#[test]
fn host_only_mode_tolerates_zero_mcp_cores() {
    let mut config = Config::default();
    config.sim_mode = SimMode::HostOnly;
    config.number_mcp_cores = 0;
    assert!(config.validate().is_ok());
}
