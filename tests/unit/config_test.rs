//! Tests for configuration parsing and validation

use rt_mutex_stress::config::{Backend, HarnessConfig, PrintMode};
use rt_mutex_stress::infra::ClockKind;
use rt_mutex_stress::config::harness::{
    DEFAULT_POLL_INTERVAL_US, DEFAULT_THROTTLE_INTERVAL, DEFAULT_WORKER_PRIORITY,
    DEFAULT_WORK_SPINS,
};
use rt_mutex_stress::runtime::{CpuSet, Topology};

#[test]
fn test_defaults() {
    let config = HarnessConfig::new();
    assert_eq!(config.iterations, 0);
    assert_eq!(config.workers, 0);
    assert_eq!(config.main_priority, 0);
    assert_eq!(config.worker_priority, DEFAULT_WORKER_PRIORITY);
    assert!(!config.keep_going);
    assert!(config.use_mutex);
    assert_eq!(config.print, PrintMode::All);
    assert_eq!(config.backend, Backend::Rt);
    assert_eq!(config.clock, ClockKind::Monotonic);
    assert_eq!(config.work_spins, DEFAULT_WORK_SPINS);
    assert_eq!(config.poll_interval_us, DEFAULT_POLL_INTERVAL_US);
    assert_eq!(config.throttle_interval, DEFAULT_THROTTLE_INTERVAL);
}

#[test]
fn test_json_partial_object_fills_defaults() {
    let config = HarnessConfig::from_json_str(
        r#"{ "iterations": 5000, "workers": 3, "print": "throttled", "backend": "generic" }"#,
    )
    .unwrap();

    assert_eq!(config.iterations, 5000);
    assert_eq!(config.workers, 3);
    assert_eq!(config.print, PrintMode::Throttled);
    assert_eq!(config.backend, Backend::Generic);
    assert_eq!(config.worker_priority, DEFAULT_WORKER_PRIORITY);
    assert!(config.use_mutex);
}

#[test]
fn test_json_empty_object_is_default() {
    assert_eq!(HarnessConfig::from_json_str("{}").unwrap(), HarnessConfig::default());
}

#[test]
fn test_json_invalid_input() {
    let err = HarnessConfig::from_json_str("{ iterations: ").unwrap_err();
    assert!(err.starts_with("parse error"));

    let err = HarnessConfig::from_json_str(r#"{ "print": "loud" }"#).unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_json_round_trip_preserves_flags() {
    let config = HarnessConfig::new().with_iterations(10).with_flags("kmt");
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(HarnessConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn test_validate_reports_first_violation() {
    let topology = Topology::from_cpus(CpuSet::from_cpus([0, 1, 2, 3]));
    let config = HarnessConfig::new().with_workers(8).with_main_priority(200);

    let err = config.validate(&topology, 99).unwrap_err();
    assert!(err.contains("too many threads"));

    let err = config.with_workers(4).validate(&topology, 99).unwrap_err();
    assert!(err.contains("too high priority"));
}

#[test]
fn test_zero_priorities_always_valid() {
    let topology = Topology::from_cpus(CpuSet::single(0));
    let config = HarnessConfig::new().with_workers(1).with_worker_priority(0);
    assert!(config.validate(&topology, 0).is_ok());
}

#[test]
fn test_poll_interval_conversion() {
    let config = HarnessConfig::new().with_poll_interval_us(250);
    assert_eq!(config.poll_interval().as_micros(), 250);
}

#[test]
fn test_json_clock_selection() {
    let config = HarnessConfig::from_json_str(r#"{ "clock": "realtime" }"#).unwrap();
    assert_eq!(config.clock, ClockKind::Realtime);
}

#[test]
fn test_negative_priorities_rejected() {
    let topology = Topology::from_cpus(CpuSet::single(0));

    let err = HarnessConfig::from_json_str(r#"{ "main_priority": -5 }"#)
        .unwrap()
        .validate(&topology, 99)
        .unwrap_err();
    assert!(err.contains("negative priority"));

    let config = HarnessConfig::new().with_worker_priority(-1);
    assert!(config.validate(&topology, 99).is_err());
}
