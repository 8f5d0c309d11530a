//! Tests for error types

use rt_mutex_stress::core::{aggregate_code, ErrorFlags, HarnessError, ERR_BITS};
use rt_mutex_stress::infra::ProviderError;

#[test]
fn test_invalid_config_error() {
    let err = HarnessError::InvalidConfig("too many threads".to_string());
    assert_eq!(format!("{}", err), "invalid configuration: too many threads");
    assert_eq!(err.exit_code(), ErrorFlags::OTHER.bits());
}

#[test]
fn test_provider_stage_error() {
    let err = HarnessError::Provider {
        stage: "create mutex",
        source: ProviderError::NotInitialized,
    };
    assert_eq!(format!("{}", err), "create mutex: provider not initialized");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_worker_setup_error() {
    let err = HarnessError::WorkerSetup {
        worker: 3,
        reason: "pin failed".to_string(),
    };
    assert_eq!(format!("{}", err), "worker 3 setup failed: pin failed");
}

#[test]
fn test_provider_error_display() {
    assert_eq!(format!("{}", ProviderError::Busy), "mutex busy");
    assert_eq!(format!("{}", ProviderError::NotOwner), "mutex not owned by caller");
    assert_eq!(
        format!("{}", ProviderError::Deadlock),
        "relock by owner would deadlock"
    );

    let os = ProviderError::Os { op: "pthread_mutex_init", errno: libc::EINVAL };
    let text = format!("{}", os);
    assert!(text.starts_with("pthread_mutex_init failed: "));
    assert!(text.ends_with(&format!("({})", libc::EINVAL)));
}

#[test]
fn test_provider_error_codes() {
    assert_eq!(ProviderError::NotInitialized.code(), -libc::ENXIO);
    assert_eq!(ProviderError::Deadlock.code(), -libc::EDEADLK);
    assert!(ProviderError::Os { op: "lock", errno: libc::EAGAIN }.code() < 0);
}

#[test]
fn test_exit_code_layout() {
    let coord = ErrorFlags::TRYLOCK;
    let workers = ErrorFlags::LOCK | ErrorFlags::UNLOCK;
    let code = aggregate_code(coord, workers);

    assert_eq!(code & ((1 << ERR_BITS) - 1), ErrorFlags::TRYLOCK.bits());
    assert_eq!(code >> ERR_BITS, (ErrorFlags::LOCK | ErrorFlags::UNLOCK).bits());
    assert_eq!(aggregate_code(ErrorFlags::empty(), ErrorFlags::empty()), 0);
}
