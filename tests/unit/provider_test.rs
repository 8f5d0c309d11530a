//! Tests for both mutex providers through the trait objects the harness uses

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rt_mutex_stress::config::Backend;
use rt_mutex_stress::infra::{MutexAttrs, MutexHandle, MutexProvider, ProviderError};

fn created(backend: Backend) -> (Arc<dyn MutexProvider>, Arc<dyn MutexHandle>) {
    let provider = backend.provider();
    provider.init().unwrap();
    let mutex = provider.create(&MutexAttrs::named("unit-mutex")).unwrap();
    (provider, mutex)
}

#[test]
fn test_create_before_init_fails() {
    for backend in [Backend::Rt, Backend::Generic] {
        let provider = backend.provider();
        let err = provider
            .create(&MutexAttrs::named("early"))
            .err()
            .unwrap();
        assert_eq!(err, ProviderError::NotInitialized);
    }
}

#[test]
fn test_lock_unlock_cycle() {
    for backend in [Backend::Rt, Backend::Generic] {
        let (_provider, mutex) = created(backend);
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
        mutex.try_lock().unwrap();
        mutex.unlock().unwrap();
    }
}

#[test]
fn test_try_lock_busy_from_other_thread() {
    for backend in [Backend::Rt, Backend::Generic] {
        let (_provider, mutex) = created(backend);
        mutex.lock().unwrap();

        let contender = Arc::clone(&mutex);
        let result = thread::spawn(move || contender.try_lock()).join().unwrap();
        assert_eq!(result, Err(ProviderError::Busy));

        mutex.unlock().unwrap();
    }
}

#[test]
fn test_unlock_by_non_owner_rejected() {
    for backend in [Backend::Rt, Backend::Generic] {
        let (_provider, mutex) = created(backend);
        mutex.lock().unwrap();

        let stranger = Arc::clone(&mutex);
        let result = thread::spawn(move || stranger.unlock()).join().unwrap();
        assert_eq!(result, Err(ProviderError::NotOwner));

        mutex.unlock().unwrap();
    }
}

#[test]
fn test_unlock_when_free_rejected() {
    for backend in [Backend::Rt, Backend::Generic] {
        let (_provider, mutex) = created(backend);
        assert!(mutex.unlock().is_err());
    }
}

#[test]
fn test_relock_by_owner_is_deadlock() {
    for backend in [Backend::Rt, Backend::Generic] {
        let (_provider, mutex) = created(backend);
        mutex.lock().unwrap();
        assert_eq!(mutex.lock(), Err(ProviderError::Deadlock));
        mutex.unlock().unwrap();
    }
}

#[test]
fn test_blocked_lock_acquires_after_release() {
    let (_provider, mutex) = created(Backend::Generic);
    mutex.lock().unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let mutex = Arc::clone(&mutex);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            mutex.lock().unwrap();
            acquired.store(true, Ordering::SeqCst);
            mutex.unlock().unwrap();
        })
    };

    thread::sleep(std::time::Duration::from_millis(20));
    assert!(!acquired.load(Ordering::SeqCst));
    mutex.unlock().unwrap();
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_attach_thread_named() {
    for backend in [Backend::Rt, Backend::Generic] {
        let (provider, _mutex) = created(backend);
        thread::spawn(move || provider.attach_thread("unit-attach").unwrap())
            .join()
            .unwrap();
    }
}
