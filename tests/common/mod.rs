//! Shared test fixtures: an instrumented provider that counts calls, checks
//! held-state before every unlock, and can inject failures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rt_mutex_stress::config::{Backend, HarnessConfig, PrintMode};
use rt_mutex_stress::infra::{
    ClockKind, GenericProvider, MutexAttrs, MutexHandle, MutexProvider, ProviderError,
};
use rt_mutex_stress::runtime::Topology;

/// Which operation the instrumented provider sabotages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Behave.
    None,
    /// Every lock/try_lock/unlock fails, on every thread.
    Everything,
    /// `lock` fails on worker threads.
    WorkerLock,
    /// `unlock` on worker threads reports failure after releasing.
    WorkerUnlock,
    /// `try_lock` fails with a non-busy error.
    TryLock,
    /// `unlock` on the coordinator reports failure after releasing, once the
    /// guard cycle is over.
    MainUnlock,
    /// `attach_thread` fails on worker threads.
    WorkerAttach,
    /// `attach_thread` fails on the coordinator.
    MainAttach,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub locks: AtomicU64,
    pub try_locks: AtomicU64,
    pub unlocks: AtomicU64,
    pub attaches: AtomicU64,
    /// Unlocks attempted by a thread that did not hold the mutex.
    pub violations: AtomicU64,
}

impl Counters {
    pub fn mutex_calls(&self) -> u64 {
        self.locks.load(Ordering::SeqCst)
            + self.try_locks.load(Ordering::SeqCst)
            + self.unlocks.load(Ordering::SeqCst)
    }
}

fn on_worker_thread() -> bool {
    thread::current()
        .name()
        .is_some_and(|name| name.starts_with("stress-worker-"))
}

fn injected(op: &'static str) -> ProviderError {
    ProviderError::Os { op, errno: libc::EIO }
}

pub struct InstrumentedProvider {
    inner: GenericProvider,
    fault: Fault,
    pub counters: Arc<Counters>,
    /// Clock requested by the last `create`.
    pub created_clock: Mutex<Option<ClockKind>>,
}

impl InstrumentedProvider {
    pub fn new(fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner: GenericProvider::new(),
            fault,
            counters: Arc::new(Counters::default()),
            created_clock: Mutex::new(None),
        })
    }
}

impl MutexProvider for InstrumentedProvider {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    fn init(&self) -> Result<(), ProviderError> {
        self.inner.init()
    }

    fn create(&self, attrs: &MutexAttrs) -> Result<Arc<dyn MutexHandle>, ProviderError> {
        *self.created_clock.lock() = Some(attrs.clock);
        Ok(Arc::new(InstrumentedMutex {
            inner: self.inner.create(attrs)?,
            holder: Mutex::new(None),
            fault: self.fault,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn attach_thread(&self, name: &str) -> Result<(), ProviderError> {
        self.counters.attaches.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::WorkerAttach if on_worker_thread() => Err(injected("attach_thread")),
            Fault::MainAttach if !on_worker_thread() => Err(injected("attach_thread")),
            _ => self.inner.attach_thread(name),
        }
    }
}

struct InstrumentedMutex {
    inner: Arc<dyn MutexHandle>,
    holder: Mutex<Option<ThreadId>>,
    fault: Fault,
    counters: Arc<Counters>,
}

impl InstrumentedMutex {
    fn acquired(&self) {
        *self.holder.lock() = Some(thread::current().id());
    }
}

impl MutexHandle for InstrumentedMutex {
    fn lock(&self) -> Result<(), ProviderError> {
        self.counters.locks.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::Everything => return Err(injected("lock")),
            Fault::WorkerLock if on_worker_thread() => return Err(injected("lock")),
            _ => {}
        }
        self.inner.lock()?;
        self.acquired();
        Ok(())
    }

    fn try_lock(&self) -> Result<(), ProviderError> {
        self.counters.try_locks.fetch_add(1, Ordering::SeqCst);
        if matches!(self.fault, Fault::Everything | Fault::TryLock) {
            return Err(injected("try_lock"));
        }
        self.inner.try_lock()?;
        self.acquired();
        Ok(())
    }

    fn unlock(&self) -> Result<(), ProviderError> {
        self.counters.unlocks.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Everything {
            return Err(injected("unlock"));
        }
        {
            let mut holder = self.holder.lock();
            if *holder != Some(thread::current().id()) {
                self.counters.violations.fetch_add(1, Ordering::SeqCst);
            }
            *holder = None;
        }
        self.inner.unlock()?;
        if self.fault == Fault::WorkerUnlock && on_worker_thread() {
            return Err(injected("unlock"));
        }
        // the guard cycle precedes every try_lock
        if self.fault == Fault::MainUnlock
            && !on_worker_thread()
            && self.counters.try_locks.load(Ordering::SeqCst) > 0
        {
            return Err(injected("unlock"));
        }
        Ok(())
    }
}

/// Worker count the machine can take, capped at `wanted`.
pub fn workers_up_to(wanted: usize) -> usize {
    wanted.min(Topology::discover().len())
}

/// Short, quiet, unprivileged run configuration.
pub fn test_config(iterations: u64, workers: usize) -> HarnessConfig {
    HarnessConfig::new()
        .with_iterations(iterations)
        .with_workers(workers)
        .with_main_priority(0)
        .with_worker_priority(0)
        .with_print(PrintMode::Errors)
        .with_backend(Backend::Generic)
        .with_work_spins(1_000)
        .with_poll_interval_us(10)
}
