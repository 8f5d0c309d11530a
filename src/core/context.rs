//! Shared run state: the stop flag, error bitmasks, and the context handed to
//! every thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::infra::provider::{MutexHandle, MutexProvider};

/// Number of low-order exit-code bits reserved for the coordinator's own
/// flags. Worker flags are shifted above them.
pub const ERR_BITS: u32 = 4;

bitflags! {
    /// Classes of failure observed during a run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ErrorFlags: u32 {
        /// Setup failure, attachment failure, or a panicked worker.
        const OTHER = 1 << 0;
        /// `try_lock` failed with something other than "busy".
        const TRYLOCK = 1 << 1;
        /// `unlock` failed.
        const UNLOCK = 1 << 2;
        /// `lock` failed.
        const LOCK = 1 << 3;
    }
}

/// Combine the coordinator's flags with the OR of all worker flags into the
/// process exit code.
#[must_use]
pub const fn aggregate_code(coordinator: ErrorFlags, workers: ErrorFlags) -> u32 {
    coordinator.bits() | (workers.bits() << ERR_BITS)
}

/// Monotonic cooperative stop signal.
///
/// Once requested it is never cleared. A stale `false` read only delays a
/// loop by one iteration.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a fresh, un-requested flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that every loop observing this flag terminates.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// The underlying atomic, for the signal bridge.
    pub(crate) fn as_atomic(&self) -> &Arc<AtomicBool> {
        &self.0
    }
}

/// Everything a worker needs, shared by reference-counted pointer.
pub struct HarnessContext {
    /// Immutable run configuration.
    pub config: Arc<HarnessConfig>,
    /// Provider the mutex was created from; workers attach through it.
    pub provider: Arc<dyn MutexProvider>,
    /// The single mutex under test.
    pub mutex: Arc<dyn MutexHandle>,
    /// Cooperative stop signal.
    pub stop: StopFlag,
}

impl std::fmt::Debug for HarnessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessContext")
            .field("provider", &self.provider.name())
            .field("stop", &self.stop.is_requested())
            .finish_non_exhaustive()
    }
}
