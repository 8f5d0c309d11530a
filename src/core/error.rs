//! Error types for harness setup.

use thiserror::Error;

use crate::core::context::ErrorFlags;
use crate::infra::provider::ProviderError;
use crate::runtime::sched::SchedError;

/// Fatal errors that abort a run before or during setup.
///
/// Operational lock/unlock/trylock failures are never reported through this
/// type; they are classified into [`ErrorFlags`] instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration rejected before any thread was created.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Mutex provider failure during setup.
    #[error("{stage}: {source}")]
    Provider {
        /// Setup step that failed.
        stage: &'static str,
        /// Underlying provider error.
        #[source]
        source: ProviderError,
    },
    /// Scheduling or affinity failure on the coordinator thread.
    #[error("{stage}: {source}")]
    Sched {
        /// Setup step that failed.
        stage: &'static str,
        /// Underlying scheduling error.
        #[source]
        source: SchedError,
    },
    /// The OS refused to create a worker thread.
    #[error("an error occurred while creating thread {worker}: {source}")]
    Spawn {
        /// Index of the worker that could not be created.
        worker: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A worker could not apply its affinity or scheduling policy.
    #[error("worker {worker} setup failed: {reason}")]
    WorkerSetup {
        /// Index of the failing worker.
        worker: usize,
        /// Human-readable cause.
        reason: String,
    },
    /// The SIGINT handler could not be installed.
    #[error("installing SIGINT handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl HarnessError {
    /// Exit code for a fatal setup error. Always the "other" class.
    #[must_use]
    pub const fn exit_code(&self) -> u32 {
        ErrorFlags::OTHER.bits()
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
