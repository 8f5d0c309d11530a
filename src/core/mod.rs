//! Harness orchestration: coordinator, workers, shared context and errors.

pub mod context;
pub mod coordinator;
pub mod error;
pub mod worker;

pub use context::{aggregate_code, ErrorFlags, HarnessContext, StopFlag, ERR_BITS};
pub use coordinator::{Coordinator, RunReport, WorkerReport, MUTEX_NAME};
pub use error::{AppResult, HarnessError};
pub use worker::{WorkerOutcome, WorkerState};
