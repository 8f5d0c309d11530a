//! # RT Mutex Stress
//!
//! A contention stress harness for real-time mutex providers.
//!
//! The harness spins up a configurable number of worker threads, each pinned to
//! its own CPU and (optionally) running under `SCHED_FIFO`, that repeatedly
//! lock, busy-work and unlock a single shared mutex. Meanwhile the coordinator
//! thread polls the same mutex with non-blocking `try_lock` calls. Every
//! lock/unlock/trylock failure is classified into an error bitmask, and the
//! combined bitmask becomes the process exit code.
//!
//! ## Key Features
//!
//! - **Two interchangeable providers**: a priority-inheriting pthread mutex
//!   (`Backend::Rt`) and a `parking_lot` fallback (`Backend::Generic`)
//! - **Deterministic setup**: priorities validated up front, coordinator
//!   affinity widened before any worker exists, workers pinned last-CPU-first
//! - **Deterministic fan-out**: the coordinator holds the mutex while the
//!   workers are created
//! - **Cooperative shutdown**: iteration budget, first error, or SIGINT all
//!   funnel into one monotonic stop flag
//!
//! ## Example
//!
//! ```rust,no_run
//! use rt_mutex_stress::config::{Backend, HarnessConfig, PrintMode};
//! use rt_mutex_stress::core::Coordinator;
//!
//! let config = HarnessConfig::new()
//!     .with_iterations(10_000)
//!     .with_workers(2)
//!     .with_print(PrintMode::Errors)
//!     .with_backend(Backend::Generic);
//!
//! let coordinator = Coordinator::new(config);
//! let report = coordinator.run()?;
//! assert_eq!(report.exit_code(), 0);
//! # Ok::<(), rt_mutex_stress::core::HarnessError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Harness orchestration: coordinator, workers, shared context and errors.
pub mod core;
/// Configuration models for a stress run.
pub mod config;
/// Mutex provider adapters under test.
pub mod infra;
/// OS-level scheduling, CPU topology and signal plumbing.
pub mod runtime;
/// Shared utilities.
pub mod util;
