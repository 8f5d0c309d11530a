//! Stress run configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infra::provider::{ClockKind, GenericProvider, MutexProvider, RtProvider};
use crate::runtime::Topology;

/// Priority given to every worker thread unless overridden.
pub const DEFAULT_WORKER_PRIORITY: i32 = 94;
/// Busy-spin steps performed while holding the mutex.
pub const DEFAULT_WORK_SPINS: u32 = 100_000;
/// Delay between coordinator `try_lock` attempts, in microseconds.
pub const DEFAULT_POLL_INTERVAL_US: u64 = 100;
/// Progress is printed every this many iterations in throttled mode.
pub const DEFAULT_THROTTLE_INTERVAL: u64 = 500;

/// How much diagnostic output a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintMode {
    /// Nothing at all.
    None,
    /// Error diagnostics only.
    Errors,
    /// Errors plus every Nth progress line.
    Throttled,
    /// Every progress line.
    #[default]
    All,
}

impl PrintMode {
    /// Whether all output, including banners and join events, is suppressed.
    #[must_use]
    pub const fn is_silent(self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether error diagnostics are emitted.
    #[must_use]
    pub const fn prints_errors(self) -> bool {
        !self.is_silent()
    }

    /// Whether the progress line for iteration `counter` is emitted.
    #[must_use]
    pub const fn prints_progress(self, counter: u64, interval: u64) -> bool {
        match self {
            Self::All => true,
            Self::Throttled => interval != 0 && counter % interval == 0,
            Self::None | Self::Errors => false,
        }
    }
}

/// Which mutex provider to exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Priority-inheriting pthread mutex.
    #[default]
    Rt,
    /// `parking_lot` fallback.
    Generic,
}

impl Backend {
    /// Instantiate the provider for this backend.
    #[must_use]
    pub fn provider(self) -> Arc<dyn MutexProvider> {
        match self {
            Self::Rt => Arc::new(RtProvider::new()),
            Self::Generic => Arc::new(GenericProvider::new()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rt => write!(f, "rt"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rt" | "evl" => Ok(Self::Rt),
            "generic" | "pthread" => Ok(Self::Generic),
            other => Err(format!("unknown backend `{other}` (expected `rt` or `generic`)")),
        }
    }
}

/// Configuration for one stress run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Coordinator `try_lock` iterations.
    pub iterations: u64,
    /// Number of worker threads.
    pub workers: usize,
    /// Coordinator priority; `0` means default time-shared scheduling.
    pub main_priority: i32,
    /// Worker priority; `0` means default time-shared scheduling.
    pub worker_priority: i32,
    /// Record operational errors and continue instead of stopping.
    pub keep_going: bool,
    /// Diagnostic verbosity.
    pub print: PrintMode,
    /// When false, loops run without ever touching the mutex.
    pub use_mutex: bool,
    /// Provider under test.
    pub backend: Backend,
    /// Clock the mutex is created with.
    pub clock: ClockKind,
    /// Busy-spin steps inside each worker critical section.
    pub work_spins: u32,
    /// Delay between coordinator polls, in microseconds.
    pub poll_interval_us: u64,
    /// Throttled-mode print interval.
    pub throttle_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            iterations: 0,
            workers: 0,
            main_priority: 0,
            worker_priority: DEFAULT_WORKER_PRIORITY,
            keep_going: false,
            print: PrintMode::All,
            use_mutex: true,
            backend: Backend::Rt,
            clock: ClockKind::Monotonic,
            work_spins: DEFAULT_WORK_SPINS,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        }
    }
}

impl HarnessConfig {
    /// Default configuration: no iterations, no workers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coordinator iteration budget.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the coordinator priority.
    #[must_use]
    pub const fn with_main_priority(mut self, priority: i32) -> Self {
        self.main_priority = priority;
        self
    }

    /// Set the worker priority.
    #[must_use]
    pub const fn with_worker_priority(mut self, priority: i32) -> Self {
        self.worker_priority = priority;
        self
    }

    /// Enable or disable keep-going mode.
    #[must_use]
    pub const fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Set the print mode.
    #[must_use]
    pub const fn with_print(mut self, print: PrintMode) -> Self {
        self.print = print;
        self
    }

    /// Enable or disable use of the mutex.
    #[must_use]
    pub const fn with_mutex(mut self, use_mutex: bool) -> Self {
        self.use_mutex = use_mutex;
        self
    }

    /// Select the provider.
    #[must_use]
    pub const fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Select the clock the mutex is created with.
    #[must_use]
    pub const fn with_clock(mut self, clock: ClockKind) -> Self {
        self.clock = clock;
        self
    }

    /// Set the busy-spin length of each critical section.
    #[must_use]
    pub const fn with_work_spins(mut self, spins: u32) -> Self {
        self.work_spins = spins;
        self
    }

    /// Set the coordinator polling delay.
    #[must_use]
    pub const fn with_poll_interval_us(mut self, micros: u64) -> Self {
        self.poll_interval_us = micros;
        self
    }

    /// Apply a flags string. Each character independently selects an option:
    ///
    /// - `k`: keep going on error
    /// - `q`: print nothing
    /// - `e`: print errors only
    /// - `t`: throttled printing
    /// - `a`: print everything
    /// - `m`: do not use the mutex
    ///
    /// Later print selections override earlier ones; other characters are
    /// ignored.
    #[must_use]
    pub fn with_flags(mut self, flags: &str) -> Self {
        for flag in flags.chars() {
            match flag {
                'k' => self.keep_going = true,
                'q' => self.print = PrintMode::None,
                'e' => self.print = PrintMode::Errors,
                't' => self.print = PrintMode::Throttled,
                'a' => self.print = PrintMode::All,
                'm' => self.use_mutex = false,
                _ => {}
            }
        }
        self
    }

    /// Coordinator polling delay.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Validate against the machine the run will execute on.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self, topology: &Topology, max_priority: i32) -> Result<(), String> {
        if self.main_priority < 0 || self.worker_priority < 0 {
            return Err(format!(
                "negative priority: main {}, worker {}",
                self.main_priority, self.worker_priority
            ));
        }
        if self.workers > topology.len() {
            return Err(format!(
                "too many threads: {} requested, {} processors available",
                self.workers,
                topology.len()
            ));
        }
        if self.main_priority > max_priority {
            return Err(format!(
                "too high priority: main priority {} exceeds maximum {max_priority}",
                self.main_priority
            ));
        }
        if self.worker_priority > max_priority {
            return Err(format!(
                "too high priority: worker priority {} exceeds maximum {max_priority}",
                self.worker_priority
            ));
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string.
    ///
    /// Missing fields take their defaults. Machine-dependent limits are checked
    /// later by [`HarnessConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns a description of the parse failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))
    }
}
