//! The coordinator: sets up the run, polls the mutex, joins the workers and
//! folds every outcome into one exit code.
//!
//! # Setup ordering
//!
//! 1. Validate the configuration against the machine
//! 2. Initialize the provider and create the mutex
//! 3. Apply the coordinator's own scheduling policy, attach to the provider,
//!    then widen the coordinator's affinity to every CPU (attaching may have
//!    pinned it to one)
//! 4. Hold the mutex while every worker is created, then release it so all
//!    workers race for the first critical section together
//!
//! Any failure in these steps is fatal. After that, operational errors are
//! recorded in [`ErrorFlags`] and termination flows only through the
//! [`StopFlag`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{Backend, HarnessConfig};
use crate::core::context::{aggregate_code, ErrorFlags, HarnessContext, StopFlag};
use crate::core::error::HarnessError;
use crate::core::worker::{spawn_worker, WorkerOutcome};
use crate::infra::provider::{MutexAttrs, MutexHandle, MutexProvider, ProviderError};
use crate::runtime::sched::{max_fifo_priority, pin_current, set_current_schedule, SchedPolicy};
use crate::runtime::signal::install_interrupt_handler;
use crate::runtime::Topology;

/// Name the mutex under test is created with.
pub const MUTEX_NAME: &str = "test-mutex";

/// Per-worker summary in a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Worker index, in creation order.
    pub index: usize,
    /// CPU the worker was pinned to.
    pub cpu: usize,
    /// Failure classes observed by the worker.
    pub flags: ErrorFlags,
    /// Loop iterations the worker started.
    pub iterations: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Provider that was exercised.
    pub backend: Backend,
    /// Failures in the coordinator's own polling loop.
    pub coordinator_flags: ErrorFlags,
    /// OR of every worker's flags.
    pub worker_flags: ErrorFlags,
    /// Polling iterations the coordinator performed.
    pub main_iterations: u64,
    /// Whether the stop flag was raised externally before the loop ended.
    pub interrupted: bool,
    /// Every joined worker, in creation order.
    pub workers: Vec<WorkerReport>,
}

impl RunReport {
    /// Aggregate exit code: coordinator flags in the low bits, worker flags
    /// shifted above them.
    #[must_use]
    pub const fn exit_code(&self) -> u32 {
        aggregate_code(self.coordinator_flags, self.worker_flags)
    }

    /// Whether no failure of any kind was recorded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

struct WorkerSlot {
    index: usize,
    cpu: usize,
    handle: JoinHandle<WorkerOutcome>,
}

/// Drives one stress run.
pub struct Coordinator {
    config: Arc<HarnessConfig>,
    provider: Arc<dyn MutexProvider>,
    topology: Topology,
    stop: StopFlag,
}

impl Coordinator {
    /// Coordinator for `config`, using the provider its backend selects and
    /// the CPUs this process may run on.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        let provider = config.backend.provider();
        Self::with_provider(config, provider)
    }

    /// Coordinator exercising an explicit provider.
    #[must_use]
    pub fn with_provider(config: HarnessConfig, provider: Arc<dyn MutexProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            topology: Topology::discover(),
            stop: StopFlag::new(),
        }
    }

    /// Replace the discovered topology.
    #[must_use]
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// The run's stop flag. Requesting it ends the run early.
    #[must_use]
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Route SIGINT to this run's stop flag.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Signal`] if the handler cannot be registered.
    pub fn install_signal_handler(&self) -> Result<(), HarnessError> {
        install_interrupt_handler(&self.stop)
    }

    /// Validate the configuration against this machine.
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidConfig`] when the worker count exceeds the
    /// available processors or a priority exceeds the `SCHED_FIFO` maximum.
    pub fn validate(&self) -> Result<(), HarnessError> {
        self.config
            .validate(&self.topology, max_fifo_priority())
            .map_err(HarnessError::InvalidConfig)
    }

    /// Execute the run to completion.
    ///
    /// # Errors
    ///
    /// Any setup failure. Lock/unlock/trylock failures are not errors here;
    /// they are reported through [`RunReport::exit_code`].
    pub fn run(self) -> Result<RunReport, HarnessError> {
        self.validate()?;
        let config = Arc::clone(&self.config);
        let silent = config.print.is_silent();
        if !silent {
            info!(backend = self.provider.name(), "Using {}", self.provider.name());
            info!(workers = config.workers, "NumThreads: {}", config.workers);
        }

        let mutex = self.create_mutex()?;
        self.configure_self()?;

        let ctx = Arc::new(HarnessContext {
            config: Arc::clone(&config),
            provider: Arc::clone(&self.provider),
            mutex: Arc::clone(&mutex),
            stop: self.stop.clone(),
        });

        let registry = self.launch_workers(&ctx)?;

        let (coordinator_flags, main_iterations) = self.poll(mutex.as_ref());
        let interrupted = self.stop.is_requested();
        self.stop.request();

        let (worker_flags, workers) = self.join_all(registry);

        let report = RunReport {
            backend: config.backend,
            coordinator_flags,
            worker_flags,
            main_iterations,
            interrupted,
            workers,
        };
        if !silent {
            if report.is_success() {
                info!(exit_code = 0, "SUCCESS");
            } else {
                error!(exit_code = report.exit_code(), "ERROR");
            }
        }
        Ok(report)
    }

    fn create_mutex(&self) -> Result<Arc<dyn MutexHandle>, HarnessError> {
        self.provider.init().map_err(|source| HarnessError::Provider {
            stage: "provider init",
            source,
        })?;
        self.provider
            .create(&MutexAttrs {
                clock: self.config.clock,
                ..MutexAttrs::named(MUTEX_NAME)
            })
            .map_err(|source| HarnessError::Provider {
                stage: "mutex create",
                source,
            })
    }

    /// Scheduling first so attachment inherits it; widen affinity last,
    /// before any worker can compete for our CPU.
    fn configure_self(&self) -> Result<(), HarnessError> {
        set_current_schedule(SchedPolicy::for_priority(self.config.main_priority)).map_err(
            |source| HarnessError::Sched {
                stage: "main scheduling",
                source,
            },
        )?;
        self.provider
            .attach_thread("main")
            .map_err(|source| HarnessError::Provider {
                stage: "attach main",
                source,
            })?;
        pin_current(self.topology.all()).map_err(|source| HarnessError::Sched {
            stage: "widen main affinity",
            source,
        })
    }

    fn launch_workers(&self, ctx: &Arc<HarnessContext>) -> Result<Vec<WorkerSlot>, HarnessError> {
        let use_mutex = self.config.use_mutex;
        if use_mutex {
            ctx.mutex.lock().map_err(|source| HarnessError::Provider {
                stage: "guard lock",
                source,
            })?;
        }

        let (ready_tx, ready_rx) = bounded(self.config.workers.max(1));
        let mut registry = Vec::with_capacity(self.config.workers);
        for index in 0..self.config.workers {
            let Some(cpu) = self.topology.worker_cpu(index) else {
                self.abandon(ctx, registry, use_mutex);
                return Err(HarnessError::InvalidConfig(format!(
                    "no CPU left for worker {index}"
                )));
            };
            match spawn_worker(index, cpu, Arc::clone(ctx), ready_tx.clone()) {
                Ok(handle) => registry.push(WorkerSlot { index, cpu, handle }),
                Err(source) => {
                    self.abandon(ctx, registry, use_mutex);
                    return Err(HarnessError::Spawn {
                        worker: index,
                        source,
                    });
                }
            }
        }
        drop(ready_tx);

        let mut reported = vec![false; registry.len()];
        let mut setup_failure = None;
        while reported.iter().any(|done| !done) {
            match ready_rx.recv() {
                Ok((worker, result)) => {
                    reported[worker] = true;
                    if let Err(e) = result {
                        error!(worker = worker, error = %e, "Worker scheduling setup failed");
                        if setup_failure.is_none() {
                            setup_failure = Some(HarnessError::WorkerSetup {
                                worker,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Err(_) => {
                    let worker = reported.iter().position(|done| !done).unwrap_or_default();
                    setup_failure = setup_failure.or(Some(HarnessError::WorkerSetup {
                        worker,
                        reason: "worker exited before reporting setup".into(),
                    }));
                    break;
                }
            }
        }
        if let Some(err) = setup_failure {
            self.abandon(ctx, registry, use_mutex);
            return Err(err);
        }

        if !self.config.print.is_silent() {
            info!("All threads go");
        }
        if use_mutex {
            if let Err(source) = ctx.mutex.unlock() {
                // Workers may be parked behind the held mutex; they are left
                // detached and the caller is expected to exit.
                error!(code = source.code(), "main ERROR unlock before loop");
                self.stop.request();
                return Err(HarnessError::Provider {
                    stage: "guard unlock",
                    source,
                });
            }
            if !self.config.print.is_silent() {
                info!("main unlocked before loop");
            }
        }
        Ok(registry)
    }

    /// Tear down a partially launched run: stop, release the guard, join.
    fn abandon(&self, ctx: &HarnessContext, registry: Vec<WorkerSlot>, guard_held: bool) {
        self.stop.request();
        if guard_held {
            if let Err(e) = ctx.mutex.unlock() {
                warn!(error = %e, "Releasing guard during abort failed");
            }
        }
        for slot in registry {
            let _ = slot.handle.join();
        }
    }

    fn poll(&self, mutex: &dyn MutexHandle) -> (ErrorFlags, u64) {
        let config = &self.config;
        let interval = config.poll_interval();
        let mut flags = ErrorFlags::empty();
        let mut n = 0u64;

        while n < config.iterations && !self.stop.is_requested() {
            let result = self.poll_once(mutex, n);
            n += 1;
            if let Err(flag) = result {
                flags |= flag;
                if !config.keep_going {
                    break;
                }
            }
            thread::sleep(interval);
        }
        (flags, n)
    }

    fn poll_once(&self, mutex: &dyn MutexHandle, n: u64) -> Result<(), ErrorFlags> {
        let print = self.config.print;
        let progress = print.prints_progress(n, self.config.throttle_interval);
        if progress {
            info!(iteration = n, "main try_lock {n}");
        }
        if !self.config.use_mutex {
            return Ok(());
        }

        match mutex.try_lock() {
            Ok(()) => {
                if progress {
                    info!("main locked");
                }
                if let Err(e) = mutex.unlock() {
                    if print.prints_errors() {
                        error!(code = e.code(), error = %e, "main ERROR unlock");
                    }
                    return Err(ErrorFlags::UNLOCK);
                }
                if progress {
                    info!("main unlocked");
                }
                Ok(())
            }
            Err(ProviderError::Busy) => {
                if progress {
                    info!("main try_lock: busy");
                }
                Ok(())
            }
            Err(e) => {
                if print.prints_errors() {
                    error!(code = e.code(), error = %e, "main ERROR try_lock");
                }
                Err(ErrorFlags::TRYLOCK)
            }
        }
    }

    fn join_all(&self, registry: Vec<WorkerSlot>) -> (ErrorFlags, Vec<WorkerReport>) {
        let silent = self.config.print.is_silent();
        let mut flags = ErrorFlags::empty();
        let mut reports = Vec::with_capacity(registry.len());

        for slot in registry {
            if !silent {
                info!(worker = slot.index, "Joining {}", slot.index);
            }
            let outcome = slot.handle.join().unwrap_or_else(|_| {
                error!(worker = slot.index, "Worker panicked");
                WorkerOutcome {
                    flags: ErrorFlags::OTHER,
                    iterations: 0,
                }
            });
            if !silent {
                info!(
                    worker = slot.index,
                    flags = outcome.flags.bits(),
                    iterations = outcome.iterations,
                    "Joined {}",
                    slot.index
                );
            }
            flags |= outcome.flags;
            reports.push(WorkerReport {
                index: slot.index,
                cpu: slot.cpu,
                flags: outcome.flags,
                iterations: outcome.iterations,
            });
        }
        (flags, reports)
    }
}
