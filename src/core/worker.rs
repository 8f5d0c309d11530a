//! Worker threads: configure, attach, then contend on the shared mutex until
//! told to stop.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::core::context::{ErrorFlags, HarnessContext};
use crate::runtime::sched::{
    current_affinity, current_schedule, pin_current, set_current_schedule, CpuSet, SchedError,
    SchedPolicy,
};
use crate::util::work::busy_work;

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Thread exists, nothing configured yet.
    Created,
    /// Affinity and scheduling policy applied.
    Configured,
    /// Registered with the mutex provider.
    Attached,
    /// Inside the contention loop.
    Running,
    /// Loop left; outcome about to be returned.
    Stopped,
}

/// What a worker hands back at join time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerOutcome {
    /// Every failure class observed by this worker.
    pub flags: ErrorFlags,
    /// Loop iterations started.
    pub iterations: u64,
}

/// Result of a worker's scheduling setup, reported before it touches the
/// mutex.
pub(crate) type ReadyReport = (usize, Result<(), SchedError>);

struct Worker {
    index: usize,
    cpu: usize,
    ctx: Arc<HarnessContext>,
    state: WorkerState,
}

impl Worker {
    fn transition(&mut self, next: WorkerState) {
        debug!(worker = self.index, from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
    }

    fn configure(&mut self) -> Result<(), SchedError> {
        pin_current(&CpuSet::single(self.cpu))?;
        set_current_schedule(SchedPolicy::for_priority(self.ctx.config.worker_priority))?;
        let policy = current_schedule()?;
        debug!(worker = self.index, cpu = self.cpu, %policy, "Worker scheduling applied");
        self.transition(WorkerState::Configured);
        Ok(())
    }

    fn run(mut self, ready: Sender<ReadyReport>) -> WorkerOutcome {
        let print = self.ctx.config.print;
        if !print.is_silent() {
            info!(worker = self.index, cpu = self.cpu, "Thread {}", self.index);
        }

        let configured = self.configure();
        let setup_failed = configured.is_err();
        // The coordinator may already have given up; nothing to do about that.
        let _ = ready.send((self.index, configured));
        // Release our end now so the coordinator sees a disconnect if another
        // worker dies before reporting.
        drop(ready);
        if setup_failed {
            self.transition(WorkerState::Stopped);
            return WorkerOutcome {
                flags: ErrorFlags::OTHER,
                iterations: 0,
            };
        }

        if let Err(e) = self.ctx.provider.attach_thread(&format!("worker-{}", self.index)) {
            error!(worker = self.index, code = e.code(), error = %e, "attach_thread failed");
            self.transition(WorkerState::Stopped);
            return WorkerOutcome {
                flags: ErrorFlags::OTHER,
                iterations: 0,
            };
        }
        self.transition(WorkerState::Attached);

        match current_affinity() {
            Ok(affinity) => {
                if !print.is_silent() {
                    // one pre-assembled line so concurrent workers do not interleave
                    let line = format!("Affinity for {}: {affinity}", self.index);
                    info!(worker = self.index, "{line}");
                }
            }
            Err(e) => {
                error!(worker = self.index, error = %e, "reading affinity failed");
                self.transition(WorkerState::Stopped);
                return WorkerOutcome {
                    flags: ErrorFlags::OTHER,
                    iterations: 0,
                };
            }
        }

        self.transition(WorkerState::Running);
        let outcome = self.contend();
        self.transition(WorkerState::Stopped);
        outcome
    }

    fn contend(&self) -> WorkerOutcome {
        let config = &self.ctx.config;
        let print = config.print;
        let n = self.index;
        let mut outcome = WorkerOutcome::default();

        while !self.ctx.stop.is_requested() {
            let progress = print.prints_progress(outcome.iterations, config.throttle_interval);
            outcome.iterations += 1;
            let mut failed = false;

            if progress {
                info!(worker = n, "thread {n} waiting");
            }
            if config.use_mutex {
                match self.ctx.mutex.lock() {
                    Err(e) => {
                        if print.prints_errors() {
                            error!(worker = n, code = e.code(), error = %e, "thread {n} lock ERROR");
                        }
                        outcome.flags |= ErrorFlags::LOCK;
                        failed = true;
                    }
                    Ok(()) => {
                        if progress {
                            info!(worker = n, "thread {n} locked");
                        }
                        busy_work(config.work_spins);
                        match self.ctx.mutex.unlock() {
                            Err(e) => {
                                if print.prints_errors() {
                                    error!(worker = n, code = e.code(), error = %e, "thread {n} unlock ERROR");
                                }
                                outcome.flags |= ErrorFlags::UNLOCK;
                                failed = true;
                            }
                            Ok(()) => {
                                if progress {
                                    info!(worker = n, "thread {n} unlocked");
                                }
                            }
                        }
                    }
                }
            } else {
                busy_work(config.work_spins);
            }

            if failed && !config.keep_going {
                break;
            }
        }
        outcome
    }
}

/// Spawn worker `index` pinned to `cpu`.
///
/// The worker reports its scheduling setup on `ready` before touching the
/// mutex, then returns its [`WorkerOutcome`] through the join handle.
pub(crate) fn spawn_worker(
    index: usize,
    cpu: usize,
    ctx: Arc<HarnessContext>,
    ready: Sender<ReadyReport>,
) -> io::Result<JoinHandle<WorkerOutcome>> {
    thread::Builder::new()
        .name(format!("stress-worker-{index}"))
        .spawn(move || {
            let worker = Worker {
                index,
                cpu,
                ctx,
                state: WorkerState::Created,
            };
            worker.run(ready)
        })
}
