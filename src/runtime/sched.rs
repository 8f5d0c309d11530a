//! Scheduling configurator: policy, priority and CPU affinity for the calling
//! thread.
//!
//! Everything here acts on the *calling* thread. Workers configure themselves
//! on entry; the coordinator configures itself before spawning them.

#![allow(unsafe_code)]

use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from scheduling and affinity calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{op}: {} ({errno})", os_message(.errno))]
pub struct SchedError {
    /// Failing call.
    pub op: &'static str,
    /// Positive errno value.
    pub errno: i32,
}

fn os_message(errno: &i32) -> String {
    std::io::Error::from_raw_os_error(*errno).to_string()
}

impl SchedError {
    fn last_os(op: &'static str) -> Self {
        Self {
            op,
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Scheduling policy for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedPolicy {
    /// Fixed-priority first-in-first-out at the given priority.
    Fifo(i32),
    /// Default time-shared scheduling.
    Other,
}

impl SchedPolicy {
    /// `Fifo(priority)` when `priority > 0`, otherwise `Other`.
    #[must_use]
    pub const fn for_priority(priority: i32) -> Self {
        if priority > 0 {
            Self::Fifo(priority)
        } else {
            Self::Other
        }
    }

    const fn raw(self) -> (libc::c_int, libc::c_int) {
        match self {
            Self::Fifo(priority) => (libc::SCHED_FIFO, priority),
            Self::Other => (libc::SCHED_OTHER, 0),
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo(priority) => write!(f, "SCHED_FIFO:{priority}"),
            Self::Other => write!(f, "SCHED_OTHER"),
        }
    }
}

/// Highest priority accepted for `SCHED_FIFO` on this platform.
#[must_use]
pub fn max_fifo_priority() -> i32 {
    // SAFETY: pure query with no pointer arguments.
    unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) }
}

/// Apply `policy` to the calling thread.
///
/// # Errors
///
/// Returns the errno from `pthread_setschedparam`, typically `EPERM` when
/// real-time scheduling is requested without the needed privilege.
pub fn set_current_schedule(policy: SchedPolicy) -> Result<(), SchedError> {
    let (raw_policy, priority) = policy.raw();
    // SAFETY: sched_param is plain data; zeroed is a valid value.
    let mut param: libc::sched_param = unsafe { mem::zeroed() };
    param.sched_priority = priority;
    // SAFETY: pthread_self() is always valid for the calling thread and
    // `param` outlives the call.
    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), raw_policy, &param) };
    if ret == 0 {
        Ok(())
    } else {
        Err(SchedError {
            op: "pthread_setschedparam",
            errno: ret,
        })
    }
}

/// Read back the calling thread's scheduling policy.
///
/// Policies other than `SCHED_FIFO` are reported as [`SchedPolicy::Other`].
///
/// # Errors
///
/// Returns the errno from `pthread_getschedparam`.
pub fn current_schedule() -> Result<SchedPolicy, SchedError> {
    let mut raw_policy: libc::c_int = 0;
    // SAFETY: sched_param is plain data; zeroed is a valid value.
    let mut param: libc::sched_param = unsafe { mem::zeroed() };
    // SAFETY: both out-pointers reference live locals.
    let ret =
        unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut raw_policy, &mut param) };
    if ret != 0 {
        return Err(SchedError {
            op: "pthread_getschedparam",
            errno: ret,
        });
    }
    Ok(if raw_policy == libc::SCHED_FIFO {
        SchedPolicy::Fifo(param.sched_priority)
    } else {
        SchedPolicy::Other
    })
}

/// An ordered set of CPU indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuSet(Vec<usize>);

impl CpuSet {
    /// Set containing exactly one CPU.
    #[must_use]
    pub fn single(cpu: usize) -> Self {
        Self(vec![cpu])
    }

    /// Set built from arbitrary indices; sorted and deduplicated.
    #[must_use]
    pub fn from_cpus(cpus: impl IntoIterator<Item = usize>) -> Self {
        let mut cpus: Vec<usize> = cpus.into_iter().collect();
        cpus.sort_unstable();
        cpus.dedup();
        Self(cpus)
    }

    /// CPU indices in ascending order.
    #[must_use]
    pub fn cpus(&self) -> &[usize] {
        &self.0
    }

    /// Number of CPUs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `cpu` is a member.
    #[must_use]
    pub fn contains(&self, cpu: usize) -> bool {
        self.0.binary_search(&cpu).is_ok()
    }

    fn to_raw(&self) -> libc::cpu_set_t {
        // SAFETY: cpu_set_t is a plain bit array; all-zero is the empty set.
        let mut raw: libc::cpu_set_t = unsafe { mem::zeroed() };
        for &cpu in self.0.iter().filter(|&&cpu| cpu < libc::CPU_SETSIZE as usize) {
            // SAFETY: index bounded by CPU_SETSIZE above.
            unsafe { libc::CPU_SET(cpu, &mut raw) };
        }
        raw
    }

    fn from_raw(raw: &libc::cpu_set_t) -> Self {
        let cpus = (0..libc::CPU_SETSIZE as usize)
            // SAFETY: index bounded by CPU_SETSIZE.
            .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, raw) })
            .collect();
        Self(cpus)
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        for cpu in &self.0 {
            write!(f, "{cpu} ")?;
        }
        write!(f, "]")
    }
}

/// Restrict the calling thread to `cpus`.
///
/// # Errors
///
/// Returns the errno from `sched_setaffinity` (e.g. `EINVAL` when none of the
/// CPUs are usable).
pub fn pin_current(cpus: &CpuSet) -> Result<(), SchedError> {
    let raw = cpus.to_raw();
    // SAFETY: pid 0 targets the calling thread; `raw` outlives the call.
    let ret = unsafe { libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &raw) };
    if ret == 0 {
        Ok(())
    } else {
        Err(SchedError::last_os("sched_setaffinity"))
    }
}

/// Effective CPU affinity of the calling thread.
///
/// # Errors
///
/// Returns the errno from `sched_getaffinity`.
pub fn current_affinity() -> Result<CpuSet, SchedError> {
    // SAFETY: cpu_set_t is a plain bit array; all-zero is the empty set.
    let mut raw: libc::cpu_set_t = unsafe { mem::zeroed() };
    // SAFETY: pid 0 targets the calling thread; `raw` is a live local.
    let ret = unsafe { libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut raw) };
    if ret == 0 {
        Ok(CpuSet::from_raw(&raw))
    } else {
        Err(SchedError::last_os("sched_getaffinity"))
    }
}

/// CPU the calling thread is running on right now.
#[must_use]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: no arguments; returns -1 on failure.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}
