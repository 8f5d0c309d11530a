//! CPU topology: which CPUs the harness may use and how workers map onto them.

use tracing::warn;

use super::sched::{current_affinity, CpuSet};

/// The CPUs available to this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    cpus: CpuSet,
}

impl Topology {
    /// Discover the CPUs in the calling thread's affinity mask.
    ///
    /// Falls back to `0..num_cpus::get()` if the mask cannot be read.
    #[must_use]
    pub fn discover() -> Self {
        match current_affinity() {
            Ok(cpus) if !cpus.is_empty() => Self { cpus },
            Ok(_) => Self::fallback(),
            Err(e) => {
                warn!(error = %e, "Could not read CPU affinity, assuming 0..num_cpus");
                Self::fallback()
            }
        }
    }

    /// Topology over an explicit set of CPUs.
    #[must_use]
    pub const fn from_cpus(cpus: CpuSet) -> Self {
        Self { cpus }
    }

    fn fallback() -> Self {
        Self {
            cpus: CpuSet::from_cpus(0..num_cpus::get()),
        }
    }

    /// Number of available processors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Whether no processor is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Every available CPU.
    #[must_use]
    pub const fn all(&self) -> &CpuSet {
        &self.cpus
    }

    /// CPU assigned to worker `index`, counting down from the last CPU so an
    /// idle CPU 0 is left to background system activity.
    #[must_use]
    pub fn worker_cpu(&self, index: usize) -> Option<usize> {
        let cpus = self.cpus.cpus();
        cpus.len()
            .checked_sub(index + 1)
            .map(|slot| cpus[slot])
    }
}
