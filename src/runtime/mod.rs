//! OS-level scheduling, CPU topology and signal plumbing.

pub mod sched;
pub mod signal;
pub mod topology;

pub use sched::{
    current_affinity, current_cpu, current_schedule, max_fifo_priority, pin_current,
    set_current_schedule, CpuSet, SchedError, SchedPolicy,
};
pub use signal::install_interrupt_handler;
pub use topology::Topology;
