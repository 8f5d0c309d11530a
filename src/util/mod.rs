//! Shared utilities.

pub mod telemetry;
pub mod work;

pub use telemetry::*;
pub use work::*;
