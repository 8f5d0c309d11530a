//! Configuration models for a stress run.

pub mod harness;

pub use harness::{Backend, HarnessConfig, PrintMode};
