//! Infrastructure adapters: the mutex providers under test.

pub mod provider;

pub use provider::{
    ClockKind, GenericProvider, MutexAttrs, MutexHandle, MutexProvider, ProviderError, RtProvider,
};
