//! Mutex provider contract consumed by the harness.
//!
//! A provider is initialized once, creates the single mutex under test, and
//! lets threads register with its runtime. The harness never looks inside the
//! mutex; every state change goes through [`MutexHandle`].
//!
//! Two providers satisfy the same contract:
//!
//! - [`rt::RtProvider`]: priority-inheriting, error-checking pthread mutex
//! - [`generic::GenericProvider`]: `parking_lot` raw mutex with owner tracking

pub mod generic;
pub mod rt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use generic::GenericProvider;
pub use rt::RtProvider;

/// Errors reported by mutex providers.
///
/// [`ProviderError::code`] maps each variant into the signed error domain used
/// in diagnostics (zero is success, failures are negative errno values).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// `create` was called before `init`.
    #[error("provider not initialized")]
    NotInitialized,
    /// `try_lock` found the mutex held.
    #[error("mutex busy")]
    Busy,
    /// `unlock` by a thread that does not hold the mutex.
    #[error("mutex not owned by caller")]
    NotOwner,
    /// `lock` by the thread that already holds the mutex.
    #[error("relock by owner would deadlock")]
    Deadlock,
    /// Any other OS-level failure.
    #[error("{op} failed: {} ({errno})", os_message(.errno))]
    Os {
        /// Failing call.
        op: &'static str,
        /// Positive errno value.
        errno: i32,
    },
}

impl ProviderError {
    /// Signed error code: the negated errno equivalent.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::NotInitialized => -libc::ENXIO,
            Self::Busy => -libc::EBUSY,
            Self::NotOwner => -libc::EPERM,
            Self::Deadlock => -libc::EDEADLK,
            Self::Os { errno, .. } => -*errno,
        }
    }

    /// Classify a positive errno returned by a pthread call.
    #[must_use]
    pub const fn from_errno(op: &'static str, errno: i32) -> Self {
        match errno {
            libc::EBUSY => Self::Busy,
            libc::EPERM => Self::NotOwner,
            libc::EDEADLK => Self::Deadlock,
            _ => Self::Os { op, errno },
        }
    }
}

fn os_message(errno: &i32) -> String {
    std::io::Error::from_raw_os_error(*errno).to_string()
}

/// Clock the mutex uses for timed waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// Monotonic clock.
    #[default]
    Monotonic,
    /// Wall-clock time.
    Realtime,
}

/// Creation attributes for the mutex under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexAttrs {
    /// Name the mutex is registered under.
    pub name: String,
    /// Clock used for timed operations.
    pub clock: ClockKind,
    /// Whether the mutex is private to this process.
    pub private: bool,
}

impl MutexAttrs {
    /// Private, monotonic-clock mutex with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock: ClockKind::Monotonic,
            private: true,
        }
    }
}

/// Lock operations on a created mutex.
///
/// None of these may assume the mutex is uncontended, and each may fail
/// independently of prior state.
pub trait MutexHandle: Send + Sync {
    /// Block until the mutex is acquired or the provider reports an error.
    ///
    /// # Errors
    ///
    /// Provider-specific; [`ProviderError::Deadlock`] on relock by the owner.
    fn lock(&self) -> Result<(), ProviderError>;

    /// Acquire without blocking.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Busy`] when the mutex is already held.
    fn try_lock(&self) -> Result<(), ProviderError>;

    /// Release the mutex.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotOwner`] when the caller does not hold it.
    fn unlock(&self) -> Result<(), ProviderError>;
}

/// A mutex implementation under test.
pub trait MutexProvider: Send + Sync {
    /// Short backend name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Initialize the provider runtime.
    ///
    /// # Errors
    ///
    /// Provider-specific initialization failure.
    fn init(&self) -> Result<(), ProviderError>;

    /// Create a mutex.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotInitialized`] before `init`, or an OS failure.
    fn create(&self, attrs: &MutexAttrs) -> Result<Arc<dyn MutexHandle>, ProviderError>;

    /// Register the calling thread with the provider runtime.
    ///
    /// # Errors
    ///
    /// Provider-specific attachment failure.
    fn attach_thread(&self, name: &str) -> Result<(), ProviderError>;
}
