//! Generic fallback provider built on `parking_lot`'s raw mutex.
//!
//! `parking_lot::RawMutex` has no notion of ownership, so the handle records an
//! owner token per thread. That gives the same error-checking contract as the
//! real-time provider: relock by the owner is refused and unlock by anyone else
//! is reported instead of corrupting the lock.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lock_api::RawMutex as _;
use parking_lot::RawMutex;
use tracing::debug;

use super::{MutexAttrs, MutexHandle, MutexProvider, ProviderError};

const NO_OWNER: u64 = 0;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_token() -> u64 {
    TOKEN.with(|token| *token)
}

/// Provider backed by a plain `parking_lot` mutex.
#[derive(Debug, Default)]
pub struct GenericProvider {
    initialized: AtomicBool,
}

impl GenericProvider {
    /// Create an uninitialized provider.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
        }
    }
}

impl MutexProvider for GenericProvider {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn init(&self) -> Result<(), ProviderError> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn create(&self, attrs: &MutexAttrs) -> Result<Arc<dyn MutexHandle>, ProviderError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(ProviderError::NotInitialized);
        }
        debug!(name = %attrs.name, clock = ?attrs.clock, "Creating generic mutex");
        Ok(Arc::new(GenericMutex {
            raw: RawMutex::INIT,
            owner: AtomicU64::new(NO_OWNER),
        }))
    }

    fn attach_thread(&self, name: &str) -> Result<(), ProviderError> {
        debug!(thread = name, "Attached to generic provider");
        Ok(())
    }
}

struct GenericMutex {
    raw: RawMutex,
    /// Token of the holding thread, `NO_OWNER` when free.
    owner: AtomicU64,
}

impl MutexHandle for GenericMutex {
    fn lock(&self) -> Result<(), ProviderError> {
        let me = current_token();
        if self.owner.load(Ordering::Acquire) == me {
            return Err(ProviderError::Deadlock);
        }
        self.raw.lock();
        self.owner.store(me, Ordering::Release);
        Ok(())
    }

    fn try_lock(&self) -> Result<(), ProviderError> {
        if self.raw.try_lock() {
            self.owner.store(current_token(), Ordering::Release);
            Ok(())
        } else {
            Err(ProviderError::Busy)
        }
    }

    fn unlock(&self) -> Result<(), ProviderError> {
        let me = current_token();
        if self
            .owner
            .compare_exchange(me, NO_OWNER, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProviderError::NotOwner);
        }
        // SAFETY: the owner token matched, so this thread acquired `raw` and
        // has not released it yet.
        unsafe { self.raw.unlock() };
        Ok(())
    }
}
