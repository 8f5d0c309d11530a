//! SIGINT bridge onto a [`StopFlag`].
//!
//! The handler performs a single atomic store and nothing else. The target
//! flag is published through a static pointer so the handler never allocates
//! or locks.

#![allow(unsafe_code)]

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::context::StopFlag;
use crate::core::error::HarnessError;

static INTERRUPT_TARGET: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_interrupt(_sig: libc::c_int) {
    let target = INTERRUPT_TARGET.load(Ordering::Acquire);
    if !target.is_null() {
        // SAFETY: the pointer comes from `Arc::into_raw` and is never released,
        // so it stays valid for the life of the process.
        unsafe { (*target).store(true, Ordering::Release) };
    }
}

/// Route SIGINT to `stop`.
///
/// Installing again retargets the handler to the new flag. Each installed flag
/// is kept alive for the remainder of the process.
///
/// # Errors
///
/// [`HarnessError::Signal`] if the handler cannot be registered.
pub fn install_interrupt_handler(stop: &StopFlag) -> Result<(), HarnessError> {
    let target = Arc::into_raw(Arc::clone(stop.as_atomic())).cast_mut();
    INTERRUPT_TARGET.store(target, Ordering::Release);

    let handler = on_interrupt as extern "C" fn(libc::c_int);
    // SAFETY: `on_interrupt` is an `extern "C"` fn with a stable address and
    // only performs async-signal-safe atomic operations.
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(HarnessError::Signal(std::io::Error::last_os_error()));
    }
    debug!("SIGINT handler installed");
    Ok(())
}
