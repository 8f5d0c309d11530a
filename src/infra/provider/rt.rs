//! Real-time provider: a priority-inheriting, error-checking pthread mutex.
//!
//! Priority inheritance is what makes a mutex usable between `SCHED_FIFO`
//! threads of different priorities; error checking turns owner violations into
//! `EPERM`/`EDEADLK` instead of undefined behaviour.
//!
//! Attaching a thread binds it to the CPU it is currently running on, the way a
//! real-time core pins threads when they join its scheduler. Callers that need
//! a wider affinity must widen it *after* attaching.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::ffi::CString;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{MutexAttrs, MutexHandle, MutexProvider, ProviderError};
use crate::runtime::sched::{current_cpu, max_fifo_priority, pin_current, CpuSet};

/// Longest thread name the kernel accepts, excluding the terminator.
const MAX_THREAD_NAME: usize = 15;

fn check(op: &'static str, ret: libc::c_int) -> Result<(), ProviderError> {
    if ret == 0 {
        Ok(())
    } else {
        Err(ProviderError::from_errno(op, ret))
    }
}

/// Provider backed by `PTHREAD_PRIO_INHERIT` pthread mutexes.
#[derive(Debug, Default)]
pub struct RtProvider {
    initialized: AtomicBool,
}

impl RtProvider {
    /// Create an uninitialized provider.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
        }
    }
}

impl MutexProvider for RtProvider {
    fn name(&self) -> &'static str {
        "rt"
    }

    fn init(&self) -> Result<(), ProviderError> {
        if max_fifo_priority() <= 0 {
            return Err(ProviderError::Os {
                op: "sched_get_priority_max",
                errno: libc::ENOSYS,
            });
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn create(&self, attrs: &MutexAttrs) -> Result<Arc<dyn MutexHandle>, ProviderError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(ProviderError::NotInitialized);
        }
        let mutex = RtMutex::new()?;
        debug!(
            name = %attrs.name,
            clock = ?attrs.clock,
            private = attrs.private,
            "Created priority-inheriting mutex"
        );
        Ok(Arc::new(mutex))
    }

    fn attach_thread(&self, name: &str) -> Result<(), ProviderError> {
        let mut short: String = name.chars().filter(|c| *c != '\0').collect();
        while short.len() > MAX_THREAD_NAME {
            short.pop();
        }
        let cname = CString::new(short).map_err(|_| ProviderError::Os {
            op: "pthread_setname_np",
            errno: libc::EINVAL,
        })?;
        // SAFETY: `cname` is NUL-terminated and within the kernel's length
        // limit; pthread_self() is valid for the calling thread.
        check("pthread_setname_np", unsafe {
            libc::pthread_setname_np(libc::pthread_self(), cname.as_ptr())
        })?;

        let cpu = current_cpu().ok_or(ProviderError::Os {
            op: "sched_getcpu",
            errno: libc::ENOSYS,
        })?;
        pin_current(&CpuSet::single(cpu)).map_err(|e| ProviderError::Os {
            op: e.op,
            errno: e.errno,
        })?;
        debug!(thread = name, cpu = cpu, "Attached to rt provider");
        Ok(())
    }
}

/// Heap-pinned pthread mutex; the address must not change after init.
struct RtMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: pthread mutexes are designed to be shared between threads; all
// access goes through the pthread API.
unsafe impl Send for RtMutex {}
// SAFETY: as above.
unsafe impl Sync for RtMutex {}

impl RtMutex {
    fn new() -> Result<Self, ProviderError> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        // SAFETY: initializes `attr` in place.
        check("pthread_mutexattr_init", unsafe {
            libc::pthread_mutexattr_init(attr.as_mut_ptr())
        })?;

        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        // SAFETY: `attr` was initialized above; `inner` is a heap slot that
        // never moves for the life of the RtMutex.
        let result = unsafe {
            check(
                "pthread_mutexattr_settype",
                libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_ERRORCHECK),
            )
            .and_then(|()| {
                check(
                    "pthread_mutexattr_setprotocol",
                    libc::pthread_mutexattr_setprotocol(attr.as_mut_ptr(), libc::PTHREAD_PRIO_INHERIT),
                )
            })
            .and_then(|()| {
                check(
                    "pthread_mutex_init",
                    libc::pthread_mutex_init(inner.get(), attr.as_ptr()),
                )
            })
        };
        // SAFETY: `attr` is initialized and no longer needed.
        unsafe { libc::pthread_mutexattr_destroy(attr.as_mut_ptr()) };

        result.map(|()| Self { inner })
    }
}

impl MutexHandle for RtMutex {
    fn lock(&self) -> Result<(), ProviderError> {
        // SAFETY: the mutex was initialized in `new` and outlives this call.
        check("pthread_mutex_lock", unsafe { libc::pthread_mutex_lock(self.inner.get()) })
    }

    fn try_lock(&self) -> Result<(), ProviderError> {
        // SAFETY: as in `lock`.
        check("pthread_mutex_trylock", unsafe {
            libc::pthread_mutex_trylock(self.inner.get())
        })
    }

    fn unlock(&self) -> Result<(), ProviderError> {
        // SAFETY: as in `lock`; error checking rejects non-owners with EPERM.
        check("pthread_mutex_unlock", unsafe {
            libc::pthread_mutex_unlock(self.inner.get())
        })
    }
}

impl Drop for RtMutex {
    fn drop(&mut self) {
        // SAFETY: no other reference exists once we are dropped.
        unsafe { libc::pthread_mutex_destroy(self.inner.get()) };
    }
}
