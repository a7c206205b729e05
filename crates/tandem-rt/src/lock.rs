// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock adapter over a native mutex.
//!
//! Two scoped forms: `enter()` hands back a guard, `locked(|| ..)` runs a
//! closure. Both use the lock's default timeout and fail with
//! `Error::Timeout` when it elapses.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tandem_native::{default_backend, Backend, NativeMutex};

use crate::error::{Error, Result};
use crate::timeout::{self, Timeout};

const FOREVER_BITS: u64 = u64::MAX;

fn timeout_to_bits(t: Timeout) -> u64 {
    match t {
        Timeout::Forever => FOREVER_BITS,
        Timeout::After(d) => u64::try_from(d.as_nanos())
            .map_or(FOREVER_BITS - 1, |n| n.min(FOREVER_BITS - 1)),
    }
}

fn timeout_from_bits(bits: u64) -> Timeout {
    if bits == FOREVER_BITS {
        Timeout::Forever
    } else {
        Timeout::After(Duration::from_nanos(bits))
    }
}

/// Blocking lock, plain or recursive.
pub struct Lock {
    native: Box<dyn NativeMutex>,
    default_timeout: AtomicU64,
    /// Holder of a non-recursive lock. Recursive locks leave it unset.
    owner: Mutex<Option<ThreadId>>,
}

impl Lock {
    pub fn new(default_timeout: impl Into<Timeout>) -> Self {
        Self::with_backend(&*default_backend(), false, default_timeout.into())
    }

    /// A lock the holding thread may take again.
    pub fn recursive(default_timeout: impl Into<Timeout>) -> Self {
        Self::with_backend(&*default_backend(), true, default_timeout.into())
    }

    pub fn with_backend(backend: &dyn Backend, recursive: bool, default_timeout: Timeout) -> Self {
        Self {
            native: backend.mutex(recursive),
            default_timeout: AtomicU64::new(timeout_to_bits(default_timeout)),
            owner: Mutex::new(None),
        }
    }

    /// Take the lock.
    ///
    /// Blocking: wait up to `timeout` (`None` waits forever) and report
    /// whether the lock was taken. Non-blocking: a single attempt, and any
    /// timeout other than `None`/`Forever` is `Error::Value`.
    pub fn acquire(&self, blocking: bool, timeout: Option<Timeout>) -> Result<bool> {
        if !blocking {
            if matches!(timeout, Some(Timeout::After(_))) {
                return Err(Error::Value(
                    "can't specify a timeout for a non-blocking call".to_string(),
                ));
            }
            return Ok(self.took(self.native.try_lock()));
        }
        let t = timeout::resolve(timeout, Timeout::Forever);
        Ok(self.took(self.native.try_lock_for(t.as_msecs())))
    }

    pub fn release(&self) {
        if !self.is_recursive() {
            *self.owner.lock() = None;
        }
        self.native.unlock();
    }

    fn took(&self, acquired: bool) -> bool {
        if acquired {
            self.mark_owned();
        }
        acquired
    }

    /// Record the calling thread as holder. Call only with the native
    /// mutex held.
    pub(crate) fn mark_owned(&self) {
        if !self.is_recursive() {
            *self.owner.lock() = Some(thread::current().id());
        }
    }

    /// Forget the holder before the native mutex is released elsewhere.
    pub(crate) fn clear_owner(&self) {
        *self.owner.lock() = None;
    }

    /// Whether the calling thread holds this lock. Non-recursive only.
    pub(crate) fn held_by_current_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Acquire with the default timeout; released when the guard drops.
    pub fn enter(&self) -> Result<LockGuard<'_>> {
        let t = timeout::resolve(None, self.default_timeout());
        if self.took(self.native.try_lock_for(t.as_msecs())) {
            Ok(LockGuard { lock: self })
        } else {
            Err(Error::Timeout("lock acquisition"))
        }
    }

    /// Run `f` while holding the lock.
    pub fn locked<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let _guard = self.enter()?;
        Ok(f())
    }

    /// Block until held, ignoring the default timeout.
    pub(crate) fn hold(&self) -> LockGuard<'_> {
        self.native.lock();
        self.mark_owned();
        LockGuard { lock: self }
    }

    pub(crate) fn native(&self) -> &dyn NativeMutex {
        &*self.native
    }

    pub fn default_timeout(&self) -> Timeout {
        timeout_from_bits(self.default_timeout.load(Ordering::Acquire))
    }

    pub fn set_default_timeout(&self, timeout: impl Into<Timeout>) {
        self.default_timeout
            .store(timeout_to_bits(timeout.into()), Ordering::Release);
    }

    pub fn is_recursive(&self) -> bool {
        self.native.is_recursive()
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new(Timeout::Forever)
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("recursive", &self.is_recursive())
            .field("default_timeout", &self.default_timeout())
            .finish()
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
