// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Event flag.
//!
//! The flag's truth is the boolean; the condition is only a wakeup channel.
//! Lock order is flag lock, then condition lock. `wait` takes only the
//! condition lock and re-reads the flag under it before blocking, so a
//! `set` that lands between the fast path and the wait is never missed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tandem_native::{default_backend, Backend};

use crate::condition::Condition;
use crate::error::Result;
use crate::lock::Lock;
use crate::timeout::Timeout;

pub struct Event {
    /// Written only with `guard` held.
    flag: AtomicBool,
    guard: Lock,
    cond: Condition,
}

impl Event {
    pub fn new() -> Self {
        Self::with_backend(&*default_backend())
    }

    pub fn with_backend(backend: &dyn Backend) -> Self {
        Self {
            flag: AtomicBool::new(false),
            guard: Lock::with_backend(backend, false, Timeout::Forever),
            cond: Condition::with_backend(backend),
        }
    }

    pub fn is_set(&self) -> bool {
        let _g = self.guard.hold();
        self.flag.load(Ordering::Acquire)
    }

    /// Set the flag and wake every waiter. No-op if already set.
    pub fn set(&self) {
        let _g = self.guard.hold();
        if self.flag.load(Ordering::Acquire) {
            return;
        }
        self.flag.store(true, Ordering::Release);
        let _c = self.cond.lock().hold();
        self.cond.notify_all();
    }

    /// Reset the flag. Waiters are not woken.
    pub fn clear(&self) {
        let _g = self.guard.hold();
        self.flag.store(false, Ordering::Release);
    }

    /// Block until the flag is set or `timeout` elapses (`None` waits
    /// forever). Returns `true` if the flag was set.
    pub fn wait(&self, timeout: Option<Timeout>) -> Result<bool> {
        if self.flag.load(Ordering::Acquire) {
            return Ok(true);
        }
        let _c = self.cond.lock().hold();
        if self.flag.load(Ordering::Acquire) {
            return Ok(true);
        }
        let notified = self.cond.wait(timeout)?;
        Ok(notified || self.flag.load(Ordering::Acquire))
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("set", &self.flag.load(Ordering::Relaxed))
            .finish()
    }
}
