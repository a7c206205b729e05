// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Counting semaphore adapter.

use std::fmt;

use tandem_native::{default_backend, Backend, NativeSemaphore};

use crate::error::{Error, Result};
use crate::timeout::{self, Timeout};

pub struct Semaphore {
    native: Box<dyn NativeSemaphore>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self::with_backend(&*default_backend(), permits)
    }

    pub fn with_backend(backend: &dyn Backend, permits: usize) -> Self {
        Self {
            native: backend.semaphore(permits),
        }
    }

    /// Take one permit. Blocking waits up to `timeout` (`None` waits
    /// forever); non-blocking makes one attempt and rejects any timeout.
    pub fn acquire(&self, blocking: bool, timeout: Option<Timeout>) -> Result<bool> {
        if !blocking {
            if matches!(timeout, Some(Timeout::After(_))) {
                return Err(Error::Value(
                    "can't specify a timeout for a non-blocking call".to_string(),
                ));
            }
            return Ok(self.native.try_acquire(1, 0));
        }
        let t = timeout::resolve(timeout, Timeout::Forever);
        Ok(self.native.try_acquire(1, t.as_msecs()))
    }

    /// Return `n` permits, waking up to `n` blocked acquirers.
    pub fn release(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::Value("n must be one or more".to_string()));
        }
        self.native.release(n);
        Ok(())
    }

    /// Take one permit, blocking; it's returned when the guard drops.
    pub fn enter(&self) -> SemaphoreGuard<'_> {
        self.native.acquire(1);
        SemaphoreGuard { sem: self }
    }

    pub fn locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _permit = self.enter();
        f()
    }

    pub fn available(&self) -> usize {
        self.native.available()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available())
            .finish()
    }
}

#[must_use = "the permit is returned as soon as the guard is dropped"]
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.native.release(1);
    }
}
