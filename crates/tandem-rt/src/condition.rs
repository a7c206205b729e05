// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Condition adapter: a `Lock` plus a native wait condition.
//!
//! Monitor discipline. `wait` is only valid while the lock is held; it
//! releases the lock while blocked and holds it again on return.

use std::fmt;

use tandem_native::{default_backend, Backend, Deadline, NativeCondvar};

use crate::error::{Error, Result};
use crate::lock::{Lock, LockGuard};
use crate::timeout::{self, Timeout};

pub struct Condition {
    lock: Lock,
    native: Box<dyn NativeCondvar>,
}

impl Condition {
    pub fn new() -> Self {
        Self::with_backend(&*default_backend())
    }

    pub fn with_backend(backend: &dyn Backend) -> Self {
        Self {
            lock: Lock::with_backend(backend, false, Timeout::Forever),
            native: backend.condvar(),
        }
    }

    pub fn acquire(&self, blocking: bool, timeout: Option<Timeout>) -> Result<bool> {
        self.lock.acquire(blocking, timeout)
    }

    pub fn release(&self) {
        self.lock.release();
    }

    pub fn enter(&self) -> Result<LockGuard<'_>> {
        self.lock.enter()
    }

    pub fn locked<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.lock.locked(f)
    }

    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// Wait for a notification. Returns `false` if `timeout` elapsed first.
    /// `None` waits forever.
    pub fn wait(&self, timeout: Option<Timeout>) -> Result<bool> {
        self.check_held()?;
        let t = timeout::resolve(timeout, Timeout::Forever);
        Ok(self.wait_until(t.deadline()))
    }

    /// Wait until `predicate` holds or `timeout` elapses. Returns the last
    /// value of the predicate.
    pub fn wait_for(&self, mut predicate: impl FnMut() -> bool, timeout: Option<Timeout>) -> Result<bool> {
        let deadline = timeout::resolve(timeout, Timeout::Forever).deadline();
        loop {
            if predicate() {
                return Ok(true);
            }
            if deadline.has_expired() {
                return Ok(false);
            }
            self.check_held()?;
            self.wait_until(deadline);
        }
    }

    fn check_held(&self) -> Result<()> {
        if !self.lock.held_by_current_thread() {
            return Err(Error::Runtime("cannot wait on un-acquired lock".to_string()));
        }
        Ok(())
    }

    /// Wait without auditing or the held-lock check. Caller holds the lock.
    pub(crate) fn wait_until(&self, deadline: Deadline) -> bool {
        // Others may take the lock while this thread is parked.
        self.lock.clear_owner();
        let notified = self.native.wait(self.lock.native(), deadline);
        self.lock.mark_owned();
        notified
    }

    /// Wake one waiter.
    pub fn notify(&self) {
        self.native.wake_one();
    }

    pub fn notify_all(&self) {
        self.native.wake_all();
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition").field("lock", &self.lock).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn wait_without_lock_is_runtime_error() {
        let c = Condition::new();
        assert!(matches!(c.wait(Some(Timeout::from(0.01))), Err(Error::Runtime(_))));
    }

    #[test]
    fn timed_wait_returns_false() {
        let c = Condition::new();
        let _g = c.enter().unwrap();
        let start = Instant::now();
        assert!(!c.wait(Some(Timeout::from(0.05))).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn notify_wakes_one_waiter() {
        let c = Arc::new(Condition::new());
        let waiting = Arc::new(AtomicBool::new(false));
        let c2 = c.clone();
        let w2 = waiting.clone();
        let h = std::thread::spawn(move || {
            let _g = c2.enter().unwrap();
            w2.store(true, Ordering::SeqCst);
            c2.wait(Some(Timeout::from(5.0))).unwrap()
        });
        while !waiting.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        // The waiter set the flag under the lock; taking it means it's parked.
        c.locked(|| c.notify()).unwrap();
        assert!(h.join().unwrap());
    }

    #[test]
    fn wait_while_another_thread_holds_is_runtime_error() {
        let c = Arc::new(Condition::new());
        let holding = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let (c2, h2, d2) = (c.clone(), holding.clone(), done.clone());
        let holder = std::thread::spawn(move || {
            let _g = c2.enter().unwrap();
            h2.store(true, Ordering::SeqCst);
            while !d2.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        while !holding.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }

        assert!(matches!(c.wait(Some(Timeout::from(0.01))), Err(Error::Runtime(_))));
        assert!(matches!(c.wait_for(|| false, Some(Timeout::from(0.01))), Err(Error::Runtime(_))));
        // Still held by the other thread.
        assert!(!c.acquire(false, None).unwrap());

        done.store(true, Ordering::SeqCst);
        holder.join().unwrap();
        assert!(c.acquire(false, None).unwrap());
        assert!(c.wait(Some(Timeout::from(0.01))).is_ok());
        c.release();
    }

    #[test]
    fn wait_for_predicate() {
        let c = Arc::new(Condition::new());
        let value = Arc::new(AtomicUsize::new(0));
        let (c2, v2) = (c.clone(), value.clone());
        let h = std::thread::spawn(move || {
            for _ in 0..3 {
                std::thread::sleep(Duration::from_millis(5));
                c2.locked(|| {
                    v2.fetch_add(1, Ordering::SeqCst);
                    c2.notify_all();
                })
                .unwrap();
            }
        });
        let _g = c.enter().unwrap();
        let ok = c
            .wait_for(|| value.load(Ordering::SeqCst) >= 3, Some(Timeout::from(5.0)))
            .unwrap();
        assert!(ok);
        drop(_g);
        h.join().unwrap();
    }
}
