// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native mutex (plain and recursive).
//!
//! Raw lock/unlock with no guard objects: the owner of the lock is whoever
//! called `lock`, and `unlock` is a separate call. That is what a toolkit
//! mutex looks like and what the adapter layer wraps.

use std::time::Duration;

use parking_lot::lock_api::{RawMutex as _, RawMutexTimed as _, RawReentrantMutex};
use parking_lot::{RawMutex, RawThreadId};

use crate::message::{self, MessageContext};
use crate::timeout::Msecs;

/// Capability set of a native mutex.
pub trait NativeMutex: Send + Sync {
    /// Block until the mutex is held.
    fn lock(&self);

    /// Take the mutex only if it is free right now.
    fn try_lock(&self) -> bool;

    /// Wait up to `msecs` for the mutex. Negative waits forever.
    fn try_lock_for(&self, msecs: Msecs) -> bool;

    /// Release the mutex. Unlocking a mutex that isn't held is a usage
    /// error reported through the message handler; the call is ignored.
    fn unlock(&self);

    fn is_recursive(&self) -> bool;
}

/// Non-recursive mutex. Locking it twice from one thread deadlocks.
pub struct ParkingLotMutex {
    raw: RawMutex,
}

impl ParkingLotMutex {
    pub const fn new() -> Self {
        Self { raw: RawMutex::INIT }
    }
}

impl Default for ParkingLotMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeMutex for ParkingLotMutex {
    fn lock(&self) {
        self.raw.lock();
    }

    fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    fn try_lock_for(&self, msecs: Msecs) -> bool {
        match msecs {
            m if m < 0 => {
                self.raw.lock();
                true
            }
            0 => self.raw.try_lock(),
            m => self.raw.try_lock_for(Duration::from_millis(m as u64)),
        }
    }

    fn unlock(&self) {
        if !self.raw.is_locked() {
            message::warning(
                &MessageContext::new(file!(), line!(), "ParkingLotMutex::unlock"),
                "unlock called on a mutex that is not locked",
            );
            return;
        }
        // SAFETY: the mutex is locked. Like a toolkit mutex it carries no
        // owner, so releasing it from another thread is permitted.
        unsafe { self.raw.unlock() }
    }

    fn is_recursive(&self) -> bool {
        false
    }
}

/// Recursive mutex. The owning thread may lock it again; it is released
/// once `unlock` has been called as many times as `lock`.
pub struct ParkingLotRecursiveMutex {
    raw: RawReentrantMutex<RawMutex, RawThreadId>,
}

impl ParkingLotRecursiveMutex {
    pub const fn new() -> Self {
        Self {
            raw: RawReentrantMutex::INIT,
        }
    }
}

impl Default for ParkingLotRecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeMutex for ParkingLotRecursiveMutex {
    fn lock(&self) {
        self.raw.lock();
    }

    fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    fn try_lock_for(&self, msecs: Msecs) -> bool {
        match msecs {
            m if m < 0 => {
                self.raw.lock();
                true
            }
            0 => self.raw.try_lock(),
            m => self.raw.try_lock_for(Duration::from_millis(m as u64)),
        }
    }

    fn unlock(&self) {
        if !self.raw.is_owned_by_current_thread() {
            message::warning(
                &MessageContext::new(file!(), line!(), "ParkingLotRecursiveMutex::unlock"),
                "unlock called on a recursive mutex not held by this thread",
            );
            return;
        }
        // SAFETY: held by the current thread, checked above.
        unsafe { self.raw.unlock() }
    }

    fn is_recursive(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn lock_then_try_lock_fails() {
        let m = ParkingLotMutex::new();
        m.lock();
        assert!(!m.try_lock());
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn timed_lock_gives_up() {
        let m = Arc::new(ParkingLotMutex::new());
        m.lock();
        let m2 = m.clone();
        let start = Instant::now();
        let got = std::thread::spawn(move || m2.try_lock_for(50)).join().unwrap();
        assert!(!got);
        assert!(start.elapsed() >= Duration::from_millis(45));
        m.unlock();
    }

    #[test]
    fn unlock_from_another_thread() {
        let m = Arc::new(ParkingLotMutex::new());
        m.lock();
        let m2 = m.clone();
        std::thread::spawn(move || m2.unlock()).join().unwrap();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn unmatched_unlock_is_ignored() {
        let m = ParkingLotMutex::new();
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn recursive_relock() {
        let m = ParkingLotRecursiveMutex::new();
        assert!(m.is_recursive());
        m.lock();
        assert!(m.try_lock());
        assert!(m.try_lock_for(10));
        m.unlock();
        m.unlock();
        m.unlock();
        // Fully released: another thread can take it.
        let m = Arc::new(m);
        let m2 = m.clone();
        assert!(std::thread::spawn(move || {
            let ok = m2.try_lock();
            if ok {
                m2.unlock();
            }
            ok
        })
        .join()
        .unwrap());
    }
}
