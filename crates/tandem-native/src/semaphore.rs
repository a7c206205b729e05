// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native counting semaphore.

use parking_lot::{Condvar, Mutex};

use crate::timeout::{Deadline, Msecs};

/// Capability set of a native counting semaphore.
pub trait NativeSemaphore: Send + Sync {
    /// Block until `n` permits are taken.
    fn acquire(&self, n: usize);

    /// Take `n` permits, waiting up to `msecs` (negative waits forever,
    /// zero does not wait).
    fn try_acquire(&self, n: usize, msecs: Msecs) -> bool;

    /// Return `n` permits.
    fn release(&self, n: usize);

    fn available(&self) -> usize;
}

pub struct ParkingLotSemaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl ParkingLotSemaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }
}

impl NativeSemaphore for ParkingLotSemaphore {
    fn acquire(&self, n: usize) {
        let mut permits = self.permits.lock();
        while *permits < n {
            self.cond.wait(&mut permits);
        }
        *permits -= n;
    }

    fn try_acquire(&self, n: usize, msecs: Msecs) -> bool {
        let mut permits = self.permits.lock();
        if msecs == 0 {
            if *permits < n {
                return false;
            }
            *permits -= n;
            return true;
        }

        let deadline = Deadline::from_msecs(msecs);
        while *permits < n {
            match deadline {
                Deadline::Forever => self.cond.wait(&mut permits),
                Deadline::At(at) => {
                    if self.cond.wait_until(&mut permits, at).timed_out() && *permits < n {
                        return false;
                    }
                }
            }
        }
        *permits -= n;
        true
    }

    fn release(&self, n: usize) {
        let mut permits = self.permits.lock();
        *permits += n;
        // Waiters may want different counts; let each re-check.
        self.cond.notify_all();
    }

    fn available(&self) -> usize {
        *self.permits.lock()
    }
}
