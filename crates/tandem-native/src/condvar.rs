// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native wait condition.
//!
//! Waits are bound to a `NativeMutex` per call: the caller holds the mutex,
//! `wait` releases it while blocked and takes it back before returning,
//! on timeout too.

use parking_lot::{Condvar, Mutex};

use crate::mutex::NativeMutex;
use crate::timeout::Deadline;

/// Capability set of a native condition variable.
pub trait NativeCondvar: Send + Sync {
    /// Release `mutex`, block until woken or `deadline`, re-acquire `mutex`.
    /// Returns `true` if woken, `false` on timeout.
    fn wait(&self, mutex: &dyn NativeMutex, deadline: Deadline) -> bool;

    fn wake_one(&self);

    fn wake_all(&self);
}

#[derive(Default)]
struct WaitState {
    waiters: usize,
    /// Wakes handed out but not yet consumed by a waiter.
    signals: usize,
}

/// Wait condition built from wake tokens. A wake issued after a waiter
/// registered is never lost, and waiters never return `true` spuriously.
#[derive(Default)]
pub struct ParkingLotCondvar {
    state: Mutex<WaitState>,
    cond: Condvar,
}

impl ParkingLotCondvar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NativeCondvar for ParkingLotCondvar {
    fn wait(&self, mutex: &dyn NativeMutex, deadline: Deadline) -> bool {
        let mut st = self.state.lock();
        st.waiters += 1;
        // Registered under `state`, so a waker holding `mutex` and calling
        // wake_* after this point sees us.
        mutex.unlock();

        let woken = loop {
            if st.signals > 0 {
                st.signals -= 1;
                break true;
            }
            match deadline {
                Deadline::Forever => self.cond.wait(&mut st),
                Deadline::At(at) => {
                    if self.cond.wait_until(&mut st, at).timed_out() {
                        if st.signals > 0 {
                            st.signals -= 1;
                            break true;
                        }
                        break false;
                    }
                }
            }
        };
        st.waiters -= 1;
        drop(st);

        mutex.lock();
        woken
    }

    fn wake_one(&self) {
        let mut st = self.state.lock();
        if st.signals < st.waiters {
            st.signals += 1;
            self.cond.notify_one();
        }
    }

    fn wake_all(&self) {
        let mut st = self.state.lock();
        if st.signals < st.waiters {
            st.signals = st.waiters;
            self.cond.notify_all();
        }
    }
}
