// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Event dispatcher: timers plus cross-thread posted jobs.
//!
//! Timers repeat every interval until killed. A receiver is held weakly;
//! once it is gone its timers are dropped on the next due tick. Receivers
//! and jobs are always invoked with no dispatcher lock held, so they may
//! start and kill timers freely.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::message::{self, MessageContext};
use crate::timeout::Msecs;

pub type TimerId = i32;

/// Work posted to run on the dispatcher's thread.
pub type Job = Box<dyn FnOnce() + Send>;

/// Object that timer events are delivered to.
pub trait TimerReceiver: Send + Sync {
    fn timer_event(&self, id: TimerId);
}

/// Capability set of a native event dispatcher.
pub trait EventDispatcher: Send + Sync {
    /// Register a repeating timer. A negative interval is treated as zero.
    fn start_timer(&self, interval: Msecs, receiver: Weak<dyn TimerReceiver>) -> TimerId;

    /// Returns `false` if `id` was not registered.
    fn kill_timer(&self, id: TimerId) -> bool;

    /// Queue `job` to run in the dispatcher's thread. Safe from any thread.
    fn post(&self, job: Job);

    /// Run posted jobs and deliver due timers. Returns how many ran.
    fn process_events(&self) -> usize;

    /// Block until something is pending, a timer is due, or `max` elapses.
    fn wait_for_events(&self, max: Duration);

    /// Interrupt a `wait_for_events` in progress.
    fn wake_up(&self);
}

struct TimerSlot {
    interval: Duration,
    due: Instant,
    receiver: Weak<dyn TimerReceiver>,
}

#[derive(Default)]
struct LoopState {
    timers: HashMap<TimerId, TimerSlot>,
    posted: VecDeque<Job>,
    woken: bool,
    exit_code: Option<i32>,
}

/// Reference dispatcher with a blocking `exec` loop.
pub struct EventLoop {
    state: Mutex<LoopState>,
    wake: Condvar,
    next_id: AtomicI32,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState::default()),
            wake: Condvar::new(),
            next_id: AtomicI32::new(1),
        }
    }

    /// Dispatch until `exit` is called. Returns the exit code.
    pub fn exec(&self) -> i32 {
        self.state.lock().exit_code = None;
        loop {
            self.process_events();
            if let Some(code) = self.state.lock().exit_code.take() {
                return code;
            }
            self.wait_for_events(Duration::from_millis(100));
        }
    }

    pub fn exit(&self, code: i32) {
        let mut st = self.state.lock();
        st.exit_code = Some(code);
        self.wake.notify_all();
    }

    pub fn quit(&self) {
        self.exit(0);
    }

    pub fn timer_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    pub fn has_pending_events(&self) -> bool {
        let st = self.state.lock();
        let now = Instant::now();
        !st.posted.is_empty() || st.timers.values().any(|t| t.due <= now)
    }

    fn run_job(job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            message::warning(
                &MessageContext::new(file!(), line!(), "EventLoop::process_events"),
                "posted job panicked",
            );
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for EventLoop {
    fn start_timer(&self, interval: Msecs, receiver: Weak<dyn TimerReceiver>) -> TimerId {
        let interval = Duration::from_millis(interval.max(0) as u64);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut st = self.state.lock();
        st.timers.insert(
            id,
            TimerSlot {
                interval,
                due: Instant::now() + interval,
                receiver,
            },
        );
        // A sleeping waiter must recompute its wake time.
        self.wake.notify_all();
        id
    }

    fn kill_timer(&self, id: TimerId) -> bool {
        self.state.lock().timers.remove(&id).is_some()
    }

    fn post(&self, job: Job) {
        let mut st = self.state.lock();
        st.posted.push_back(job);
        self.wake.notify_all();
    }

    fn process_events(&self) -> usize {
        let now = Instant::now();
        let (jobs, mut due) = {
            let mut st = self.state.lock();
            st.woken = false;
            let jobs: Vec<Job> = st.posted.drain(..).collect();
            let mut due = Vec::new();
            for (id, slot) in st.timers.iter_mut() {
                if slot.due <= now {
                    slot.due = now + slot.interval;
                    due.push((*id, slot.receiver.clone()));
                }
            }
            (jobs, due)
        };
        // Registration order for timers that came due together.
        due.sort_by_key(|(id, _)| *id);

        let mut handled = 0;
        for job in jobs {
            Self::run_job(job);
            handled += 1;
        }
        for (id, receiver) in due {
            // An earlier handler in this batch may have killed it.
            if !self.state.lock().timers.contains_key(&id) {
                continue;
            }
            match receiver.upgrade() {
                Some(r) => {
                    r.timer_event(id);
                    handled += 1;
                }
                None => {
                    self.state.lock().timers.remove(&id);
                }
            }
        }
        handled
    }

    fn wait_for_events(&self, max: Duration) {
        let mut st = self.state.lock();
        if st.woken || !st.posted.is_empty() || st.exit_code.is_some() {
            st.woken = false;
            return;
        }
        let now = Instant::now();
        let mut until = now + max;
        if let Some(next) = st.timers.values().map(|t| t.due).min() {
            until = until.min(next);
        }
        if until > now {
            self.wake.wait_until(&mut st, until);
        }
        st.woken = false;
    }

    fn wake_up(&self) {
        let mut st = self.state.lock();
        st.woken = true;
        self.wake.notify_all();
    }
}
