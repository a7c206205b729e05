// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Callback timers over a native dispatcher.
//!
//! Each registered handle gets its own native timer. When the timer fires
//! the entry is removed under the registry lock before anything runs, and
//! the native timer is killed, so a handle runs at most once per timer id.
//! `stop` turns every later firing into cleanup only.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tandem_native::{EventDispatcher, TimerId, TimerReceiver};

use crate::error::TaskError;
use crate::hook;

static DEFAULT_DEBUG: AtomicBool = AtomicBool::new(false);

/// Debug logging for timers created from now on.
pub fn set_default_debug(enabled: bool) {
    DEFAULT_DEBUG.store(enabled, Ordering::Relaxed);
}

type Callback = Box<dyn FnOnce() + Send>;

/// Cancellable one-shot callback.
pub struct TimerHandle {
    cancelled: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl TimerHandle {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(f))),
        })
    }

    /// Prevent the callback from running. Its captures are dropped now.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let dropped = self.callback.lock().take();
        drop(dropped);
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether the callback has yet to run or be cancelled.
    pub fn is_pending(&self) -> bool {
        !self.cancelled() && self.callback.lock().is_some()
    }

    /// Run the callback unless cancelled. Later calls do nothing.
    pub fn run(&self) {
        let callback = self.callback.lock().take();
        if let Some(f) = callback {
            if !self.cancelled() {
                f();
            }
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.cancelled())
            .finish()
    }
}

/// Registry of native timer ids to pending handles.
pub struct CallbackTimer {
    dispatcher: Arc<dyn EventDispatcher>,
    callbacks: Mutex<HashMap<TimerId, Arc<TimerHandle>>>,
    stopped: AtomicBool,
    debug: AtomicBool,
    this: Weak<CallbackTimer>,
}

impl CallbackTimer {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            dispatcher,
            callbacks: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            debug: AtomicBool::new(DEFAULT_DEBUG.load(Ordering::Relaxed)),
            this: this.clone(),
        })
    }

    /// Arm a native timer that runs `handle` after `delay`.
    pub fn add_callback(&self, handle: Arc<TimerHandle>, delay: Duration) -> Arc<TimerHandle> {
        let receiver: Weak<dyn TimerReceiver> = self.this.clone();
        let msecs = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let mut callbacks = self.callbacks.lock();
        let id = self.dispatcher.start_timer(msecs, receiver);
        callbacks.insert(id, handle.clone());
        if self.debug.load(Ordering::Relaxed) {
            tracing::debug!(timer_id = id, delay_ms = msecs, "registered timer");
        }
        handle
    }

    /// Every later firing only cleans up. Outstanding timers are not
    /// killed eagerly.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Timers registered and not yet fired.
    pub fn pending(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn dispatcher(&self) -> &Arc<dyn EventDispatcher> {
        &self.dispatcher
    }
}

impl TimerReceiver for CallbackTimer {
    fn timer_event(&self, id: TimerId) {
        let handle = self.callbacks.lock().remove(&id);
        self.dispatcher.kill_timer(id);

        if self.is_stopped() {
            if self.debug.load(Ordering::Relaxed) {
                tracing::debug!(timer_id = id, "timer fired after stop");
            }
            return;
        }

        let Some(handle) = handle else {
            tracing::debug!(timer_id = id, "timer fired for an unknown callback");
            return;
        };
        if self.debug.load(Ordering::Relaxed) {
            tracing::debug!(timer_id = id, cancelled = handle.cancelled(), "timer fired");
        }
        if handle.cancelled() {
            return;
        }
        // A panicking callback must not unwind through the dispatcher.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handle.run())) {
            hook::report_unhandled(&TaskError::from_panic(payload));
        }
    }
}

impl fmt::Debug for CallbackTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTimer")
            .field("pending", &self.pending())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A callback scheduled once on a dispatcher.
#[derive(Debug)]
pub struct SingleShot {
    handle: Arc<TimerHandle>,
}

impl SingleShot {
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Not yet fired and not cancelled.
    pub fn is_active(&self) -> bool {
        self.handle.is_pending()
    }
}

/// Run `f` once, `delay` from now, when `dispatcher` processes events.
/// Fires even if the returned `SingleShot` is dropped.
pub fn single_shot<F>(dispatcher: Arc<dyn EventDispatcher>, delay: Duration, f: F) -> SingleShot
where
    F: FnOnce() + Send + 'static,
{
    let timer = CallbackTimer::new(dispatcher);
    // The callback keeps its timer alive until it runs or is cancelled.
    let keep = timer.clone();
    let handle = TimerHandle::new(move || {
        let _keep = keep;
        f();
    });
    timer.add_callback(handle.clone(), delay);
    SingleShot { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tandem_native::EventLoop;

    fn counter() -> (Arc<AtomicUsize>, Arc<TimerHandle>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = TimerHandle::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handle)
    }

    #[test]
    fn fired_entry_is_removed_and_killed() {
        let ev = Arc::new(EventLoop::new());
        let timer = CallbackTimer::new(ev.clone());
        let (hits, handle) = counter();
        timer.add_callback(handle, Duration::ZERO);
        assert_eq!(timer.pending(), 1);
        ev.process_events();
        ev.process_events();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending(), 0);
        assert_eq!(ev.timer_count(), 0);
    }

    #[test]
    fn stopped_timer_never_runs() {
        let ev = Arc::new(EventLoop::new());
        let timer = CallbackTimer::new(ev.clone());
        let (hits, handle) = counter();
        timer.add_callback(handle, Duration::ZERO);
        timer.stop();
        ev.process_events();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(timer.pending(), 0);
        assert_eq!(ev.timer_count(), 0);
    }

    #[test]
    fn panicking_callback_is_reported_and_timer_keeps_working() {
        static REPORTED: AtomicUsize = AtomicUsize::new(0);
        let _serial = hook::HOOK_TEST_LOCK.lock();
        let previous = hook::set_unhandled_error_hook(|e| {
            if e.is_panic() && e.to_string().contains("callback blew up") {
                REPORTED.fetch_add(1, Ordering::SeqCst);
            }
        });

        let ev = Arc::new(EventLoop::new());
        let timer = CallbackTimer::new(ev.clone());
        timer.add_callback(TimerHandle::new(|| panic!("callback blew up")), Duration::ZERO);
        ev.process_events();

        let (hits, handle) = counter();
        timer.add_callback(handle, Duration::ZERO);
        ev.process_events();
        hook::restore_unhandled_error_hook(previous);

        assert_eq!(REPORTED.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending(), 0);
        assert_eq!(ev.timer_count(), 0);
    }

    #[test]
    fn cancelled_handle_is_skipped() {
        let ev = Arc::new(EventLoop::new());
        let timer = CallbackTimer::new(ev.clone());
        let (hits, handle) = counter();
        timer.add_callback(handle.clone(), Duration::ZERO);
        handle.cancel();
        ev.process_events();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn unknown_id_is_tolerated() {
        let ev = Arc::new(EventLoop::new());
        let timer = CallbackTimer::new(ev);
        timer.timer_event(4242);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn single_shot_fires_once_even_when_dropped() {
        let ev = Arc::new(EventLoop::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        drop(single_shot(ev.clone(), Duration::ZERO, move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        ev.process_events();
        ev.process_events();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn single_shot_cancel() {
        let ev = Arc::new(EventLoop::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let shot = single_shot(ev.clone(), Duration::ZERO, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(shot.is_active());
        shot.cancel();
        assert!(!shot.is_active());
        ev.process_events();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
