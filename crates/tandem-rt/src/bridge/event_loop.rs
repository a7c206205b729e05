// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative loop bridged onto a native dispatcher.
//!
//! Callbacks and task polls are native timers, so they only run while the
//! dispatcher processes events: from `run_*` here, or from the native
//! loop's own `exec` when this loop is never run directly.

use std::fmt;
use std::future::Future as StdFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tandem_native::EventDispatcher;

use super::task::{self, LoopTask};
use super::timer::{CallbackTimer, TimerHandle};
use crate::error::{Error, Result, TaskError};
use crate::future::Future;
use crate::timeout::Timeout;

/// Upper bound on one park between event batches.
const PARK: Duration = Duration::from_millis(10);

pub struct BridgedLoop {
    dispatcher: Arc<dyn EventDispatcher>,
    timer: Arc<CallbackTimer>,
    running: AtomicBool,
    stopping: AtomicBool,
    closed: AtomicBool,
}

impl BridgedLoop {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            timer: CallbackTimer::new(dispatcher.clone()),
            dispatcher,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn dispatcher(&self) -> &Arc<dyn EventDispatcher> {
        &self.dispatcher
    }

    pub fn timer(&self) -> &Arc<CallbackTimer> {
        &self.timer
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Runtime("event loop is closed".to_string()));
        }
        Ok(())
    }

    /// Run `f` on the next pass through the dispatcher.
    pub fn call_soon(&self, f: impl FnOnce() + Send + 'static) -> Result<Arc<TimerHandle>> {
        self.call_later(Duration::ZERO, f)
    }

    pub fn call_later(
        &self,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> Result<Arc<TimerHandle>> {
        self.check_open()?;
        Ok(self.timer.add_callback(TimerHandle::new(f), delay))
    }

    /// Start `fut` as a task on this loop. Its outcome, including a
    /// panic, lands in the returned future.
    pub fn spawn<T, F>(&self, fut: F) -> Result<Future<T>>
    where
        T: Send + Sync + 'static,
        F: StdFuture<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.check_open()?;
        let target = Future::new();
        // Claimed at once: a loop task can't be cancelled before it starts.
        target.set_running_or_notify_cancel()?;
        let task = LoopTask::new(task::bind(fut, target.clone()), &self.timer);
        task.schedule();
        tracing::trace!(future_id = %target.id(), "loop task spawned");
        Ok(target)
    }

    /// Run until `fut` completes and return its value.
    pub fn run_until_complete<T, F>(&self, fut: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: StdFuture<Output = Result<T, TaskError>> + Send + 'static,
    {
        let target = self.spawn(fut)?;
        let watched = target.clone();
        self.run_until(move || watched.done())?;
        if !target.done() {
            return Err(Error::Runtime(
                "event loop stopped before the future completed".to_string(),
            ));
        }
        target.result(Some(Timeout::NON_BLOCKING))
    }

    /// Run until `stop` is called.
    pub fn run_forever(&self) -> Result<()> {
        self.run_until(|| false)
    }

    fn run_until(&self, finished: impl Fn() -> bool) -> Result<()> {
        self.check_open()?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::Runtime("this event loop is already running".to_string()));
        }
        let _running = RunningFlag(&self.running);
        self.stopping.store(false, Ordering::Release);
        tracing::debug!("bridged loop running");

        while !finished() && !self.stopping.load(Ordering::Acquire) {
            self.dispatcher.process_events();
            if finished() || self.stopping.load(Ordering::Acquire) {
                break;
            }
            self.dispatcher.wait_for_events(PARK);
        }

        tracing::debug!("bridged loop stopped");
        Ok(())
    }

    /// Ask a running loop to return after the current event batch.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.dispatcher.wake_up();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the loop. Pending timers become no-ops. Fails while running.
    pub fn close(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::Runtime("cannot close a running event loop".to_string()));
        }
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.timer.stop();
        }
        Ok(())
    }
}

/// Clears the running flag when `run_until` returns or unwinds.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl fmt::Debug for BridgedLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgedLoop")
            .field("running", &self.is_running())
            .field("closed", &self.is_closed())
            .field("timer", &self.timer)
            .finish()
    }
}
