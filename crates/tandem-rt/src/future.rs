// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Future: a write-once outcome with a five-state lifecycle.
//!
//! ```text
//! Pending ──► Running ──► Finished
//!    │  └────────────────────▲
//!    ▼
//! Cancelled ──► CancelledAndNotified
//! ```
//!
//! The state byte is written only while the condition lock is held, and
//! every writer notifies the condition. Readers that block loop until the
//! state is terminal or their deadline passes.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tandem_native::EventDispatcher;

use crate::condition::Condition;
use crate::error::{Error, Result, TaskError};
use crate::timeout::{self, Timeout};

/// Lifecycle of a future.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureState {
    Pending = 0,
    Running = 1,
    Cancelled = 2,
    /// Cancelled, and the worker that would have run it has seen that.
    CancelledAndNotified = 3,
    Finished = 4,
}

impl FutureState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Cancelled,
            3 => Self::CancelledAndNotified,
            _ => Self::Finished,
        }
    }

    /// The transition table.
    pub fn can_transition_to(self, next: FutureState) -> bool {
        use FutureState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Finished)
                | (Running, Finished)
                | (Cancelled, CancelledAndNotified)
        )
    }

    pub fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled | Self::CancelledAndNotified)
    }

    pub fn is_terminal(self) -> bool {
        self.is_cancelled() || self == Self::Finished
    }
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::CancelledAndNotified => "cancelled-and-notified",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Where done-callbacks run.
#[derive(Clone, Default)]
pub enum Emitter {
    /// On the thread that completes the future.
    #[default]
    Direct,
    /// Posted to a dispatcher; they run when its owner processes events.
    Queued(Arc<dyn EventDispatcher>),
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emitter::Direct => f.write_str("Direct"),
            Emitter::Queued(_) => f.write_str("Queued"),
        }
    }
}

type DoneCallback<T> = Box<dyn FnOnce(&Future<T>) + Send>;

struct Inner<T> {
    id: String,
    cond: Condition,
    state: AtomicU8,
    outcome: OnceLock<Result<T, TaskError>>,
    callbacks: Mutex<Vec<DoneCallback<T>>>,
    emitter: Emitter,
}

/// Shared handle to a pending outcome. Clones refer to the same future.
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    pub fn new() -> Self {
        Self::with_emitter(Emitter::Direct)
    }

    pub fn with_emitter(emitter: Emitter) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: format!("{:016x}", rand::random::<u64>()),
                cond: Condition::new(),
                state: AtomicU8::new(FutureState::Pending as u8),
                outcome: OnceLock::new(),
                callbacks: Mutex::new(Vec::new()),
                emitter,
            }),
        }
    }

    /// Opaque identity for logs.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> FutureState {
        let _g = self.inner.cond.lock().hold();
        self.load_state()
    }

    fn load_state(&self) -> FutureState {
        FutureState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Caller holds the condition lock.
    fn store_state(&self, next: FutureState) {
        self.inner.state.store(next as u8, Ordering::Release);
    }

    /// Cancel a pending future. `false` once it is running or finished;
    /// `true` if it is (now or already) cancelled.
    pub fn cancel(&self) -> bool {
        {
            let _g = self.inner.cond.lock().hold();
            match self.load_state() {
                FutureState::Running | FutureState::Finished => return false,
                FutureState::Cancelled | FutureState::CancelledAndNotified => return true,
                FutureState::Pending => {
                    self.store_state(FutureState::Cancelled);
                    self.inner.cond.notify_all();
                }
            }
        }
        tracing::debug!(future_id = %self.id(), "future cancelled");
        self.fire_callbacks();
        true
    }

    pub fn cancelled(&self) -> bool {
        self.state().is_cancelled()
    }

    pub fn running(&self) -> bool {
        self.state() == FutureState::Running
    }

    pub fn done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait for completion and return the value, or re-raise the stored
    /// failure as `Error::Task`. `None` waits forever.
    pub fn result(&self, timeout: Option<Timeout>) -> Result<T>
    where
        T: Clone,
    {
        self.wait_finished(timeout)?;
        match self.inner.outcome.get() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(e)) => Err(Error::Task(e.clone())),
            None => Err(self.missing_outcome()),
        }
    }

    /// Wait for completion and return the stored failure, if any.
    pub fn exception(&self, timeout: Option<Timeout>) -> Result<Option<TaskError>> {
        self.wait_finished(timeout)?;
        match self.inner.outcome.get() {
            Some(Ok(_)) => Ok(None),
            Some(Err(e)) => Ok(Some(e.clone())),
            None => Err(self.missing_outcome()),
        }
    }

    fn missing_outcome(&self) -> Error {
        tracing::error!(future_id = %self.id(), "finished future has no outcome");
        Error::Runtime(format!("future {} finished without an outcome", self.id()))
    }

    /// Block until `Finished`. Cancellation and timeout are errors.
    fn wait_finished(&self, timeout: Option<Timeout>) -> Result<()> {
        let deadline = timeout::resolve(timeout, Timeout::Forever).deadline();
        let _g = self.inner.cond.lock().hold();
        loop {
            let state = self.load_state();
            if state.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if state == FutureState::Finished {
                return Ok(());
            }
            if deadline.has_expired() {
                return Err(Error::Timeout("future result"));
            }
            self.inner.cond.wait_until(deadline);
        }
    }

    /// Run `f` with this future once it is done. Already done: `f` runs now,
    /// on this thread. A panicking callback is logged, never propagated.
    pub fn add_done_callback(&self, f: impl FnOnce(&Future<T>) + Send + 'static) {
        {
            let _g = self.inner.cond.lock().hold();
            if !self.load_state().is_terminal() {
                self.inner.callbacks.lock().push(Box::new(f));
                return;
            }
        }
        invoke_callback(self, Box::new(f));
    }

    /// Claim the future for execution. `Ok(false)` means it was cancelled
    /// and the callable must not run. Claiming twice is a defect.
    pub fn set_running_or_notify_cancel(&self) -> Result<bool> {
        let _g = self.inner.cond.lock().hold();
        let state = self.load_state();
        match state {
            FutureState::Pending => {
                self.store_state(FutureState::Running);
                Ok(true)
            }
            FutureState::Cancelled => {
                self.store_state(FutureState::CancelledAndNotified);
                self.inner.cond.notify_all();
                Ok(false)
            }
            _ => {
                tracing::error!(future_id = %self.id(), %state, "future in unexpected state");
                Err(Error::Runtime(format!(
                    "future {} in unexpected state: {}",
                    self.id(),
                    state
                )))
            }
        }
    }

    pub fn set_result(&self, value: T) -> Result<()> {
        self.complete(Ok(value))
    }

    pub fn set_exception(&self, error: TaskError) -> Result<()> {
        self.complete(Err(error))
    }

    fn complete(&self, outcome: Result<T, TaskError>) -> Result<()> {
        {
            let _g = self.inner.cond.lock().hold();
            let state = self.load_state();
            if !state.can_transition_to(FutureState::Finished) {
                return Err(Error::InvalidState {
                    state,
                    future_id: self.id().to_string(),
                });
            }
            if self.inner.outcome.set(outcome).is_err() {
                return Err(Error::InvalidState {
                    state,
                    future_id: self.id().to_string(),
                });
            }
            self.store_state(FutureState::Finished);
            self.inner.cond.notify_all();
        }
        tracing::trace!(future_id = %self.id(), "future finished");
        self.fire_callbacks();
        Ok(())
    }

    fn fire_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        if callbacks.is_empty() {
            return;
        }
        match &self.inner.emitter {
            Emitter::Direct => {
                for cb in callbacks {
                    invoke_callback(self, cb);
                }
            }
            Emitter::Queued(dispatcher) => {
                let future = self.clone();
                dispatcher.post(Box::new(move || {
                    for cb in callbacks {
                        invoke_callback(&future, cb);
                    }
                }));
            }
        }
    }
}

impl<T: Send + Sync + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field(
                "state",
                &FutureState::from_u8(self.inner.state.load(Ordering::Relaxed)),
            )
            .finish()
    }
}

fn invoke_callback<T>(future: &Future<T>, cb: DoneCallback<T>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| cb(future))) {
        let err = TaskError::from_panic(payload);
        tracing::error!(future_id = %future.inner.id, error = %err, "exception calling callback for future");
    }
}
