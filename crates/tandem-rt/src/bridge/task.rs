// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Loop tasks: futures polled from native timer callbacks.
//!
//! Waking a task arms a zero-delay timer on the loop's `CallbackTimer`;
//! the timer callback polls it. A task is armed at most once at a time.

use std::future::Future as StdFuture;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use parking_lot::Mutex;

use super::timer::{CallbackTimer, TimerHandle};
use crate::error::TaskError;
use crate::future::Future;

pub(crate) type BoxFuture = Pin<Box<dyn StdFuture<Output = ()> + Send>>;

pub(crate) struct LoopTask {
    future: Mutex<Option<BoxFuture>>,
    /// A poll is armed and hasn't run yet.
    scheduled: AtomicBool,
    timer: Weak<CallbackTimer>,
}

impl LoopTask {
    pub fn new(future: BoxFuture, timer: &Arc<CallbackTimer>) -> Arc<Self> {
        Arc::new(Self {
            future: Mutex::new(Some(future)),
            scheduled: AtomicBool::new(false),
            timer: Arc::downgrade(timer),
        })
    }

    /// Arm a poll. No-op if one is armed or the loop is gone.
    pub fn schedule(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(timer) = self.timer.upgrade() else {
            return;
        };
        let task = self.clone();
        timer.add_callback(TimerHandle::new(move || task.poll()), Duration::ZERO);
    }

    fn poll(self: &Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        let waker = Waker::from(Arc::new(TaskWaker { task: self.clone() }));
        let mut cx = Context::from_waker(&waker);

        let mut slot = self.future.lock();
        let Some(fut) = slot.as_mut() else {
            return;
        };
        if fut.as_mut().poll(&mut cx).is_ready() {
            *slot = None;
        }
    }
}

struct TaskWaker {
    task: Arc<LoopTask>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.task.schedule();
    }
}

/// Polls the inner future, turning a panic into `Err(payload)`.
struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F: StdFuture> StdFuture for CatchUnwind<F> {
    type Output = Result<F::Output, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(v)) => Poll::Ready(Ok(v)),
            Err(payload) => Poll::Ready(Err(TaskError::from_panic(payload))),
        }
    }
}

/// Wrap `fut` so its outcome, or its panic, lands in `target`.
pub(crate) fn bind<T, F>(fut: F, target: Future<T>) -> BoxFuture
where
    T: Send + Sync + 'static,
    F: StdFuture<Output = Result<T, TaskError>> + Send + 'static,
{
    Box::pin(async move {
        let outcome = CatchUnwind {
            inner: Box::pin(fut),
        }
        .await;
        let written = match outcome {
            Ok(Ok(value)) => target.set_result(value),
            Ok(Err(e)) | Err(e) => target.set_exception(e),
        };
        if let Err(e) = written {
            tracing::debug!(future_id = %target.id(), error = %e, "loop task outcome dropped");
        }
    })
}
