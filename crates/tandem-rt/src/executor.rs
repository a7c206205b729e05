// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Thread-pool executor.
//!
//! `submit` binds a callable to a fresh `Future` and hands the binding to
//! the native pool. The worker claims the future first; a cancelled claim
//! skips the callable. A binding the pool discards without running
//! cancels its future when dropped.

use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tandem_native::{EventDispatcher, NativeThreadPool, Runnable, ThreadPool, FOREVER};

use crate::error::{Error, Result, TaskError};
use crate::future::{Emitter, Future};
use crate::lock::Lock;
use crate::timeout::Timeout;

type Work<T> = Box<dyn FnOnce() -> Result<T, TaskError> + Send>;

/// A callable bound to the future that receives its outcome.
struct Task<T: Send + Sync + 'static> {
    future: Future<T>,
    work: Option<Work<T>>,
}

impl<T: Send + Sync + 'static> Runnable for Task<T> {
    fn run(mut self: Box<Self>) {
        let Some(work) = self.work.take() else {
            return;
        };
        match self.future.set_running_or_notify_cancel() {
            Ok(true) => {}
            // Cancelled before a worker got to it.
            Ok(false) => return,
            Err(e) => {
                tracing::error!(future_id = %self.future.id(), error = %e, "task claimed twice; work dropped");
                return;
            }
        }

        let written = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => self.future.set_result(value),
            Ok(Err(e)) => self.future.set_exception(e),
            Err(payload) => self.future.set_exception(TaskError::from_panic(payload)),
        };
        if let Err(e) = written {
            tracing::warn!(future_id = %self.future.id(), error = %e, "task outcome was not recorded");
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Task<T> {
    fn drop(&mut self) {
        if self.work.is_some() && self.future.cancel() {
            tracing::debug!(future_id = %self.future.id(), "queued task discarded");
        }
    }
}

/// Executor running callables on a native thread pool.
pub struct ThreadPoolExecutor {
    pool: Arc<dyn NativeThreadPool>,
    /// Guards `shutdown` against concurrent `submit`.
    shutdown_lock: Lock,
    shutdown: AtomicBool,
    emitter: Emitter,
}

impl ThreadPoolExecutor {
    /// Executor over the process-wide pool.
    pub fn new() -> Self {
        Self::with_pool(ThreadPool::global())
    }

    pub fn with_pool(pool: Arc<dyn NativeThreadPool>) -> Self {
        Self {
            pool,
            shutdown_lock: Lock::new(Timeout::Forever),
            shutdown: AtomicBool::new(false),
            emitter: Emitter::Direct,
        }
    }

    /// Done-callbacks of futures created from now on are posted to
    /// `dispatcher` instead of running on the worker.
    pub fn notify_on(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.emitter = Emitter::Queued(dispatcher);
        self
    }

    pub fn pool(&self) -> &Arc<dyn NativeThreadPool> {
        &self.pool
    }

    /// Schedule `f`. A panic inside `f` becomes the future's exception.
    pub fn submit<T, F>(&self, f: F) -> Result<Future<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit_fallible(move || Ok::<T, Infallible>(f()))
    }

    /// Schedule `f`; `Err(e)` becomes the future's exception.
    pub fn submit_fallible<T, E, F>(&self, f: F) -> Result<Future<T>>
    where
        T: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    {
        let _g = self.shutdown_lock.hold();
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::Runtime(
                "cannot schedule new futures after shutdown".to_string(),
            ));
        }
        let future = Future::with_emitter(self.emitter.clone());
        tracing::trace!(future_id = %future.id(), "task submitted");
        self.pool.start(Box::new(Task {
            future: future.clone(),
            work: Some(Box::new(move || f().map_err(TaskError::new))),
        }));
        Ok(future)
    }

    /// Submit `f(item)` for every item. Futures come back in input order.
    pub fn map<I, T, F>(&self, items: I, f: F) -> Result<Vec<Future<T>>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        T: Send + Sync + 'static,
        F: Fn(I::Item) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        items
            .into_iter()
            .map(|item| {
                let f = f.clone();
                self.submit(move || f(item))
            })
            .collect()
    }

    /// Refuse further submissions. `cancel_futures` discards queued work
    /// (the whole pool's queue); `wait` blocks until the pool is idle.
    pub fn shutdown(&self, wait: bool, cancel_futures: bool) {
        {
            let _g = self.shutdown_lock.hold();
            self.shutdown.store(true, Ordering::Release);
        }
        tracing::debug!(wait, cancel_futures, "executor shutdown");
        if cancel_futures {
            self.pool.clear();
        }
        if wait {
            self.pool.wait_for_done(FOREVER);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Run `f` with the executor, then shut down and wait.
    pub fn run_scoped<R>(&self, f: impl FnOnce(&Self) -> R) -> Result<R> {
        if self.is_shutdown() {
            return Err(Error::Runtime(
                "cannot enter an executor that has been shut down".to_string(),
            ));
        }
        let out = f(self);
        self.shutdown(true, false);
        Ok(out)
    }
}

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("shutdown", &self.is_shutdown())
            .field("emitter", &self.emitter)
            .finish()
    }
}
