// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Execution context: where spawned work runs, and which backend its
//! primitives come from.
//!
//! The thread kind is picked once, when the context is built. Primitives
//! are always the adapters, so they work the same across both kinds.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tandem_native::{default_backend, pool, Backend, NativeThreadPool, ThreadPool};

use crate::condition::Condition;
use crate::error::{Error, Result, TaskError};
use crate::event::Event;
use crate::lock::Lock;
use crate::semaphore::Semaphore;
use crate::timeout::Timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    /// A dedicated OS thread.
    Os,
    /// A worker of the native pool.
    Pooled,
}

pub struct RuntimeContext {
    kind: ThreadKind,
    backend: Arc<dyn Backend>,
    pool: Arc<dyn NativeThreadPool>,
}

impl RuntimeContext {
    /// Default backend, process-wide pool.
    pub fn new(kind: ThreadKind) -> Self {
        Self::with_parts(kind, default_backend(), ThreadPool::global())
    }

    pub fn with_parts(
        kind: ThreadKind,
        backend: Arc<dyn Backend>,
        pool: Arc<dyn NativeThreadPool>,
    ) -> Self {
        Self { kind, backend, pool }
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    /// Run `f` on a thread of this context's kind.
    pub fn spawn<F>(&self, f: F) -> Result<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let done = Arc::new(self.event());
        let failure = Arc::new(Mutex::new(None));
        let handle = ThreadHandle {
            done: done.clone(),
            failure: failure.clone(),
        };

        let body = move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
                let err = TaskError::from_panic(payload);
                tracing::warn!(error = %err, "spawned thread panicked");
                *failure.lock() = Some(err);
            }
            done.set();
        };

        match self.kind {
            ThreadKind::Os => {
                thread::Builder::new()
                    .name("tandem-thread".to_string())
                    .spawn(body)
                    .map_err(|e| Error::Runtime(format!("failed to spawn thread: {}", e)))?;
            }
            ThreadKind::Pooled => self.pool.start(pool::boxed(body)),
        }
        Ok(handle)
    }

    pub fn event(&self) -> Event {
        Event::with_backend(&*self.backend)
    }

    pub fn condition(&self) -> Condition {
        Condition::with_backend(&*self.backend)
    }

    pub fn semaphore(&self, permits: usize) -> Semaphore {
        Semaphore::with_backend(&*self.backend, permits)
    }

    pub fn lock(&self) -> Lock {
        Lock::with_backend(&*self.backend, false, Timeout::Forever)
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Completion handle of a spawned closure.
#[derive(Clone)]
pub struct ThreadHandle {
    done: Arc<Event>,
    failure: Arc<Mutex<Option<TaskError>>>,
}

impl ThreadHandle {
    /// Wait for the closure to finish. `false` if `timeout` elapsed first.
    pub fn join(&self, timeout: Option<Timeout>) -> bool {
        self.done.wait(timeout).unwrap_or(false)
    }

    pub fn is_alive(&self) -> bool {
        !self.done.is_set()
    }

    /// The panic of a finished closure, if it panicked.
    pub fn panic(&self) -> Option<TaskError> {
        self.failure.lock().clone()
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
