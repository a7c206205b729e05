// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::future::FutureState;

/// Everything the adapters can fail with.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A blocking call gave up. The payload names the operation.
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("future was cancelled")]
    Cancelled,

    /// A result or exception was written into a future that is already done.
    #[error("future {future_id} is already {state}")]
    InvalidState {
        state: FutureState,
        future_id: String,
    },

    #[error("{0}")]
    Runtime(String),

    /// Caller passed an argument combination that makes no sense.
    #[error("{0}")]
    Value(String),

    /// The callable behind a future failed; `result` re-raises it.
    #[error("task failed: {0}")]
    Task(#[source] TaskError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Timeouts are expected and recoverable.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The failure of a user callable: any error value, a message, or a
/// caught panic. Cheap to clone so every reader of a future can get it.
#[derive(Clone)]
pub struct TaskError {
    inner: Arc<dyn std::error::Error + Send + Sync>,
    panicked: bool,
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

impl TaskError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
            panicked: false,
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Wrap a payload returned by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self {
            inner: Arc::new(Message(msg)),
            panicked: true,
        }
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Whether the callable panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskError")
            .field("error", &self.inner)
            .field("panicked", &self.panicked)
            .finish()
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "panicked: {}", self.inner)
        } else {
            fmt::Display::fmt(&self.inner, f)
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for TaskError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            inner: Arc::from(error),
            panicked: false,
        }
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}
