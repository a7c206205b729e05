// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Blocking concurrency primitives over a toolkit's native ones.
//!
//! Every lock, wait and wakeup goes through the `tandem-native` traits, so
//! objects made here interoperate with the toolkit's threads and event loop.
//!
//! Components:
//! - timeout: caller timeouts, native conversion, timeout policy
//! - lock / condition / event / semaphore: blocking primitive adapters
//! - future / executor: write-once futures, thread-pool executor
//! - bridge: cooperative loop running on native timers
//! - context: OS-thread or pool-thread execution, primitive backend
//! - hook / logging / config: unhandled errors, native messages, settings

pub mod bridge;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod future;
pub mod hook;
pub mod lock;
pub mod logging;
pub mod semaphore;
pub mod timeout;

pub use condition::Condition;
pub use config::Config;
pub use context::{RuntimeContext, ThreadHandle, ThreadKind};
pub use error::{Error, Result, TaskError};
pub use event::Event;
pub use executor::ThreadPoolExecutor;
pub use future::{Emitter, Future, FutureState};
pub use lock::{Lock, LockGuard};
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use timeout::Timeout;
