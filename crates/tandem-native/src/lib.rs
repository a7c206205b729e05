// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native toolkit capability set.
//!
//! Everything the adapter layer in `tandem-rt` synchronizes through lives
//! behind the traits in this crate. A toolkit binding implements them; the
//! adapters never reach past them.
//!
//! Components:
//! - timeout: native timeout encodings (`Msecs`, `Deadline`)
//! - mutex: plain and recursive mutex with raw lock/unlock
//! - condvar: wait condition bound to a native mutex at wait time
//! - semaphore: counting semaphore
//! - pool: thread pool running `Runnable`s
//! - dispatcher: event dispatcher: timers, posted events, processing
//! - message: diagnostic message sink
//! - backend: primitive factory, selected once per adapter
//!
//! The `ParkingLot*`, `ThreadPool` and `EventLoop` types are the reference
//! binding shipped with the crate.

pub mod backend;
pub mod condvar;
pub mod dispatcher;
pub mod message;
pub mod mutex;
pub mod pool;
pub mod semaphore;
pub mod timeout;

pub use backend::{default_backend, Backend, ParkingLotBackend};
pub use condvar::{NativeCondvar, ParkingLotCondvar};
pub use dispatcher::{EventDispatcher, EventLoop, Job, TimerId, TimerReceiver};
pub use message::{MessageContext, MessageHandler, MessageKind};
pub use mutex::{NativeMutex, ParkingLotMutex, ParkingLotRecursiveMutex};
pub use pool::{NativeThreadPool, Runnable, ThreadPool};
pub use semaphore::{NativeSemaphore, ParkingLotSemaphore};
pub use timeout::{Deadline, Msecs, FOREVER};
