// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Wrappers that let a native callback start loop tasks.
//!
//! `async_close` drives its task to completion before returning, pumping
//! the native dispatcher meanwhile (for handlers whose caller needs the
//! answer, such as close requests). `async_slot` starts the task and
//! returns at once; a failure is reported through `hook`.

use std::future::Future as StdFuture;
use std::sync::Arc;
use std::time::Duration;

use super::event_loop::BridgedLoop;
use crate::error::{Result, TaskError};
use crate::future::Future;
use crate::hook;
use crate::timeout::Timeout;

/// Wrap `f` so each call runs the task it builds to completion.
pub fn async_close<A, T, F, Fut>(lp: Arc<BridgedLoop>, f: F) -> impl Fn(A) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: StdFuture<Output = Result<T, TaskError>> + Send + 'static,
{
    move |args| {
        let task = lp.spawn(f(args))?;
        let dispatcher = lp.dispatcher();
        while !task.done() {
            dispatcher.process_events();
            if !task.done() {
                dispatcher.wait_for_events(Duration::from_millis(10));
            }
        }
        task.result(Some(Timeout::NON_BLOCKING))
    }
}

/// Wrap `f` so each call starts the task it builds. A task that fails is
/// handed to the unhandled-error hook; cancellation is not reported.
pub fn async_slot<A, T, F, Fut>(lp: Arc<BridgedLoop>, f: F) -> impl Fn(A) -> Result<Future<T>>
where
    T: Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: StdFuture<Output = Result<T, TaskError>> + Send + 'static,
{
    move |args| {
        let task = lp.spawn(f(args))?;
        task.add_done_callback(|done| {
            if let Ok(Some(err)) = done.exception(Some(Timeout::NON_BLOCKING)) {
                hook::report_unhandled(&err);
            }
        });
        Ok(task)
    }
}
