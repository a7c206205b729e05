// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Event-loop bridge.
//!
//! A cooperative single-threaded loop whose callbacks and tasks fire as
//! native timers, so it shares its thread with the native dispatcher.
//!
//! Components:
//! - `timer`: timer-id to callback registry, single-shot timers
//! - `task`: polled tasks woken through zero-delay timers
//! - `event_loop`: `BridgedLoop` (call_soon, call_later, spawn, run)
//! - `slot`: wrappers that drive a task from a native callback

pub mod event_loop;
pub mod slot;
mod task;
pub mod timer;

pub use event_loop::BridgedLoop;
pub use slot::{async_close, async_slot};
pub use timer::{single_shot, CallbackTimer, SingleShot, TimerHandle};
