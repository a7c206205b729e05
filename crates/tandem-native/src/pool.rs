// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native worker thread pool.
//!
//! Workers are spawned on demand up to `max_thread_count` and park on
//! `work_available` when the queue is empty. Queued work still runs when
//! the pool shuts down; only `clear` discards it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::message::{self, MessageContext};
use crate::timeout::{Deadline, Msecs};

/// A unit of work handed to a pool. Consumed by running it; dropping it
/// unrun is how `clear` discards queued work.
pub trait Runnable: Send {
    fn run(self: Box<Self>);
}

struct FnRunnable<F>(F);

impl<F: FnOnce() + Send> Runnable for FnRunnable<F> {
    fn run(self: Box<Self>) {
        (self.0)()
    }
}

/// Box a closure as a `Runnable`.
pub fn boxed<F: FnOnce() + Send + 'static>(f: F) -> Box<dyn Runnable> {
    Box::new(FnRunnable(f))
}

/// Capability set of a native thread pool.
pub trait NativeThreadPool: Send + Sync {
    /// Queue `task` to run on a worker.
    fn start(&self, task: Box<dyn Runnable>);

    /// Drop every queued task that hasn't started.
    fn clear(&self);

    /// Wait until the queue is empty and no task is running.
    /// Negative `msecs` waits forever. Returns `false` on timeout.
    fn wait_for_done(&self, msecs: Msecs) -> bool;

    fn max_thread_count(&self) -> usize;

    fn set_max_thread_count(&self, n: usize);

    /// Tasks currently running.
    fn active_thread_count(&self) -> usize;
}

struct PoolState {
    queue: VecDeque<Box<dyn Runnable>>,
    /// Spawned workers still in their loop.
    live: usize,
    /// Workers parked on `work_available`.
    idle: usize,
    /// Workers running a task.
    active: usize,
    max: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    work_available: Condvar,
    all_done: Condvar,
    name: String,
}

/// Reference pool.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    /// Pool with up to `max_threads` workers. Zero means one per core.
    pub fn new(max_threads: usize) -> Self {
        Self::named("tandem-pool", max_threads)
    }

    pub fn named(name: &str, max_threads: usize) -> Self {
        let max = if max_threads == 0 {
            thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            max_threads
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    live: 0,
                    idle: 0,
                    active: 0,
                    max,
                    shutdown: false,
                }),
                work_available: Condvar::new(),
                all_done: Condvar::new(),
                name: name.to_string(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Process-wide pool shared by every executor that doesn't bring its own.
    pub fn global() -> Arc<ThreadPool> {
        static GLOBAL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(ThreadPool::named("tandem-global", 0)))
            .clone()
    }

    /// Queue a closure.
    pub fn spawn<F: FnOnce() + Send + 'static>(&self, f: F) {
        self.start(boxed(f));
    }

    /// Queued tasks not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Spawn workers while there is queued work nobody is free to take.
    fn grow(&self, st: &mut PoolState) {
        while !st.shutdown && st.live < st.max && st.queue.len() > st.idle {
            let shared = self.shared.clone();
            let id = st.live;
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.shared.name, id))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => {
                    st.live += 1;
                    self.workers.lock().push(handle);
                }
                Err(e) => {
                    message::warning(
                        &MessageContext::new(file!(), line!(), "ThreadPool::grow"),
                        &format!("failed to spawn worker thread: {}", e),
                    );
                    break;
                }
            }
        }
    }

    fn shutdown(&self) {
        {
            let mut st = self.shared.state.lock();
            st.shutdown = true;
            self.shared.work_available.notify_all();
        }

        let me = thread::current().id();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.thread().id() == me {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl NativeThreadPool for ThreadPool {
    fn start(&self, task: Box<dyn Runnable>) {
        let mut st = self.shared.state.lock();
        st.queue.push_back(task);
        self.grow(&mut st);
        self.shared.work_available.notify_one();
    }

    fn clear(&self) {
        let mut st = self.shared.state.lock();
        let dropped: Vec<Box<dyn Runnable>> = st.queue.drain(..).collect();
        if st.active == 0 {
            self.shared.all_done.notify_all();
        }
        drop(st);
        // Dropping a runnable may run arbitrary code; keep the lock free.
        drop(dropped);
    }

    fn wait_for_done(&self, msecs: Msecs) -> bool {
        let deadline = Deadline::from_msecs(msecs);
        let mut st = self.shared.state.lock();
        while !(st.queue.is_empty() && st.active == 0) {
            match deadline {
                Deadline::Forever => self.shared.all_done.wait(&mut st),
                Deadline::At(at) => {
                    if self.shared.all_done.wait_until(&mut st, at).timed_out() {
                        return st.queue.is_empty() && st.active == 0;
                    }
                }
            }
        }
        true
    }

    fn max_thread_count(&self) -> usize {
        self.shared.state.lock().max
    }

    fn set_max_thread_count(&self, n: usize) {
        let mut st = self.shared.state.lock();
        st.max = n.max(1);
        self.grow(&mut st);
    }

    fn active_thread_count(&self) -> usize {
        self.shared.state.lock().active
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    let mut st = shared.state.lock();
    loop {
        if let Some(task) = st.queue.pop_front() {
            st.active += 1;
            MutexGuard::unlocked(&mut st, || run_task(task));
            st.active -= 1;
            if st.active == 0 && st.queue.is_empty() {
                shared.all_done.notify_all();
            }
            continue;
        }
        if st.shutdown {
            break;
        }
        st.idle += 1;
        shared.work_available.wait(&mut st);
        st.idle -= 1;
    }
    st.live -= 1;
}

fn run_task(task: Box<dyn Runnable>) {
    if panic::catch_unwind(AssertUnwindSafe(move || task.run())).is_err() {
        message::warning(
            &MessageContext::new(file!(), line!(), "ThreadPool::worker"),
            "runnable panicked; worker continues",
        );
    }
}
