// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Future lifecycle and executor behavior.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tandem_native::{EventDispatcher, EventLoop, NativeThreadPool, ThreadPool};
use tandem_rt::{Error, Event, Future, FutureState, TaskError, ThreadPoolExecutor, Timeout};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn executor(threads: usize) -> ThreadPoolExecutor {
    init_tracing();
    ThreadPoolExecutor::with_pool(Arc::new(ThreadPool::new(threads)))
}

fn add(a: i32, b: i32) -> i32 {
    a + b
}

const LONG: Option<Timeout> = Some(Timeout::After(Duration::from_secs(5)));

#[test]
fn future_lifecycle() {
    init_tracing();
    let pending: Future<i32> = Future::new();
    assert!(pending.cancel());
    assert!(pending.cancelled());
    assert!(pending.result(None).unwrap_err().is_cancelled());

    let claimed: Future<i32> = Future::new();
    assert!(claimed.set_running_or_notify_cancel().unwrap());
    assert!(!claimed.cancel());
    claimed.set_result(1).unwrap();
    assert!(matches!(claimed.set_result(2), Err(Error::InvalidState { .. })));

    let never: Future<i32> = Future::new();
    assert!(never.result(Some(Timeout::from(0.1))).unwrap_err().is_timeout());
}

#[test]
fn submit_returns_callable_value() {
    let ex = executor(2);
    let f = ex.submit(move || add(1, 2)).unwrap();
    assert_eq!(f.result(LONG).unwrap(), add(1, 2));
    assert_eq!(f.state(), FutureState::Finished);
}

#[test]
fn submit_after_shutdown_is_runtime_error() {
    let ex = executor(2);
    ex.submit(|| ()).unwrap();
    ex.shutdown(true, false);
    match ex.submit(|| ()) {
        Err(Error::Runtime(_)) => {}
        other => panic!("expected Runtime error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn shutdown_with_cancel_leaves_queued_futures_cancelled() {
    let ex = executor(1);
    let gate = Arc::new(Event::new());
    let started = Arc::new(Event::new());

    let (g, s) = (gate.clone(), started.clone());
    let blocker = ex
        .submit(move || {
            s.set();
            g.wait(LONG).unwrap()
        })
        .unwrap();
    assert!(started.wait(LONG).unwrap());

    let ran = Arc::new(AtomicUsize::new(0));
    let queued: Vec<Future<()>> = (0..5)
        .map(|_| {
            let ran = ran.clone();
            ex.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        })
        .collect();

    ex.shutdown(false, true);
    gate.set();
    assert!(blocker.result(LONG).unwrap());
    assert!(ex.pool().wait_for_done(5_000));

    for f in &queued {
        assert!(f.cancelled());
        assert!(f.result(None).unwrap_err().is_cancelled());
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn cancelled_while_worker_busy_never_runs() {
    let ex = executor(1);
    let gate = Arc::new(Event::new());
    let g = gate.clone();
    let blocker = ex.submit(move || g.wait(LONG).unwrap()).unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let r = ran.clone();
    let victim = ex.submit(move || r.store(true, Ordering::SeqCst)).unwrap();
    assert!(victim.cancel());

    gate.set();
    blocker.result(LONG).unwrap();
    assert!(ex.pool().wait_for_done(5_000));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(victim.state(), FutureState::CancelledAndNotified);
}

#[test]
fn failing_callable_exposes_exception() {
    let ex = executor(1);
    let f = ex
        .submit_fallible(|| -> Result<u32, std::num::ParseIntError> { "seven".parse() })
        .unwrap();
    let err = f.exception(LONG).unwrap().expect("stored exception");
    assert!(err.downcast_ref::<std::num::ParseIntError>().is_some());
    assert!(matches!(f.result(None), Err(Error::Task(_))));

    let p = ex.submit(|| -> u32 { panic!("kaboom") }).unwrap();
    let err = p.exception(LONG).unwrap().expect("stored panic");
    assert!(err.is_panic());
}

#[test]
fn callback_added_after_completion_runs_synchronously() {
    init_tracing();
    let f = Future::new();
    f.set_result(5u8).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    f.add_done_callback(move |fut| {
        s.store(fut.result(None).unwrap() as usize, Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

#[test]
fn queued_emitter_defers_callbacks_to_dispatcher() {
    init_tracing();
    let ev = Arc::new(EventLoop::new());
    let pool: Arc<dyn NativeThreadPool> = Arc::new(ThreadPool::new(1));
    let ex = ThreadPoolExecutor::with_pool(pool).notify_on(ev.clone());

    let gate = Arc::new(Event::new());
    let g = gate.clone();
    let f = ex.submit(move || g.wait(LONG).unwrap()).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    f.add_done_callback(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    gate.set();
    assert!(f.result(LONG).unwrap());
    ex.shutdown(true, false);
    // The worker finished; the callback is posted but has not run.
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(ev.has_pending_events());
    ev.process_events();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_before_completion_runs_once() {
    let ex = executor(1);
    let gate = Arc::new(Event::new());
    let g = gate.clone();
    let f = ex.submit(move || g.wait(LONG).unwrap()).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    f.add_done_callback(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    gate.set();
    f.result(LONG).unwrap();
    ex.shutdown(true, false);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn set_exception_on_cancelled_future_is_invalid_state() {
    init_tracing();
    let f: Future<()> = Future::new();
    f.cancel();
    match f.set_exception(TaskError::msg("late")) {
        Err(Error::InvalidState { state, .. }) => assert_eq!(state, FutureState::Cancelled),
        other => panic!("expected InvalidState, got {:?}", other),
    }
}

#[test]
fn global_pool_executor() {
    init_tracing();
    let ex = ThreadPoolExecutor::new();
    let futures = ex.map(1..=4, |n: u32| n * 10).unwrap();
    let total: u32 = futures.iter().map(|f| f.result(LONG).unwrap()).sum();
    assert_eq!(total, 100);
}
