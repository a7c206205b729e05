// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Blocking primitives, exercised from both OS and pool threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tandem_native::{default_backend, NativeThreadPool, ThreadPool};
use tandem_rt::{Error, Lock, RuntimeContext, ThreadKind, Timeout};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One context per thread kind, sharing a pool big enough for every
/// waiter these tests park at once.
fn contexts() -> Vec<RuntimeContext> {
    init_tracing();
    let pool: Arc<dyn NativeThreadPool> = Arc::new(ThreadPool::new(16));
    [ThreadKind::Os, ThreadKind::Pooled]
        .into_iter()
        .map(|kind| RuntimeContext::with_parts(kind, default_backend(), pool.clone()))
        .collect()
}

const LONG: f64 = 5.0;

#[test]
fn non_blocking_acquire_rejects_any_timeout() {
    init_tracing();
    let lock = Lock::default();
    for secs in [0.0, 0.001, 0.1, 1.0, 60.0] {
        match lock.acquire(false, Some(Timeout::from(secs))) {
            Err(Error::Value(_)) => {}
            other => panic!("timeout {}: expected Value error, got {:?}", secs, other),
        }
    }
}

#[test]
fn condition_wait_times_out_single_threaded() {
    for ctx in contexts() {
        let cond = ctx.condition();
        let _g = cond.enter().unwrap();
        let start = Instant::now();
        assert!(!cond.wait(Some(Timeout::from(0.1))).unwrap());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(95), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(LONG as u64));
    }
}

#[test]
fn notify_all_wakes_every_waiter() {
    const WAITERS: usize = 5;
    for ctx in contexts() {
        let cond = Arc::new(ctx.condition());
        let parked = Arc::new(AtomicUsize::new(0));
        let woken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..WAITERS)
            .map(|_| {
                let (cond, parked, woken) = (cond.clone(), parked.clone(), woken.clone());
                ctx.spawn(move || {
                    let _g = cond.enter().unwrap();
                    parked.fetch_add(1, Ordering::SeqCst);
                    if cond.wait(Some(Timeout::from(LONG))).unwrap() {
                        woken.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .unwrap()
            })
            .collect();

        while parked.load(Ordering::SeqCst) < WAITERS {
            std::thread::sleep(Duration::from_millis(1));
        }
        // Every waiter bumped `parked` under the lock and then waited,
        // which released it; holding the lock here means all are parked.
        cond.locked(|| cond.notify_all()).unwrap();

        for h in &handles {
            assert!(h.join(Some(Timeout::from(LONG))), "{:?}", ctx.kind());
        }
        assert_eq!(woken.load(Ordering::SeqCst), WAITERS, "{:?}", ctx.kind());
    }
}

#[test]
fn event_set_releases_waiter() {
    for ctx in contexts() {
        let event = Arc::new(ctx.event());
        assert!(!event.is_set());

        let e = event.clone();
        let result = Arc::new(AtomicUsize::new(0));
        let r = result.clone();
        let h = ctx
            .spawn(move || {
                if e.wait(Some(Timeout::from(LONG))).unwrap() {
                    r.store(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        event.set();
        assert!(event.is_set());
        assert!(h.join(Some(Timeout::from(LONG))));
        assert_eq!(result.load(Ordering::SeqCst), 1, "{:?}", ctx.kind());
    }
}

#[test]
fn semaphore_of_two() {
    for ctx in contexts() {
        let sem = Arc::new(ctx.semaphore(2));
        assert!(sem.acquire(false, None).unwrap());
        assert!(sem.acquire(false, None).unwrap());
        assert!(!sem.acquire(false, None).unwrap());

        let s = sem.clone();
        let h = ctx.spawn(move || s.release(2).unwrap()).unwrap();
        assert!(h.join(Some(Timeout::from(LONG))));

        assert!(sem.acquire(false, None).unwrap());
        assert!(sem.acquire(false, None).unwrap());
        assert!(!sem.acquire(false, None).unwrap());
    }
}

#[test]
fn semaphore_blocked_acquirer_wakes_on_release() {
    for ctx in contexts() {
        let sem = Arc::new(ctx.semaphore(0));
        let got = Arc::new(AtomicUsize::new(0));
        let (s, g) = (sem.clone(), got.clone());
        let h = ctx
            .spawn(move || {
                if s.acquire(true, Some(Timeout::from(LONG))).unwrap() {
                    g.store(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        sem.release(1).unwrap();
        assert!(h.join(Some(Timeout::from(LONG))));
        assert_eq!(got.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn scoped_lock_times_out_while_held_elsewhere() {
    for ctx in contexts() {
        let lock = Arc::new(ctx.lock());
        lock.set_default_timeout(0.05);
        let holder = ctx.event();
        let holder = Arc::new(holder);
        let release = Arc::new(ctx.event());

        let (l, held, rel) = (lock.clone(), holder.clone(), release.clone());
        let h = ctx
            .spawn(move || {
                let _g = l.enter().unwrap_or_else(|e| panic!("{}", e));
                held.set();
                rel.wait(Some(Timeout::from(LONG))).unwrap();
            })
            .unwrap();

        assert!(holder.wait(Some(Timeout::from(LONG))).unwrap());
        assert!(lock.enter().map(|_| ()).unwrap_err().is_timeout());
        release.set();
        assert!(h.join(Some(Timeout::from(LONG))));
        assert!(lock.enter().is_ok());
    }
}
