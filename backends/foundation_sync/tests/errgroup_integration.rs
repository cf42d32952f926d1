//! Task group scenarios: bounded fan-out, failure aggregation and panic
//! containment across many concurrent tasks.

use foundation_sync::context::Context;
use foundation_sync::errgroup::{TaskError, TaskGroup};
use foundation_sync::BoxedError;
use ntest::timeout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
#[timeout(60000)]
fn hundred_tasks_never_exceed_limit_of_ten() {
    let group = TaskGroup::new();
    group.set_limit(10);

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        let completed = Arc::clone(&completed);
        group.go(move || {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(fastrand::u64(1..=10)));
            running.fetch_sub(1, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
            Ok::<(), BoxedError>(())
        });
    }

    group.wait().expect("no task failed");
    assert_eq!(completed.load(Ordering::SeqCst), 100);
    assert!(peak.load(Ordering::SeqCst) <= 10);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[test]
#[timeout(60000)]
fn one_panic_among_many_is_reported_and_others_finish() {
    let (group, ctx) = TaskGroup::with_context(&Context::background());
    group.set_limit(10);

    let completed = Arc::new(AtomicUsize::new(0));
    for i in 0..100 {
        let completed = Arc::clone(&completed);
        group.go(move || {
            thread::sleep(Duration::from_millis(5));
            if i == 10 {
                panic!("1");
            }
            completed.fetch_add(1, Ordering::SeqCst);
            Ok::<(), BoxedError>(())
        });
    }

    let err = group.wait().expect_err("the panic is surfaced");
    match &err {
        TaskError::Panicked(panicked) => assert_eq!(panicked.message(), "1"),
        other => panic!("expected a panic, got {other:?}"),
    }
    assert!(err.to_string().contains("panicked"));
    assert_eq!(completed.load(Ordering::SeqCst), 99);
    assert!(ctx.is_done());
}

#[test]
#[timeout(60000)]
fn tasks_observing_context_stop_early_after_failure() {
    let (group, ctx) = TaskGroup::with_context(&Context::background());

    let stopped_early = Arc::new(AtomicUsize::new(0));
    for _ in 0..8 {
        let ctx = ctx.clone();
        let stopped_early = Arc::clone(&stopped_early);
        group.go(move || {
            if ctx.wait_done_timeout(Duration::from_secs(10)).is_some() {
                stopped_early.fetch_add(1, Ordering::SeqCst);
            }
            Ok::<(), BoxedError>(())
        });
    }

    group.go(|| Err::<(), _>("broken pipe"));

    let err = group.wait().expect_err("one task failed");
    assert!(matches!(err, TaskError::Failed(_)));
    assert_eq!(err.to_string(), "task failed: broken pipe");
    assert_eq!(stopped_early.load(Ordering::SeqCst), 8);
}

#[test]
#[timeout(60000)]
fn nested_submissions_are_awaited() {
    let group = TaskGroup::new();
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let inner_group = group.clone();
        let completed = Arc::clone(&completed);
        group.go(move || {
            for _ in 0..4 {
                let completed = Arc::clone(&completed);
                inner_group.go(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), BoxedError>(())
                });
            }
            Ok::<(), BoxedError>(())
        });
    }

    group.wait().expect("no task failed");
    assert_eq!(completed.load(Ordering::SeqCst), 16);
}
