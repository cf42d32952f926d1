use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use super::TaskError;
use crate::context::{CancelHandle, Context};
use crate::drops::RunOnDrop;
use crate::panics::catch_panic;
use crate::BoxedError;

struct GroupState {
    /// `None` means unlimited.
    limit: Option<usize>,

    /// Tasks that started running and have not finished.
    active: usize,

    /// Tasks admitted by `go`/`try_go` that have not finished. This is
    /// what the limit is checked against.
    pending: usize,

    first_error: Option<TaskError>,
    next_task_id: u64,
}

impl GroupState {
    fn has_slot(&self) -> bool {
        self.limit.is_none_or(|limit| self.pending < limit)
    }

    fn admit(&mut self) -> u64 {
        self.pending += 1;
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }
}

struct GroupInner {
    state: Mutex<GroupState>,

    /// Notified whenever a task finishes and frees a slot.
    slot_freed: Condvar,

    /// Notified when `pending` drops to zero.
    all_done: Condvar,

    cancel: Option<CancelHandle>,
}

impl GroupInner {
    fn lock_state(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn started(&self) {
        self.lock_state().active += 1;
    }

    fn finish(&self, started: bool) {
        let mut state = self.lock_state();
        if started {
            state.active -= 1;
        }
        state.pending -= 1;
        let idle = state.pending == 0;
        drop(state);

        self.slot_freed.notify_all();
        if idle {
            self.all_done.notify_all();
        }
    }

    /// Keeps `err` if it is the first failure of the group and cancels
    /// the derived context after it has been stored.
    fn record_failure(&self, task: u64, err: TaskError) {
        let discarded = {
            let mut state = self.lock_state();
            if state.first_error.is_some() {
                Some(err)
            } else {
                state.first_error = Some(err);
                None
            }
        };

        match discarded {
            None => {
                tracing::debug!(task, "recorded first task failure");
                if let Some(cancel) = &self.cancel {
                    cancel.cancel();
                }
            }
            Some(err) => {
                tracing::debug!(task, "discarding later task failure: {err}");
            }
        }
    }
}

/// Runs tasks on their own threads and collects the first failure.
///
/// Cloning a `TaskGroup` hands out another handle to the same group, so
/// running tasks may submit further tasks. Submitting from inside a task
/// while the limit is saturated blocks that task until a slot frees up.
///
/// # Examples
///
/// ```
/// use foundation_sync::errgroup::TaskGroup;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let group = TaskGroup::new();
/// group.set_limit(2);
///
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     let done = Arc::clone(&done);
///     group.go(move || {
///         done.fetch_add(1, Ordering::SeqCst);
///         Ok::<(), foundation_sync::BoxedError>(())
///     });
/// }
///
/// assert!(group.wait().is_ok());
/// assert_eq!(done.load(Ordering::SeqCst), 8);
/// ```
#[derive(Clone)]
pub struct TaskGroup {
    inner: Arc<GroupInner>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("TaskGroup")
            .field("limit", &state.limit)
            .field("active", &state.active)
            .field("pending", &state.pending)
            .field("failed", &state.first_error.is_some())
            .finish()
    }
}

impl TaskGroup {
    /// Creates a group without a derived context.
    #[must_use]
    pub fn new() -> Self {
        Self::from_cancel(None)
    }

    /// Creates a group together with a context derived from `parent`.
    ///
    /// The returned context is cancelled the first time a task of the
    /// group fails or panics, or when `parent` ends.
    #[must_use]
    pub fn with_context(parent: &Context) -> (Self, Context) {
        let (ctx, cancel) = parent.with_cancel();
        (Self::from_cancel(Some(cancel)), ctx)
    }

    fn from_cancel(cancel: Option<CancelHandle>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                state: Mutex::new(GroupState {
                    limit: None,
                    active: 0,
                    pending: 0,
                    first_error: None,
                    next_task_id: 0,
                }),
                slot_freed: Condvar::new(),
                all_done: Condvar::new(),
                cancel,
            }),
        }
    }

    /// Caps the number of unfinished tasks for submissions made after
    /// this call. `None` or `0` removes the cap.
    ///
    /// Tasks already running are never interrupted; if more of them are
    /// running than the new cap allows, later submissions block until
    /// enough of them finish.
    pub fn set_limit(&self, limit: impl Into<Option<usize>>) {
        let limit = limit.into().filter(|limit| *limit > 0);
        self.inner.lock_state().limit = limit;
        tracing::debug!(?limit, "task group limit updated");

        // a raised limit may admit blocked submitters.
        self.inner.slot_freed.notify_all();
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.inner.lock_state().limit
    }

    /// Number of tasks currently executing.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.lock_state().active
    }

    /// Number of submitted tasks that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock_state().pending
    }

    /// Submits `task` to run on a new thread.
    ///
    /// Blocks the caller while the group is at its limit. A panic inside
    /// `task` is recovered and reported as [`TaskError::Panicked`].
    pub fn go<F, E>(&self, task: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxedError>,
    {
        let mut state = self.inner.lock_state();
        while !state.has_slot() {
            tracing::trace!(pending = state.pending, "task group saturated, submitter waiting");
            state = self
                .inner
                .slot_freed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let id = state.admit();
        drop(state);

        self.spawn(id, task);
    }

    /// Submits `task` only if the group has a free slot right now.
    ///
    /// Returns `false`, without running `task`, when the group is at its
    /// limit.
    pub fn try_go<F, E>(&self, task: F) -> bool
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxedError>,
    {
        let mut state = self.inner.lock_state();
        if !state.has_slot() {
            return false;
        }
        let id = state.admit();
        drop(state);

        self.spawn(id, task);
        true
    }

    fn spawn<F, E>(&self, id: u64, task: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxedError>,
    {
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("taskgroup-worker-{id}"))
            .spawn(move || {
                inner.started();
                let _finished = RunOnDrop::new({
                    let inner = Arc::clone(&inner);
                    move || inner.finish(true)
                });

                tracing::trace!(task = id, "task started");
                let failure = match catch_panic(task) {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(TaskError::failed(err.into())),
                    Err(panicked) => Some(TaskError::from(panicked)),
                };

                if let Some(err) = failure {
                    inner.record_failure(id, err);
                }
                tracing::trace!(task = id, "task finished");
            });

        if let Err(err) = spawned {
            tracing::error!(task = id, "failed to spawn task thread: {err}");
            self.inner.record_failure(id, TaskError::from(err));
            self.inner.finish(false);
        }
    }

    /// Blocks until every submitted task has finished and returns the
    /// first failure, if any.
    ///
    /// Returns `Ok(())` immediately when nothing was submitted. Failures
    /// after the first are dropped.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaskError`] recorded by the group.
    pub fn wait(&self) -> Result<(), TaskError> {
        let mut state = self.inner.lock_state();
        while state.pending > 0 {
            state = self
                .inner
                .all_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        match &state.first_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test_task_group {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use ntest::timeout;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[timeout(1000)]
    fn wait_on_empty_group_returns_immediately() {
        let group = TaskGroup::new();
        let started = Instant::now();
        assert!(group.wait().is_ok());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    #[timeout(30000)]
    fn limit_bounds_concurrency() {
        let group = TaskGroup::new();
        group.set_limit(10);
        assert_eq!(group.limit(), Some(10));

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
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxedError>(())
            });
            assert!(group.pending() <= 10);
        }

        assert!(group.wait().is_ok());
        assert_eq!(completed.load(Ordering::SeqCst), 100);
        assert!(peak.load(Ordering::SeqCst) <= 10);
        assert_eq!(group.pending(), 0);
        assert_eq!(group.active(), 0);
    }

    #[test]
    #[timeout(30000)]
    fn panicking_task_is_contained() {
        let (group, _ctx) = TaskGroup::with_context(&Context::background());
        group.set_limit(10);

        let completed = Arc::new(AtomicUsize::new(0));
        for i in 0..50 {
            let completed = Arc::clone(&completed);
            group.go(move || {
                thread::sleep(Duration::from_millis(2));
                assert!(i != 10, "task {i} blew up");
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxedError>(())
            });
        }

        let err = group.wait().expect_err("one task panicked");
        let panicked = err.as_panic().expect("should be a panic");
        assert_eq!(panicked.message(), "task 10 blew up");
        assert_eq!(panicked.thread_name(), Some("taskgroup-worker-10"));
        assert_eq!(completed.load(Ordering::SeqCst), 49);
    }

    #[test]
    #[timeout(10000)]
    fn first_failure_wins() {
        let group = TaskGroup::new();

        group.go(|| Err::<(), _>("first"));
        // make sure the first failure is recorded before the others run.
        while group.pending() > 0 {
            thread::sleep(Duration::from_millis(1));
        }

        for i in 0..5 {
            group.go(move || Err::<(), BoxedError>(format!("later {i}").into()));
        }

        let err = group.wait().expect_err("tasks failed");
        assert_eq!(err.to_string(), "task failed: first");
        // repeated waits report the same failure.
        assert_eq!(
            group.wait().expect_err("still failed").to_string(),
            "task failed: first"
        );
    }

    #[test]
    #[timeout(10000)]
    fn derived_context_cancelled_on_first_failure_only() {
        let (group, ctx) = TaskGroup::with_context(&Context::background());

        group.go(|| Ok::<(), BoxedError>(()));
        assert!(group.wait().is_ok());
        assert!(!ctx.is_done());

        let observer = {
            let ctx = ctx.clone();
            move || {
                ctx.wait_done();
                Ok::<(), BoxedError>(())
            }
        };
        group.go(observer);
        group.go(|| Err::<(), _>("stop everyone"));

        assert!(group.wait().is_err());
        assert_eq!(ctx.err(), Some(crate::context::ContextError::Cancelled));
    }

    #[test]
    #[timeout(10000)]
    fn parent_cancellation_reaches_derived_context() {
        let (parent, cancel) = Context::background().with_cancel();
        let (group, ctx) = TaskGroup::with_context(&parent);

        cancel.cancel();
        assert!(ctx.is_done());
        assert!(group.wait().is_ok());
    }

    #[test]
    #[timeout(10000)]
    fn try_go_refuses_when_saturated() {
        let group = TaskGroup::new();
        group.set_limit(1);

        let (release, gate) = mpsc::channel::<()>();
        assert!(group.try_go(move || {
            let _ = gate.recv();
            Ok::<(), BoxedError>(())
        }));

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        assert!(!group.try_go(move || {
            ran_clone.store(true, Ordering::SeqCst);
            Ok::<(), BoxedError>(())
        }));

        release.send(()).expect("should release");
        assert!(group.wait().is_ok());
        assert!(!ran.load(Ordering::SeqCst));
        assert!(group.try_go(|| Ok::<(), BoxedError>(())));
        assert!(group.wait().is_ok());
    }

    #[test]
    #[timeout(10000)]
    fn go_applies_backpressure_to_submitter() {
        let group = TaskGroup::new();
        group.set_limit(1);

        let (release, gate) = mpsc::channel::<()>();
        group.go(move || {
            let _ = gate.recv();
            Ok::<(), BoxedError>(())
        });

        let submitted = Arc::new(AtomicBool::new(false));
        let submitter = {
            let group = group.clone();
            let submitted = Arc::clone(&submitted);
            thread::spawn(move || {
                group.go(|| Ok::<(), BoxedError>(()));
                submitted.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!submitted.load(Ordering::SeqCst));

        release.send(()).expect("should release");
        submitter.join().expect("should join");
        assert!(submitted.load(Ordering::SeqCst));
        assert!(group.wait().is_ok());
    }

    #[test]
    #[timeout(10000)]
    fn raising_limit_unblocks_submitter() {
        let group = TaskGroup::new();
        group.set_limit(1);

        let (release, gate) = mpsc::channel::<()>();
        group.go(move || {
            let _ = gate.recv();
            Ok::<(), BoxedError>(())
        });

        let submitter = {
            let group = group.clone();
            thread::spawn(move || group.go(|| Ok::<(), BoxedError>(())))
        };

        thread::sleep(Duration::from_millis(20));
        group.set_limit(None);
        submitter.join().expect("should join");
        assert_eq!(group.limit(), None);

        release.send(()).expect("should release");
        assert!(group.wait().is_ok());
    }

    #[test]
    #[traced_test]
    fn zero_limit_means_unlimited() {
        let group = TaskGroup::new();
        group.set_limit(0);
        assert_eq!(group.limit(), None);
        assert!(logs_contain("task group limit updated"));
    }
}
