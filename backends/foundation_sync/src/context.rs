//! Cancellation and deadline signalling for blocking operations.
//!
//! A [`Context`] is handed to blocking calls such as
//! [`CyclicBarrier::await_with`](crate::barrier::CyclicBarrier::await_with)
//! so the caller can give up waiting. Contexts form a tree: cancelling a
//! context cancels every live context derived from it, and a derived
//! context never outlives its parent's deadline.
//!
//! Deadlines are observed lazily: a context whose deadline has passed
//! reports [`ContextError::DeadlineExceeded`] the next time it is queried or
//! waited on, and that is when its watchers and children are notified.

use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Why a context ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Cancelled,
    DeadlineExceeded,
}

impl ContextError {
    #[must_use]
    pub fn is_deadline(&self) -> bool {
        matches!(self, ContextError::DeadlineExceeded)
    }
}

impl std::error::Error for ContextError {}

impl core::fmt::Display for ContextError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ContextError::Cancelled => write!(f, "context cancelled"),
            ContextError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

type Watcher = Box<dyn FnOnce() + Send + 'static>;

struct ContextState {
    err: Option<ContextError>,
    children: Vec<Weak<ContextInner>>,
    watchers: Vec<(u64, Watcher)>,
    next_watch_id: u64,
}

struct ContextInner {
    deadline: Option<Instant>,

    /// Background contexts can never end, everything derived from
    /// one can.
    cancellable: bool,

    state: Mutex<ContextState>,

    /// Notified once, when `state.err` is first set.
    done: Condvar,

    // keeps the ancestry alive for as long as this context lives.
    _parent: Option<Arc<ContextInner>>,
}

impl ContextInner {
    fn new(parent: Option<Arc<ContextInner>>, deadline: Option<Instant>, cancellable: bool) -> Self {
        Self {
            deadline,
            cancellable,
            state: Mutex::new(ContextState {
                err: None,
                children: Vec::new(),
                watchers: Vec::new(),
                next_watch_id: 0,
            }),
            done: Condvar::new(),
            _parent: parent,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Option<ContextError> {
        let err = self.lock_state().err;
        if err.is_some() {
            return err;
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel_with(ContextError::DeadlineExceeded);
                self.lock_state().err
            }
            _ => None,
        }
    }

    /// Records `reason` if the context is still live, then wakes blocked
    /// waiters, cancels children and fires watchers outside the lock.
    fn cancel_with(&self, reason: ContextError) -> bool {
        let (children, watchers) = {
            let mut state = self.lock_state();
            if state.err.is_some() {
                return false;
            }
            state.err = Some(reason);
            (
                mem::take(&mut state.children),
                mem::take(&mut state.watchers),
            )
        };

        tracing::debug!("context ended: {reason}");
        self.done.notify_all();

        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel_with(reason);
            }
        }

        for (_, watcher) in watchers {
            watcher();
        }

        true
    }
}

/// A cancellation signal with an optional deadline.
///
/// Cloning a `Context` is cheap and every clone observes the same signal.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("cancellable", &self.inner.cancellable)
            .field("err", &self.inner.lock_state().err)
            .finish()
    }
}

impl Context {
    /// The root context: never cancelled and without a deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            inner: Arc::new(ContextInner::new(None, None, false)),
        }
    }

    /// Derives a child context that ends when `cancel` is called on the
    /// returned handle or when this context ends.
    #[must_use]
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        self.derive(None)
    }

    /// Derives a child context that ends after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.derive(Instant::now().checked_add(timeout))
    }

    /// Derives a child context that ends at `deadline`, or earlier if this
    /// context's own deadline comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        self.derive(Some(deadline))
    }

    fn derive(&self, deadline: Option<Instant>) -> (Context, CancelHandle) {
        let deadline = match (self.inner.deadline, deadline) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };

        let child = Arc::new(ContextInner::new(
            Some(Arc::clone(&self.inner)),
            deadline,
            true,
        ));

        let inherited = {
            let mut state = self.inner.lock_state();
            if state.err.is_none() {
                state.children.retain(|c| c.strong_count() > 0);
                state.children.push(Arc::downgrade(&child));
            }
            state.err
        };

        if let Some(reason) = inherited {
            child.cancel_with(reason);
        }

        (
            Context {
                inner: Arc::clone(&child),
            },
            CancelHandle { inner: child },
        )
    }

    /// Returns why the context ended, or `None` while it is still live.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        self.inner.check()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left until the deadline, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `false` only for contexts that can never end, i.e. the
    /// background context.
    #[must_use]
    pub fn can_end(&self) -> bool {
        self.inner.cancellable || self.inner.deadline.is_some()
    }

    /// Blocks the current thread until the context ends.
    ///
    /// Blocks forever on the background context.
    pub fn wait_done(&self) -> ContextError {
        loop {
            if let Some(err) = self.block_until(None) {
                return err;
            }
        }
    }

    /// Blocks until the context ends or `timeout` elapses, returning the
    /// reason if it ended.
    #[must_use]
    pub fn wait_done_timeout(&self, timeout: Duration) -> Option<ContextError> {
        self.block_until(Instant::now().checked_add(timeout))
    }

    fn block_until(&self, limit: Option<Instant>) -> Option<ContextError> {
        let until = match (self.inner.deadline, limit) {
            (Some(deadline), Some(limit)) => Some(deadline.min(limit)),
            (deadline, limit) => deadline.or(limit),
        };

        let mut state = self.inner.lock_state();
        loop {
            if state.err.is_some() {
                return state.err;
            }

            match until {
                None => {
                    state = self
                        .inner
                        .done
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        drop(state);
                        return self.err();
                    }
                    state = self
                        .inner
                        .done
                        .wait_timeout(state, until - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Registers `callback` to run once when the context ends.
    ///
    /// The callback runs on the thread that ends the context, after the
    /// context's lock has been released. If the context has already ended
    /// the callback runs immediately on the calling thread. Dropping the
    /// returned guard unregisters a callback that has not fired yet.
    pub fn on_cancel<F>(&self, callback: F) -> WatchGuard
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.can_end() {
            return WatchGuard::inert();
        }

        if self.err().is_some() {
            callback();
            return WatchGuard::inert();
        }

        let mut state = self.inner.lock_state();
        if state.err.is_some() {
            drop(state);
            callback();
            return WatchGuard::inert();
        }

        let id = state.next_watch_id;
        state.next_watch_id += 1;
        state.watchers.push((id, Box::new(callback)));

        WatchGuard {
            inner: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }
}

/// Ends the context it was created with.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<ContextInner>,
}

impl core::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

impl CancelHandle {
    /// Cancels the context and everything derived from it.
    ///
    /// Returns `true` if this call ended the context, `false` if it had
    /// already ended.
    pub fn cancel(&self) -> bool {
        self.inner.cancel_with(ContextError::Cancelled)
    }
}

/// Unregisters an [`Context::on_cancel`] callback when dropped.
#[must_use = "dropping the guard unregisters the callback"]
pub struct WatchGuard {
    inner: Weak<ContextInner>,
    id: Option<u64>,
}

impl WatchGuard {
    fn inert() -> Self {
        Self {
            inner: Weak::new(),
            id: None,
        }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let (Some(id), Some(inner)) = (self.id, self.inner.upgrade()) else {
            return;
        };
        inner.lock_state().watchers.retain(|(watch_id, _)| *watch_id != id);
    }
}
