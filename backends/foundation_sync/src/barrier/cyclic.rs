use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use super::{ActionFailure, BarrierBuilder, BarrierError, BarrierResult};
use crate::context::Context;
use crate::panics::catch_panic;
use crate::BoxedError;

pub(crate) type BarrierAction = Box<dyn Fn() -> Result<(), BoxedError> + Send + Sync + 'static>;

/// How a generation ended.
#[derive(Clone)]
enum Outcome {
    Tripped,
    Broken(BarrierError),
}

/// One round of the barrier's life.
///
/// Parties keep a handle to the generation they joined, so a party that
/// wakes up late still reads the outcome of its own round even when the
/// barrier has moved on.
struct Generation {
    id: u64,

    /// Set exactly once, under the barrier lock.
    outcome: OnceLock<Outcome>,
}

impl Generation {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            outcome: OnceLock::new(),
        })
    }

    fn is_broken(&self) -> bool {
        matches!(self.outcome.get(), Some(Outcome::Broken(_)))
    }
}

struct BarrierState {
    current: Arc<Generation>,
    waiting: usize,
}

struct Inner {
    parties: usize,
    action: Option<BarrierAction>,
    cancel_poll: Duration,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ends the current generation with `reason` and wakes its parties.
    ///
    /// Returns `false` if the generation already had an outcome.
    fn break_generation(&self, state: &mut BarrierState, reason: BarrierError) -> bool {
        if state.current.outcome.set(Outcome::Broken(reason)).is_err() {
            return false;
        }

        tracing::debug!(
            generation = state.current.id,
            waiting = state.waiting,
            "barrier generation broken"
        );

        state.waiting = 0;
        self.released.notify_all();
        true
    }

    fn next_generation(&self, state: &mut BarrierState) {
        state.current = Generation::new(state.current.id + 1);
        state.waiting = 0;
    }

    /// Called by the last arriving party with the lock held, so no new
    /// party can join until the action has finished.
    fn trip(&self, state: &mut BarrierState) -> BarrierResult<usize> {
        if let Some(action) = &self.action {
            let failure = match catch_panic(|| action()) {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(ActionFailure::returned(err)),
                Err(panicked) => Some(ActionFailure::from(panicked)),
            };

            if let Some(failure) = failure {
                tracing::debug!(
                    generation = state.current.id,
                    "barrier action failed: {failure}"
                );
                let err = BarrierError::ActionFailed(failure);
                self.break_generation(state, err.clone());
                return Err(err);
            }
        }

        // a fresh generation is never decided before its trip.
        let _ = state.current.outcome.set(Outcome::Tripped);
        tracing::debug!(generation = state.current.id, "barrier tripped");

        self.next_generation(state);
        self.released.notify_all();
        Ok(0)
    }
}

/// A reusable rendezvous point for a fixed number of parties.
///
/// Each call to [`CyclicBarrier::await_with`] blocks until `parties` calls
/// have arrived in the same generation. The last one to arrive runs the
/// optional trip action, then every party is released and the barrier is
/// ready for the next generation.
///
/// If any party gives up (its context is cancelled or times out), the
/// whole generation is broken: the other parties can never trip, so they
/// are released with [`BarrierError::Broken`] and the barrier rejects new
/// arrivals until [`CyclicBarrier::reset`] is called.
///
/// # Examples
///
/// ```
/// use foundation_sync::barrier::CyclicBarrier;
/// use std::thread;
///
/// let barrier = CyclicBarrier::new(3).expect("valid party count");
/// let mut handles = vec![];
///
/// for _ in 0..3 {
///     let barrier = barrier.clone();
///     handles.push(thread::spawn(move || barrier.wait()));
/// }
///
/// let mut indices: Vec<usize> = handles
///     .into_iter()
///     .map(|h| h.join().unwrap().expect("barrier should trip"))
///     .collect();
/// indices.sort_unstable();
/// assert_eq!(indices, vec![0, 1, 2]);
/// assert_eq!(barrier.generation(), 1);
/// ```
#[derive(Clone)]
pub struct CyclicBarrier {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for CyclicBarrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.inner.parties)
            .field("generation", &state.current.id)
            .field("waiting", &state.waiting)
            .field("broken", &state.current.is_broken())
            .field("has_action", &self.inner.action.is_some())
            .finish()
    }
}

impl CyclicBarrier {
    /// Creates a barrier for `parties` parties without a trip action.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidParties`] if `parties` is 0.
    pub fn new(parties: usize) -> BarrierResult<Self> {
        Self::builder(parties).build()
    }

    /// Creates a barrier that runs `action` on the last arriving party of
    /// every generation, before anyone is released.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidParties`] if `parties` is 0.
    pub fn with_action<F, E>(parties: usize, action: F) -> BarrierResult<Self>
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxedError>,
    {
        Self::builder(parties).action(action).build()
    }

    #[must_use]
    pub fn builder(parties: usize) -> BarrierBuilder {
        BarrierBuilder::new(parties)
    }

    pub(crate) fn from_parts(
        parties: usize,
        action: Option<BarrierAction>,
        cancel_poll: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                parties,
                action,
                cancel_poll,
                state: Mutex::new(BarrierState {
                    current: Generation::new(0),
                    waiting: 0,
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Number of parties required to trip the barrier.
    #[must_use]
    pub fn parties(&self) -> usize {
        self.inner.parties
    }

    /// Number of parties currently blocked in the active generation.
    #[must_use]
    pub fn number_waiting(&self) -> usize {
        self.inner.lock_state().waiting
    }

    /// `true` when the active generation is broken and arrivals are
    /// rejected until [`CyclicBarrier::reset`].
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.inner.lock_state().current.is_broken()
    }

    /// Index of the active generation, starting at 0. Increases on every
    /// trip and every reset.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock_state().current.id
    }

    /// Waits without any way to give up.
    ///
    /// # Errors
    ///
    /// See [`CyclicBarrier::await_with`].
    pub fn wait(&self) -> BarrierResult<usize> {
        self.await_with(&Context::background())
    }

    /// Waits for at most `timeout`; on expiry the generation is broken and
    /// the caller gets [`BarrierError::Timeout`].
    ///
    /// # Errors
    ///
    /// See [`CyclicBarrier::await_with`].
    pub fn wait_timeout(&self, timeout: Duration) -> BarrierResult<usize> {
        let (ctx, _cancel) = Context::background().with_timeout(timeout);
        self.await_with(&ctx)
    }

    /// Arrives at the barrier and blocks until the current generation
    /// trips or ends.
    ///
    /// On success returns the arrival index: `parties - 1` for the first
    /// party to arrive, down to `0` for the last one, which is the party
    /// that ran the trip action.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Broken`] if the barrier was broken on entry, or
    ///   another party of this generation gave up while we waited.
    /// - [`BarrierError::ActionFailed`] if the trip action failed or
    ///   panicked; every party of the generation gets it.
    /// - [`BarrierError::Reset`] if [`CyclicBarrier::reset`] ended the
    ///   generation.
    /// - [`BarrierError::Cancelled`] / [`BarrierError::Timeout`] if `ctx`
    ///   ended first. The generation is broken for everyone else.
    pub fn await_with(&self, ctx: &Context) -> BarrierResult<usize> {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        let generation = Arc::clone(&state.current);

        if generation.is_broken() {
            return Err(BarrierError::Broken);
        }

        if let Some(err) = ctx.err() {
            inner.break_generation(&mut state, BarrierError::Broken);
            return Err(err.into());
        }

        state.waiting += 1;
        let index = inner.parties - state.waiting;
        tracing::trace!(generation = generation.id, index, "party arrived at barrier");

        if index == 0 {
            return inner.trip(&mut state);
        }

        // the watcher must not take the barrier lock: it can run on a thread
        // that already holds it (inline registration, a trip action that
        // cancels, a lazy deadline check below). Wakeups it misses are
        // caught by the bounded wait.
        let weak = Arc::downgrade(inner);
        let _watch = ctx.on_cancel(move || {
            if let Some(inner) = weak.upgrade() {
                inner.released.notify_all();
            }
        });

        loop {
            match generation.outcome.get() {
                Some(Outcome::Tripped) => return Ok(index),
                Some(Outcome::Broken(err)) => return Err(err.clone()),
                None => {}
            }

            if let Some(err) = ctx.err() {
                inner.break_generation(&mut state, BarrierError::Broken);
                return Err(err.into());
            }

            state = if ctx.can_end() {
                let timeout = ctx
                    .remaining()
                    .map_or(inner.cancel_poll, |remaining| remaining.min(inner.cancel_poll));
                inner
                    .released
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            } else {
                inner
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner)
            };
        }
    }

    /// Releases every party of the active generation with
    /// [`BarrierError::Reset`] and starts a fresh, unbroken generation.
    pub fn reset(&self) {
        let mut state = self.inner.lock_state();
        let waiting = state.waiting;
        if self.inner.break_generation(&mut state, BarrierError::Reset) {
            tracing::debug!(waiting, "barrier reset released waiting parties");
        }
        self.inner.next_generation(&mut state);
    }
}
