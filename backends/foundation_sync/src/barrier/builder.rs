use core::time::Duration;

use super::cyclic::BarrierAction;
use super::{BarrierError, BarrierResult, CyclicBarrier};
use crate::BoxedError;

/// Default upper bound on how long a waiting party sleeps before it
/// re-checks its context.
pub const DEFAULT_CANCEL_POLL: Duration = Duration::from_millis(50);

const MIN_CANCEL_POLL: Duration = Duration::from_millis(1);

/// Configuration for a [`CyclicBarrier`].
///
/// # Examples
///
/// ```
/// use foundation_sync::barrier::CyclicBarrier;
/// use std::time::Duration;
///
/// let barrier = CyclicBarrier::builder(2)
///     .action(|| Ok::<(), foundation_sync::BoxedError>(()))
///     .cancel_poll(Duration::from_millis(5))
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(barrier.parties(), 2);
/// ```
pub struct BarrierBuilder {
    parties: usize,
    action: Option<BarrierAction>,
    cancel_poll: Duration,
}

impl BarrierBuilder {
    /// Defaults:
    /// - no trip action
    /// - `cancel_poll`: [`DEFAULT_CANCEL_POLL`]
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            action: None,
            cancel_poll: DEFAULT_CANCEL_POLL,
        }
    }

    /// Sets the action the last arriving party runs before the generation
    /// is released. An `Err` or a panic breaks the generation.
    #[must_use]
    pub fn action<F, E>(mut self, action: F) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxedError>,
    {
        self.action = Some(Box::new(move || action().map_err(Into::into)));
        self
    }

    /// Sets how often a waiting party re-checks its context for
    /// cancellation. Values below 1ms are raised to 1ms.
    ///
    /// Cancellation normally wakes waiters right away. A cancel that lands
    /// after a party checked its context but before it went back to sleep
    /// is only noticed on the next re-check, so this interval is the upper
    /// bound on how late such a party poisons its generation.
    #[must_use]
    pub fn cancel_poll(mut self, interval: Duration) -> Self {
        self.cancel_poll = interval.max(MIN_CANCEL_POLL);
        self
    }

    #[must_use]
    pub fn get_parties(&self) -> usize {
        self.parties
    }

    #[must_use]
    pub fn get_cancel_poll(&self) -> Duration {
        self.cancel_poll
    }

    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidParties`] if the party count is 0.
    pub fn build(self) -> BarrierResult<CyclicBarrier> {
        if self.parties < 1 {
            return Err(BarrierError::InvalidParties(self.parties));
        }

        Ok(CyclicBarrier::from_parts(
            self.parties,
            self.action,
            self.cancel_poll,
        ))
    }
}

impl core::fmt::Debug for BarrierBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BarrierBuilder")
            .field("parties", &self.parties)
            .field("has_action", &self.action.is_some())
            .field("cancel_poll", &self.cancel_poll)
            .finish()
    }
}
