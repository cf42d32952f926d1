use std::sync::Arc;

use derive_more::From;

use crate::context::ContextError;
use crate::panics::PanicError;
use crate::BoxedError;

pub type BarrierResult<T> = std::result::Result<T, BarrierError>;

/// Why a barrier's trip action failed.
#[derive(Clone, Debug, From)]
pub enum ActionFailure {
    #[from(ignore)]
    Returned(Arc<dyn std::error::Error + Send + Sync + 'static>),

    Panicked(PanicError),
}

impl ActionFailure {
    pub(crate) fn returned(err: BoxedError) -> Self {
        ActionFailure::Returned(Arc::from(err))
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, ActionFailure::Panicked(_))
    }
}

impl std::error::Error for ActionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActionFailure::Returned(err) => Some(err.as_ref()),
            ActionFailure::Panicked(err) => Some(err),
        }
    }
}

impl core::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ActionFailure::Returned(err) => write!(f, "action returned an error: {err}"),
            ActionFailure::Panicked(err) => write!(f, "action {err}"),
        }
    }
}

/// Errors returned by [`CyclicBarrier`](super::CyclicBarrier).
///
/// Every party of a generation that fails receives its own clone of the
/// same error, which is why the type is `Clone`.
#[derive(Clone, Debug, From)]
pub enum BarrierError {
    /// The barrier was constructed with fewer than one party.
    #[from(ignore)]
    InvalidParties(usize),

    /// The generation was poisoned by another party's cancellation or
    /// timeout, or the barrier was already broken on entry.
    Broken,

    /// The caller's own context deadline passed while waiting.
    Timeout,

    /// The caller's own context was cancelled while waiting.
    Cancelled,

    /// The generation was ended by [`CyclicBarrier::reset`](super::CyclicBarrier::reset).
    Reset,

    /// The trip action failed or panicked; the generation is broken.
    ActionFailed(ActionFailure),
}

impl BarrierError {
    /// `true` for every error that leaves the barrier broken until reset.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(self, BarrierError::Broken | BarrierError::ActionFailed(_))
    }

    #[must_use]
    pub fn is_reset(&self) -> bool {
        matches!(self, BarrierError::Reset)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, BarrierError::Timeout)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BarrierError::Cancelled)
    }
}

impl From<ContextError> for BarrierError {
    fn from(value: ContextError) -> Self {
        if value.is_deadline() {
            BarrierError::Timeout
        } else {
            BarrierError::Cancelled
        }
    }
}

impl std::error::Error for BarrierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BarrierError::ActionFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl core::fmt::Display for BarrierError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BarrierError::InvalidParties(parties) => {
                write!(f, "barrier requires at least 1 party, got {parties}")
            }
            BarrierError::Broken => write!(f, "barrier is broken"),
            BarrierError::Timeout => write!(f, "timed out waiting on barrier"),
            BarrierError::Cancelled => write!(f, "cancelled while waiting on barrier"),
            BarrierError::Reset => write!(f, "barrier was reset"),
            BarrierError::ActionFailed(failure) => write!(f, "barrier is broken: {failure}"),
        }
    }
}
