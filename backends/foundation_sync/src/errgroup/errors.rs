use std::io;
use std::sync::Arc;

use derive_more::From;

use crate::panics::PanicError;
use crate::BoxedError;

/// The failure a [`TaskGroup`](super::TaskGroup) reports from `wait`.
#[derive(Clone, Debug, From)]
pub enum TaskError {
    /// The task returned an error.
    #[from(ignore)]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The task panicked; the panic was contained at the task boundary.
    Panicked(PanicError),

    /// The OS refused to start a thread for the task.
    #[from(ignore)]
    Spawn(Arc<io::Error>),
}

impl TaskError {
    pub(crate) fn failed(err: BoxedError) -> Self {
        TaskError::Failed(Arc::from(err))
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }

    /// The recovered panic, if the task panicked.
    #[must_use]
    pub fn as_panic(&self) -> Option<&PanicError> {
        match self {
            TaskError::Panicked(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TaskError {
    fn from(value: io::Error) -> Self {
        TaskError::Spawn(Arc::new(value))
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Failed(err) => Some(err.as_ref()),
            TaskError::Panicked(err) => Some(err),
            TaskError::Spawn(err) => Some(err.as_ref()),
        }
    }
}

impl core::fmt::Display for TaskError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TaskError::Failed(err) => write!(f, "task failed: {err}"),
            TaskError::Panicked(err) => write!(f, "task {err}"),
            TaskError::Spawn(err) => write!(f, "failed to spawn task thread: {err}"),
        }
    }
}
