//! Panic containment at task boundaries.
//!
//! [`catch_panic`] runs a closure inside [`std::panic::catch_unwind`] and turns
//! a panic payload into a [`PanicError`] that can be stored, cloned and
//! reported like any other error.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// A panic recovered at a task or action boundary.
#[derive(Clone)]
pub struct PanicError {
    message: String,
    thread: Option<String>,
    backtrace: Arc<Backtrace>,
}

impl PanicError {
    /// Builds a `PanicError` from the payload handed back by `catch_unwind`.
    ///
    /// The backtrace is captured at the recovery point on the panicking
    /// thread; it is only populated when `RUST_BACKTRACE` allows it.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self {
            message: payload_message(payload),
            thread: thread::current().name().map(ToOwned::to_owned),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// The message passed to `panic!`, or a placeholder for non-string payloads.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the thread that panicked, when it had one.
    #[must_use]
    pub fn thread_name(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    String::from("Box<dyn Any>")
}

impl core::fmt::Debug for PanicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PanicError")
            .field("message", &self.message)
            .field("thread", &self.thread)
            .finish_non_exhaustive()
    }
}

impl core::fmt::Display for PanicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.thread {
            Some(name) => write!(f, "panicked in thread '{name}': {}", self.message)?,
            None => write!(f, "panicked: {}", self.message)?,
        }
        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            write!(f, "\n{}", self.backtrace)?;
        }
        Ok(())
    }
}

impl std::error::Error for PanicError {}

/// Runs `f`, converting a panic into a [`PanicError`].
///
/// # Errors
///
/// Returns the recovered panic when `f` unwinds.
pub fn catch_panic<F, R>(f: F) -> Result<R, PanicError>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let err = PanicError::from_payload(payload.as_ref());
        tracing::error!("recovered panic: {}", err.message());
        err
    })
}
