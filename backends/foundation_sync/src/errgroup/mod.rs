//! Bounded task groups with first-error aggregation.
//!
//! A [`TaskGroup`] runs each submitted task on its own thread, optionally
//! capping how many run at once, and remembers the first task that failed
//! or panicked. Tasks that want to stop early watch the group's derived
//! [`Context`](crate::context::Context), which is cancelled on that first
//! failure.

mod errors;
mod group;

pub use errors::*;
pub use group::*;
