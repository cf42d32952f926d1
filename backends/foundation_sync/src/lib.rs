//! Thread coordination primitives for the ewe-platform project.
//!
//! This crate provides:
//! - **[`barrier::CyclicBarrier`]**: a reusable rendezvous point for a fixed
//!   number of parties with an optional trip action
//! - **[`errgroup::TaskGroup`]**: a bounded task launcher that keeps the first
//!   failure and contains task panics
//! - **[`context::Context`]**: cancellation and deadline signalling shared by
//!   both of them
//! - **[`slice`]**: generic map/filter/some/every helpers and
//!   [`slice::CompareHelper`] for diff and intersection
//!
//! # Examples
//!
//! ```rust
//! use foundation_sync::context::Context;
//! use foundation_sync::errgroup::TaskGroup;
//!
//! let (group, ctx) = TaskGroup::with_context(&Context::background());
//! group.set_limit(4);
//!
//! for i in 0..16 {
//!     let ctx = ctx.clone();
//!     group.go(move || {
//!         if ctx.is_done() {
//!             return Ok(());
//!         }
//!         if i == 7 {
//!             return Err("seven is unlucky".into());
//!         }
//!         Ok::<(), foundation_sync::BoxedError>(())
//!     });
//! }
//!
//! assert!(group.wait().is_err());
//! assert!(ctx.is_done());
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod barrier;
pub mod context;
pub mod drops;
pub mod errgroup;
pub mod panics;
pub mod slice;

/// Boxed error accepted from user supplied actions and tasks.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use barrier::{BarrierBuilder, BarrierError, BarrierResult, CyclicBarrier};
pub use context::{CancelHandle, Context, ContextError, WatchGuard};
pub use errgroup::{TaskError, TaskGroup};
pub use panics::PanicError;
