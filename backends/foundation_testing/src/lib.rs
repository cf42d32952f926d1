//! Reusable scenarios and stress testing infrastructure for the
//! `foundation_sync` primitives.
//!
//! This crate provides:
//! - **Stress harnesses**: many parties hammering a `CyclicBarrier` with
//!   randomized arrival timing, and bounded fan-out through a `TaskGroup`
//! - **Common scenarios**: the water molecule factory (two hydrogen and one
//!   oxygen party per barrier trip), counting permits, concurrency probes
//!
//! # Examples
//!
//! ```rust
//! use foundation_testing::stress::{StressConfig, StressHarness};
//! use std::time::Duration;
//!
//! let config = StressConfig::new()
//!     .threads(4)
//!     .rounds(10)
//!     .max_jitter(Duration::from_millis(1));
//!
//! let result = StressHarness::new(config).run_barrier();
//!
//! assert_eq!(result.trips, 10);
//! assert_eq!(result.successes, 40); // 4 parties * 10 rounds
//! assert!(result.success_rate() > 0.99);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod scenarios;
pub mod stress;

// Re-export commonly used items
pub use scenarios::{Atom, ConcurrencyProbe, Permits, WaterFactory, WaterReport};
pub use stress::{GroupStressResult, StressConfig, StressHarness, StressResult};
