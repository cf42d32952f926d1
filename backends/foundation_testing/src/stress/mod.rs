//! Stress test framework for the synchronization primitives.
//!
//! Provides configurable high-contention testing with:
//! - Party/thread count control
//! - Round limits
//! - Randomized arrival jitter
//! - Success rate tracking

use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use foundation_sync::{BoxedError, CyclicBarrier, TaskGroup};

use crate::scenarios::ConcurrencyProbe;

pub mod config;

pub use config::StressConfig;

/// Result of a barrier stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Barrier waits that returned an arrival index
    pub successes: usize,
    /// Barrier waits that returned an error, plus parties that panicked
    pub failures: usize,
    /// Number of times the barrier action ran
    pub trips: usize,
    /// Total time taken for the test
    pub duration: Duration,
    /// Number of parties used
    pub thread_count: usize,
}

impl StressResult {
    /// Returns the total number of waits.
    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.successes + self.failures
    }

    /// Returns the success rate as a value between 0.0 and 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_operations() == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_operations() as f64
        }
    }

    /// Returns barrier trips per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn trips_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.trips as f64 / secs
        }
    }
}

/// Result of a task group stress run.
#[derive(Debug, Clone)]
pub struct GroupStressResult {
    /// Tasks that ran to completion
    pub completed: usize,
    /// Highest number of tasks observed running at once
    pub peak: usize,
    /// Concurrency limit the group ran under
    pub limit: usize,
    /// Whether `wait` reported a failure
    pub failed: bool,
    /// Total time taken for the test
    pub duration: Duration,
}

/// Stress test harness.
///
/// Drives many threads through a [`CyclicBarrier`] or a bounded
/// [`TaskGroup`] with random delays between operations.
#[derive(Debug, Clone, Copy)]
pub struct StressHarness {
    config: StressConfig,
}

impl StressHarness {
    /// Creates a new stress test harness with the given configuration.
    #[must_use]
    pub const fn new(config: StressConfig) -> Self {
        Self { config }
    }

    /// Runs `thread_count` parties through a barrier for `rounds`
    /// generations.
    ///
    /// A party that sees an error stops; with a timeout configured its
    /// siblings then fail too instead of blocking forever.
    ///
    /// # Examples
    ///
    /// ```
    /// use foundation_testing::stress::{StressConfig, StressHarness};
    /// use std::time::Duration;
    ///
    /// let config = StressConfig::new()
    ///     .threads(3)
    ///     .rounds(20)
    ///     .max_jitter(Duration::ZERO);
    /// let result = StressHarness::new(config).run_barrier();
    ///
    /// assert_eq!(result.trips, 20);
    /// assert_eq!(result.failures, 0);
    /// ```
    #[must_use]
    pub fn run_barrier(self) -> StressResult {
        let parties = self.config.get_thread_count().max(1);
        let rounds = self.config.get_rounds();
        let max_jitter = self.config.get_max_jitter();
        let timeout = self.config.get_timeout();

        let trips = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let trips_clone = Arc::clone(&trips);
        let barrier = match CyclicBarrier::with_action(parties, move || {
            trips_clone.fetch_add(1, Ordering::Relaxed);
            Ok::<(), BoxedError>(())
        }) {
            Ok(barrier) => barrier,
            Err(err) => {
                tracing::error!("stress barrier rejected: {err}");
                return StressResult {
                    successes: 0,
                    failures: parties * rounds,
                    trips: 0,
                    duration: Duration::ZERO,
                    thread_count: parties,
                };
            }
        };

        let start = Instant::now();
        let mut handles = Vec::with_capacity(parties);
        for party in 0..parties {
            let barrier = barrier.clone();
            let successes = Arc::clone(&successes);
            let failures = Arc::clone(&failures);

            handles.push(thread::spawn(move || {
                for round in 0..rounds {
                    config::jitter(max_jitter);
                    let arrived = match timeout {
                        Some(timeout) => barrier.wait_timeout(timeout),
                        None => barrier.wait(),
                    };
                    if let Err(err) = arrived {
                        tracing::debug!(party, round, "stress party stopped: {err}");
                        failures.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    successes.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }

        for handle in handles {
            if handle.join().is_err() {
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        StressResult {
            successes: successes.load(Ordering::Relaxed),
            failures: failures.load(Ordering::Relaxed),
            trips: trips.load(Ordering::Relaxed),
            duration: start.elapsed(),
            thread_count: parties,
        }
    }

    /// Submits `thread_count * rounds` tasks to a task group limited to
    /// `thread_count`, each sleeping a random delay inside a
    /// [`ConcurrencyProbe`] section.
    ///
    /// # Examples
    ///
    /// ```
    /// use foundation_testing::stress::{StressConfig, StressHarness};
    ///
    /// let result = StressHarness::new(StressConfig::new().threads(2).rounds(5))
    ///     .run_task_group();
    ///
    /// assert_eq!(result.completed, 10);
    /// assert!(result.peak <= 2);
    /// ```
    #[must_use]
    pub fn run_task_group(self) -> GroupStressResult {
        let limit = self.config.get_thread_count().max(1);
        let tasks = limit * self.config.get_rounds();
        let max_jitter = self.config.get_max_jitter();

        let probe = ConcurrencyProbe::new();
        let group = TaskGroup::new();
        group.set_limit(limit);

        let start = Instant::now();
        for _ in 0..tasks {
            let probe = probe.clone();
            group.go(move || {
                let _section = probe.enter();
                config::jitter(max_jitter);
                Ok::<(), BoxedError>(())
            });
        }
        let outcome = group.wait();
        if let Err(err) = &outcome {
            tracing::error!("task group stress failed: {err}");
        }

        GroupStressResult {
            completed: probe.completed(),
            peak: probe.peak(),
            limit,
            failed: outcome.is_err(),
            duration: start.elapsed(),
        }
    }
}
