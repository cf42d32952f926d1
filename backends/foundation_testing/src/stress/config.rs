//! Stress test configuration.

use core::time::Duration;

/// Configuration for stress tests.
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    /// Number of threads (barrier parties, or task group limit)
    thread_count: usize,
    /// Number of barrier generations, or tasks per thread for task groups
    rounds: usize,
    /// Upper bound of the random sleep before every arrival
    max_jitter: Duration,
    /// Optional per-arrival timeout
    timeout: Option<Duration>,
}

impl StressConfig {
    /// Creates a new stress test configuration with default values.
    ///
    /// Defaults:
    /// - `thread_count`: 4
    /// - `rounds`: 100
    /// - `max_jitter`: 1ms
    /// - `timeout`: None (parties wait forever)
    #[must_use]
    pub const fn new() -> Self {
        Self {
            thread_count: 4,
            rounds: 100,
            max_jitter: Duration::from_millis(1),
            timeout: None,
        }
    }

    /// Sets the number of threads to spawn.
    #[must_use]
    pub const fn threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Sets the number of rounds.
    #[must_use]
    pub const fn rounds(mut self, count: usize) -> Self {
        self.rounds = count;
        self
    }

    /// Sets the upper bound of the random delay before each arrival.
    #[must_use]
    pub const fn max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Gives every barrier arrival a timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the thread count.
    #[must_use]
    pub const fn get_thread_count(&self) -> usize {
        self.thread_count
    }

    /// Returns the round count.
    #[must_use]
    pub const fn get_rounds(&self) -> usize {
        self.rounds
    }

    /// Returns the maximum jitter.
    #[must_use]
    pub const fn get_max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Returns the optional per-arrival timeout.
    #[must_use]
    pub const fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps for a random duration in `0..=max`.
pub(crate) fn jitter(max: Duration) {
    if max.is_zero() {
        return;
    }
    let max_micros = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
    std::thread::sleep(Duration::from_micros(fastrand::u64(0..=max_micros)));
}
