//! Concurrency probe: counts how many callers are inside a section at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Counters {
    running: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

/// Tracks the number of concurrently running sections and the highest
/// number ever observed.
///
/// ```
/// use foundation_testing::ConcurrencyProbe;
///
/// let probe = ConcurrencyProbe::new();
/// {
///     let _a = probe.enter();
///     let _b = probe.enter();
///     assert_eq!(probe.running(), 2);
/// }
/// assert_eq!(probe.peak(), 2);
/// assert_eq!(probe.completed(), 2);
/// ```
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    counters: Arc<Counters>,
}

impl ConcurrencyProbe {
    /// Creates a probe with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a section. The section ends when the guard drops.
    #[must_use = "the section ends as soon as the guard is dropped"]
    pub fn enter(&self) -> ProbeGuard {
        let now = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Sections currently open.
    #[must_use]
    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running sections.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Sections that have ended.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }
}

impl core::fmt::Debug for ConcurrencyProbe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrencyProbe")
            .field("running", &self.running())
            .field("peak", &self.peak())
            .field("completed", &self.completed())
            .finish()
    }
}

/// An open section of a [`ConcurrencyProbe`].
pub struct ProbeGuard {
    counters: Arc<Counters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
    }
}
