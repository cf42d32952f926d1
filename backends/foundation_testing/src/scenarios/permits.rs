//! Counting permits built on a mutex and condition variable.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

struct PermitState {
    available: Mutex<usize>,
    returned: Condvar,
}

/// A counting semaphore.
///
/// [`Permits::acquire`] blocks until a permit is free and hands back a
/// guard that returns the permit when dropped.
#[derive(Clone)]
pub struct Permits {
    state: Arc<PermitState>,
}

impl Permits {
    /// Creates a semaphore holding `count` permits.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            state: Arc::new(PermitState {
                available: Mutex::new(count),
                returned: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.state
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a permit is free and takes it.
    #[must_use = "the permit is returned as soon as the guard is dropped"]
    pub fn acquire(&self) -> PermitGuard {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .state
                .returned
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        PermitGuard {
            state: Arc::clone(&self.state),
        }
    }

    /// Returns the number of free permits.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.lock()
    }
}

impl core::fmt::Debug for Permits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Permits")
            .field("available", &self.available())
            .finish()
    }
}

/// A held permit. Dropping it returns the permit and wakes one waiter.
pub struct PermitGuard {
    state: Arc<PermitState>,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        let mut available = self
            .state
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        self.state.returned.notify_one();
    }
}

#[cfg(test)]
mod test_permits {
    use super::Permits;
    use ntest::timeout;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guards_return_permits_on_drop() {
        let permits = Permits::new(2);
        let first = permits.acquire();
        let second = permits.acquire();
        assert_eq!(permits.available(), 0);

        drop(first);
        assert_eq!(permits.available(), 1);
        drop(second);
        assert_eq!(permits.available(), 2);
    }

    #[test]
    #[timeout(5000)]
    fn acquire_blocks_until_a_permit_is_returned() {
        let permits = Permits::new(1);
        let held = permits.acquire();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let permits = permits.clone();
            thread::spawn(move || {
                let _guard = permits.acquire();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(2))
            .expect("waiter acquires after release");
        waiter.join().unwrap();
        assert_eq!(permits.available(), 1);
    }
}
