//! Water molecule factory.
//!
//! Hydrogen and oxygen producer threads meet at a three party
//! [`CyclicBarrier`]. Two hydrogen permits and one oxygen permit make sure
//! every generation of the barrier is made of exactly two hydrogen atoms
//! and one oxygen atom, so the released atoms always group into `HHO`,
//! `HOH` or `OHH` triples.

use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use foundation_sync::{BarrierResult, BoxedError, CyclicBarrier};

use super::Permits;
use crate::stress::config::jitter;

/// An atom released by a producer line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Atom {
    /// Released by a hydrogen line.
    Hydrogen,
    /// Released by an oxygen line.
    Oxygen,
}

impl core::fmt::Display for Atom {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Hydrogen => write!(f, "H"),
            Self::Oxygen => write!(f, "O"),
        }
    }
}

/// Bonds hydrogen and oxygen atoms into water molecules.
#[derive(Clone, Debug)]
pub struct WaterFactory {
    hydrogen: Permits,
    oxygen: Permits,
    bond: CyclicBarrier,
    molecules: Arc<AtomicUsize>,
}

impl WaterFactory {
    /// Creates a factory with an empty molecule counter.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the barrier always has three parties.
    pub fn new() -> BarrierResult<Self> {
        let molecules = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&molecules);
        let bond = CyclicBarrier::with_action(3, move || {
            let made = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::trace!(made, "water molecule bonded");
            Ok::<(), BoxedError>(())
        })?;

        Ok(Self {
            hydrogen: Permits::new(2),
            oxygen: Permits::new(1),
            bond,
            molecules,
        })
    }

    /// Produces one hydrogen atom: calls `release` and blocks until the
    /// molecule it belongs to is complete.
    ///
    /// # Errors
    ///
    /// Returns the barrier error if the bond generation broke.
    pub fn hydrogen<F: FnOnce()>(&self, release: F) -> BarrierResult<usize> {
        let _permit = self.hydrogen.acquire();
        release();
        self.bond.wait()
    }

    /// Produces one oxygen atom: calls `release` and blocks until the
    /// molecule it belongs to is complete.
    ///
    /// # Errors
    ///
    /// Returns the barrier error if the bond generation broke.
    pub fn oxygen<F: FnOnce()>(&self, release: F) -> BarrierResult<usize> {
        let _permit = self.oxygen.acquire();
        release();
        self.bond.wait()
    }

    /// Number of molecules bonded so far.
    #[must_use]
    pub fn molecules(&self) -> usize {
        self.molecules.load(Ordering::SeqCst)
    }

    /// Runs `2 * molecules` hydrogen lines and `molecules` oxygen lines,
    /// each sleeping a random delay up to `max_jitter` before producing its
    /// atom, and returns the release order.
    ///
    /// # Errors
    ///
    /// Returns the first barrier error any line observed.
    ///
    /// # Panics
    ///
    /// Re-raises the panic of a producer line that panicked.
    pub fn run(molecules: usize, max_jitter: Duration) -> BarrierResult<WaterReport> {
        let factory = Self::new()?;
        let (tx, rx) = mpsc::channel();

        let mut lines = Vec::with_capacity(molecules * 3);
        for line in 0..molecules * 3 {
            let atom = if line % 3 == 2 {
                Atom::Oxygen
            } else {
                Atom::Hydrogen
            };
            let factory = factory.clone();
            let tx = tx.clone();
            lines.push(thread::spawn(move || {
                jitter(max_jitter);
                let release = move || {
                    let _ = tx.send(atom);
                };
                match atom {
                    Atom::Hydrogen => factory.hydrogen(release),
                    Atom::Oxygen => factory.oxygen(release),
                }
            }));
        }
        drop(tx);

        let mut outcome = Ok(());
        for line in lines {
            match line.join() {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    if outcome.is_ok() {
                        outcome = Err(err);
                    }
                }
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        outcome?;

        let report = WaterReport {
            atoms: rx.iter().collect(),
            molecules: factory.molecules(),
        };
        tracing::debug!(molecules = report.molecules, "water factory finished");
        Ok(report)
    }
}

/// Release order and molecule count of a [`WaterFactory::run`].
#[derive(Debug, Clone)]
pub struct WaterReport {
    /// Atoms in the order their lines released them.
    pub atoms: Vec<Atom>,
    /// Barrier trips observed by the bonding action.
    pub molecules: usize,
}

impl WaterReport {
    /// Returns the release order as a string such as `"HHOOHH"`.
    #[must_use]
    pub fn formula(&self) -> String {
        self.atoms.iter().map(ToString::to_string).collect()
    }

    /// Returns the first consecutive triple that is not two hydrogen and
    /// one oxygen atom, with its position.
    #[must_use]
    pub fn first_malformed(&self) -> Option<(usize, String)> {
        self.atoms.chunks(3).enumerate().find_map(|(index, triple)| {
            let mut sorted = triple.to_vec();
            sorted.sort_unstable();
            if sorted == [Atom::Hydrogen, Atom::Hydrogen, Atom::Oxygen] {
                None
            } else {
                Some((index, sorted.iter().map(ToString::to_string).collect()))
            }
        })
    }

    /// True when every consecutive triple is a water molecule.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.atoms.len() % 3 == 0 && self.first_malformed().is_none()
    }
}

#[cfg(test)]
mod test_water {
    use super::*;
    use ntest::timeout;

    #[test]
    fn report_checks_triples() {
        let good = WaterReport {
            atoms: vec![
                Atom::Oxygen,
                Atom::Hydrogen,
                Atom::Hydrogen,
                Atom::Hydrogen,
                Atom::Oxygen,
                Atom::Hydrogen,
            ],
            molecules: 2,
        };
        assert!(good.is_well_formed());
        assert_eq!(good.formula(), "OHHHOH");

        let bad = WaterReport {
            atoms: vec![
                Atom::Hydrogen,
                Atom::Hydrogen,
                Atom::Hydrogen,
                Atom::Oxygen,
                Atom::Oxygen,
                Atom::Hydrogen,
            ],
            molecules: 2,
        };
        assert!(!bad.is_well_formed());
        assert_eq!(bad.first_malformed(), Some((0, "HHH".to_string())));
    }

    #[test]
    #[timeout(10000)]
    fn single_molecule_bonds() {
        let factory = WaterFactory::new().unwrap();

        let others: Vec<_> = [Atom::Hydrogen, Atom::Hydrogen]
            .into_iter()
            .map(|_| {
                let factory = factory.clone();
                thread::spawn(move || factory.hydrogen(|| {}))
            })
            .collect();

        factory.oxygen(|| {}).expect("molecule bonds");
        for other in others {
            other.join().unwrap().expect("molecule bonds");
        }
        assert_eq!(factory.molecules(), 1);
    }
}
