//! Client scenarios built on the `foundation_sync` primitives:
//! - Water molecule factory (three party barrier plus permits)
//! - Counting permits
//! - Concurrency probe for bounded task groups

pub mod permits;
pub mod probe;
pub mod water;

pub use permits::{PermitGuard, Permits};
pub use probe::{ConcurrencyProbe, ProbeGuard};
pub use water::{Atom, WaterFactory, WaterReport};
