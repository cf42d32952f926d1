//! Reusable rendezvous barrier.
//!
//! A [`CyclicBarrier`] blocks a fixed number of parties until all of them
//! have arrived, optionally runs a trip action on the last arriving party,
//! then releases everyone and starts the next generation.

mod builder;
mod cyclic;
mod errors;

pub use builder::*;
pub use cyclic::*;
pub use errors::*;
