//! Communication, routing and ordering algorithms.

pub mod collective;
pub mod communicator;
pub mod distribute;
pub mod exchange;
pub mod hilbert;
pub mod linear_partition;
pub mod meshgen;
pub mod wire;

pub use exchange::ExchangePattern;
pub use linear_partition::{LinearPartition, suggest_slices};
