//! Entry-point for geometric partitioning.

pub mod inertia;

pub use self::inertia::{Bisection, RibConfig, recursively_bisect};
