//! MeshDistError: unified error type for mesh-dist public APIs
//!
//! Every error is fatal for the collective computation that raised it. A rank that
//! observes an `Err` must not keep using partial results: the other ranks either hit
//! the same guard or are left waiting in a collective.

use thiserror::Error;

use crate::topology::ownership::Remote;

/// Unified error type for mesh-dist operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshDistError {
    /// A flat connectivity array does not split into records of the expected degree,
    /// or references a vertex that does not exist.
    #[error("invalid connectivity: {0}")]
    InvalidConnectivity(String),
    /// A connectivity record lists the same vertex twice.
    #[error("degenerate record {record}: vertex global {global} appears more than once")]
    DegenerateRecord { record: usize, global: u64 },
    /// A per-item array has the wrong length for the collective it is passed to.
    #[error("shape mismatch in {what}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A destination names a rank outside the communicator.
    #[error("rank {rank} out of range for communicator of size {size}")]
    RankOutOfRange { rank: usize, size: usize },
    /// A destination names a root index the receiving rank does not have.
    #[error("root index {index} out of range on rank {rank} ({nroots} roots)")]
    RootOutOfRange {
        rank: usize,
        index: usize,
        nroots: usize,
    },
    /// A global number is not below the agreed global total.
    #[error("global number {global} out of range (total {total})")]
    GlobalOutOfRange { global: u64, total: u64 },
    /// Ranks computed different values for a quantity that must agree.
    #[error("collective disagreement on {what}: rank {rank} has {theirs}, this rank has {ours}")]
    CollectiveDisagreement {
        what: &'static str,
        rank: usize,
        ours: u64,
        theirs: u64,
    },
    /// A group of duplicate copies did not resolve to one of its own members.
    #[error("duplicate group served by vertex {vertex} resolved to {owner:?}, which is not a member")]
    UnresolvedDuplicate { vertex: usize, owner: Option<Remote> },
    /// Input slices do not match the suggested linear slicing.
    #[error("slice mismatch for {what}: expected [{expected_begin}, {expected_end}), got [{begin}, {end})")]
    SliceMismatch {
        what: &'static str,
        expected_begin: u64,
        expected_end: u64,
        begin: u64,
        end: u64,
    },
    /// Spatial or topological dimension outside the supported range.
    #[error("unsupported dimension {0}")]
    InvalidDimension(usize),
    /// Geometry input is malformed (e.g. non-finite coordinates or masses).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// The transport failed to deliver a message from `neighbor`.
    #[error("communication with rank {neighbor} failed: {message}")]
    CommError { neighbor: usize, message: String },
}
