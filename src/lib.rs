#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-dist
//!
//! mesh-dist is the distributed core of an unstructured-mesh engine. Each rank derives
//! mesh connectivity from its own share of the elements; mesh-dist turns those
//! independent local views into one globally consistent mesh and redistributes
//! elements into a geometrically coherent, load-balanced partition.
//!
//! ## Features
//! - Canonical alignment of connectivity records (rotation + flip codes)
//! - One owner per duplicated entity, chosen by a replaceable [`OwnerPolicy`]
//! - Reusable bipartite exchange patterns with communication-free inversion
//! - Recursive inertial bisection over explicit rank groups
//! - Hilbert-curve ordering of point clouds
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Determinism
//!
//! Results never depend on message arrival order: arrived copies are ordered by their
//! origin `(rank, index)` before any decision, and reductions fold contributions in
//! rank order, so every rank of a group computes bit-identical values.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-dist = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! [`OwnerPolicy`]: crate::topology::ownership::OwnerPolicy

pub mod algs;
pub mod mesh;
pub mod mesh_error;
pub mod partitioning;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::collective::RankGroup;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
    pub use crate::algs::distribute::{AssembledSlices, assemble_slices, suggest_slices};
    pub use crate::algs::exchange::ExchangePattern;
    pub use crate::algs::hilbert::{dists_from_coords, sort_coords};
    pub use crate::algs::linear_partition::LinearPartition;
    pub use crate::algs::meshgen::{BoxMesh, build_box};
    pub use crate::mesh::{DistMesh, EntityLayer, build_from_elems2verts, build_serial};
    pub use crate::mesh_error::MeshDistError;
    pub use crate::partitioning::inertia::{Bisection, RibConfig, recursively_bisect};
    pub use crate::topology::canonical::{CanonCode, align_records, canonicalize, codes_to_canonical};
    pub use crate::topology::family::Family;
    pub use crate::topology::ownership::{
        DerivedCopies, OwnerPolicy, Remote, SmallestOrigin, globals_from_owners, identity_remotes,
        owned_mask, owners_from_globals, resolve_derived_copies,
    };
}
