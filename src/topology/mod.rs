//! Entity topology: element families, local derivation, canonical alignment and
//! ownership of duplicated entities.
//!
//! Most users will call [`ownership::resolve_derived_copies`] through
//! [`crate::mesh::build_from_elems2verts`] rather than directly.

pub mod canonical;
pub mod derive;
pub mod family;
pub mod ownership;

pub use canonical::CanonCode;
pub use family::Family;
pub use ownership::{OwnerPolicy, Remote, SmallestOrigin};
