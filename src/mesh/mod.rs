//! Distributed mesh: per-dimension connectivity, owners and global numbers.

pub mod build;

pub use build::{build_from_elems2verts, build_serial};

use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshDistError;
use crate::topology::family::Family;
use crate::topology::ownership::{Remote, owned_mask};

/// Entities of one dimension on one rank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityLayer {
    /// Local vertex indices, `degree` per entity. Vertices list themselves.
    pub ev2v: Vec<usize>,
    /// Authoritative copy of each entity.
    pub owners: Vec<Remote>,
    /// Global number of each entity.
    pub globals: Vec<u64>,
}

impl EntityLayer {
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// One rank's part of a mesh built over a communicator.
#[derive(Debug)]
pub struct DistMesh<'a, C> {
    comm: &'a C,
    family: Family,
    dim: usize,
    layers: Vec<EntityLayer>,
}

impl<'a, C: Communicator> DistMesh<'a, C> {
    pub(crate) fn new(comm: &'a C, family: Family, dim: usize, layers: Vec<EntityLayer>) -> Self {
        Self {
            comm,
            family,
            dim,
            layers,
        }
    }

    pub fn comm(&self) -> &'a C {
        self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Element dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn layer(&self, dim: usize) -> Result<&EntityLayer, MeshDistError> {
        self.layers.get(dim).ok_or(MeshDistError::InvalidDimension(dim))
    }

    pub fn nents(&self, dim: usize) -> Result<usize, MeshDistError> {
        Ok(self.layer(dim)?.len())
    }

    pub fn nverts(&self) -> usize {
        self.layers.first().map_or(0, EntityLayer::len)
    }

    pub fn nelems(&self) -> usize {
        self.layers.last().map_or(0, EntityLayer::len)
    }

    /// Which local entities of `dim` this rank owns.
    pub fn owned(&self, dim: usize) -> Result<Vec<bool>, MeshDistError> {
        Ok(owned_mask(self.comm, &self.layer(dim)?.owners))
    }

    pub fn owners(&self, dim: usize) -> Result<&[Remote], MeshDistError> {
        Ok(&self.layer(dim)?.owners)
    }

    pub fn globals(&self, dim: usize) -> Result<&[u64], MeshDistError> {
        Ok(&self.layer(dim)?.globals)
    }

    pub fn ask_verts_of(&self, dim: usize) -> Result<&[usize], MeshDistError> {
        Ok(&self.layer(dim)?.ev2v)
    }
}
