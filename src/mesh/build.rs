//! Mesh assembly from element-to-vertex connectivity.
//!
//! Each rank supplies its elements (local vertex indices) and the global number of
//! each local vertex. Intermediate entities are derived locally, then made globally
//! consistent: canonical vertex order, one owner per duplicate, dense global numbers.

use itertools::Itertools;
use log::debug;

use crate::algs::communicator::{Communicator, NoComm};
use crate::mesh::{DistMesh, EntityLayer};
use crate::mesh_error::MeshDistError;
use crate::topology::canonical::canonicalize;
use crate::topology::derive::find_unique;
use crate::topology::family::{Family, VERT};
use crate::topology::ownership::{
    SmallestOrigin, globals_from_owners, identity_remotes, owners_from_globals,
    resolve_derived_copies,
};

fn vertex_layer<C: Communicator>(comm: &C, vert_globals: &[u64]) -> Result<EntityLayer, MeshDistError> {
    let owners = if comm.size() > 1 {
        owners_from_globals(comm, vert_globals, None, &SmallestOrigin)?
    } else {
        identity_remotes(comm, vert_globals.len())
    };
    Ok(EntityLayer {
        ev2v: (0..vert_globals.len()).collect(),
        owners,
        globals: vert_globals.to_vec(),
    })
}

/// Layer of derived entities (edges, faces) given their local connectivity.
fn derived_layer<C: Communicator>(
    comm: &C,
    deg: usize,
    ev2v: &[usize],
    vert_globals: &[u64],
) -> Result<EntityLayer, MeshDistError> {
    if comm.size() > 1 {
        let copies = resolve_derived_copies(comm, vert_globals, deg, ev2v, &SmallestOrigin)?;
        let globals = globals_from_owners(comm, &copies.owners)?;
        Ok(EntityLayer {
            ev2v: copies.ev2v,
            owners: copies.owners,
            globals,
        })
    } else {
        let canon = canonicalize(deg, ev2v, vert_globals)?;
        let n = canon.nents();
        Ok(EntityLayer {
            ev2v: canon.ev2v,
            owners: identity_remotes(comm, n),
            globals: (0..n as u64).collect(),
        })
    }
}

/// Elements are never shared: each rank owns its own.
fn element_layer<C: Communicator>(comm: &C, deg: usize, ev2v: &[usize]) -> Result<EntityLayer, MeshDistError> {
    let n = ev2v.len() / deg;
    let owners = identity_remotes(comm, n);
    let globals = if comm.size() > 1 {
        globals_from_owners(comm, &owners)?
    } else {
        (0..n as u64).collect()
    };
    Ok(EntityLayer {
        ev2v: ev2v.to_vec(),
        owners,
        globals,
    })
}

/// Build this rank's part of a mesh from element connectivity. Collective.
///
/// `ev2v` lists `degree(elem_dim)` local vertex indices per element and
/// `vert_globals` the global number of every local vertex.
pub fn build_from_elems2verts<'a, C: Communicator>(
    comm: &'a C,
    family: Family,
    elem_dim: usize,
    ev2v: &[usize],
    vert_globals: &[u64],
) -> Result<DistMesh<'a, C>, MeshDistError> {
    if elem_dim == VERT {
        return Err(MeshDistError::InvalidDimension(elem_dim));
    }
    let deg = family.element_degree(elem_dim)?;
    if ev2v.len() % deg != 0 {
        return Err(MeshDistError::InvalidConnectivity(format!(
            "element connectivity of length {} is not a multiple of {deg}",
            ev2v.len()
        )));
    }
    if let Some(&v) = ev2v.iter().find(|&&v| v >= vert_globals.len()) {
        return Err(MeshDistError::InvalidConnectivity(format!(
            "element vertex {v} out of range ({} vertices)",
            vert_globals.len()
        )));
    }

    let mut layers = Vec::with_capacity(elem_dim + 1);
    layers.push(vertex_layer(comm, vert_globals)?);
    for dim in 1..elem_dim {
        let mv2v = find_unique(ev2v, family, elem_dim, dim)?;
        layers.push(derived_layer(comm, family.element_degree(dim)?, &mv2v, vert_globals)?);
    }
    layers.push(element_layer(comm, deg, ev2v)?);

    debug!(
        "rank {}: built {family:?} mesh of dimension {elem_dim}, entity counts {}",
        comm.rank(),
        layers.iter().map(EntityLayer::len).join("/")
    );
    Ok(DistMesh::new(comm, family, elem_dim, layers))
}

/// Single-rank mesh whose vertices are numbered `0..nverts`.
pub fn build_serial<'a>(
    comm: &'a NoComm,
    family: Family,
    elem_dim: usize,
    ev2v: &[usize],
    nverts: usize,
) -> Result<DistMesh<'a, NoComm>, MeshDistError> {
    let globals: Vec<u64> = (0..nverts as u64).collect();
    build_from_elems2verts(comm, family, elem_dim, ev2v, &globals)
}
