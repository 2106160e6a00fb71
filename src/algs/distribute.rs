//! Assembly of a partitioned mesh from sliced input.
//!
//! Readers typically hand every rank a contiguous slice of the global element list
//! (connectivity as vertex global numbers) and a contiguous slice of the vertex
//! coordinates, both cut by [`suggest_slices`]. Assembly moves elements to a
//! geometric partition (RIB on element centroids) and gathers the vertices each
//! rank needs.

use log::debug;

use crate::algs::collective::all_ok;
use crate::algs::communicator::Communicator;
use crate::algs::exchange::ExchangePattern;
use crate::algs::linear_partition::LinearPartition;
use crate::algs::wire::{f64s_from_wire, f64s_to_wire};
use crate::mesh_error::MeshDistError;
use crate::partitioning::inertia::{RibConfig, recursively_bisect};
use crate::topology::family::Family;
use crate::topology::ownership::Remote;

pub use crate::algs::linear_partition::suggest_slices;

/// This rank's part of the partitioned mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledSlices {
    /// Local connectivity of the elements now held here.
    pub ev2v: Vec<usize>,
    /// Global number of each local vertex, ascending.
    pub vert_globals: Vec<u64>,
    /// `dim` coordinates per local vertex.
    pub vert_coords: Vec<f64>,
    /// Per input slice element, where it went.
    pub elem_dests: Vec<Remote>,
}

fn check_slice<C: Communicator>(
    comm: &C,
    what: &'static str,
    total: u64,
    begin: u64,
    len: usize,
) -> Result<(), MeshDistError> {
    let expected = suggest_slices(total, comm.size(), comm.rank());
    let end = begin + len as u64;
    if expected.start != begin || expected.end != end {
        return Err(MeshDistError::SliceMismatch {
            what,
            expected_begin: expected.start,
            expected_end: expected.end,
            begin,
            end,
        });
    }
    Ok(())
}

fn split_records(what: &'static str, len: usize, width: usize) -> Result<usize, MeshDistError> {
    if width == 0 || len % width != 0 {
        return Err(MeshDistError::ShapeMismatch {
            what,
            expected: len - len % width.max(1),
            actual: len,
        });
    }
    Ok(len / width)
}

/// Partition sliced elements with RIB and localize their connectivity. Collective.
#[allow(clippy::too_many_arguments)]
pub fn assemble_slices<C: Communicator>(
    comm: &C,
    family: Family,
    dim: usize,
    global_nelems: u64,
    elem_offset: u64,
    conn_in: &[u64],
    global_nverts: u64,
    vert_offset: u64,
    vert_coords: &[f64],
    cfg: &RibConfig,
) -> Result<AssembledSlices, MeshDistError> {
    if !(1..=3).contains(&dim) {
        return Err(MeshDistError::InvalidDimension(dim));
    }
    let deg = family.element_degree(dim)?;
    let local = split_records("sliced connectivity", conn_in.len(), deg).and_then(|ne| {
        let nv = split_records("sliced coordinates", vert_coords.len(), dim)?;
        check_slice(comm, "elements", global_nelems, elem_offset, ne)?;
        check_slice(comm, "vertices", global_nverts, vert_offset, nv)?;
        Ok((ne, nv))
    });
    let (nslice_elems, nslice_verts) = all_ok(comm, "slice layout", local)?;

    // element vertex slots -> vertex slices, and coordinates back
    let verts = LinearPartition::new(global_nverts, comm.size())?;
    let slot_owners = verts.owners_of(conn_in)?;
    let slots2verts = ExchangePattern::new(comm, &slot_owners, nslice_verts)?;
    let wire_coords = f64s_to_wire(vert_coords);
    let slot_coords = f64s_from_wire(&slots2verts.invert().exchange_roots(&wire_coords, dim)?);

    let mut centroids = vec![0.0f64; nslice_elems * 3];
    for (c, e) in centroids.chunks_exact_mut(3).zip(slot_coords.chunks_exact(deg * dim)) {
        for v in e.chunks_exact(dim) {
            for (ci, x) in c.iter_mut().zip(v) {
                *ci += x;
            }
        }
        for ci in c.iter_mut() {
            *ci /= deg as f64;
        }
    }
    let masses = vec![1.0; nslice_elems];
    let parts = recursively_bisect(comm, &centroids, &masses, cfg)?;

    // move elements as vertex globals
    let to_elems = ExchangePattern::new(comm, &parts.dests, parts.nlocal)?;
    let elem_vert_globals = to_elems.exchange(conn_in, deg)?;

    let mut vert_globals = elem_vert_globals.clone();
    vert_globals.sort_unstable();
    vert_globals.dedup();
    let ev2v = elem_vert_globals
        .iter()
        .map(|g| {
            vert_globals
                .binary_search(g)
                .map_err(|_| MeshDistError::GlobalOutOfRange {
                    global: *g,
                    total: global_nverts,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // fetch coordinates of the needed vertices from their slices
    let fetch = ExchangePattern::new(comm, &verts.owners_of(&vert_globals)?, nslice_verts)?;
    let coords = f64s_from_wire(&fetch.invert().exchange_roots(&wire_coords, dim)?);

    debug!(
        "rank {}: assembled {} elements over {} vertices from slices of {nslice_elems} / {nslice_verts}",
        comm.rank(),
        parts.nlocal,
        vert_globals.len()
    );
    Ok(AssembledSlices {
        ev2v,
        vert_globals,
        vert_coords: coords,
        elem_dests: parts.dests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn serial_assembly_keeps_elements() {
        // unit square as two triangles
        let conn = [0u64, 1, 2, 2, 1, 3];
        let coords = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let out = assemble_slices(&NoComm, Family::Simplex, 2, 2, 0, &conn, 4, 0, &coords, &RibConfig::default())
            .unwrap();
        assert_eq!(out.ev2v, vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(out.vert_globals, vec![0, 1, 2, 3]);
        assert_eq!(out.vert_coords, coords.to_vec());
        assert_eq!(out.elem_dests, vec![Remote::new(0, 0), Remote::new(0, 1)]);
    }

    #[test]
    fn wrong_slice_is_rejected() {
        let err = assemble_slices(
            &NoComm,
            Family::Simplex,
            1,
            3,
            1,
            &[0, 1],
            2,
            0,
            &[0.0, 1.0],
            &RibConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MeshDistError::SliceMismatch { what: "elements", .. }));
    }
}
