//! Local derivation of intermediate entities from element connectivity.

use hashbrown::HashMap;
use log::trace;

use crate::mesh_error::MeshDistError;
use crate::topology::family::Family;

/// Unique `sub_dim` entities of the local elements `ev2v` (`elem_dim` elements).
///
/// Entities are numbered in order of first appearance, walking elements in order
/// and each element's template in order; each keeps the vertex order of its first
/// appearance. Two sub-entities are the same when they have the same vertex set.
pub fn find_unique(
    ev2v: &[usize],
    family: Family,
    elem_dim: usize,
    sub_dim: usize,
) -> Result<Vec<usize>, MeshDistError> {
    let elem_deg = family.element_degree(elem_dim)?;
    let sub_deg = family.element_degree(sub_dim)?;
    if ev2v.len() % elem_deg != 0 {
        return Err(MeshDistError::InvalidConnectivity(format!(
            "connectivity of length {} is not a multiple of {elem_deg}",
            ev2v.len()
        )));
    }
    let template = family.sub_template(elem_dim, sub_dim)?;
    let mut seen: HashMap<Vec<usize>, usize> = HashMap::new();
    let mut out = Vec::new();
    for elem in ev2v.chunks_exact(elem_deg) {
        for slots in template.chunks_exact(sub_deg) {
            let record: Vec<usize> = slots.iter().map(|&s| elem[s]).collect();
            let mut key = record.clone();
            key.sort_unstable();
            if let Some(w) = key.windows(2).find(|w| w[0] == w[1]) {
                return Err(MeshDistError::InvalidConnectivity(format!(
                    "element repeats vertex {}",
                    w[0]
                )));
            }
            let next = seen.len();
            seen.entry(key).or_insert_with(|| {
                out.extend_from_slice(&record);
                next
            });
        }
    }
    trace!(
        "derived {} unique {sub_dim}-entities from {} elements",
        seen.len(),
        ev2v.len() / elem_deg
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::family::{EDGE, FACE, REGION};

    #[test]
    fn two_triangles_share_an_edge() {
        let edges = find_unique(&[0, 1, 2, 2, 1, 3], Family::Simplex, FACE, EDGE).unwrap();
        assert_eq!(edges, vec![0, 1, 1, 2, 2, 0, 1, 3, 3, 2]);
    }

    #[test]
    fn single_tet() {
        let faces = find_unique(&[0, 1, 2, 3], Family::Simplex, REGION, FACE).unwrap();
        assert_eq!(faces.len(), 12);
        let edges = find_unique(&[0, 1, 2, 3], Family::Simplex, REGION, EDGE).unwrap();
        assert_eq!(edges.len(), 12);
    }

    #[test]
    fn two_hexes_share_a_face() {
        let ev2v = [0, 1, 2, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8, 9, 10, 11];
        let faces = find_unique(&ev2v, Family::Hypercube, REGION, FACE).unwrap();
        assert_eq!(faces.len() / 4, 11);
        let edges = find_unique(&ev2v, Family::Hypercube, REGION, EDGE).unwrap();
        assert_eq!(edges.len() / 2, 20);
    }

    #[test]
    fn repeated_vertex_is_rejected() {
        assert!(find_unique(&[0, 0, 1], Family::Simplex, FACE, EDGE).is_err());
    }
}
