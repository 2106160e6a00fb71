//! Element families and their sub-entity templates.

use crate::mesh_error::MeshDistError;

/// Shape family of a mesh's elements.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub enum Family {
    /// Segments, triangles, tetrahedra.
    #[default]
    Simplex,
    /// Segments, quadrilaterals, hexahedra.
    Hypercube,
}

pub const VERT: usize = 0;
pub const EDGE: usize = 1;
pub const FACE: usize = 2;
pub const REGION: usize = 3;

const TRI_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const TET_FACES: [[usize; 3]; 4] = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
const QUAD_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const HEX_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
];
const HEX_FACES: [[usize; 4]; 6] = [
    [1, 0, 3, 2],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
    [4, 5, 6, 7],
];

impl Family {
    /// Number of vertices of a `dim`-dimensional entity.
    pub fn element_degree(self, dim: usize) -> Result<usize, MeshDistError> {
        if dim > REGION {
            return Err(MeshDistError::InvalidDimension(dim));
        }
        Ok(match self {
            Family::Simplex => dim + 1,
            Family::Hypercube => 1 << dim,
        })
    }

    /// Number of `sub_dim` entities bounding one `dim` entity.
    pub fn sub_count(self, dim: usize, sub_dim: usize) -> Result<usize, MeshDistError> {
        if sub_dim == VERT {
            return self.element_degree(dim);
        }
        Ok(self.sub_template(dim, sub_dim)?.len() / self.element_degree(sub_dim)?)
    }

    /// Element-local vertex slots of every `sub_dim` entity of a `dim` entity,
    /// flattened. Faces are listed as vertex cycles.
    pub fn sub_template(self, dim: usize, sub_dim: usize) -> Result<Vec<usize>, MeshDistError> {
        let flat = |t: &[&[usize]]| t.iter().flat_map(|r| r.iter().copied()).collect();
        let rows: Vec<&[usize]> = match (self, dim, sub_dim) {
            (_, d, s) if s == d => return Ok((0..self.element_degree(d)?).collect()),
            (_, d, VERT) if d <= REGION => {
                return Ok((0..self.element_degree(d)?).collect());
            }
            (Family::Simplex, FACE, EDGE) => TRI_EDGES.iter().map(|r| &r[..]).collect(),
            (Family::Simplex, REGION, EDGE) => TET_EDGES.iter().map(|r| &r[..]).collect(),
            (Family::Simplex, REGION, FACE) => TET_FACES.iter().map(|r| &r[..]).collect(),
            (Family::Hypercube, FACE, EDGE) => QUAD_EDGES.iter().map(|r| &r[..]).collect(),
            (Family::Hypercube, REGION, EDGE) => HEX_EDGES.iter().map(|r| &r[..]).collect(),
            (Family::Hypercube, REGION, FACE) => HEX_FACES.iter().map(|r| &r[..]).collect(),
            (_, d, s) if s > d => return Err(MeshDistError::InvalidDimension(s)),
            (_, d, _) => return Err(MeshDistError::InvalidDimension(d)),
        };
        Ok(flat(&rows))
    }
}
