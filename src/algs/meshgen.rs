//! Structured box meshes for tests and demos.

use crate::algs::hilbert::sort_coords;
use crate::mesh_error::MeshDistError;
use crate::topology::family::Family;

/// A single-rank mesh of `[0, x] x [0, y] x [0, z]`.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxMesh {
    pub family: Family,
    pub dim: usize,
    /// Element connectivity, `family.element_degree(dim)` vertices per element.
    pub ev2v: Vec<usize>,
    /// `dim` coordinates per vertex.
    pub coords: Vec<f64>,
}

fn invalid_geometry(message: impl Into<String>) -> MeshDistError {
    MeshDistError::InvalidGeometry(message.into())
}

// hex corners 0..8 split into six tets sharing the 0-6 diagonal, positively oriented
const HEX_TO_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 5, 1, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 4, 5, 6],
    [0, 7, 4, 6],
];

/// Build a box with `nx` cells along x, `ny` along y and `nz` along z.
///
/// `ny == 0` gives a 1D chain of segments and `nz == 0` a 2D grid. Simplex 2D boxes
/// split every quad along its `v0-v2` diagonal; simplex 3D boxes split every hex into
/// six tets around its main diagonal.
pub fn build_box(
    family: Family,
    x: f64,
    y: f64,
    z: f64,
    nx: usize,
    ny: usize,
    nz: usize,
) -> Result<BoxMesh, MeshDistError> {
    if nx == 0 {
        return Err(invalid_geometry("nx must be positive"));
    }
    if [x, y, z].iter().any(|s| !s.is_finite() || *s < 0.0) {
        return Err(invalid_geometry("box sides must be finite and non-negative"));
    }
    let dx = x / nx as f64;
    if ny == 0 {
        let coords = (0..=nx).map(|i| dx * i as f64).collect();
        let ev2v = (0..nx).flat_map(|i| [i, i + 1]).collect();
        return Ok(BoxMesh {
            family,
            dim: 1,
            ev2v,
            coords,
        });
    }

    let dy = y / ny as f64;
    let row = nx + 1;
    if nz == 0 {
        let mut coords = Vec::with_capacity(2 * row * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                coords.extend([dx * i as f64, dy * j as f64]);
            }
        }
        let mut ev2v = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let v0 = j * row + i;
                let v1 = v0 + 1;
                let v3 = v0 + row;
                let v2 = v3 + 1;
                match family {
                    Family::Simplex => ev2v.extend([v0, v1, v2, v0, v2, v3]),
                    Family::Hypercube => ev2v.extend([v0, v1, v2, v3]),
                }
            }
        }
        return Ok(BoxMesh {
            family,
            dim: 2,
            ev2v,
            coords,
        });
    }

    let dz = z / nz as f64;
    let slab = row * (ny + 1);
    let mut coords = Vec::with_capacity(3 * slab * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                coords.extend([dx * i as f64, dy * j as f64, dz * k as f64]);
            }
        }
    }
    let mut ev2v = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v0 = k * slab + j * row + i;
                let v3 = v0 + row;
                let v4 = v0 + slab;
                let v7 = v4 + row;
                let hex = [v0, v0 + 1, v3 + 1, v3, v4, v4 + 1, v7 + 1, v7];
                match family {
                    Family::Simplex => {
                        for tet in HEX_TO_TETS {
                            ev2v.extend(tet.map(|c| hex[c]));
                        }
                    }
                    Family::Hypercube => ev2v.extend(hex),
                }
            }
        }
    }
    Ok(BoxMesh {
        family,
        dim: 3,
        ev2v,
        coords,
    })
}

impl BoxMesh {
    pub fn nverts(&self) -> usize {
        self.coords.len() / self.dim
    }

    pub fn nelems(&self) -> usize {
        self.ev2v.len() / self.family.element_degree(self.dim).unwrap_or(1)
    }

    /// Renumber vertices, then elements, along the Hilbert curve of their
    /// coordinates (element centroids for elements).
    pub fn reorder_by_hilbert(&mut self) -> Result<(), MeshDistError> {
        let dim = self.dim;
        let deg = self.family.element_degree(dim)?;

        let new2old = sort_coords(&self.coords, dim)?;
        let mut old2new = vec![0usize; new2old.len()];
        for (new, &old) in new2old.iter().enumerate() {
            old2new[old] = new;
        }
        self.coords = new2old
            .iter()
            .flat_map(|&old| self.coords[old * dim..(old + 1) * dim].iter().copied())
            .collect();
        for v in &mut self.ev2v {
            *v = old2new[*v];
        }

        let mut centroids = vec![0.0; self.ev2v.len() / deg * dim];
        for (c, e) in centroids.chunks_exact_mut(dim).zip(self.ev2v.chunks_exact(deg)) {
            for &v in e {
                for (ci, x) in c.iter_mut().zip(&self.coords[v * dim..(v + 1) * dim]) {
                    *ci += x / deg as f64;
                }
            }
        }
        let elem_order = sort_coords(&centroids, dim)?;
        self.ev2v = elem_order
            .iter()
            .flat_map(|&e| self.ev2v[e * deg..(e + 1) * deg].iter().copied())
            .collect();
        Ok(())
    }
}
