//! Hilbert-curve keys for point clouds.
//!
//! Points are snapped to a `2^MANTISSA_BITS` grid over their bounding box (the
//! largest side sets the scale, so cells stay cubic) and mapped to their distance
//! along a Hilbert curve with Skilling's transpose algorithm
//! ("Programming the Hilbert curve", AIP Conf. Proc. 707, 2004). The distance has
//! `dim * MANTISSA_BITS` bits and is returned as `dim` words, most significant first,
//! so sorting by the word tuple sorts along the curve.

use rayon::prelude::*;

use crate::mesh_error::MeshDistError;

/// Grid resolution per axis, in bits.
pub const MANTISSA_BITS: u32 = 52;

fn check_dim(coords: &[f64], dim: usize) -> Result<usize, MeshDistError> {
    if !(1..=3).contains(&dim) {
        return Err(MeshDistError::InvalidDimension(dim));
    }
    if coords.len() % dim != 0 {
        return Err(MeshDistError::ShapeMismatch {
            what: "hilbert coordinates",
            expected: coords.len() - coords.len() % dim,
            actual: coords.len(),
        });
    }
    if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
        return Err(MeshDistError::InvalidGeometry(format!("non-finite coordinate {bad}")));
    }
    Ok(coords.len() / dim)
}

/// Skilling's AxestoTranspose, in place.
fn axes_to_transpose(x: &mut [u64], nbits: u32) {
    let n = x.len();
    let m = 1u64 << (nbits - 1);
    // inverse undo
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }
    // gray encode
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for v in x.iter_mut() {
        *v ^= t;
    }
}

/// Interleave the transposed bits into `x.len()` words, most significant first.
fn untranspose(x: &[u64], nbits: u32) -> [u64; 3] {
    let n = x.len();
    let b = nbits as usize;
    let mut out = [0u64; 3];
    for k in 0..b * n {
        let bit = (x[k % n] >> (b - 1 - k / n)) & 1;
        out[k / b] |= bit << (b - 1 - k % b);
    }
    out
}

/// `dim` Hilbert words per point of `coords` (`dim` values per point).
pub fn dists_from_coords(coords: &[f64], dim: usize) -> Result<Vec<u64>, MeshDistError> {
    let npts = check_dim(coords, dim)?;
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for p in coords.chunks_exact(dim) {
        for j in 0..dim {
            lo[j] = lo[j].min(p[j]);
            hi[j] = hi[j].max(p[j]);
        }
    }
    let side = (0..dim).map(|j| hi[j] - lo[j]).fold(0.0f64, f64::max);
    let cells = (1u64 << MANTISSA_BITS) as f64;
    let max_cell = (1u64 << MANTISSA_BITS) - 1;

    let mut out = vec![0u64; npts * dim];
    out.par_chunks_mut(dim)
        .zip(coords.par_chunks(dim))
        .for_each(|(key, p)| {
            let mut x = [0u64; 3];
            if side > 0.0 {
                for j in 0..dim {
                    let cell = ((p[j] - lo[j]) / side * cells).floor();
                    x[j] = (cell as u64).min(max_cell);
                }
            }
            axes_to_transpose(&mut x[..dim], MANTISSA_BITS);
            key.copy_from_slice(&untranspose(&x[..dim], MANTISSA_BITS)[..dim]);
        });
    Ok(out)
}

/// Permutation visiting the points along the Hilbert curve: `order[k]` is the
/// index of the `k`-th point. Stable, so coincident points keep their input order.
pub fn sort_coords(coords: &[f64], dim: usize) -> Result<Vec<usize>, MeshDistError> {
    let keys = dists_from_coords(coords, dim)?;
    let mut order: Vec<usize> = (0..keys.len() / dim).collect();
    order.par_sort_by(|&a, &b| keys[a * dim..(a + 1) * dim].cmp(&keys[b * dim..(b + 1) * dim]));
    Ok(order)
}
