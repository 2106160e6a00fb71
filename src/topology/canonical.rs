//! Canonical alignment of connectivity records.
//!
//! A record of degree `deg` is a cycle of vertices (an edge, triangle or quad).
//! Its canonical form puts the vertex with the smallest global number first and,
//! for `deg >= 3`, the smaller of that vertex's two cyclic neighbours second.
//! The transform is an element of the dihedral group D_deg and is stored as a
//! one-byte [`CanonCode`] so it can be replayed on any other per-slot array.

use core::fmt::{Debug, Formatter};

use rayon::prelude::*;

use crate::mesh_error::MeshDistError;

/// Rotation + flip, packed as `rot << 1 | flip`.
///
/// Applying code `(rot, flip)` to a record `x` of degree `deg` yields
/// `out[i] = x[(rot + s(i)) % deg]` with `s(i) = i`, or `(deg - i) % deg` if flipped.
/// Composition follows D_N: (k,f)*(k',f') = (k + (-1)^f k' mod N, f xor f').
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct CanonCode(u8);

impl Debug for CanonCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CanonCode")
            .field("rot", &self.rotation())
            .field("flip", &self.is_flipped())
            .finish()
    }
}

impl CanonCode {
    pub const IDENTITY: CanonCode = CanonCode(0);

    #[inline]
    pub const fn new(flip: bool, rotation: u8) -> Self {
        CanonCode((rotation << 1) | flip as u8)
    }

    #[inline]
    pub const fn is_flipped(self) -> bool {
        self.0 & 1 == 1
    }

    #[inline]
    pub const fn rotation(self) -> u8 {
        self.0 >> 1
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Source slot for output slot `i`.
    #[inline]
    pub fn source_slot(self, deg: usize, i: usize) -> usize {
        let s = if self.is_flipped() { (deg - i) % deg } else { i };
        (self.rotation() as usize + s) % deg
    }

    /// Code equivalent to applying `first`, then `then`.
    pub fn compose(deg: usize, first: Self, then: Self) -> Self {
        // (first then `then`)[i] = x[first.src(then.src(i))]; recover from slots 0 and 1.
        let rot = first.source_slot(deg, then.source_slot(deg, 0));
        if deg < 3 {
            return CanonCode::new(false, rot as u8);
        }
        let next = first.source_slot(deg, then.source_slot(deg, 1));
        let flip = next != (rot + 1) % deg;
        CanonCode::new(flip, rot as u8)
    }

    /// The code undoing `self`.
    pub fn inverse(deg: usize, code: Self) -> Self {
        if code.is_flipped() {
            // reflections are involutions
            code
        } else {
            let rot = code.rotation() as usize % deg.max(1);
            CanonCode::new(false, ((deg - rot) % deg.max(1)) as u8)
        }
    }
}

fn check_shape(deg: usize, len: usize) -> Result<usize, MeshDistError> {
    if deg == 0 || len % deg != 0 {
        return Err(MeshDistError::InvalidConnectivity(format!(
            "array of length {len} does not hold records of degree {deg}"
        )));
    }
    Ok(len / deg)
}

/// Code taking one record of global numbers to canonical form.
pub fn code_to_canonical(deg: usize, record: &[u64]) -> CanonCode {
    let min_j = record
        .iter()
        .enumerate()
        .min_by_key(|&(_, g)| *g)
        .map_or(0, |(j, _)| j);
    if deg < 3 {
        return CanonCode::new(false, min_j as u8);
    }
    let next = record[(min_j + 1) % deg];
    let prev = record[(min_j + deg - 1) % deg];
    CanonCode::new(prev < next, min_j as u8)
}

/// Canonical codes of every record in `ev2vg` (records of `deg` global numbers).
///
/// Records listing a vertex twice are rejected: they cannot denote a valid entity.
pub fn codes_to_canonical(deg: usize, ev2vg: &[u64]) -> Result<Vec<CanonCode>, MeshDistError> {
    check_shape(deg, ev2vg.len())?;
    ev2vg
        .par_chunks(deg)
        .enumerate()
        .map(|(e, record)| {
            for (j, g) in record.iter().enumerate() {
                if record[j + 1..].contains(g) {
                    return Err(MeshDistError::DegenerateRecord {
                        record: e,
                        global: *g,
                    });
                }
            }
            Ok(code_to_canonical(deg, record))
        })
        .collect()
}

/// Apply per-record codes to any per-slot array.
pub fn align_records<T>(deg: usize, ev2x: &[T], codes: &[CanonCode]) -> Result<Vec<T>, MeshDistError>
where
    T: Copy + Send + Sync,
{
    let n = check_shape(deg, ev2x.len())?;
    if codes.len() != n {
        return Err(MeshDistError::ShapeMismatch {
            what: "canonical codes",
            expected: n,
            actual: codes.len(),
        });
    }
    let mut out = ev2x.to_vec();
    out.par_chunks_mut(deg)
        .zip(ev2x.par_chunks(deg))
        .zip(codes.par_iter())
        .for_each(|((dst, src), &code)| {
            for (i, d) in dst.iter_mut().enumerate() {
                *d = src[code.source_slot(deg, i)];
            }
        });
    Ok(out)
}

/// Canonicalized connectivity: the codes plus both aligned arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canonical {
    pub deg: usize,
    pub codes: Vec<CanonCode>,
    /// Local vertex indices, canonical order.
    pub ev2v: Vec<usize>,
    /// Vertex global numbers, canonical order.
    pub ev2vg: Vec<u64>,
}

impl Canonical {
    pub fn nents(&self) -> usize {
        self.codes.len()
    }

    /// Global number of the first (smallest) vertex of entity `e`.
    pub fn first_global(&self, e: usize) -> u64 {
        self.ev2vg[e * self.deg]
    }
}

/// Canonicalize local connectivity `ev2v` using the vertices' global numbers.
pub fn canonicalize(
    deg: usize,
    ev2v: &[usize],
    verts2globals: &[u64],
) -> Result<Canonical, MeshDistError> {
    check_shape(deg, ev2v.len())?;
    let ev2vg = ev2v
        .iter()
        .map(|&v| {
            verts2globals.get(v).copied().ok_or_else(|| {
                MeshDistError::InvalidConnectivity(format!(
                    "vertex {v} out of range ({} vertices)",
                    verts2globals.len()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let codes = codes_to_canonical(deg, &ev2vg)?;
    Ok(Canonical {
        deg,
        ev2v: align_records(deg, ev2v, &codes)?,
        ev2vg: align_records(deg, &ev2vg, &codes)?,
        codes,
    })
}
