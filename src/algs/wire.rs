//! Fixed little-endian wire records moved by the collectives.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::{align_of, size_of};

use crate::mesh_error::MeshDistError;
use crate::topology::ownership::Remote;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Copy received bytes into a typed vector (the byte buffer need not be aligned).
pub fn collect_from_bytes<T: Pod>(
    neighbor: usize,
    bytes: &[u8],
    expected: usize,
) -> Result<Vec<T>, MeshDistError> {
    let want = expected * size_of::<T>();
    if bytes.len() != want {
        return Err(MeshDistError::CommError {
            neighbor,
            message: format!("expected {want} bytes, got {}", bytes.len()),
        });
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

/// Floats as little-endian bit patterns, for payloads moved by exchange patterns.
pub fn f64s_to_wire(values: &[f64]) -> Vec<u64> {
    values.iter().map(|x| x.to_bits().to_le()).collect()
}

pub fn f64s_from_wire(words: &[u64]) -> Vec<f64> {
    words.iter().map(|&w| f64::from_bits(u64::from_le(w))).collect()
}

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64, // count of following records
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// A remote reference `(rank, index)` carried on the wire.
/// NOTE: `rank_le` is u32 (never usize) on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireRemote {
    pub index_le: u64,
    pub rank_le: u32,
    pub _pad: u32, // pad to 8-byte alignment (explicit)
}

impl WireRemote {
    pub const SIZE: usize = 16;

    pub fn new(rank: usize, index: usize) -> Self {
        Self {
            index_le: (index as u64).to_le(),
            rank_le: (rank as u32).to_le(),
            _pad: 0,
        }
    }
    pub fn rank(&self) -> usize {
        u32::from_le(self.rank_le) as usize
    }
    pub fn index(&self) -> usize {
        u64::from_le(self.index_le) as usize
    }
}

impl From<Remote> for WireRemote {
    fn from(r: Remote) -> Self {
        WireRemote::new(r.rank, r.index)
    }
}

impl From<WireRemote> for Remote {
    fn from(w: WireRemote) -> Self {
        Remote::new(w.rank(), w.index())
    }
}

/// A weighted point and its origin, moved between bisection levels.
/// Floats travel as their little-endian bit patterns.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePoint {
    pub coords_le: [u64; 3],
    pub mass_le: u64,
    pub origin: WireRemote,
}

impl WirePoint {
    pub fn new(coords: [f64; 3], mass: f64, origin: Remote) -> Self {
        Self {
            coords_le: coords.map(|c| c.to_bits().to_le()),
            mass_le: mass.to_bits().to_le(),
            origin: origin.into(),
        }
    }
    pub fn coords(&self) -> [f64; 3] {
        self.coords_le.map(|c| f64::from_bits(u64::from_le(c)))
    }
    pub fn mass(&self) -> f64 {
        f64::from_bits(u64::from_le(self.mass_le))
    }
    pub fn origin(&self) -> Remote {
        self.origin.into()
    }
}

const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WirePoint>(), 48);
const_assert_eq!(size_of::<WireRemote>(), WireRemote::SIZE);
const_assert_eq!(align_of::<WireRemote>(), 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_bytes_roundtrip() {
        let v = vec![WireRemote::new(3, 17), WireRemote::new(0, 1 << 40)];
        let bytes = cast_slice(&v).to_vec();
        let out: Vec<WireRemote> = collect_from_bytes(0, &bytes, 2).unwrap();
        assert_eq!(Remote::from(out[0]), Remote::new(3, 17));
        assert_eq!(out[1].index(), 1 << 40);
    }

    #[test]
    fn point_keeps_float_bits() {
        let p = WirePoint::new([0.1, -2.5, f64::MIN_POSITIVE], 3.0, Remote::new(1, 2));
        let bytes = cast_slice(std::slice::from_ref(&p)).to_vec();
        let q: Vec<WirePoint> = collect_from_bytes(1, &bytes, 1).unwrap();
        assert_eq!(q[0].coords(), [0.1, -2.5, f64::MIN_POSITIVE]);
        assert_eq!(q[0].mass(), 3.0);
        assert_eq!(q[0].origin(), Remote::new(1, 2));
    }

    #[test]
    fn short_buffer_is_comm_error() {
        let err = collect_from_bytes::<WireCount>(4, &[0u8; 5], 1).unwrap_err();
        assert!(matches!(err, MeshDistError::CommError { neighbor: 4, .. }));
    }
}
