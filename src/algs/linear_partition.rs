//! Linear partition of a dense global index space.
//!
//! `total` global numbers are dealt out in contiguous ranges: the first
//! `total % size` ranks get `total / size + 1` numbers, the rest get `total / size`.
//! The owner of a global number depends only on the number and `total`.

use std::ops::Range;

use crate::mesh_error::MeshDistError;
use crate::topology::ownership::Remote;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinearPartition {
    total: u64,
    size: usize,
}

impl LinearPartition {
    pub fn new(total: u64, size: usize) -> Result<Self, MeshDistError> {
        if size == 0 {
            return Err(MeshDistError::RankOutOfRange { rank: 0, size });
        }
        Ok(Self { total, size })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn quot_rem(&self) -> (u64, u64) {
        let n = self.size as u64;
        (self.total / n, self.total % n)
    }

    /// Global numbers held by `rank`.
    pub fn range(&self, rank: usize) -> Range<u64> {
        suggest_slices(self.total, self.size, rank)
    }

    /// Number of global numbers held by `rank`.
    pub fn local_size(&self, rank: usize) -> usize {
        let r = self.range(rank);
        (r.end - r.start) as usize
    }

    /// Rank and local index of global number `global`.
    pub fn owner_of(&self, global: u64) -> Result<Remote, MeshDistError> {
        if global >= self.total {
            return Err(MeshDistError::GlobalOutOfRange {
                global,
                total: self.total,
            });
        }
        let (quot, rem) = self.quot_rem();
        let split = (quot + 1) * rem;
        let (rank, index) = if global < split {
            (global / (quot + 1), global % (quot + 1))
        } else {
            let g = global - split;
            (g / quot + rem, g % quot)
        };
        Ok(Remote::new(rank as usize, index as usize))
    }

    /// Linear owners of a batch of global numbers.
    pub fn owners_of(&self, globals: &[u64]) -> Result<Vec<Remote>, MeshDistError> {
        globals.iter().map(|&g| self.owner_of(g)).collect()
    }
}

/// The contiguous slice `[begin, end)` of `total` items that `rank` of `size` should hold.
pub fn suggest_slices(total: u64, size: usize, rank: usize) -> Range<u64> {
    let n = size as u64;
    let r = rank as u64;
    let quot = total / n;
    let rem = total % n;
    if r < rem {
        let begin = quot * r + r;
        begin..begin + quot + 1
    } else {
        let begin = quot * r + rem;
        begin..begin + quot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ranges_tile_total() {
        let lp = LinearPartition::new(10, 4).unwrap();
        let ranges: Vec<_> = (0..4).map(|r| lp.range(r)).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..8, 8..10]);
    }

    #[test]
    fn fewer_items_than_ranks() {
        let lp = LinearPartition::new(2, 4).unwrap();
        assert_eq!(lp.owner_of(1).unwrap(), Remote::new(1, 0));
        assert_eq!(lp.local_size(3), 0);
        assert!(lp.owner_of(2).is_err());
    }

    proptest! {
        #[test]
        fn owner_agrees_with_slices(total in 1u64..500, size in 1usize..17, pick in 0u64..500) {
            let g = pick % total;
            let lp = LinearPartition::new(total, size).unwrap();
            let owner = lp.owner_of(g).unwrap();
            let range = lp.range(owner.rank);
            prop_assert!(range.contains(&g));
            prop_assert_eq!(range.start + owner.index as u64, g);
        }
    }
}
