//! Exchange patterns: reusable bipartite routing between two distributed index spaces.
//!
//! A pattern is built from the *items* side: every local item names a destination
//! `(rank, root index)`. Construction is collective and records both directions, so
//! [`ExchangePattern::invert`] is a local swap and `p.invert().invert() == p`.
//!
//! Each side stores its items grouped by local root (`roots2items` offsets). On the
//! source side of a freshly built pattern every item is its own root. On the
//! destination side the arrived copies are grouped by the root they were sent to.
//! The order of copies *within* a root is not part of the contract: callers that
//! need determinism sort by an explicit key (see `topology::ownership`).
//!
//! All operations are collective: every rank calls them in the same order.

use std::fmt;

use bytemuck::Pod;
use log::debug;

use crate::algs::collective::{all_ok, alltoallv};
use crate::algs::communicator::{CommTag, Communicator};
use crate::mesh_error::MeshDistError;
use crate::topology::ownership::Remote;

const TAG_SETUP: CommTag = CommTag(0x1000);
const TAG_SLOTS: CommTag = CommTag(0x1010);
const TAG_EXCHANGE: CommTag = CommTag(0x1100);

/// Remote end of one item: the rank, the root it is grouped under there, and its
/// position in that rank's item array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Link {
    rank: usize,
    root: usize,
    slot: usize,
}

/// One side of the relation.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Half {
    links: Vec<Link>,
    /// Items of root `r` are `offsets[r]..offsets[r + 1]`.
    offsets: Vec<usize>,
    /// Per remote rank, local items ordered by the remote slot (send order).
    send_order: Vec<Vec<usize>>,
    /// Per remote rank, local items in ascending local order (receive order).
    recv_order: Vec<Vec<usize>>,
}

impl Half {
    fn new(links: Vec<Link>, offsets: Vec<usize>, size: usize) -> Self {
        let mut recv_order = vec![Vec::new(); size];
        for (i, l) in links.iter().enumerate() {
            recv_order[l.rank].push(i);
        }
        let mut send_order = recv_order.clone();
        for items in &mut send_order {
            items.sort_by_key(|&i| links[i].slot);
        }
        Self {
            links,
            offsets,
            send_order,
            recv_order,
        }
    }

    fn validate(&self, size: usize) -> Result<(), MeshDistError> {
        let last = self.offsets.last().copied().unwrap_or(0);
        if self.offsets.first().copied().unwrap_or(0) != 0
            || last != self.links.len()
            || self.offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(MeshDistError::InvalidConnectivity(
                "exchange pattern roots2items offsets are not a valid fan".into(),
            ));
        }
        if let Some(l) = self.links.iter().find(|l| l.rank >= size) {
            return Err(MeshDistError::RankOutOfRange { rank: l.rank, size });
        }
        Ok(())
    }
}

/// Immutable bipartite routing pattern between local items and remote roots.
pub struct ExchangePattern<'a, C> {
    comm: &'a C,
    src: Half,
    dst: Half,
}

impl<C> Clone for ExchangePattern<'_, C> {
    fn clone(&self) -> Self {
        Self {
            comm: self.comm,
            src: self.src.clone(),
            dst: self.dst.clone(),
        }
    }
}

impl<C: Communicator> fmt::Debug for ExchangePattern<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangePattern")
            .field("nitems", &self.src.links.len())
            .field("nroots", &self.nroots())
            .field("ndest_items", &self.dst.links.len())
            .field("ndest_roots", &self.ndest_roots())
            .finish()
    }
}

/// Two patterns are equal when they route identically (the communicator is ignored).
impl<C> PartialEq for ExchangePattern<'_, C> {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src && self.dst == other.dst
    }
}

fn fan_from_counts(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    offsets.push(0);
    let mut acc = 0;
    for &c in counts {
        acc += c;
        offsets.push(acc);
    }
    offsets
}

impl<'a, C> ExchangePattern<'a, C>
where
    C: Communicator,
{
    /// Build a pattern sending local item `i` to root `items2dests[i].index` on rank
    /// `items2dests[i].rank`. `nroots` is the number of roots this rank holds.
    pub fn new(comm: &'a C, items2dests: &[Remote], nroots: usize) -> Result<Self, MeshDistError> {
        let size = comm.size();
        let ranks_ok = match items2dests.iter().find(|d| d.rank >= size) {
            Some(bad) => Err(MeshDistError::RankOutOfRange {
                rank: bad.rank,
                size,
            }),
            None => Ok(()),
        };
        all_ok(comm, "exchange destinations", ranks_ok)?;

        // 1) announce (root, item) to every destination, in item order
        let mut announce: Vec<Vec<[u64; 2]>> = vec![Vec::new(); size];
        for (i, d) in items2dests.iter().enumerate() {
            announce[d.rank].push([d.index as u64, i as u64]);
        }
        let arrived = alltoallv(comm, TAG_SETUP, &announce)?;

        // 2) group arrivals by root; within a root, by (source rank, source item)
        let me = comm.rank();
        let mut arrivals: Vec<(usize, usize, usize, usize)> = Vec::new(); // (root, rank, item, arrival pos)
        for (src_rank, buf) in arrived.iter().enumerate() {
            for (k, &[root, item]) in buf.iter().enumerate() {
                arrivals.push((root as usize, src_rank, item as usize, k));
            }
        }
        let roots_ok = match arrivals.iter().find(|a| a.0 >= nroots) {
            Some(&(root, ..)) => Err(MeshDistError::RootOutOfRange {
                rank: me,
                index: root,
                nroots,
            }),
            None => Ok(()),
        };
        all_ok(comm, "exchange roots", roots_ok)?;
        arrivals.sort_unstable_by_key(|&(root, rank, item, _)| (root, rank, item));

        let mut counts = vec![0usize; nroots];
        let mut slots_back: Vec<Vec<u64>> = arrived.iter().map(|b| vec![0; b.len()]).collect();
        let mut dst_links = Vec::with_capacity(arrivals.len());
        for (slot, &(root, rank, item, k)) in arrivals.iter().enumerate() {
            counts[root] += 1;
            slots_back[rank][k] = slot as u64;
            dst_links.push(Link {
                rank,
                root: item,
                slot: item,
            });
        }

        // 3) tell every item where it landed
        let landed = alltoallv(comm, TAG_SLOTS, &slots_back)?;
        let mut cursor = vec![0usize; size];
        let mut src_links = Vec::with_capacity(items2dests.len());
        for d in items2dests {
            let slot = landed[d.rank]
                .get(cursor[d.rank])
                .copied()
                .ok_or_else(|| MeshDistError::CommError {
                    neighbor: d.rank,
                    message: "missing landing slot for exchange item".into(),
                })?;
            cursor[d.rank] += 1;
            src_links.push(Link {
                rank: d.rank,
                root: d.index,
                slot: slot as usize,
            });
        }

        let src_offsets = (0..=items2dests.len()).collect();
        let pattern = Self {
            comm,
            src: Half::new(src_links, src_offsets, size),
            dst: Half::new(dst_links, fan_from_counts(&counts), size),
        };
        pattern.check_invariants()?;
        debug!(
            "rank {me}: exchange pattern with {} items -> {} arrived copies over {} roots",
            pattern.nitems(),
            pattern.ndest_items(),
            nroots
        );
        Ok(pattern)
    }

    fn check_invariants(&self) -> Result<(), MeshDistError> {
        if cfg!(any(debug_assertions, feature = "strict-invariants")) {
            let size = self.comm.size();
            self.src.validate(size)?;
            self.dst.validate(size)?;
        }
        Ok(())
    }

    /// The pattern with items and roots swapped. No communication.
    pub fn invert(&self) -> Self {
        Self {
            comm: self.comm,
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }

    pub fn comm(&self) -> &'a C {
        self.comm
    }

    /// Number of local items (senders).
    pub fn nitems(&self) -> usize {
        self.src.links.len()
    }

    /// Number of local roots grouping the items.
    pub fn nroots(&self) -> usize {
        self.src.offsets.len().saturating_sub(1)
    }

    /// Number of copies this rank receives.
    pub fn ndest_items(&self) -> usize {
        self.dst.links.len()
    }

    /// Number of local roots receiving copies.
    pub fn ndest_roots(&self) -> usize {
        self.dst.offsets.len().saturating_sub(1)
    }

    /// Per local item, the destination `(rank, root index)`.
    pub fn items2dests(&self) -> Vec<Remote> {
        self.src
            .links
            .iter()
            .map(|l| Remote::new(l.rank, l.root))
            .collect()
    }

    /// Offsets grouping local items by local root.
    pub fn roots2items(&self) -> &[usize] {
        &self.src.offsets
    }

    /// Offsets grouping received copies by the root they were sent to.
    pub fn dest_roots2items(&self) -> &[usize] {
        &self.dst.offsets
    }

    /// Send `width` values per local item; returns `width` values per received copy,
    /// grouped root-major (see [`Self::dest_roots2items`]).
    pub fn exchange<T: Pod>(&self, data: &[T], width: usize) -> Result<Vec<T>, MeshDistError> {
        if width == 0 {
            return Err(MeshDistError::ShapeMismatch {
                what: "exchange width",
                expected: 1,
                actual: 0,
            });
        }
        if data.len() != self.nitems() * width {
            return Err(MeshDistError::ShapeMismatch {
                what: "exchange payload",
                expected: self.nitems() * width,
                actual: data.len(),
            });
        }
        let sends: Vec<Vec<T>> = self
            .src
            .send_order
            .iter()
            .map(|items| {
                let mut buf = Vec::with_capacity(items.len() * width);
                for &i in items {
                    buf.extend_from_slice(&data[i * width..(i + 1) * width]);
                }
                buf
            })
            .collect();
        let received = alltoallv(self.comm, TAG_EXCHANGE, &sends)?;

        let mut out = vec![T::zeroed(); self.ndest_items() * width];
        for (rank, (buf, order)) in received.iter().zip(&self.dst.recv_order).enumerate() {
            if buf.len() != order.len() * width {
                return Err(MeshDistError::CommError {
                    neighbor: rank,
                    message: format!(
                        "exchange expected {} values, got {}",
                        order.len() * width,
                        buf.len()
                    ),
                });
            }
            for (chunk, &j) in buf.chunks_exact(width).zip(order) {
                out[j * width..(j + 1) * width].copy_from_slice(chunk);
            }
        }
        Ok(out)
    }

    /// Replicate `width` values per local root onto every item grouped under it.
    pub fn expand_roots<T: Copy>(&self, root_data: &[T], width: usize) -> Result<Vec<T>, MeshDistError> {
        if root_data.len() != self.nroots() * width {
            return Err(MeshDistError::ShapeMismatch {
                what: "per-root data",
                expected: self.nroots() * width,
                actual: root_data.len(),
            });
        }
        let mut out = Vec::with_capacity(self.nitems() * width);
        for (r, w) in self.src.offsets.windows(2).enumerate() {
            for _ in w[0]..w[1] {
                out.extend_from_slice(&root_data[r * width..(r + 1) * width]);
            }
        }
        Ok(out)
    }

    /// [`Self::expand_roots`] followed by [`Self::exchange`].
    pub fn exchange_roots<T: Pod>(&self, root_data: &[T], width: usize) -> Result<Vec<T>, MeshDistError> {
        let items = self.expand_roots(root_data, width)?;
        self.exchange(&items, width)
    }
}

/// Items that each own themselves: `(rank, i)` for `i in 0..n`.
pub fn identity_dests<C: Communicator>(comm: &C, n: usize) -> Vec<Remote> {
    let me = comm.rank();
    (0..n).map(|i| Remote::new(me, i)).collect()
}
