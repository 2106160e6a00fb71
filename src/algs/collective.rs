//! Collective operations built on the point-to-point [`Communicator`].
//!
//! Every collective runs in two stages: first each pair of participants exchanges
//! a [`WireCount`] header, then the payloads move. Receives are posted before sends, every receive is
//! waited on (even after an error) and every send handle is drained before the
//! function returns.
//!
//! Participants are given as a [`RankGroup`]. Reductions gather every member's
//! contribution and fold them in group order, so all members get bit-identical
//! results (floating-point sums included).

use std::mem::size_of;
use std::ops::Range;

use bytemuck::Pod;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, collect_from_bytes};
use crate::mesh_error::MeshDistError;

pub const TAG_ALLTOALL: CommTag = CommTag(0x0100);
pub const TAG_GATHER: CommTag = CommTag(0x0200);
pub const TAG_REDUCE: CommTag = CommTag(0x0300);
pub const TAG_SCAN: CommTag = CommTag(0x0400);

/// An explicit, ordered list of ranks taking part in a sub-collective.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RankGroup {
    ranks: Vec<usize>,
}

impl RankGroup {
    /// All ranks of `comm`.
    pub fn world<C: Communicator>(comm: &C) -> Self {
        Self::from_range(0..comm.size())
    }

    pub fn from_range(range: Range<usize>) -> Self {
        Self {
            ranks: range.collect(),
        }
    }

    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Position of `rank` within the group.
    pub fn position(&self, rank: usize) -> Option<usize> {
        self.ranks.iter().position(|&r| r == rank)
    }

    pub fn contains(&self, rank: usize) -> bool {
        self.position(rank).is_some()
    }

    /// Split into the first `len / 2` members and the rest.
    pub fn split(&self) -> (Self, Self) {
        let half = self.ranks.len() / 2;
        (
            Self {
                ranks: self.ranks[..half].to_vec(),
            },
            Self {
                ranks: self.ranks[half..].to_vec(),
            },
        )
    }
}

/// Sparse personalized all-to-all among `group`: `sends[k]` goes to the k-th member,
/// the k-th returned buffer came from the k-th member.
pub fn exchange_in<T, C>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    sends: &[Vec<T>],
) -> Result<Vec<Vec<T>>, MeshDistError>
where
    T: Pod,
    C: Communicator,
{
    let me = comm.rank();
    let peers = group.ranks();
    if sends.len() != peers.len() {
        return Err(MeshDistError::ShapeMismatch {
            what: "per-peer send buffers",
            expected: peers.len(),
            actual: sends.len(),
        });
    }
    let me_pos = group.position(me).ok_or(MeshDistError::RankOutOfRange {
        rank: me,
        size: peers.len(),
    })?;

    // --- Stage 1: sizes ---
    let mut size_recvs = Vec::with_capacity(peers.len());
    for (k, &p) in peers.iter().enumerate() {
        if k != me_pos {
            size_recvs.push((k, p, comm.irecv(p, tag.base(), size_of::<WireCount>())));
        }
    }
    let mut pending_sends = Vec::with_capacity(peers.len());
    for (k, (&p, buf)) in peers.iter().zip(sends).enumerate() {
        if k != me_pos {
            let count = WireCount::new(buf.len());
            pending_sends.push(comm.isend(p, tag.base(), cast_slice(std::slice::from_ref(&count))));
        }
    }
    let mut counts = vec![0usize; peers.len()];
    let mut maybe_err = None;
    for (k, p, h) in size_recvs {
        match h.wait() {
            Some(data) => match collect_from_bytes::<WireCount>(p, &data, 1) {
                Ok(c) => counts[k] = c[0].get(),
                Err(e) => {
                    maybe_err.get_or_insert(e);
                }
            },
            None => {
                maybe_err.get_or_insert(MeshDistError::CommError {
                    neighbor: p,
                    message: format!("failed to receive size from rank {p}"),
                });
            }
        }
    }
    for send in pending_sends.drain(..) {
        let _ = send.wait();
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    // --- Stage 2: payloads (empty messages are skipped on both sides) ---
    let data_tag = tag.offset(1).as_u16();
    let mut data_recvs = Vec::with_capacity(peers.len());
    for (k, &p) in peers.iter().enumerate() {
        if k != me_pos && counts[k] > 0 {
            data_recvs.push((k, p, comm.irecv(p, data_tag, counts[k] * size_of::<T>())));
        }
    }
    for (k, (&p, buf)) in peers.iter().zip(sends).enumerate() {
        if k != me_pos && !buf.is_empty() {
            pending_sends.push(comm.isend(p, data_tag, cast_slice(buf)));
        }
    }
    let mut out: Vec<Vec<T>> = vec![Vec::new(); peers.len()];
    out[me_pos] = sends[me_pos].clone();
    for (k, p, h) in data_recvs {
        match h.wait() {
            Some(data) => match collect_from_bytes::<T>(p, &data, counts[k]) {
                Ok(v) => out[k] = v,
                Err(e) => {
                    maybe_err.get_or_insert(e);
                }
            },
            None => {
                maybe_err.get_or_insert(MeshDistError::CommError {
                    neighbor: p,
                    message: format!("failed to receive payload from rank {p}"),
                });
            }
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// World-wide personalized all-to-all; `sends[r]` goes to rank `r`.
pub fn alltoallv<T, C>(comm: &C, tag: CommTag, sends: &[Vec<T>]) -> Result<Vec<Vec<T>>, MeshDistError>
where
    T: Pod,
    C: Communicator,
{
    exchange_in(comm, &RankGroup::world(comm), tag, sends)
}

/// Every member receives every member's `local` slice, in group order.
pub fn allgather_in<T, C>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    local: &[T],
) -> Result<Vec<Vec<T>>, MeshDistError>
where
    T: Pod,
    C: Communicator,
{
    let sends = vec![local.to_vec(); group.len()];
    exchange_in(comm, group, tag, &sends)
}

/// One `u64` per rank of the world, in rank order.
pub fn allgather_u64<C: Communicator>(comm: &C, value: u64) -> Result<Vec<u64>, MeshDistError> {
    let all = allgather_in(comm, &RankGroup::world(comm), TAG_GATHER, &[value])?;
    Ok(all.into_iter().map(|v| v[0]).collect())
}

fn gather_scalars_in<T, C>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    value: T,
) -> Result<Vec<T>, MeshDistError>
where
    T: Pod,
    C: Communicator,
{
    let all = allgather_in(comm, group, tag, &[value])?;
    all.into_iter()
        .zip(group.ranks())
        .map(|(v, &r)| {
            v.first().copied().ok_or(MeshDistError::CommError {
                neighbor: r,
                message: "empty reduction contribution".into(),
            })
        })
        .collect()
}

pub fn allreduce_sum_u64_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    value: u64,
) -> Result<u64, MeshDistError> {
    Ok(gather_scalars_in(comm, group, tag, value)?.into_iter().sum())
}

pub fn allreduce_max_u64_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    value: u64,
) -> Result<u64, MeshDistError> {
    Ok(gather_scalars_in(comm, group, tag, value)?
        .into_iter()
        .max()
        .unwrap_or(value))
}

pub fn allreduce_and_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    value: bool,
) -> Result<bool, MeshDistError> {
    Ok(gather_scalars_in(comm, group, tag, u8::from(value))?
        .into_iter()
        .all(|b| b != 0))
}

/// Exclusive prefix sum of `value` over the group; returns `(offset, total)`.
pub fn exclusive_scan_u64_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    value: u64,
) -> Result<(u64, u64), MeshDistError> {
    let all = gather_scalars_in(comm, group, tag, value)?;
    let me = comm.rank();
    let mut offset = 0;
    for (&r, v) in group.ranks().iter().zip(&all) {
        if r == me {
            break;
        }
        offset += v;
    }
    Ok((offset, all.iter().sum()))
}

fn elementwise_in<C, F>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    values: &[f64],
    fold: F,
) -> Result<Vec<f64>, MeshDistError>
where
    C: Communicator,
    F: Fn(f64, f64) -> f64,
{
    let all = allgather_in(comm, group, tag, values)?;
    let mut iter = all.into_iter().zip(group.ranks());
    let Some((mut acc, _)) = iter.next() else {
        return Ok(values.to_vec());
    };
    if acc.len() != values.len() {
        return Err(MeshDistError::ShapeMismatch {
            what: "reduction contribution",
            expected: values.len(),
            actual: acc.len(),
        });
    }
    for (contrib, &r) in iter {
        if contrib.len() != acc.len() {
            return Err(MeshDistError::CollectiveDisagreement {
                what: "reduction width",
                rank: r,
                ours: acc.len() as u64,
                theirs: contrib.len() as u64,
            });
        }
        for (a, b) in acc.iter_mut().zip(contrib) {
            *a = fold(*a, b);
        }
    }
    Ok(acc)
}

/// Element-wise sum, folded in group order.
pub fn allreduce_sum_f64_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    values: &[f64],
) -> Result<Vec<f64>, MeshDistError> {
    elementwise_in(comm, group, tag, values, |a, b| a + b)
}

pub fn allreduce_min_f64_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    values: &[f64],
) -> Result<Vec<f64>, MeshDistError> {
    elementwise_in(comm, group, tag, values, f64::min)
}

pub fn allreduce_max_f64_in<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    tag: CommTag,
    values: &[f64],
) -> Result<Vec<f64>, MeshDistError> {
    elementwise_in(comm, group, tag, values, f64::max)
}

pub fn allreduce_sum_u64<C: Communicator>(comm: &C, value: u64) -> Result<u64, MeshDistError> {
    allreduce_sum_u64_in(comm, &RankGroup::world(comm), TAG_REDUCE, value)
}

pub fn allreduce_max_u64<C: Communicator>(comm: &C, value: u64) -> Result<u64, MeshDistError> {
    allreduce_max_u64_in(comm, &RankGroup::world(comm), TAG_REDUCE, value)
}

pub fn allreduce_and<C: Communicator>(comm: &C, value: bool) -> Result<bool, MeshDistError> {
    allreduce_and_in(comm, &RankGroup::world(comm), TAG_REDUCE, value)
}

pub fn exclusive_scan_u64<C: Communicator>(comm: &C, value: u64) -> Result<(u64, u64), MeshDistError> {
    exclusive_scan_u64_in(comm, &RankGroup::world(comm), TAG_SCAN, value)
}

/// Make a rank-local check collective: every rank learns whether any rank failed.
///
/// A failing rank gets its own error back; the others get
/// [`MeshDistError::CollectiveDisagreement`] naming the first failing rank, so no
/// rank walks into a collective its peers have left.
pub fn all_ok<T, C: Communicator>(
    comm: &C,
    what: &'static str,
    local: Result<T, MeshDistError>,
) -> Result<T, MeshDistError> {
    let flags = allgather_u64(comm, u64::from(local.is_ok()))?;
    let value = local?;
    match flags.iter().position(|&f| f == 0) {
        Some(rank) => Err(MeshDistError::CollectiveDisagreement {
            what,
            rank,
            ours: 1,
            theirs: 0,
        }),
        None => Ok(value),
    }
}

/// Verify that every rank holds the same `value`.
pub fn check_agreement<C: Communicator>(
    comm: &C,
    what: &'static str,
    value: u64,
) -> Result<(), MeshDistError> {
    let all = allgather_u64(comm, value)?;
    match all.iter().enumerate().find(|&(_, &v)| v != value) {
        Some((rank, &theirs)) => Err(MeshDistError::CollectiveDisagreement {
            what,
            rank,
            ours: value,
            theirs,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    fn run<R: Send>(size: usize, f: impl Fn(RayonComm) -> R + Sync) -> Vec<R> {
        let comms = RayonComm::world(size);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|c| {
                    let f = &f;
                    s.spawn(move || f(c))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn serial_collectives_are_local() {
        let comm = NoComm;
        assert_eq!(allreduce_sum_u64(&comm, 5).unwrap(), 5);
        assert_eq!(exclusive_scan_u64(&comm, 5).unwrap(), (0, 5));
        assert!(allreduce_and(&comm, true).unwrap());
    }

    #[test]
    fn alltoallv_routes_by_rank() {
        let out = run(3, |c| {
            let me = c.rank() as u64;
            let sends: Vec<Vec<u64>> = (0..3u64).map(|to| vec![me * 10 + to; to as usize]).collect();
            alltoallv(&c, TAG_ALLTOALL, &sends).unwrap()
        });
        for (me, recv) in out.iter().enumerate() {
            for (from, buf) in recv.iter().enumerate() {
                assert_eq!(buf, &vec![from as u64 * 10 + me as u64; me]);
            }
        }
    }

    #[test]
    fn reductions_agree_on_all_ranks() {
        let out = run(4, |c| {
            let r = c.rank() as u64;
            (
                allreduce_sum_u64(&c, r + 1).unwrap(),
                allreduce_max_u64(&c, r * 3).unwrap(),
                allreduce_and(&c, r != 2).unwrap(),
                exclusive_scan_u64(&c, r + 1).unwrap(),
            )
        });
        for (r, (sum, max, and, scan)) in out.into_iter().enumerate() {
            assert_eq!(sum, 10);
            assert_eq!(max, 9);
            assert!(!and);
            let before: u64 = (1..=r as u64).sum();
            assert_eq!(scan, (before, 10));
        }
    }

    #[test]
    fn subgroup_reduction_ignores_outsiders() {
        let out = run(4, |c| {
            let group = if c.rank() < 2 {
                RankGroup::from_range(0..2)
            } else {
                RankGroup::from_range(2..4)
            };
            allreduce_sum_f64_in(&c, &group, TAG_REDUCE, &[c.rank() as f64, 1.0]).unwrap()
        });
        assert_eq!(out[0], vec![1.0, 2.0]);
        assert_eq!(out[1], vec![1.0, 2.0]);
        assert_eq!(out[3], vec![5.0, 2.0]);
    }

    #[test]
    fn disagreement_is_detected() {
        let out = run(2, |c| check_agreement(&c, "total", c.rank() as u64));
        assert!(out.iter().all(|r| matches!(
            r,
            Err(MeshDistError::CollectiveDisagreement { what: "total", .. })
        )));
    }

    #[test]
    fn local_failure_reaches_every_rank() {
        let out = run(3, |c| {
            let local = if c.rank() == 1 {
                Err(MeshDistError::InvalidDimension(9))
            } else {
                Ok(c.rank())
            };
            all_ok(&c, "guard", local)
        });
        assert!(matches!(
            out[0],
            Err(MeshDistError::CollectiveDisagreement { what: "guard", rank: 1, .. })
        ));
        assert_eq!(out[1], Err(MeshDistError::InvalidDimension(9)));
        assert!(matches!(out[2], Err(MeshDistError::CollectiveDisagreement { rank: 1, .. })));
        assert_eq!(all_ok(&NoComm, "guard", Ok(4)).unwrap(), 4);
    }

    #[test]
    fn split_halves_group() {
        let (lo, hi) = RankGroup::from_range(0..5).split();
        assert_eq!(lo.ranks(), &[0, 1]);
        assert_eq!(hi.ranks(), &[2, 3, 4]);
    }
}
