//! Recursive inertial bisection (RIB).
//!
//! Weighted points are split level by level. At each level every rank group computes
//! the principal axis of its points' inertia tensor, cuts them with a plane normal to
//! that axis, and hands the low side to the first half of the group and the high side
//! to the rest. After `ceil(log2(size))` levels every group is a single rank.
//!
//! Levels are synchronous: all ranks join the same point exchange at every level,
//! while reductions stay inside each group.

use log::{debug, trace, warn};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::algs::collective::{
    RankGroup, allreduce_max_f64_in, allreduce_min_f64_in, allreduce_sum_f64_in,
    exclusive_scan_u64_in,
};
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::{ExchangePattern, identity_dests};
use crate::algs::linear_partition::LinearPartition;
use crate::algs::wire::{WirePoint, WireRemote};
use crate::mesh_error::MeshDistError;
use crate::topology::ownership::Remote;

const TAG_MOMENTS: CommTag = CommTag(0x2000);
const TAG_BOUNDS: CommTag = CommTag(0x2010);
const TAG_PLANE: CommTag = CommTag(0x2020);
const TAG_SPREAD: CommTag = CommTag(0x2030);

/// Bisection controls.
#[derive(Debug, Clone, PartialEq)]
pub struct RibConfig {
    /// Allowed total imbalance, as a fraction of one part's ideal mass. Each level
    /// gets an equal share.
    pub tolerance: f64,
    /// Plane search steps per level before settling for the best plane seen.
    pub max_iters: usize,
}

impl Default for RibConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            max_iters: 64,
        }
    }
}

/// Where every input point ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bisection {
    /// Final `(rank, index)` of each input point, in input order.
    pub dests: Vec<Remote>,
    /// Number of points this rank holds afterwards.
    pub nlocal: usize,
}

#[derive(Clone, Copy, Debug)]
struct Point {
    x: Vector3<f64>,
    mass: f64,
    origin: Remote,
}

impl From<WirePoint> for Point {
    fn from(w: WirePoint) -> Self {
        Point {
            x: Vector3::from(w.coords()),
            mass: w.mass(),
            origin: w.origin(),
        }
    }
}

impl From<&Point> for WirePoint {
    fn from(p: &Point) -> Self {
        WirePoint::new([p.x[0], p.x[1], p.x[2]], p.mass, p.origin)
    }
}

fn ceil_log2(n: usize) -> usize {
    n.next_power_of_two().trailing_zeros() as usize
}

/// Principal axis of the weighted points of `group`, and the group's centroid and mass.
fn principal_axis<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    points: &[Point],
) -> Result<(Vector3<f64>, Vector3<f64>, f64), MeshDistError> {
    let mut first = [0.0f64; 4];
    for p in points {
        first[0] += p.mass;
        for j in 0..3 {
            first[j + 1] += p.mass * p.x[j];
        }
    }
    let first = allreduce_sum_f64_in(comm, group, TAG_MOMENTS, &first)?;
    let mass = first[0];
    if mass <= 0.0 {
        return Ok((Vector3::x(), Vector3::zeros(), 0.0));
    }
    let centroid = Vector3::new(first[1], first[2], first[3]) / mass;

    let mut second = [0.0f64; 6];
    for p in points {
        let d = p.x - centroid;
        let upper = [d[0] * d[0], d[0] * d[1], d[0] * d[2], d[1] * d[1], d[1] * d[2], d[2] * d[2]];
        for (s, u) in second.iter_mut().zip(upper) {
            *s += p.mass * u;
        }
    }
    let s = allreduce_sum_f64_in(comm, group, TAG_MOMENTS, &second)?;
    let tensor = Matrix3::new(s[0], s[1], s[2], s[1], s[3], s[4], s[2], s[4], s[5]);
    let eigen = SymmetricEigen::new(tensor);
    let mut axis: Vector3<f64> = eigen.eigenvectors.column(eigen.eigenvalues.imax()).into_owned();
    // eigenvectors are defined up to sign; make the dominant component positive
    if axis[axis.iamax()] < 0.0 {
        axis = -axis;
    }
    Ok((axis, centroid, mass))
}

/// Split the group's points with a plane normal to its principal axis.
/// Returns, per local point, whether it lies on the high side.
fn bisect_group<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    points: &[Point],
    level_tolerance: f64,
    cfg: &RibConfig,
) -> Result<Vec<bool>, MeshDistError> {
    let (axis, centroid, mass) = principal_axis(comm, group, points)?;
    let dist: Vec<f64> = points.iter().map(|p| (p.x - centroid).dot(&axis)).collect();
    let local_lo = dist.iter().copied().fold(f64::INFINITY, f64::min);
    let local_hi = dist.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut lo = allreduce_min_f64_in(comm, group, TAG_BOUNDS, &[local_lo])?[0];
    let mut hi = allreduce_max_f64_in(comm, group, TAG_BOUNDS, &[local_hi])?[0];
    if mass <= 0.0 || !lo.is_finite() {
        return Ok(vec![false; points.len()]);
    }

    let (low_ranks, _) = group.split();
    let target = mass * low_ranks.len() as f64 / group.len() as f64;
    let allowed = level_tolerance * mass / group.len() as f64;
    let mass_below = |plane: f64| -> f64 {
        points
            .iter()
            .zip(&dist)
            .filter(|&(_, &d)| d <= plane)
            .map(|(p, _)| p.mass)
            .sum()
    };

    let mut best = (f64::INFINITY, hi);
    let mut converged = false;
    for iter in 0..cfg.max_iters {
        let plane = 0.5 * (lo + hi);
        // interval exhausted in floating point
        if plane <= lo || plane >= hi {
            break;
        }
        let below = allreduce_sum_f64_in(comm, group, TAG_PLANE, &[mass_below(plane)])?[0];
        let err = (below - target).abs();
        if err < best.0 {
            best = (err, plane);
        }
        trace!("rib search {iter}: plane {plane:.6e}, mass below {below}, target {target}");
        if err <= allowed {
            converged = true;
            break;
        }
        if below < target {
            lo = plane;
        } else {
            hi = plane;
        }
    }
    if !converged {
        warn!(
            "rank {}: inertial bisection of {} ranks stopped {} mass units from balance (allowed {allowed})",
            comm.rank(),
            group.len(),
            best.0
        );
    }
    Ok(dist.iter().map(|&d| d > best.1).collect())
}

/// Destinations of the local points after one group split: low points are spread
/// over the first half of the group, high points over the rest, in group-wide
/// ordinal order. Also returns how many points this rank will receive.
fn spread_over_halves<C: Communicator>(
    comm: &C,
    group: &RankGroup,
    high: &[bool],
) -> Result<(Vec<Remote>, usize), MeshDistError> {
    let (low_ranks, high_ranks) = group.split();
    let nhigh = high.iter().filter(|&&h| h).count() as u64;
    let nlow = high.len() as u64 - nhigh;
    let (low_offset, low_total) = exclusive_scan_u64_in(comm, group, TAG_SPREAD, nlow)?;
    let (high_offset, high_total) = exclusive_scan_u64_in(comm, group, TAG_SPREAD, nhigh)?;
    let low_part = LinearPartition::new(low_total, low_ranks.len())?;
    let high_part = LinearPartition::new(high_total, high_ranks.len())?;

    let mut next = [low_offset, high_offset];
    let mut dests = Vec::with_capacity(high.len());
    for &h in high {
        let (part, ranks) = if h {
            (&high_part, &high_ranks)
        } else {
            (&low_part, &low_ranks)
        };
        let slot = part.owner_of(next[h as usize])?;
        next[h as usize] += 1;
        dests.push(Remote::new(ranks.ranks()[slot.rank], slot.index));
    }

    let me = comm.rank();
    let nrecv = match (low_ranks.position(me), high_ranks.position(me)) {
        (Some(p), _) => low_part.local_size(p),
        (_, Some(p)) => high_part.local_size(p),
        (None, None) => 0,
    };
    Ok((dests, nrecv))
}

/// Partition weighted points (`coords`: 3 per point) over all ranks by recursive
/// inertial bisection. Collective.
pub fn recursively_bisect<C: Communicator>(
    comm: &C,
    coords: &[f64],
    masses: &[f64],
    cfg: &RibConfig,
) -> Result<Bisection, MeshDistError> {
    if coords.len() != masses.len() * 3 {
        return Err(MeshDistError::ShapeMismatch {
            what: "bisection coordinates",
            expected: masses.len() * 3,
            actual: coords.len(),
        });
    }
    if let Some(c) = coords.iter().find(|c| !c.is_finite()) {
        return Err(MeshDistError::InvalidGeometry(format!("non-finite coordinate {c}")));
    }
    if let Some(m) = masses.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
        return Err(MeshDistError::InvalidGeometry(format!("point mass {m} is not positive")));
    }

    let origins = identity_dests(comm, masses.len());
    let mut points: Vec<Point> = coords
        .chunks_exact(3)
        .zip(masses)
        .zip(origins)
        .map(|((x, &mass), origin)| Point {
            x: Vector3::new(x[0], x[1], x[2]),
            mass,
            origin,
        })
        .collect();

    let me = comm.rank();
    let levels = ceil_log2(comm.size());
    let level_tolerance = if levels > 0 { cfg.tolerance / levels as f64 } else { cfg.tolerance };
    let mut group = RankGroup::world(comm);
    for level in 0..levels {
        let (dests, nrecv) = if group.len() > 1 {
            let high = bisect_group(comm, &group, &points, level_tolerance, cfg)?;
            spread_over_halves(comm, &group, &high)?
        } else {
            (identity_dests(comm, points.len()), points.len())
        };
        // every rank joins the move, including those already alone in their group
        let pattern = ExchangePattern::new(comm, &dests, nrecv)?;
        let wire: Vec<WirePoint> = points.iter().map(WirePoint::from).collect();
        points = pattern.exchange(&wire, 1)?.into_iter().map(Point::from).collect();

        if group.len() > 1 {
            let (low, high) = group.split();
            group = if low.contains(me) { low } else { high };
        }
        debug!("rank {me}: rib level {level} done, holding {} points", points.len());
    }

    // tell every origin where its point landed
    let home: Vec<Remote> = points.iter().map(|p| p.origin).collect();
    let back = ExchangePattern::new(comm, &home, masses.len())?;
    let landed: Vec<WireRemote> = (0..points.len()).map(|i| WireRemote::new(me, i)).collect();
    let dests = back
        .exchange(&landed, 1)?
        .into_iter()
        .map(Remote::from)
        .collect();
    Ok(Bisection {
        dests,
        nlocal: points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn level_count() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(8), 3);
    }

    #[test]
    fn serial_is_identity() {
        let out = recursively_bisect(&NoComm, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], &[1.0, 1.0], &RibConfig::default())
            .unwrap();
        assert_eq!(out.dests, vec![Remote::new(0, 0), Remote::new(0, 1)]);
        assert_eq!(out.nlocal, 2);
    }

    #[test]
    fn rejects_bad_masses() {
        let err = recursively_bisect(&NoComm, &[0.0; 3], &[0.0], &RibConfig::default()).unwrap_err();
        assert!(matches!(err, MeshDistError::InvalidGeometry(_)));
        let err = recursively_bisect(&NoComm, &[0.0; 4], &[1.0], &RibConfig::default()).unwrap_err();
        assert!(matches!(err, MeshDistError::ShapeMismatch { .. }));
    }

    #[test]
    fn plane_search_moves_past_the_midpoint() {
        // 30 points in [0, 1) and 10 far out: the midpoint cut would leave 30 below
        let points: Vec<Point> = (0..40)
            .map(|i| Point {
                x: Vector3::new(if i < 30 { i as f64 / 30.0 } else { 50.0 + i as f64 }, 0.0, 0.0),
                mass: 1.0,
                origin: Remote::new(0, i),
            })
            .collect();
        let comms = RayonComm::world(2);
        let cfg = RibConfig::default();
        let highs: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|c| {
                    let mine: &[Point] = if c.rank() == 0 { &points } else { &[] };
                    let cfg = &cfg;
                    s.spawn(move || {
                        let high = bisect_group(c, &RankGroup::world(c), mine, cfg.tolerance, cfg).unwrap();
                        high.iter().filter(|&&h| h).count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        // allowed error is 0.05 * 40 / 2 = 1 point
        assert!((19..=21).contains(&highs[0]), "{highs:?}");
        assert_eq!(highs[1], 0);
    }

    #[test]
    fn principal_axis_follows_elongation() {
        let points: Vec<Point> = (0..10)
            .map(|i| Point {
                x: Vector3::new(0.1 * (i % 2) as f64, i as f64, 0.0),
                mass: 1.0,
                origin: Remote::new(0, i),
            })
            .collect();
        let (axis, centroid, mass) = principal_axis(&NoComm, &RankGroup::world(&NoComm), &points).unwrap();
        assert_eq!(mass, 10.0);
        assert!((centroid[1] - 4.5).abs() < 1e-12);
        assert!(axis[1] > 0.99, "{axis:?}");
    }
}
