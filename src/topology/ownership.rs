//! Ownership of entities duplicated across ranks.
//!
//! Every rank stores its own copy of partition-boundary entities. A [`Remote`]
//! names which stored copy is authoritative. Ownership is computed once per entity
//! dimension and recomputed from scratch after redistribution.
//!
//! Derived entities (edges, faces) have no global number of their own, so their
//! copies are matched by content: each copy is canonicalized and sent to the rank
//! that serves its smallest vertex under the linear partition of vertex globals.
//! Copies of one entity share that vertex, so they all meet on the same rank.

use hashbrown::HashMap;
use log::{debug, trace};
use rayon::prelude::*;

use crate::algs::collective::{all_ok, allreduce_max_u64, check_agreement, exclusive_scan_u64};
use crate::algs::communicator::Communicator;
use crate::algs::exchange::{ExchangePattern, identity_dests};
use crate::algs::linear_partition::LinearPartition;
use crate::algs::wire::WireRemote;
use crate::mesh_error::MeshDistError;
use crate::topology::canonical::{CanonCode, canonicalize};

/// `(rank, local index)` of one stored copy of an entity.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Remote {
    pub rank: usize,
    pub index: usize,
}

impl Remote {
    pub const fn new(rank: usize, index: usize) -> Self {
        Self { rank, index }
    }
}

/// Chooses the owner of one class of duplicate copies.
///
/// Implementations must be deterministic functions of the copies' origins and must
/// return one of them.
pub trait OwnerPolicy: Sync {
    /// `copies` are the origins of one duplicate class, sorted by `(rank, index)`.
    fn choose(&self, copies: &[Remote]) -> Option<Remote>;
}

/// Owner = copy with the lexicographically smallest `(rank, index)`.
///
/// Simple and deterministic, but piles ownership (and later work) onto low ranks.
/// A "fewest already owned" rule would need ownership to be known already, so it is
/// not offered here; plug a different [`OwnerPolicy`] in if needed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmallestOrigin;

impl OwnerPolicy for SmallestOrigin {
    fn choose(&self, copies: &[Remote]) -> Option<Remote> {
        copies.iter().min().copied()
    }
}

/// Every local entity owns itself.
pub fn identity_remotes<C: Communicator>(comm: &C, n: usize) -> Vec<Remote> {
    identity_dests(comm, n)
}

/// `true` where this rank holds the authoritative copy.
pub fn owned_mask<C: Communicator>(comm: &C, owners: &[Remote]) -> Vec<bool> {
    let me = comm.rank();
    owners
        .iter()
        .enumerate()
        .map(|(i, o)| *o == Remote::new(me, i))
        .collect()
}

/// One past the largest global number on any rank, agreed on by all ranks.
pub fn find_total_globals<C: Communicator>(comm: &C, globals: &[u64]) -> Result<u64, MeshDistError> {
    let local = globals.iter().max().map_or(0, |&g| g + 1);
    let total = allreduce_max_u64(comm, local)?;
    check_agreement(comm, "global vertex total", total)?;
    Ok(total)
}

/// Order the served copies of every serving root by origin `(rank, index)`.
///
/// Returns a permutation of served copies; the copies of root `r` occupy
/// `offsets[r]..offsets[r + 1]`. Arrival order never leaks into the result.
pub fn sort_locally_based_on_rank(offsets: &[usize], origins: &[Remote]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..origins.len()).collect();
    for w in offsets.windows(2) {
        order[w[0]..w[1]].sort_by_key(|&j| origins[j]);
    }
    order
}

/// Match identical keys within every serving root and let `choose` pick each class's
/// owner. Returns the owner of every served copy.
fn choose_owners<F>(
    offsets: &[usize],
    origins: &[Remote],
    keys: &[u64],
    width: usize,
    choose: F,
) -> Result<Vec<Remote>, MeshDistError>
where
    F: Fn(&[usize]) -> Option<Remote> + Sync,
{
    let order = sort_locally_based_on_rank(offsets, origins);
    let nroots = offsets.len().saturating_sub(1);
    let decided: Vec<Vec<(usize, Remote)>> = (0..nroots)
        .into_par_iter()
        .map(|root| {
            let group = &order[offsets[root]..offsets[root + 1]];
            // first match wins: a class is keyed by its first member's sequence
            let mut class_of: HashMap<&[u64], usize> = HashMap::with_capacity(group.len());
            let mut classes: Vec<Vec<usize>> = Vec::new();
            for &j in group {
                let key = &keys[j * width..(j + 1) * width];
                let c = *class_of.entry(key).or_insert_with(|| {
                    classes.push(Vec::new());
                    classes.len() - 1
                });
                classes[c].push(j);
            }
            let mut out = Vec::with_capacity(group.len());
            for members in &classes {
                let owner = choose(members);
                let valid = owner.is_some_and(|o| members.iter().any(|&j| origins[j] == o));
                let Some(owner) = owner.filter(|_| valid) else {
                    return Err(MeshDistError::UnresolvedDuplicate {
                        vertex: root,
                        owner,
                    });
                };
                if origins[members[0]] != owner {
                    trace!("root {root}: candidate {:?} overridden by {owner:?}", origins[members[0]]);
                }
                out.extend(members.iter().map(|&j| (j, owner)));
            }
            Ok(out)
        })
        .collect::<Result<_, _>>()?;

    let mut owners = vec![Remote::new(0, 0); origins.len()];
    for (j, owner) in decided.into_iter().flatten() {
        owners[j] = owner;
    }
    Ok(owners)
}

/// Result of [`resolve_derived_copies`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedCopies {
    /// Local connectivity, smallest-global vertex first.
    pub ev2v: Vec<usize>,
    /// Transform applied to each record.
    pub codes: Vec<CanonCode>,
    /// Authoritative copy of each local entity.
    pub owners: Vec<Remote>,
}

/// Canonicalize locally derived entities and give all copies of each entity the
/// same owner.
///
/// `ev2v` holds `deg` local vertex indices per entity and `verts2globals` the global
/// number of each local vertex. Collective.
pub fn resolve_derived_copies<C, P>(
    comm: &C,
    verts2globals: &[u64],
    deg: usize,
    ev2v: &[usize],
    policy: &P,
) -> Result<DerivedCopies, MeshDistError>
where
    C: Communicator,
    P: OwnerPolicy,
{
    let canon = all_ok(comm, "derived connectivity", canonicalize(deg, ev2v, verts2globals))?;
    let total = find_total_globals(comm, verts2globals)?;
    let linpart = LinearPartition::new(total, comm.size())?;
    // entity -> (rank, index) of its smallest vertex in the linear partition
    let e2ov = (0..canon.nents())
        .map(|e| linpart.owner_of(canon.first_global(e)))
        .collect::<Result<Vec<_>, _>>()?;
    let in_dist = ExchangePattern::new(comm, &e2ov, linpart.local_size(comm.rank()))?;
    // served entity copies, as vertex globals
    let sev2vg = in_dist.exchange(&canon.ev2vg, deg)?;
    let out_dist = in_dist.invert();
    let se2orig = out_dist.items2dests();
    debug!(
        "rank {}: resolving {} entities of degree {deg}, serving {} copies",
        comm.rank(),
        canon.nents(),
        se2orig.len()
    );

    let decided = choose_owners(out_dist.roots2items(), &se2orig, &sev2vg, deg, |members| {
        let copies: Vec<Remote> = members.iter().map(|&j| se2orig[j]).collect();
        policy.choose(&copies)
    });
    let se2owner = all_ok(comm, "duplicate ownership", decided)?;

    let wire: Vec<WireRemote> = se2owner.into_iter().map(WireRemote::from).collect();
    let owners = out_dist
        .exchange(&wire, 1)?
        .into_iter()
        .map(Remote::from)
        .collect();
    Ok(DerivedCopies {
        ev2v: canon.ev2v,
        codes: canon.codes,
        owners,
    })
}

/// Owners of entities that already carry global numbers (e.g. vertices).
///
/// Copies sharing a global number agree on one owner. With `own_ranks`, each copy
/// names the rank that should own it (all copies must name the same rank);
/// otherwise `policy` decides. Collective.
pub fn owners_from_globals<C, P>(
    comm: &C,
    globals: &[u64],
    own_ranks: Option<&[usize]>,
    policy: &P,
) -> Result<Vec<Remote>, MeshDistError>
where
    C: Communicator,
    P: OwnerPolicy,
{
    let shape = match own_ranks {
        Some(ranks) if ranks.len() != globals.len() => Err(MeshDistError::ShapeMismatch {
            what: "own ranks",
            expected: globals.len(),
            actual: ranks.len(),
        }),
        _ => Ok(()),
    };
    all_ok(comm, "own ranks", shape)?;
    let total = find_total_globals(comm, globals)?;
    let linpart = LinearPartition::new(total, comm.size())?;
    let dests = linpart.owners_of(globals)?;
    let in_dist = ExchangePattern::new(comm, &dests, linpart.local_size(comm.rank()))?;
    let keys = in_dist.exchange(globals, 1)?;
    let out_dist = in_dist.invert();
    let origins = out_dist.items2dests();

    let decided = match own_ranks {
        Some(ranks) => {
            let wanted: Vec<u64> = ranks.iter().map(|&r| r as u64).collect();
            let served_wanted = in_dist.exchange(&wanted, 1)?;
            choose_owners(out_dist.roots2items(), &origins, &keys, 1, |members| {
                let want = served_wanted[members[0]];
                if members.iter().any(|&j| served_wanted[j] != want) {
                    return None;
                }
                members
                    .iter()
                    .map(|&j| origins[j])
                    .filter(|o| o.rank as u64 == want)
                    .min()
            })
        }
        None => choose_owners(out_dist.roots2items(), &origins, &keys, 1, |members| {
            let copies: Vec<Remote> = members.iter().map(|&j| origins[j]).collect();
            policy.choose(&copies)
        }),
    };
    let owners = all_ok(comm, "duplicate ownership", decided)?;

    let wire: Vec<WireRemote> = owners.into_iter().map(WireRemote::from).collect();
    Ok(out_dist
        .exchange(&wire, 1)?
        .into_iter()
        .map(Remote::from)
        .collect())
}

/// Dense global numbers from ownership: owned entities are numbered in rank order,
/// then every copy takes its owner's number. Collective.
pub fn globals_from_owners<C: Communicator>(comm: &C, owners: &[Remote]) -> Result<Vec<u64>, MeshDistError> {
    let owned = owned_mask(comm, owners);
    let nowned = owned.iter().filter(|&&o| o).count() as u64;
    let (offset, total) = exclusive_scan_u64(comm, nowned)?;
    let mut root_globals = vec![0u64; owners.len()];
    let mut next = offset;
    for (g, _) in root_globals.iter_mut().zip(&owned).filter(|(_, o)| **o) {
        *g = next;
        next += 1;
    }

    // copies -> owners, then owners answer every copy that named them
    let to_owner = ExchangePattern::new(comm, owners, owners.len())?;
    let from_owner = to_owner.invert();
    let named = match from_owner
        .roots2items()
        .windows(2)
        .zip(&owned)
        .position(|(w, &o)| w[1] > w[0] && !o)
    {
        Some(root) => Err(MeshDistError::InvalidConnectivity(format!(
            "entity {root} on rank {} is named as owner but does not own itself",
            comm.rank()
        ))),
        None => Ok(()),
    };
    all_ok(comm, "owner self-reference", named)?;
    let globals = from_owner.exchange_roots(&root_globals, 1)?;
    debug!("rank {}: numbered {nowned} owned of {total} entities", comm.rank());
    Ok(globals)
}
