#![allow(dead_code)]
use mesh_dist::{
    algs::communicator::RayonComm, algs::linear_partition::suggest_slices, algs::meshgen::BoxMesh,
};
use rand::{Rng, SeedableRng, rngs::SmallRng};

/// Run `f` on every rank of a fresh in-process world; results come back in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&RayonComm) -> R + Sync,
{
    let comms = RayonComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|c| {
                let f = &f;
                s.spawn(move || f(c))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// One rank's share of a serial mesh: a contiguous slice of its elements, with
/// vertices renumbered locally (ascending global order).
#[derive(Clone, Debug)]
pub struct LocalPart {
    pub ev2v: Vec<usize>,
    pub vert_globals: Vec<u64>,
}

pub fn split_elements(ev2v: &[usize], deg: usize, size: usize, rank: usize) -> LocalPart {
    let nelems = (ev2v.len() / deg) as u64;
    let range = suggest_slices(nelems, size, rank);
    let mine = &ev2v[range.start as usize * deg..range.end as usize * deg];
    let mut vert_globals: Vec<u64> = mine.iter().map(|&v| v as u64).collect();
    vert_globals.sort_unstable();
    vert_globals.dedup();
    let ev2v = mine
        .iter()
        .map(|&v| vert_globals.binary_search(&(v as u64)).unwrap())
        .collect();
    LocalPart { ev2v, vert_globals }
}

pub fn split_box(mesh: &BoxMesh, size: usize, rank: usize) -> LocalPart {
    let deg = mesh.family.element_degree(mesh.dim).unwrap();
    split_elements(&mesh.ev2v, deg, size, rank)
}

/// `n` points uniform in the unit cube, fixed seed.
pub fn random_points(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..3 * n).map(|_| rng.r#gen::<f64>()).collect()
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Clone + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
