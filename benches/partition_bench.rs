use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_dist::algs::communicator::{Communicator, RayonComm};
use mesh_dist::algs::hilbert::sort_coords;
use mesh_dist::partitioning::inertia::{RibConfig, recursively_bisect};

fn cloud(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..3 * n).map(|_| rng.r#gen::<f64>()).collect()
}

fn bench_hilbert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hilbert");
    for &n in &[10_000usize, 100_000] {
        let coords = cloud(n, 42);
        group.bench_with_input(BenchmarkId::new("sort_coords_3d", n), &coords, |b, coords| {
            b.iter(|| sort_coords(coords, 3).unwrap());
        });
    }
    group.finish();
}

fn bench_rib(c: &mut Criterion) {
    let mut group = c.benchmark_group("rib");
    group.sample_size(10);
    for &(n, ranks) in &[(20_000usize, 2usize), (20_000, 4), (20_000, 8)] {
        let coords = cloud(n, 7);
        group.bench_with_input(
            BenchmarkId::new(format!("n{n}"), ranks),
            &(coords, ranks),
            |b, (coords, ranks)| {
                b.iter(|| {
                    let comms = RayonComm::world(*ranks);
                    std::thread::scope(|s| {
                        for comm in &comms {
                            s.spawn(move || {
                                // everything starts on rank 0
                                let mine: &[f64] = if comm.rank() == 0 { coords } else { &[] };
                                let masses = vec![1.0; mine.len() / 3];
                                recursively_bisect(comm, mine, &masses, &RibConfig::default()).unwrap()
                            });
                        }
                    });
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_hilbert, bench_rib);
criterion_main!(benches);
