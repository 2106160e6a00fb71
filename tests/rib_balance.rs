mod util;

use mesh_dist::algs::linear_partition::suggest_slices;
use mesh_dist::prelude::*;
use util::{random_points, run_ranks};

/// Points `0..n` dealt to ranks in linear slices.
fn my_slice(points: &[f64], n: usize, size: usize, rank: usize) -> Vec<f64> {
    let r = suggest_slices(n as u64, size, rank);
    points[3 * r.start as usize..3 * r.end as usize].to_vec()
}

#[test]
fn uniform_cube_is_balanced() {
    let n = 4000;
    let cfg = RibConfig::default();
    let points = random_points(7, n);
    for size in [2usize, 4, 8] {
        let results = run_ranks(size, |comm| {
            // a bad initial partition: everything on rank 0
            let mine = if comm.rank() == 0 { points.clone() } else { Vec::new() };
            let masses = vec![1.0; mine.len() / 3];
            recursively_bisect(comm, &mine, &masses, &cfg).unwrap()
        });
        let ideal = n as f64 / size as f64;
        let mut held = vec![0usize; size];
        for b in &results {
            for d in &b.dests {
                held[d.rank] += 1;
            }
        }
        for (rank, b) in results.iter().enumerate() {
            assert_eq!(held[rank], b.nlocal);
            assert!(
                (b.nlocal as f64 - ideal).abs() <= cfg.tolerance * ideal,
                "size {size}: rank {rank} holds {} of ideal {ideal}",
                b.nlocal
            );
        }
        assert_eq!(held.iter().sum::<usize>(), n);
    }
}

#[test]
fn destinations_are_a_bijection() {
    let n = 1000;
    let points = random_points(11, n);
    let results = run_ranks(3, |comm| {
        let mine = my_slice(&points, n, 3, comm.rank());
        let masses = vec![1.0; mine.len() / 3];
        recursively_bisect(comm, &mine, &masses, &RibConfig::default()).unwrap()
    });
    let mut slots: Vec<Remote> = results.iter().flat_map(|b| b.dests.iter().copied()).collect();
    slots.sort_unstable();
    let mut want = Vec::new();
    for (rank, b) in results.iter().enumerate() {
        want.extend((0..b.nlocal).map(|i| Remote::new(rank, i)));
    }
    assert_eq!(slots, want);
}

#[test]
fn two_ranks_split_along_the_long_axis() {
    // a slab much longer in y than in x or z
    let n = 500;
    let mut points = random_points(3, n);
    for p in points.chunks_mut(3) {
        p[1] *= 10.0;
    }
    let results = run_ranks(2, |comm| {
        let mine = my_slice(&points, n, 2, comm.rank());
        let masses = vec![1.0; mine.len() / 3];
        let out = recursively_bisect(comm, &mine, &masses, &RibConfig::default()).unwrap();
        (mine, out)
    });
    let mut ys = [Vec::new(), Vec::new()];
    for (mine, out) in &results {
        for (p, d) in mine.chunks(3).zip(&out.dests) {
            ys[d.rank].push(p[1]);
        }
    }
    // the cut is close to y = median; the axis is only approximately y
    let mut all: Vec<f64> = ys.concat();
    all.sort_by(f64::total_cmp);
    let median = all[n / 2];
    let misplaced = ys[0].iter().filter(|&&y| y > median + 0.5).count()
        + ys[1].iter().filter(|&&y| y < median - 0.5).count();
    assert_eq!(misplaced, 0);
}

#[test]
fn repeated_runs_agree() {
    let n = 600;
    let points = random_points(5, n);
    let run = || {
        run_ranks(4, |comm| {
            let mine = my_slice(&points, n, 4, comm.rank());
            let masses: Vec<f64> = (0..mine.len() / 3).map(|i| 1.0 + (i % 3) as f64).collect();
            recursively_bisect(comm, &mine, &masses, &RibConfig::default()).unwrap()
        })
    };
    assert_eq!(run(), run());
}

/// `n` points on the x axis: nine tenths spread over `[0, 1)`, the rest far out near x = 100.
fn skewed_line(n: usize) -> Vec<f64> {
    let near = n * 9 / 10;
    let mut coords = Vec::with_capacity(3 * n);
    for i in 0..near {
        coords.extend([i as f64 / near as f64, 0.0, 0.0]);
    }
    for i in near..n {
        coords.extend([100.0 + 0.01 * (i - near) as f64, 0.0, 0.0]);
    }
    coords
}

#[test]
fn skewed_cloud_is_balanced() {
    let cfg = RibConfig::default();
    for (n, size) in [(100usize, 2usize), (400, 4)] {
        let points = skewed_line(n);
        let results = run_ranks(size, |comm| {
            let mine = if comm.rank() == 0 { points.clone() } else { Vec::new() };
            let masses = vec![1.0; mine.len() / 3];
            recursively_bisect(comm, &mine, &masses, &cfg).unwrap()
        });
        let ideal = n as f64 / size as f64;
        let held: Vec<usize> = results.iter().map(|b| b.nlocal).collect();
        for &h in &held {
            assert!(
                (h as f64 - ideal).abs() <= cfg.tolerance * ideal,
                "size {size}: imbalanced {held:?}"
            );
        }
    }
}

#[test]
fn balance_follows_mass_not_count() {
    let n = 100;
    let cfg = RibConfig::default();
    // a unit spaced line whose first quarter is three times heavier
    let points: Vec<f64> = (0..n).flat_map(|i| [i as f64, 0.0, 0.0]).collect();
    let masses: Vec<f64> = (0..n).map(|i| if i < n / 4 { 3.0 } else { 1.0 }).collect();
    let results = run_ranks(2, |comm| {
        let r = suggest_slices(n as u64, 2, comm.rank());
        let (lo, hi) = (r.start as usize, r.end as usize);
        let out = recursively_bisect(comm, &points[3 * lo..3 * hi], &masses[lo..hi], &cfg).unwrap();
        (lo, out)
    });

    let mut mass_on = [0.0f64; 2];
    for (lo, out) in &results {
        for (i, d) in out.dests.iter().enumerate() {
            mass_on[d.rank] += masses[lo + i];
        }
    }
    let total: f64 = masses.iter().sum();
    let ideal = total / 2.0;
    for m in mass_on {
        assert!((m - ideal).abs() <= cfg.tolerance * ideal, "masses {mass_on:?}");
    }
    // an even point count would have put 100 of the 150 mass units on rank 0
    assert!(results[0].1.nlocal < 40, "rank 0 holds {} points", results[0].1.nlocal);
}
