mod util;

use mesh_dist::prelude::*;
use proptest::prelude::*;
use util::{assert_permutation, run_ranks};

const NROOTS: usize = 3;

fn dests_strategy() -> impl Strategy<Value = (usize, Vec<Vec<(usize, usize)>>, usize)> {
    (1usize..=4, 1usize..=3).prop_flat_map(|(size, width)| {
        let per_rank = proptest::collection::vec((0..size, 0..NROOTS), 0..12);
        (
            Just(size),
            proptest::collection::vec(per_rank, size..=size),
            Just(width),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn exchange_then_inverse_restores_items((size, dests, width) in dests_strategy()) {
        let ok = run_ranks(size, |comm| {
            let me = comm.rank();
            let items2dests: Vec<Remote> =
                dests[me].iter().map(|&(r, root)| Remote::new(r, root)).collect();
            let p = ExchangePattern::new(comm, &items2dests, NROOTS).unwrap();
            let data: Vec<u64> = (0..items2dests.len() * width)
                .map(|k| (me * 10_000 + k) as u64)
                .collect();
            let there = p.exchange(&data, width).unwrap();
            let back = p.invert().exchange(&there, width).unwrap();

            // every root received exactly the items that named it
            let offsets = p.dest_roots2items().to_vec();
            let senders = p.invert().items2dests();
            for root in 0..NROOTS {
                let mut want: Vec<Remote> = Vec::new();
                for (r, list) in dests.iter().enumerate() {
                    for (i, &(dr, droot)) in list.iter().enumerate() {
                        if dr == me && droot == root {
                            want.push(Remote::new(r, i));
                        }
                    }
                }
                assert_permutation(&senders[offsets[root]..offsets[root + 1]], &want);
            }
            back == data && p.invert().invert() == p
        });
        prop_assert!(ok.into_iter().all(|b| b));
    }
}

#[test]
fn roots_broadcast_to_their_items() {
    let results = run_ranks(3, |comm| {
        let me = comm.rank();
        // every rank sends two items to root 0 of the next rank
        let items2dests = vec![Remote::new((me + 1) % 3, 0); 2];
        let p = ExchangePattern::new(comm, &items2dests, 1).unwrap();
        let answer = p.invert().exchange_roots(&[100 + me as u64], 1).unwrap();
        (p.ndest_items(), p.ndest_roots(), answer)
    });
    for (me, (ndest, nroots, answer)) in results.into_iter().enumerate() {
        assert_eq!((ndest, nroots), (2, 1));
        assert_eq!(answer, vec![100 + ((me + 1) % 3) as u64; 2]);
    }
}
