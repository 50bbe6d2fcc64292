//! Randomized invariants driven by proptest.

use proptest::prelude::*;

use vicinity::prelude::*;

fn vector_strategy(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0, dim)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Flat search results are always sorted, id-tie-broken, and bounded.
    #[test]
    fn flat_results_sorted_and_bounded(
        vectors in proptest::collection::vec(vector_strategy(4), 1..40),
        query in vector_strategy(4),
        k in 1usize..20,
    ) {
        let mut index = FlatIndex::new(Metric::L2);
        for (i, v) in vectors.iter().enumerate() {
            index.add(i as u32, v.clone(), None).unwrap();
        }

        let results = index.search(&query, k).unwrap();
        prop_assert!(results.len() <= k.min(vectors.len()));
        for pair in results.windows(2) {
            prop_assert!(
                pair[0].1 < pair[1].1
                    || (pair[0].1 == pair[1].1 && pair[0].0 < pair[1].0)
            );
        }
    }

    /// HNSW accepts any workload without violating degree bounds or symmetry.
    #[test]
    fn hnsw_structural_invariants(
        vectors in proptest::collection::vec(vector_strategy(3), 2..30),
        deletions in proptest::collection::vec(0usize..30, 0..10),
    ) {
        let index = HnswIndex::new(
            Metric::L2,
            HnswParams {
                m: 4,
                ef_construction: 16,
                ef_search: 8,
                seed: 0,
                ..Default::default()
            },
        )
        .unwrap();
        for v in &vectors {
            index.insert(v.clone(), None).unwrap();
        }
        for &d in &deletions {
            if d < vectors.len() {
                index.delete(d as u32).unwrap();
            }
        }

        for id in 0..vectors.len() as u32 {
            let top = index.node_level(id).unwrap();
            for layer in 0..=top {
                let neighbors = index.neighbors(id, layer).unwrap();
                let cap = if layer == 0 { 8 } else { 4 };
                prop_assert!(neighbors.len() <= cap);
                for n in neighbors {
                    prop_assert!(index.neighbors(n, layer).unwrap().contains(&id));
                }
            }
        }
    }

    /// Scalar quantizer round-trips within one quantization step for values
    /// inside the calibration range.
    #[test]
    fn scalar_quantizer_bounded_error(
        vectors in proptest::collection::vec(vector_strategy(6), 2..30),
    ) {
        let mut sq = ScalarQuantizer::new(6).unwrap();
        sq.train(&vectors).unwrap();

        // Worst case one step of the 254-level grid over the observed range
        let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
        for v in &vectors {
            for &x in v {
                lo = lo.min(x);
                hi = hi.max(x);
            }
        }
        let step = if hi > lo { (hi - lo) / 254.0 } else { 1.0 };

        for v in &vectors {
            let decoded = sq.decode(&sq.encode(v).unwrap()).unwrap();
            for (a, b) in v.iter().zip(decoded.iter()) {
                prop_assert!((a - b).abs() <= step + 1e-4);
            }
        }
    }

    /// Asymmetric distance equals the exact distance to the decoded vector.
    #[test]
    fn pq_table_consistent_with_decode(
        seed in 0u64..1000,
    ) {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let vectors: Vec<Vec<f32>> = (0..64)
            .map(|_| (0..8).map(|_| rng.gen::<f32>()).collect())
            .collect();

        let mut pq = ProductQuantizer::new(
            8,
            Metric::L2,
            PqParams { m: 2, bits: 4, train_iter: 5, seed },
        )
        .unwrap();
        pq.train(&vectors).unwrap();

        let query: Vec<f32> = (0..8).map(|_| rng.gen::<f32>()).collect();
        let table = pq.build_table(&query).unwrap();

        for v in vectors.iter().take(10) {
            let code = pq.encode(v).unwrap();
            let via_table = table.distance(&code).unwrap();
            let via_decode =
                vicinity::distance::l2(&query, &pq.decode(&code).unwrap()).unwrap();
            prop_assert!((via_table - via_decode).abs() < 1e-3);
        }
    }
}
