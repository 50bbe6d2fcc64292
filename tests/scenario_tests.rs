//! End-to-end scenarios with literal inputs across all engines.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vicinity::prelude::*;

/// HNSW identity: inserted basis vectors come back with distance ~0.
#[test]
fn hnsw_identity_on_basis_vectors() {
    let index = HnswIndex::new(
        Metric::L2,
        HnswParams {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            seed: 0,
            ..Default::default()
        },
    )
    .unwrap();

    index.insert(vec![1.0, 0.0, 0.0, 0.0], None).unwrap();
    index.insert(vec![0.0, 1.0, 0.0, 0.0], None).unwrap();
    index.insert(vec![0.0, 0.0, 1.0, 0.0], None).unwrap();
    index.insert(vec![0.0, 0.0, 0.0, 1.0], None).unwrap();

    let results = index.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 0);
    assert!(results[0].1 <= 1e-6);
}

/// NSG range search on the 3x3 unit grid: exactly the center cross, sorted by
/// distance with id tie-breaks.
#[test]
fn nsg_range_search_unit_grid() {
    let mut index = NsgIndex::new(Metric::L2, NsgParams { r: 4, l: 8, c: 32 }).unwrap();
    for i in 0..3 {
        for j in 0..3 {
            index.add_vector(vec![i as f32, j as f32], None).unwrap();
        }
    }
    index.build().unwrap();

    let results = index.range_search(&[1.0, 1.0], 1.0).unwrap();
    let ids: Vec<u32> = results.iter().map(|&(id, _)| id).collect();
    // (1,1) at distance 0, then its four axis neighbors at distance 1 in
    // ascending id order
    assert_eq!(ids, vec![4, 1, 3, 5, 7]);
    assert!(results[0].1 <= 1e-6);
    for &(_, d) in &results[1..] {
        assert!((d - 1.0).abs() <= 1e-5);
    }
}

/// IVF-Flat probe behavior: one probe confines results to the query's
/// partition; probing everything matches brute force.
#[test]
fn ivf_flat_probe_vs_brute_force() {
    let params = IvfParams {
        nlist: 4,
        nprobe: 4,
        train_iter: 25,
        seed: 7,
    };
    let mut index = IvfFlatIndex::new(Metric::L2, params).unwrap();

    // Corner training set replicated to satisfy |V| >= nlist
    let mut training = Vec::new();
    for _ in 0..3 {
        training.push(vec![0.0, 0.0]);
        training.push(vec![10.0, 0.0]);
        training.push(vec![0.0, 10.0]);
        training.push(vec![10.0, 10.0]);
    }
    index.train(&training).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let vectors: Vec<Vec<f32>> = (0..100)
        .map(|_| vec![rng.gen::<f32>(), rng.gen::<f32>()])
        .collect();
    let ids: Vec<u32> = (0..100).collect();
    index.add(&vectors, &ids, None).unwrap();

    let mut brute = FlatIndex::new(Metric::L2);
    for (i, v) in vectors.iter().enumerate() {
        brute.add(i as u32, v.clone(), None).unwrap();
    }

    // All data lives in [0,1]^2, so every point's nearest centroid is the
    // origin corner; one probe already sees everything.
    let one_probe = index.search_with_nprobe(&[0.5, 0.5], 10, 1).unwrap();
    assert_eq!(one_probe.len(), 10);

    let all_probes = index.search_with_nprobe(&[0.5, 0.5], 10, 4).unwrap();
    let exact = brute.search(&[0.5, 0.5], 10).unwrap();
    assert_eq!(all_probes, exact);
    assert_eq!(one_probe, exact);
}

/// PQ round-trip: reconstruction error on trained vectors stays small.
#[test]
fn pq_roundtrip_reconstruction_error() {
    let params = PqParams {
        m: 4,
        bits: 6,
        train_iter: 15,
        seed: 11,
    };
    let mut pq = ProductQuantizer::new(128, Metric::L2, params).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let vectors: Vec<Vec<f32>> = (0..500)
        .map(|_| (0..128).map(|_| rng.gen::<f32>()).collect())
        .collect();
    pq.train(&vectors).unwrap();

    let mut worst = 0.0f32;
    for v in &vectors {
        let decoded = pq.decode(&pq.encode(v).unwrap()).unwrap();
        let mse: f32 = v
            .iter()
            .zip(decoded.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            / 128.0;
        worst = worst.max(mse);
        assert!(mse <= 0.5, "mse {} above bound", mse);
    }
    // Unit-cube data quantized with 64 centroids per 32-wide subspace sits
    // far below the bound on average
    assert!(worst <= 0.5);
}

/// PQ serialization: a reloaded quantizer produces byte-identical codes.
#[test]
fn pq_serialization_identical_codes() {
    let params = PqParams {
        m: 4,
        bits: 6,
        train_iter: 15,
        seed: 13,
    };
    let mut pq = ProductQuantizer::new(128, Metric::L2, params).unwrap();

    let mut rng = StdRng::seed_from_u64(13);
    let vectors: Vec<Vec<f32>> = (0..500)
        .map(|_| (0..128).map(|_| rng.gen::<f32>()).collect())
        .collect();
    pq.train(&vectors).unwrap();

    let blob = pq.to_bytes().unwrap();
    let loaded = ProductQuantizer::from_bytes(&blob).unwrap();

    for v in vectors.iter().take(50) {
        assert_eq!(pq.encode(v).unwrap(), loaded.encode(v).unwrap());
    }
}

/// SCANN filtered search only returns ids in the requested category.
#[test]
fn scann_filtered_search_by_category() {
    let params = ScannParams {
        nlist: 30,
        nprobe: 15,
        m: 16,
        bits: 8,
        spherical: true,
        reorder_top_k: 100,
        use_rescoring: true,
        train_iter: 4,
        seed: 21,
    };
    let mut index = ScannIndex::new(Metric::CosineDistance, params).unwrap();

    let mut rng = StdRng::seed_from_u64(21);
    let vectors: Vec<Vec<f32>> = (0..1000)
        .map(|_| (0..768).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect();
    index.train(&vectors).unwrap();

    let ids: Vec<u32> = (0..1000).collect();
    let metadata: Vec<Metadata> = ids
        .iter()
        .map(|id| {
            let mut m = Metadata::new();
            m.insert("category".to_string(), id % 10);
            m
        })
        .collect();
    index.add(&vectors, &ids, Some(&metadata)).unwrap();

    let query: Vec<f32> = (0..768).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
    let results = index
        .search_with_filter(&query, 10, 15, &FilterPredicate::equals("category", 5))
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 10);
    for (id, _) in results {
        assert_eq!(id % 10, 5, "id {} not in category 5", id);
    }
}

/// Universal invariants: self-recall, sorted results, bounded length.
#[test]
fn universal_invariants_across_engines() {
    let mut rng = StdRng::seed_from_u64(33);
    let vectors: Vec<Vec<f32>> = (0..120)
        .map(|_| (0..8).map(|_| rng.gen::<f32>()).collect())
        .collect();

    // Flat
    let mut flat = FlatIndex::new(Metric::L2);
    for (i, v) in vectors.iter().enumerate() {
        flat.add(i as u32, v.clone(), None).unwrap();
    }

    // NSG
    let mut nsg = NsgIndex::new(Metric::L2, NsgParams { r: 8, l: 24, c: 128 }).unwrap();
    for v in &vectors {
        nsg.add_vector(v.clone(), None).unwrap();
    }
    nsg.build().unwrap();

    // IVF-Flat
    let mut ivf = IvfFlatIndex::new(
        Metric::L2,
        IvfParams {
            nlist: 8,
            nprobe: 8,
            train_iter: 15,
            seed: 33,
        },
    )
    .unwrap();
    ivf.train(&vectors).unwrap();
    let ids: Vec<u32> = (0..vectors.len() as u32).collect();
    ivf.add(&vectors, &ids, None).unwrap();

    let check = |results: &[(u32, f32)], expect_id: u32, k: usize| {
        assert!(results.len() <= k);
        assert_eq!(results[0].0, expect_id);
        assert!(results[0].1 <= 1e-5);
        for pair in results.windows(2) {
            assert!(
                pair[0].1 < pair[1].1 || (pair[0].1 == pair[1].1 && pair[0].0 < pair[1].0),
                "results out of order: {:?}",
                pair
            );
        }
    };

    for probe in [0usize, 17, 63, 119] {
        let q = &vectors[probe];
        check(&flat.search(q, 5).unwrap(), probe as u32, 5);
        check(&nsg.search(q, 5).unwrap(), probe as u32, 5);
        check(&ivf.search_with_nprobe(q, 5, 8).unwrap(), probe as u32, 5);
    }
}
