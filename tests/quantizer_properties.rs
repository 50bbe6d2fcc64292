//! Statistical properties of the quantizers.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vicinity::prelude::*;

fn uniform_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
        .collect()
}

/// Scalar quantizer: mean absolute reconstruction error on held-out
/// unit-cube data stays within 0.05.
#[test]
fn scalar_quantizer_reconstruction_error() {
    let train = uniform_vectors(200, 32, 1);
    let held_out = uniform_vectors(200, 32, 2);

    let mut sq = ScalarQuantizer::new(32).unwrap();
    sq.train(&train).unwrap();

    let mut total_err = 0.0f64;
    let mut count = 0usize;
    for v in &held_out {
        let decoded = sq.decode(&sq.encode(v).unwrap()).unwrap();
        for (a, b) in v.iter().zip(decoded.iter()) {
            total_err += (a - b).abs() as f64;
            count += 1;
        }
    }

    let mae = total_err / count as f64;
    assert!(mae <= 0.05, "mae {} above bound", mae);
}

/// PQ asymmetric ranking tracks exact brute force: recall@10 over uniform
/// 768-dim data is at least 0.70.
#[test]
fn pq_asymmetric_recall_at_10() {
    let database = uniform_vectors(1000, 768, 3);
    let queries = uniform_vectors(100, 768, 4);

    let params = PqParams {
        m: 16,
        bits: 8,
        train_iter: 4,
        seed: 3,
    };
    let mut pq = ProductQuantizer::new(768, Metric::L2, params).unwrap();
    pq.train(&database).unwrap();

    let codes: Vec<Vec<u8>> = database.iter().map(|v| pq.encode(v).unwrap()).collect();

    let mut flat = FlatIndex::new(Metric::L2);
    for (i, v) in database.iter().enumerate() {
        flat.add(i as u32, v.clone(), None).unwrap();
    }

    let mut hits = 0usize;
    let mut total = 0usize;
    for q in &queries {
        let truth: HashSet<u32> = flat
            .search(q, 10)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let table = pq.build_table(q).unwrap();
        let mut approx: Vec<(u32, f32)> = codes
            .iter()
            .enumerate()
            .map(|(i, code)| (i as u32, table.distance(code).unwrap()))
            .collect();
        approx.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        total += truth.len();
        hits += approx
            .iter()
            .take(10)
            .filter(|(id, _)| truth.contains(id))
            .count();
    }

    let recall = hits as f64 / total as f64;
    assert!(recall >= 0.70, "recall@10 = {:.3}", recall);
}

/// Compression ratio is exactly `(D * 4) / m` for the code-based quantizers
/// and exactly 4 for the scalar quantizer.
#[test]
fn compression_ratios_exact() {
    let pq = ProductQuantizer::new(
        768,
        Metric::L2,
        PqParams {
            m: 16,
            bits: 8,
            train_iter: 5,
            seed: 0,
        },
    )
    .unwrap();
    assert_eq!(pq.compression_ratio(), 192.0);

    let aq = AnisotropicQuantizer::new(768, Metric::L2, 16, 8, 5, 0).unwrap();
    assert_eq!(aq.compression_ratio(), 192.0);

    let pq_small = ProductQuantizer::new(
        64,
        Metric::L2,
        PqParams {
            m: 8,
            bits: 4,
            train_iter: 5,
            seed: 0,
        },
    )
    .unwrap();
    assert_eq!(pq_small.compression_ratio(), 32.0);

    let sq = ScalarQuantizer::new(100).unwrap();
    assert_eq!(sq.compression_ratio(), 4.0);
}

/// Asymmetric distance beats symmetric distance at approximating the exact
/// value, averaged over a sample.
#[test]
fn asymmetric_tighter_than_symmetric() {
    let database = uniform_vectors(400, 32, 5);

    let params = PqParams {
        m: 8,
        bits: 6,
        train_iter: 10,
        seed: 5,
    };
    let mut pq = ProductQuantizer::new(32, Metric::L2, params).unwrap();
    pq.train(&database).unwrap();

    let mut asym_err = 0.0f64;
    let mut sym_err = 0.0f64;
    for pair in database.chunks(2).take(100) {
        let (a, b) = (&pair[0], &pair[1]);
        let exact = vicinity::distance::l2(a, b).unwrap();

        let table = pq.build_table(a).unwrap();
        let code_b = pq.encode(b).unwrap();
        let asym = table.distance(&code_b).unwrap();

        let code_a = pq.encode(a).unwrap();
        let sym = pq.sym_dist(&code_a, &code_b).unwrap();

        asym_err += (asym - exact).abs() as f64;
        sym_err += (sym - exact).abs() as f64;
    }

    assert!(
        asym_err <= sym_err,
        "asym err {} vs sym err {}",
        asym_err,
        sym_err
    );
}

/// Anisotropic quantizer on residuals: reconstruction improves over the
/// zero-residual baseline.
#[test]
fn anisotropic_residual_reconstruction() {
    let mut rng = StdRng::seed_from_u64(6);
    let residuals: Vec<Vec<f32>> = (0..500)
        .map(|_| (0..50).map(|_| (rng.gen::<f32>() - 0.5) * 0.4).collect())
        .collect();

    let mut aq = AnisotropicQuantizer::new(50, Metric::L2, 7, 6, 10, 6).unwrap();
    aq.train(&residuals).unwrap();

    let mut quantized_err = 0.0f64;
    let mut zero_err = 0.0f64;
    for v in residuals.iter().take(200) {
        let decoded = aq.decode(&aq.encode(v).unwrap()).unwrap();
        for (a, b) in v.iter().zip(decoded.iter()) {
            quantized_err += ((a - b) * (a - b)) as f64;
            zero_err += (a * a) as f64;
        }
    }

    assert!(
        quantized_err < zero_err,
        "quantization did not improve over dropping the residual: {} vs {}",
        quantized_err,
        zero_err
    );
}
