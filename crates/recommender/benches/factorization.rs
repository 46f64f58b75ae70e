//! Benchmarks for training and querying
//!
//! Run with: cargo bench --package recommender
//!
//! Uses a synthetic rating matrix so no dataset needs to be present.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recommender::{FactorizationConfig, MatrixFactorizer, RatingMatrix, RecommenderModel};

/// 200 users x 100 books with roughly a fifth of the cells rated.
fn synthetic_matrix() -> RatingMatrix {
    let rows: Vec<Vec<f64>> = (0..200u64)
        .map(|u| {
            (0..100u64)
                .map(|b| {
                    let h = (u * 31 + b * 17) % 97;
                    if h % 5 == 0 { ((h / 5) % 5 + 1) as f64 } else { 0.0 }
                })
                .collect()
        })
        .collect();
    RatingMatrix::from_dense(&rows).expect("synthetic rows are rectangular")
}

fn bench_factorize(c: &mut Criterion) {
    let matrix = synthetic_matrix();
    let factorizer = MatrixFactorizer::new(
        FactorizationConfig::default()
            .with_latent_features(8)
            .with_steps(50)
            .with_seed(1),
    )
    .expect("valid config");

    c.bench_function("factorize_200x100_50_passes", |b| {
        b.iter(|| {
            let result = factorizer.factorize(black_box(&matrix)).unwrap();
            black_box(result)
        })
    });
}

fn bench_top_picks(c: &mut Criterion) {
    let model = RecommenderModel::new(
        synthetic_matrix(),
        FactorizationConfig::default().with_steps(50).with_seed(1),
    )
    .expect("valid config");
    let trained = model.build().expect("matrix has ratings");

    c.bench_function("top_picks_10", |b| {
        b.iter(|| {
            let picks = trained.top_picks(black_box(7), black_box(10), false).unwrap();
            black_box(picks)
        })
    });
}

criterion_group!(benches, bench_factorize, bench_top_picks);
criterion_main!(benches);
