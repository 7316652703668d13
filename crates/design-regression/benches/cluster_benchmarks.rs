use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use design_core::Grouping;
use design_regression::{cluster_vcov, solve, ClusterType, SolverAlgorithm};
use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Intercept plus `k - 1` uniform covariates, `per_cluster` rows per cluster
fn generate_clustered(n_clusters: usize, per_cluster: usize, k: usize, seed: u64) -> (DMatrix<f64>, DVector<f64>, Grouping) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = n_clusters * per_cluster;
    let x = DMatrix::from_fn(n, k, |_, j| if j == 0 { 1.0 } else { rng.gen::<f64>() });
    let shocks: Vec<f64> = (0..n_clusters).map(|_| rng.gen::<f64>() - 0.5).collect();
    let y = DVector::from_fn(n, |i, _| {
        x.row(i).sum() + shocks[i / per_cluster] + rng.gen::<f64>() - 0.5
    });
    let labels: Vec<usize> = (0..n).map(|i| i / per_cluster).collect();
    let clusters = Grouping::from_labels(&labels).unwrap();
    (x, y, clusters)
}

fn bench_cluster_estimators(c: &mut Criterion) {
    let mut group = c.benchmark_group("ClusterVcov");

    for &n_clusters in &[10, 50, 200] {
        let (x, y, clusters) = generate_clustered(n_clusters, 10, 4, 42);
        let fit = solve(&x, &y, SolverAlgorithm::PivotedQr).unwrap();

        group.bench_with_input(BenchmarkId::new("CR0", n_clusters), &fit, |b, fit| {
            b.iter(|| cluster_vcov(black_box(fit), &clusters, ClusterType::CR0))
        });
        group.bench_with_input(BenchmarkId::new("CR2", n_clusters), &fit, |b, fit| {
            b.iter(|| cluster_vcov(black_box(fit), &clusters, ClusterType::CR2))
        });
    }

    group.finish();
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("Solver");

    for &n in &[100, 1000, 5000] {
        let (x, y, _) = generate_clustered(n / 10, 10, 6, 7);
        group.bench_with_input(BenchmarkId::new("pivoted_qr", n), &(&x, &y), |b, (x, y)| {
            b.iter(|| solve(black_box(x), black_box(y), SolverAlgorithm::PivotedQr))
        });
        group.bench_with_input(BenchmarkId::new("cholesky", n), &(&x, &y), |b, (x, y)| {
            b.iter(|| solve(black_box(x), black_box(y), SolverAlgorithm::Cholesky))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cluster_estimators, bench_solver);
criterion_main!(benches);
