//! Benchmarking the integer ambiguity search over double-differenced
//! phase-bias float estimates, at DD-ambiguity-set sizes typical of a
//! single- and dual-constellation baseline.
extern crate criterion;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nalgebra::{DMatrix, DVector};
use rtk_core::rtk::ambiguity::lambda_search;

/// A synthetic float-ambiguity vector close to integers, with a diagonally
/// dominant covariance shaped like a real DD phase-bias block (unit
/// variance on the diagonal, mild cross-correlation from the shared
/// reference satellite).
fn synthetic_problem(n: usize) -> (DVector<f64>, DMatrix<f64>) {
    let afloat = DVector::from_fn(n, |i, _| (i as f64) + 0.15 * ((i + 1) as f64).sin());
    let q_b = DMatrix::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.15 });
    (afloat, q_b)
}

fn benchmark(c: &mut Criterion) {
    let mut grp = c.benchmark_group("lambda_search");
    for &n in &[4usize, 8, 12] {
        let (afloat, q_b) = synthetic_problem(n);
        grp.bench_function(format!("n={n}"), |b| {
            b.iter(|| lambda_search(black_box(&afloat), black_box(&q_b)).unwrap())
        });
    }
    grp.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
