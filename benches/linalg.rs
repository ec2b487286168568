//! Benchmarking the dense linear-algebra primitives the RTK filter's
//! measurement and time updates run on every epoch.
extern crate criterion;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nalgebra::{DMatrix, DVector};
use rtk_core::linalg::{kalman_update, sym_inverse, time_update_cov};

fn spd_matrix(n: usize) -> DMatrix<f64> {
    let a = DMatrix::<f64>::from_fn(n, n, |i, j| ((i + 1) as f64 * 0.3 + (j + 1) as f64 * 0.1).sin());
    &a * a.transpose() + DMatrix::identity(n, n) * (n as f64)
}

fn benchmark(c: &mut Criterion) {
    let mut inv_grp = c.benchmark_group("sym_inverse");
    for &n in &[8usize, 32, 64] {
        let m = spd_matrix(n);
        inv_grp.bench_function(format!("n={n}"), |b| {
            b.iter(|| sym_inverse(black_box(&m)).unwrap())
        });
    }
    inv_grp.finish();

    let mut kalman_grp = c.benchmark_group("kalman_update");
    for &n in &[8usize, 32, 64] {
        let p = spd_matrix(n);
        let x = DVector::<f64>::zeros(n);
        let m = n.min(16);
        let h = DMatrix::<f64>::from_fn(m, n, |i, j| if i == j { 1.0 } else { 0.0 });
        let y = DVector::<f64>::from_element(m, 0.05);
        let r = DMatrix::<f64>::identity(m, m);
        kalman_grp.bench_function(format!("state={n},meas={m}"), |b| {
            b.iter(|| kalman_update(black_box(&x), black_box(&p), black_box(&h), black_box(&y), black_box(&r)).unwrap())
        });
    }
    kalman_grp.finish();

    let mut tu_grp = c.benchmark_group("time_update_cov");
    for &n in &[8usize, 32, 64] {
        let p = spd_matrix(n);
        let f = DMatrix::<f64>::identity(n, n);
        let q = DMatrix::<f64>::identity(n, n) * 1e-4;
        tu_grp.bench_function(format!("n={n}"), |b| {
            b.iter(|| time_update_cov(black_box(&p), black_box(&f), black_box(&q)))
        });
    }
    tu_grp.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
