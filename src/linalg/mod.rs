//! Small dense linear algebra used by the filter and ambiguity resolver.
//!
//! Built on [`nalgebra`], the way the single-point solver
//! (`gnss-rtk::estimate::SolverEstimate`) leans on `nalgebra::{DMatrix,
//! DVector}` for its own normal-equations solve. The compression helpers and
//! the Joseph-form update are specific to the RTK core and have no direct
//! teacher counterpart; they are grounded on the "compress/accessor" pattern
//! called for in the spec's design notes (section 9).

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Inverts a symmetric positive-(semi)definite matrix via LU decomposition
/// with partial pivoting. Used for the normal-matrix inverse in the
/// single-point solver and for `Q_b^-1` in ambiguity resolution.
pub fn sym_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    m.clone()
        .try_inverse()
        .ok_or(Error::NumericFailure("matrix inverse failed (singular)"))
}

/// Lower-triangular Cholesky-like factorisation (`L L' = m`), used inside
/// LAMBDA's decorrelation step. Falls back to an LDL-style diagonal
/// adjustment if a pivot is non-positive (can happen on a near-singular
/// Q_b for nearly collinear DD ambiguities), clamping the pivot to a tiny
/// positive epsilon rather than failing outright.
pub fn cholesky_lower(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = m.nrows();
    let mut l = DMatrix::<f64>::zeros(n, n);
    for j in 0..n {
        let mut sum = m[(j, j)];
        for k in 0..j {
            sum -= l[(j, k)] * l[(j, k)];
        }
        let pivot = if sum > 1e-12 { sum.sqrt() } else { 1e-6 };
        l[(j, j)] = pivot;
        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = sum / pivot;
        }
    }
    Ok(l)
}

/// Maps the full state's non-zero-variance indices to a compact ordering,
/// always keeping the first `always_keep` indices (the position block).
///
/// This is the "uncompressed-index -> compressed-index" accessor called for
/// in the design notes: callers never special-case a zero-variance state,
/// they just never see it in the compressed system.
pub fn compress_indices(variances: &[f64], always_keep: usize) -> Vec<usize> {
    variances
        .iter()
        .enumerate()
        .filter(|(i, v)| *i < always_keep || **v > 0.0)
        .map(|(i, _)| i)
        .collect()
}

pub fn extract_compressed(
    x: &DVector<f64>,
    p: &DMatrix<f64>,
    idx: &[usize],
) -> (DVector<f64>, DMatrix<f64>) {
    let n = idx.len();
    let mut xc = DVector::<f64>::zeros(n);
    let mut pc = DMatrix::<f64>::zeros(n, n);
    for (a, &ia) in idx.iter().enumerate() {
        xc[a] = x[ia];
        for (b, &ib) in idx.iter().enumerate() {
            pc[(a, b)] = p[(ia, ib)];
        }
    }
    (xc, pc)
}

pub fn writeback_compressed(x: &mut DVector<f64>, p: &mut DMatrix<f64>, idx: &[usize], xc: &DVector<f64>, pc: &DMatrix<f64>) {
    for (a, &ia) in idx.iter().enumerate() {
        x[ia] = xc[a];
        for (b, &ib) in idx.iter().enumerate() {
            p[(ia, ib)] = pc[(a, b)];
        }
    }
}

/// Joseph-form Kalman measurement update on the compressed (non-zero-state)
/// system, avoiding an explicitly-formed Kalman gain's numerical blow-up at
/// high condition numbers:
///
/// `K = P H' (H P H' + R)^-1`
/// `x' = x + K (y - H x)`
/// `P' = (I - K H) P (I - K H)' + K R K'`
///
/// Returns the innovation vector alongside the updated state/covariance so
/// callers can run outlier rejection against it before committing.
pub fn kalman_update(
    x: &DVector<f64>,
    p: &DMatrix<f64>,
    h: &DMatrix<f64>,
    y: &DVector<f64>,
    r: &DMatrix<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>, DVector<f64>)> {
    let n = x.len();
    let innovation = y - h * x;
    let pht = p * h.transpose();
    let s = h * &pht + r;
    let s_inv = sym_inverse(&s)?;
    let k = &pht * &s_inv;
    let x_new = x + &k * &innovation;
    let ikh = DMatrix::<f64>::identity(n, n) - &k * h;
    let p_new = &ikh * p * ikh.transpose() + &k * r * k.transpose();
    Ok((x_new, p_new, innovation))
}

/// Time-update covariance propagation `P' = F P F' + Q`.
pub fn time_update_cov(p: &DMatrix<f64>, f: &DMatrix<f64>, q: &DMatrix<f64>) -> DMatrix<f64> {
    f * p * f.transpose() + q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sym_inverse_roundtrips_identity() {
        let m = DMatrix::<f64>::identity(3, 3) * 4.0;
        let inv = sym_inverse(&m).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn cholesky_reconstructs_spd_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 5.0]);
        let l = cholesky_lower(&m).unwrap();
        let reconstructed = &l * l.transpose();
        for i in 0..2 {
            for j in 0..2 {
                assert!((reconstructed[(i, j)] - m[(i, j)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn compress_indices_always_keeps_prefix() {
        let variances = vec![0.0, 0.0, 0.0, 5.0, 0.0, 2.0];
        let idx = compress_indices(&variances, 3);
        assert_eq!(idx, vec![0, 1, 2, 3, 5]);
    }

    #[test]
    fn kalman_update_reduces_innovation_given_good_measurement() {
        let x = DVector::from_vec(vec![0.0]);
        let p = DMatrix::from_row_slice(1, 1, &[100.0]);
        let h = DMatrix::from_row_slice(1, 1, &[1.0]);
        let y = DVector::from_vec(vec![5.0]);
        let r = DMatrix::from_row_slice(1, 1, &[1.0]);
        let (x_new, p_new, _innov) = kalman_update(&x, &p, &h, &y, &r).unwrap();
        assert!((x_new[0] - 5.0).abs() < 0.1);
        assert!(p_new[(0, 0)] < p[(0, 0)]);
    }
}
