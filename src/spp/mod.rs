//! Single-point positioner (section 4.F): iterated weighted least squares
//! estimating (x, y, z, clock-bias-per-system), with RAIM outlier
//! exclusion.
//!
//! Grounded on `gnss-rtk::Solver::run`'s candidate-filter-then-solve shape
//! and `gnss-rtk::estimate::SolverEstimate::new`'s normal-equations solve
//! (`q = (g g')^-1, x = q g' y`), generalized to per-system clock biases
//! and to the RAIM re-solve loop the teacher's SPP-only solver omits.

use crate::constants::CLIGHT;
use crate::error::{Error, Result};
use crate::sat::SatIndex;
use crate::solution::Dop;
use gnss_rs::prelude::Constellation;
use nalgebra::{DMatrix, DVector};

const MAX_ITERATIONS: usize = 10;
const CONVERGENCE_M: f64 = 1e-4;

/// One satellite's contribution to the SPP normal equations.
#[derive(Clone, Debug)]
pub struct SppCandidate {
    pub satellite: SatIndex,
    pub constellation: Constellation,
    pub sat_position_m: [f64; 3],
    pub sat_clock_bias_s: f64,
    pub pseudorange_m: f64,
    pub elevation_rad: f64,
    pub tropo_delay_m: f64,
    pub iono_delay_m: f64,
    pub tgd_m: f64,
    /// Variance contributions already folded together by the caller
    /// (elevation weighting, URA, SNR-based DCB application) per section
    /// 4.F's weight model.
    pub variance_m2: f64,
    pub snr_dbhz: f64,
    pub healthy: bool,
}

/// Result of a successful SPP solve.
#[derive(Clone, Debug)]
pub struct SppResult {
    pub position_ecef_m: [f64; 3],
    /// Per-system clock bias (m), keyed by constellation, in system order
    /// first-seen.
    pub clock_biases_m: Vec<(Constellation, f64)>,
    pub dop: Dop,
    pub used_satellites: Vec<SatIndex>,
    pub residual_sum_of_squares: f64,
}

/// Elevation mask (radians) below which a candidate is excluded.
pub fn elevation_filter(candidates: Vec<SppCandidate>, mask_rad: f64, min_snr_dbhz: f64) -> Vec<SppCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.healthy && c.elevation_rad >= mask_rad && c.snr_dbhz >= min_snr_dbhz)
        .collect()
}

/// Runs iterated weighted least squares to convergence, then RAIM if the
/// chi-squared residual test fails.
pub fn solve(
    candidates: &[SppCandidate],
    initial_position_ecef_m: [f64; 3],
    raim_chi2_threshold: f64,
) -> Result<SppResult> {
    if candidates.len() < 4 {
        return Err(Error::DataGap("fewer than 4 usable satellites for SPP"));
    }

    let systems = distinct_systems(candidates);
    let result = iterate_lsq(candidates, initial_position_ecef_m, &systems)?;

    let dof = candidates.len() as f64 - (3.0 + systems.len() as f64);
    if dof > 0.0 && result.residual_sum_of_squares > raim_chi2_threshold {
        return raim_reselect(candidates, initial_position_ecef_m, raim_chi2_threshold);
    }

    Ok(result)
}

fn distinct_systems(candidates: &[SppCandidate]) -> Vec<Constellation> {
    let mut systems = Vec::new();
    for c in candidates {
        if !systems.contains(&c.constellation) {
            systems.push(c.constellation);
        }
    }
    systems
}

fn iterate_lsq(
    candidates: &[SppCandidate],
    initial_position_ecef_m: [f64; 3],
    systems: &[Constellation],
) -> Result<SppResult> {
    let n = candidates.len();
    let p = 3 + systems.len();

    let mut position = initial_position_ecef_m;
    let mut clock_biases = vec![0.0_f64; systems.len()];

    let mut g = DMatrix::<f64>::zeros(n, p);
    let mut y = DVector::<f64>::zeros(n);
    let mut w = DMatrix::<f64>::zeros(n, n);
    let mut rss = 0.0;

    for _iter in 0..MAX_ITERATIONS {
        let mut max_delta = 0.0_f64;

        for (i, c) in candidates.iter().enumerate() {
            let dx = position[0] - c.sat_position_m[0];
            let dy = position[1] - c.sat_position_m[1];
            let dz = position[2] - c.sat_position_m[2];
            let range = (dx * dx + dy * dy + dz * dz).sqrt();

            let sys_idx = systems.iter().position(|s| *s == c.constellation).unwrap();
            let clock_bias = clock_biases[sys_idx];

            let modeled = range - c.sat_clock_bias_s * CLIGHT + clock_bias + c.tropo_delay_m + c.iono_delay_m + c.tgd_m;
            let residual = c.pseudorange_m - modeled;

            y[i] = residual;
            g[(i, 0)] = dx / range;
            g[(i, 1)] = dy / range;
            g[(i, 2)] = dz / range;
            g[(i, 3 + sys_idx)] = 1.0;

            w[(i, i)] = 1.0 / c.variance_m2.max(1e-6);
        }

        let gtw = g.transpose() * &w;
        let normal = &gtw * &g;
        let normal_inv = crate::linalg::sym_inverse(&normal)?;
        let dx_vec = &normal_inv * &gtw * &y;

        position[0] += dx_vec[0];
        position[1] += dx_vec[1];
        position[2] += dx_vec[2];
        for (k, bias) in clock_biases.iter_mut().enumerate() {
            *bias += dx_vec[3 + k];
        }

        max_delta = max_delta.max(dx_vec[0].abs()).max(dx_vec[1].abs()).max(dx_vec[2].abs());

        let residual_final = &y - &g * &dx_vec;
        rss = (residual_final.transpose() * &w * &residual_final)[(0, 0)];

        if max_delta < CONVERGENCE_M {
            let dop = compute_dop(&normal_inv, &position);
            return Ok(SppResult {
                position_ecef_m: position,
                clock_biases_m: systems.iter().copied().zip(clock_biases).collect(),
                dop,
                used_satellites: candidates.iter().map(|c| c.satellite).collect(),
                residual_sum_of_squares: rss,
            });
        }
    }

    Err(Error::NumericFailure("SPP least-squares failed to converge"))
}

fn compute_dop(normal_inv: &DMatrix<f64>, _position: &[f64; 3]) -> Dop {
    let qxx = normal_inv[(0, 0)];
    let qyy = normal_inv[(1, 1)];
    let qzz = normal_inv[(2, 2)];
    let qtt = if normal_inv.nrows() > 3 { normal_inv[(3, 3)] } else { 0.0 };

    Dop {
        gdop: (qxx + qyy + qzz + qtt).max(0.0).sqrt(),
        pdop: (qxx + qyy + qzz).max(0.0).sqrt(),
        hdop: (qxx + qyy).max(0.0).sqrt(),
        vdop: qzz.max(0.0).sqrt(),
        tdop: qtt.max(0.0).sqrt(),
    }
}

/// RAIM: re-solve N times, each with one satellite removed, picking the
/// solution with minimum residual sum and satellite count >= 5.
fn raim_reselect(
    candidates: &[SppCandidate],
    initial_position_ecef_m: [f64; 3],
    raim_chi2_threshold: f64,
) -> Result<SppResult> {
    if candidates.len() < 6 {
        // Need >=5 after exclusion; with exactly 5 input satellites,
        // excluding one leaves 4, below the minimum usable set.
        return Err(Error::NumericFailure("RAIM needs at least 6 candidates to exclude one and keep >=5"));
    }

    let mut best: Option<SppResult> = None;

    for skip in 0..candidates.len() {
        let subset: Vec<SppCandidate> = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, c)| c.clone())
            .collect();

        if subset.len() < 5 {
            continue;
        }

        let systems = distinct_systems(&subset);
        if let Ok(result) = iterate_lsq(&subset, initial_position_ecef_m, &systems) {
            if result.residual_sum_of_squares <= raim_chi2_threshold {
                let better = match &best {
                    Some(b) => result.residual_sum_of_squares < b.residual_sum_of_squares,
                    None => true,
                };
                if better {
                    best = Some(result);
                }
            }
        }
    }

    best.ok_or(Error::NumericFailure("RAIM found no consistent subset"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(sat: usize, pos: [f64; 3], pr: f64) -> SppCandidate {
        SppCandidate {
            satellite: SatIndex(sat),
            constellation: Constellation::GPS,
            sat_position_m: pos,
            sat_clock_bias_s: 0.0,
            pseudorange_m: pr,
            elevation_rad: 45.0_f64.to_radians(),
            tropo_delay_m: 0.0,
            iono_delay_m: 0.0,
            tgd_m: 0.0,
            variance_m2: 1.0,
            snr_dbhz: 45.0,
            healthy: true,
        }
    }

    #[test]
    fn converges_to_known_position() {
        let truth = [4_000_000.0, 3_000_000.0, 3_500_000.0];
        let sats = [
            [20_000_000.0, 10_000_000.0, 5_000_000.0],
            [-15_000_000.0, 20_000_000.0, 8_000_000.0],
            [10_000_000.0, -20_000_000.0, 10_000_000.0],
            [5_000_000.0, 5_000_000.0, -22_000_000.0],
            [-10_000_000.0, -10_000_000.0, 20_000_000.0],
        ];
        let candidates: Vec<SppCandidate> = sats
            .iter()
            .enumerate()
            .map(|(i, sp)| {
                let range = ((truth[0] - sp[0]).powi(2) + (truth[1] - sp[1]).powi(2) + (truth[2] - sp[2]).powi(2)).sqrt();
                make_candidate(i, *sp, range)
            })
            .collect();

        let result = solve(&candidates, [0.0, 0.0, 0.0], 1e6).unwrap();
        for k in 0..3 {
            assert!((result.position_ecef_m[k] - truth[k]).abs() < 1.0, "axis {k} diverged");
        }
    }

    #[test]
    fn rejects_fewer_than_four_satellites() {
        let candidates = vec![make_candidate(0, [1.0, 0.0, 0.0], 1.0)];
        assert!(solve(&candidates, [0.0, 0.0, 0.0], 1e6).is_err());
    }
}
