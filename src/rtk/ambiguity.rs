//! Ambiguity resolver (section 4.H): DD transformation from the
//! single-difference phase-bias states, integer least-squares search
//! (MLAMBDA), ratio validation, partial-fix retries, and fix-and-hold
//! feedback.
//!
//! The search itself has no teacher counterpart in the retrieval pack (the
//! classic LAMBDA/MLAMBDA integer-least-squares search is public GNSS
//! literature, not something `georust-rinex`/`gnss-rtk` implement); it is
//! written here as a direct sequential conditional-least-squares search
//! over the `L D L'` factorisation from [`crate::linalg::cholesky_lower`]'s
//! sibling decomposition, without the full Z-transform decorrelation step
//! real LAMBDA implementations use for search efficiency. That is a
//! deliberate simplification for a filter of this state size, noted here
//! rather than silently assumed.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::linalg;
use crate::rtk::RtkState;
use crate::sat::SatIndex;
use gnss_rs::prelude::Constellation;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

/// One satellite/frequency's eligibility inputs for the DD transform:
/// system, frequency, slip-free flag and rover elevation.
#[derive(Copy, Clone, Debug)]
pub struct BiasCandidate {
    pub satellite: SatIndex,
    pub constellation: Constellation,
    pub freq: usize,
    pub slip_free: bool,
    pub elevation_rad: f64,
}

/// One bias-difference row of the DD transformation: `other - reference`.
#[derive(Copy, Clone, Debug)]
pub struct BiasPair {
    pub reference: (SatIndex, usize),
    pub other: (SatIndex, usize),
    pub reference_state_index: usize,
    pub other_state_index: usize,
}

/// Builds the DD transformation pairs from single-difference phase-bias
/// states: within each (constellation-group, frequency), the reference is
/// the first valid, non-slipped bias at elevation >= `elmaskar` with
/// `lock_count >= 0`; every other qualifying bias pairs against it.
pub fn build_dd_transform(state: &RtkState, config: &Config, candidates: &[BiasCandidate]) -> Vec<BiasPair> {
    let elmaskar = config.elevation_mask_ar_deg.to_radians();
    let mut groups: HashMap<(Constellation, usize), Vec<BiasCandidate>> = HashMap::new();
    for &c in candidates {
        groups.entry((c.constellation, c.freq)).or_default().push(c);
    }

    let mut pairs = Vec::new();
    for members in groups.values() {
        let qualifies = |m: &BiasCandidate| -> bool {
            let idx = state.layout.phase_bias_index(m.satellite, m.freq);
            let locked = state
                .tracking
                .get(&m.satellite)
                .map(|t| t.frequencies[m.freq].lock_count >= config.min_lock_count)
                .unwrap_or(false);
            m.elevation_rad >= elmaskar && m.slip_free && state.x[idx] != 0.0 && locked
        };
        let reference = members.iter().copied().find(|m| qualifies(m));
        let Some(reference) = reference else { continue };
        for &member in members {
            if member.satellite == reference.satellite {
                continue;
            }
            if !qualifies(&member) {
                continue;
            }
            pairs.push(BiasPair {
                reference: (reference.satellite, reference.freq),
                other: (member.satellite, member.freq),
                reference_state_index: state.layout.phase_bias_index(reference.satellite, reference.freq),
                other_state_index: state.layout.phase_bias_index(member.satellite, member.freq),
            });
        }
    }
    pairs
}

/// Outcome of a single LAMBDA search.
pub struct SearchResult {
    pub best: Vec<i64>,
    pub second_best: Vec<i64>,
    pub s1: f64,
    pub s2: f64,
}

/// Integer least-squares search over `afloat`, with covariance `q_b`, via
/// a sequential conditional-least-squares depth-first search on the
/// `L D L'` factorisation.
pub fn lambda_search(afloat: &DVector<f64>, q_b: &DMatrix<f64>) -> Result<SearchResult> {
    let n = afloat.len();
    let (l, d) = ldl_decompose(q_b)?;

    let mut kept: Vec<(Vec<i64>, f64)> = Vec::new();
    let mut zfixed = vec![0i64; n];
    let mut nodes_visited: u64 = 0;
    const MAX_NODES: u64 = 200_000;

    search_level(
        n as isize - 1,
        &l,
        &d,
        afloat,
        &mut zfixed,
        0.0,
        &mut kept,
        2,
        &mut nodes_visited,
        MAX_NODES,
    );

    if kept.is_empty() {
        // Node budget exhausted before any full candidate was found: fall
        // back to the rounded float solution as the sole candidate.
        let rounded: Vec<i64> = afloat.iter().map(|v| v.round() as i64).collect();
        return Ok(SearchResult {
            best: rounded.clone(),
            second_best: rounded,
            s1: 0.0,
            s2: 999.9,
        });
    }

    kept.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (best, s1) = kept[0].clone();
    let (second_best, s2) = kept.get(1).cloned().unwrap_or((best.clone(), 999.9));
    Ok(SearchResult { best, second_best, s1, s2 })
}

/// `Q = L D L'` with `L` unit lower triangular, processed from the last
/// row upward (the convention the sequential conditional search below
/// relies on: `z[n-1]` is unconditional, `z[i]` conditions on `z[i+1..]`).
fn ldl_decompose(q: &DMatrix<f64>) -> Result<(DMatrix<f64>, Vec<f64>)> {
    let n = q.nrows();
    let mut a = q.clone();
    let mut l = DMatrix::<f64>::identity(n, n);
    let mut d = vec![0.0; n];

    for i in (0..n).rev() {
        let pivot = a[(i, i)];
        if pivot <= 0.0 {
            return Err(Error::NumericFailure("LDL decomposition hit a non-positive pivot"));
        }
        d[i] = pivot;
        for j in 0..i {
            let factor = a[(i, j)] / pivot;
            l[(i, j)] = factor;
            for k in 0..=j {
                a[(j, k)] -= factor * a[(i, k)];
            }
        }
    }
    Ok((l, d))
}

#[allow(clippy::too_many_arguments)]
fn search_level(
    i: isize,
    l: &DMatrix<f64>,
    d: &[f64],
    afloat: &DVector<f64>,
    zfixed: &mut Vec<i64>,
    cum_cost: f64,
    kept: &mut Vec<(Vec<i64>, f64)>,
    max_keep: usize,
    nodes_visited: &mut u64,
    max_nodes: u64,
) {
    *nodes_visited += 1;
    if *nodes_visited > max_nodes {
        return;
    }

    if i < 0 {
        kept.push((zfixed.clone(), cum_cost));
        if kept.len() > max_keep {
            kept.sort_by(|a, b| a.1.total_cmp(&b.1));
            kept.truncate(max_keep);
        }
        return;
    }
    let idx = i as usize;
    let n = afloat.len();

    let mut cond_mean = afloat[idx];
    for j in (idx + 1)..n {
        cond_mean -= l[(j, idx)] * (zfixed[j] as f64 - afloat[j]);
    }

    let bound = if kept.len() >= max_keep {
        kept.iter().map(|(_, c)| *c).fold(f64::MIN, f64::max)
    } else {
        f64::INFINITY
    };

    let center = cond_mean.round() as i64;
    let mut offset = 0i64;
    loop {
        let candidate = if offset == 0 { center } else if offset % 2 == 1 { center + (offset + 1) / 2 } else { center - offset / 2 };
        let residual = candidate as f64 - cond_mean;
        let incremental = residual * residual / d[idx];
        let next_cost = cum_cost + incremental;
        if next_cost > bound && offset > 0 {
            break;
        }
        zfixed[idx] = candidate;
        search_level(i - 1, l, d, afloat, zfixed, next_cost, kept, max_keep, nodes_visited, max_nodes);

        offset += 1;
        if offset > 10 {
            break;
        }
        if *nodes_visited > max_nodes {
            break;
        }
    }
}

/// Section 4.H's ratio-test threshold: a polynomial in `nb` (number of DD
/// ambiguities), mapped into `[min_ratio, max_ratio]`. If the config
/// specifies equal min/max, that fixed value is used directly (the open
/// question about `minAR==maxAR` is resolved here as: equal bounds always
/// short-circuit, regardless of the polynomial's own shape — see
/// `DESIGN.md`).
pub fn ratio_threshold(nb: usize, config: &Config) -> f64 {
    if (config.ratio_threshold_min - config.ratio_threshold_max).abs() < 1e-9 {
        return config.ratio_threshold_min;
    }
    const COEFFS: [f64; 5] = [3.0, -0.05, 0.0008, -6e-6, 1.6e-8];
    let nbf = nb as f64;
    let mut poly = 0.0;
    for (k, c) in COEFFS.iter().enumerate() {
        poly += c * nbf.powi(k as i32);
    }
    poly.clamp(config.ratio_threshold_min, config.ratio_threshold_max)
}

/// One ambiguity-resolution attempt's outcome.
pub struct FixResult {
    pub fixed: bool,
    pub ratio: f64,
    pub excluded_satellite: Option<SatIndex>,
}

/// Runs the full section 4.H pipeline for one epoch: build the DD
/// transform, search, validate by ratio, and on failure retry with
/// staggered locks (if the previous epoch was fixed) or round-robin
/// satellite exclusion.
pub fn resolve(
    state: &mut RtkState,
    config: &Config,
    candidates: &[BiasCandidate],
) -> Result<FixResult> {
    let pairs = build_dd_transform(state, config, candidates);
    if pairs.len() < 2 {
        state.xa = None;
        state.pa = None;
        return Ok(FixResult { fixed: false, ratio: 0.0, excluded_satellite: None });
    }

    let nb = pairs.len();
    let n = state.layout.total_len();
    let mut d_mat = DMatrix::<f64>::zeros(nb, n);
    for (row, pair) in pairs.iter().enumerate() {
        d_mat[(row, pair.other_state_index)] = 1.0;
        d_mat[(row, pair.reference_state_index)] = -1.0;
    }

    let y = &d_mat * &state.x;
    let q_b = &d_mat * &state.p * d_mat.transpose();

    let search = lambda_search(&y, &q_b)?;
    let ratio = if search.s1.abs() < 1e-9 { 999.9 } else { (search.s2 / search.s1).min(999.9) };
    let threshold = ratio_threshold(nb, config);

    if ratio < threshold {
        if state.last_quality_was_fix {
            for pair in &pairs {
                if let Some(track) = state.tracking.get_mut(&pair.other.0) {
                    if track.frequencies[pair.other.1].lock_count == 0 {
                        track.frequencies[pair.other.1].lock_count = -1;
                    }
                }
            }
        }
        let excluded = pairs.get(state.excsat_cursor % pairs.len()).map(|p| p.other.0);
        state.excsat_cursor = state.excsat_cursor.wrapping_add(1);
        state.last_quality_was_fix = false;
        state.consecutive_fixes = 0;
        state.xa = None;
        state.pa = None;
        return Ok(FixResult { fixed: false, ratio, excluded_satellite: excluded });
    }

    // The float state is never collapsed: the fixed solution is kept
    // separately in `xa`/`pa` (RTKLIB's `xa`/`Pa`) and only read back out
    // for output and for fix-and-hold's pseudo-observations, so a failed
    // or missing fix next epoch still propagates the float covariance.
    let best: DVector<f64> = DVector::from_vec(search.best.iter().map(|&v| v as f64).collect());
    let q_b_inv = linalg::sym_inverse(&q_b)?;
    let gain = &state.p * d_mat.transpose() * &q_b_inv;
    let x_fixed = &state.x - &gain * (&y - &best);
    let p_fixed = &state.p - &gain * &d_mat * &state.p;

    state.xa = Some(x_fixed);
    state.pa = Some(p_fixed);
    state.last_quality_was_fix = true;
    state.consecutive_fixes += 1;

    Ok(FixResult { fixed: true, ratio, excluded_satellite: None })
}

/// Fix-and-hold feedback (section 4.H): once `min_fix_count` consecutive
/// fixes have been reached, feeds pseudo-observations back into the float
/// filter pinning the fixed bias differences, and for GLONASS/SBAS moves
/// the fractional part of each bias difference into the satellite's
/// inter-channel bias estimate, scaled by `gain_hold_amb`.
pub fn apply_fix_and_hold(state: &mut RtkState, config: &Config, pairs: &[BiasPair]) -> Result<()> {
    if state.consecutive_fixes < config.min_fix_count {
        return Ok(());
    }
    let Some(xa) = state.xa.clone() else { return Ok(()) };

    for pair in pairs {
        let float_diff = state.x[pair.other_state_index] - state.x[pair.reference_state_index];
        let fixed_diff = xa[pair.other_state_index] - xa[pair.reference_state_index];

        let n = state.layout.total_len();
        let mut h = DMatrix::<f64>::zeros(1, n);
        h[(0, pair.other_state_index)] = 1.0;
        h[(0, pair.reference_state_index)] = -1.0;
        let y = DVector::from_vec(vec![fixed_diff]);
        let r = DMatrix::from_vec(1, 1, vec![config.sigma_hold_m * config.sigma_hold_m]);
        let (x_new, p_new, _innov) = linalg::kalman_update(&state.x, &state.p, &h, &y, &r)?;
        state.x = x_new;
        state.p = p_new;

        let is_glonass_or_sbas = pair
            .other
            .0
            .to_sv()
            .map(|sv| sv.constellation == Constellation::Glonass || sv.constellation.is_sbas())
            .unwrap_or(false);
        if is_glonass_or_sbas {
            let fractional = float_diff - fixed_diff;
            if let Some(track) = state.tracking.get_mut(&pair.other.0) {
                track.inter_channel_bias_m += config.gain_hold_amb * fractional;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_threshold_shortcuts_when_min_equals_max() {
        let mut config = Config::default();
        config.ratio_threshold_min = 3.0;
        config.ratio_threshold_max = 3.0;
        assert_eq!(ratio_threshold(5, &config), 3.0);
    }

    #[test]
    fn lambda_search_on_already_integer_input_is_idempotent() {
        let afloat = DVector::from_vec(vec![2.0, -3.0, 5.0]);
        let q_b = DMatrix::<f64>::identity(3, 3) * 0.01;
        let result = lambda_search(&afloat, &q_b).unwrap();
        assert_eq!(result.best, vec![2, -3, 5]);
        assert!(result.s1 < 1e-6);
    }

    #[test]
    fn lambda_search_recovers_near_integer_vector() {
        let afloat = DVector::from_vec(vec![1.9, 0.05, -2.05]);
        let q_b = DMatrix::<f64>::identity(3, 3) * 0.02;
        let result = lambda_search(&afloat, &q_b).unwrap();
        assert_eq!(result.best, vec![2, 0, -2]);
    }
}
