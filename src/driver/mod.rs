//! Post-processing driver (section 4.I): multi-session windowing,
//! forward/backward/combined processing, the two-filter smoother, and the
//! static-solution collapse.
//!
//! Grounded on `rinex-cli`'s trait-driven sources (`positioning::rtk::BaseStation`,
//! `positioning::eph::EphemerisSource`): rather than the driver owning file
//! decoding, it pulls epochs through an [`EpochSource`] the parsing layer
//! implements, the same shape `BaseStation`/`EphemerisSource` use to hand a
//! boxed iterator to their solver. The driver itself stays single-threaded,
//! per section 5.

use crate::config::{Config, ProcessingDirection};
use crate::error::Result;
use crate::rtk::ambiguity::{self, BiasCandidate};
use crate::rtk::filter::{self, SdMeasurement, SlipInput};
use crate::rtk::tracking::TrackingRecord;
use crate::rtk::{RtkState, StateLayout};
use crate::sat::SatIndex;
use crate::solution::{Solution, SolutionQuality};
use crate::spp::{self, SppCandidate};
use crate::time::Instant;
use nalgebra::{DMatrix, DVector};

/// Per-satellite tracking inputs the caller observed this epoch (elevation,
/// azimuth, validity at each end); applied to [`RtkState::tracking`] before
/// the time update runs.
pub struct TrackingUpdate {
    pub satellite: SatIndex,
    pub elevation_rad: f64,
    pub azimuth_rad: f64,
    pub valid_rover: bool,
    pub valid_base: bool,
}

/// Everything the filter needs to process one epoch, supplied by the
/// (not-yet-written) parsing layer via [`EpochSource`].
pub struct EpochInput {
    pub time: Instant,
    /// Nominal sampling interval, used only to seed `dt` on the very first
    /// epoch of a session (when there is no previous epoch to difference
    /// against).
    pub nominal_dt_s: f64,
    pub spp_candidates: Vec<SppCandidate>,
    pub sd_measurements: Vec<SdMeasurement>,
    pub slips: Vec<SlipInput>,
    pub ambiguity_candidates: Vec<BiasCandidate>,
    pub tracking_updates: Vec<TrackingUpdate>,
    pub baseline_m: f64,
    pub base_position_ecef_m: Option<[f64; 3]>,
}

/// Source of epochs for one session window. The parsing layer implements
/// this over its RINEX OBS/NAV/SP3/IONEX/SBAS readers; everything below is
/// agnostic to where the bytes came from.
pub trait EpochSource {
    /// Returns every epoch falling in `[window.0, window.1)`, already
    /// deduplicated and time-ordered, for the given processing direction.
    fn epochs(&mut self, window: (Instant, Instant)) -> Result<Vec<EpochInput>>;

    /// Polled at each epoch and each file/window boundary; returning `true`
    /// aborts the session (section 5's cancellation contract).
    fn should_abort(&mut self) -> bool {
        false
    }
}

/// Partitions `[ts, te]` into `tu`-second windows, following section 4.I's
/// "multi-session loop". The final window is clipped to `te`.
pub fn partition_windows(ts: Instant, te: Instant, tu_s: f64) -> Vec<(Instant, Instant)> {
    let mut windows = Vec::new();
    if tu_s <= 0.0 {
        windows.push((ts, te));
        return windows;
    }
    let mut start = ts;
    while start.diff_seconds(te) < 0.0 {
        let end = start.add_seconds(tu_s);
        let clipped_end = if end.diff_seconds(te) > 0.0 { te } else { end };
        windows.push((start, clipped_end));
        start = clipped_end;
    }
    if windows.is_empty() {
        windows.push((ts, te));
    }
    windows
}

/// Expands RTKLIB-style filename keywords against a concrete time: `%Y`
/// (4-digit year), `%y` (2-digit year), `%m` (month), `%d` (day), `%h`
/// (hour), `%M` (minute), `%S` (second), `%n` (day of year), `%r` (rover
/// marker slot), `%b` (base marker slot). `%r`/`%b` are substituted by the
/// caller-supplied marker names since the driver has no notion of a
/// receiver identity of its own.
pub fn expand_filename(template: &str, time: Instant, rover_marker: &str, base_marker: &str) -> String {
    let epoch = time.to_gpst_epoch();
    let (year, month, day, hour, minute, second, _) = epoch.to_gregorian_utc();
    let day_of_year = epoch.day_of_year().floor() as u32;

    template
        .replace("%Y", &format!("{:04}", year))
        .replace("%y", &format!("{:02}", year.rem_euclid(100)))
        .replace("%m", &format!("{:02}", month))
        .replace("%d", &format!("{:02}", day))
        .replace("%h", &format!("{:02}", hour))
        .replace("%M", &format!("{:02}", minute))
        .replace("%S", &format!("{:02}", second))
        .replace("%n", &format!("{:03}", day_of_year))
        .replace("%r", rover_marker)
        .replace("%b", base_marker)
}

fn new_state(config: &Config) -> RtkState {
    let layout = StateLayout {
        dynamics: config.enable_dynamics,
        gradients: false,
    };
    RtkState::new(layout)
}

fn ensure_tracking(state: &mut RtkState, updates: &[TrackingUpdate]) {
    for u in updates {
        let entry = state.tracking.entry(u.satellite).or_insert_with(TrackingRecord::default);
        entry.elevation_rad = u.elevation_rad;
        entry.azimuth_rad = u.azimuth_rad;
        entry.valid_rover = u.valid_rover;
        entry.valid_base = u.valid_base;
    }
}

fn position_covariance(solution: &Solution) -> DMatrix<f64> {
    let [sxx, syy, szz] = solution.sigma_diag;
    let [sxy, syz, szx] = solution.sigma_offdiag;
    DMatrix::from_row_slice(
        3,
        3,
        &[sxx, sxy, szx, sxy, syy, syz, szx, syz, szz],
    )
}

fn solution_from_state(state: &RtkState, time: Instant, quality: SolutionQuality, satellite_count: u32, ar_ratio: f64) -> Solution {
    let off = StateLayout::POSITION_OFFSET;
    // The fixed solution (`xa`/`pa`) is output-only: it's never written back
    // into the float `x`/`p` the filter keeps propagating. Fall back to the
    // float state whenever there is no current fix to report.
    let (position, p) = match (quality, &state.xa, &state.pa) {
        (SolutionQuality::Fix, Some(xa), Some(pa)) => ([xa[off], xa[off + 1], xa[off + 2]], pa),
        _ => (state.position(), &state.p),
    };
    Solution {
        time,
        position_ecef_m: position,
        quality,
        satellite_count,
        sigma_diag: [p[(off, off)], p[(off + 1, off + 1)], p[(off + 2, off + 2)]],
        sigma_offdiag: [p[(off, off + 1)], p[(off + 1, off + 2)], p[(off + 2, off)]],
        age_of_differential_s: 0.0,
        ar_ratio,
        dop: Default::default(),
        satellites: Vec::new(),
    }
}

/// Runs one epoch's time update, measurement update and (if configured)
/// ambiguity resolution against `state`, returning the resulting solution.
/// `dt` carries its sign from the caller: negative for backward processing,
/// per section 4.I's "swap forward/backward semantics for time-update sign".
fn process_epoch(state: &mut RtkState, config: &Config, epoch: &EpochInput, dt: f64) -> Solution {
    ensure_tracking(state, &epoch.tracking_updates);

    if state.position() == [0.0, 0.0, 0.0] && epoch.spp_candidates.len() >= 4 {
        if let Ok(spp) = spp::solve(&epoch.spp_candidates, [0.0, 0.0, 0.0], config.raim_chi2_threshold) {
            state.set_position(spp.position_ecef_m);
        }
    }

    filter::time_update(state, config, dt, epoch.baseline_m, &epoch.slips);

    let measurement = filter::measurement_update(state, config, &epoch.sd_measurements);

    if let (Some(baseline), Some(base_pos)) = (config.baseline, epoch.base_position_ecef_m) {
        let _ = filter::apply_baseline_constraint(state, base_pos, baseline.length_m, baseline.std_m);
    }

    let mut quality = match &measurement {
        Ok(_) => SolutionQuality::Float,
        Err(_) => SolutionQuality::None,
    };
    let mut ar_ratio = 0.0;

    if measurement.is_ok() && !epoch.ambiguity_candidates.is_empty() {
        if let Ok(fix) = ambiguity::resolve(state, config, &epoch.ambiguity_candidates) {
            ar_ratio = fix.ratio;
            if fix.fixed {
                quality = SolutionQuality::Fix;
                if config.fix_and_hold {
                    let pairs = ambiguity::build_dd_transform(state, config, &epoch.ambiguity_candidates);
                    let _ = ambiguity::apply_fix_and_hold(state, config, &pairs);
                }
            }
        }
    }

    state.prev_time = Some(epoch.time);

    let used = measurement.map(|r| r.satellites_used.len() as u32).unwrap_or(0);
    solution_from_state(state, epoch.time, quality, used, ar_ratio)
}

/// Forward mode: initialise the filter fresh and iterate epochs in order.
pub fn run_forward(epochs: &[EpochInput], config: &Config) -> Vec<Solution> {
    let mut state = new_state(config);
    let mut solutions = Vec::with_capacity(epochs.len());
    for epoch in epochs {
        let dt = state
            .prev_time
            .map(|p| epoch.time.diff_seconds(p))
            .unwrap_or(epoch.nominal_dt_s);
        solutions.push(process_epoch(&mut state, config, epoch, dt));
    }
    solutions
}

/// Backward mode: initialise a fresh filter and iterate epochs in reverse,
/// returning solutions back in chronological order. Time-update deltas come
/// out negative naturally since each step differences against the
/// chronologically *later* previous epoch.
pub fn run_backward(epochs: &[EpochInput], config: &Config) -> Vec<Solution> {
    let mut state = new_state(config);
    let mut solutions = Vec::with_capacity(epochs.len());
    for epoch in epochs.iter().rev() {
        let dt = state
            .prev_time
            .map(|p| epoch.time.diff_seconds(p))
            .unwrap_or(-epoch.nominal_dt_s);
        solutions.push(process_epoch(&mut state, config, epoch, dt));
    }
    solutions.reverse();
    solutions
}

/// Two-filter smoother (section 4.I): fuses the forward and backward
/// solution sets epoch-by-epoch. `forward` and `backward` must already be
/// the same length, in chronological order, one entry per epoch.
pub fn smooth(forward: &[Solution], backward: &[Solution]) -> Vec<Solution> {
    forward
        .iter()
        .zip(backward.iter())
        .map(|(f, b)| smooth_one(f, b))
        .collect()
}

fn smooth_one(f: &Solution, b: &Solution) -> Solution {
    if f.quality == SolutionQuality::None {
        return b.clone();
    }
    if b.quality == SolutionQuality::None {
        return f.clone();
    }

    let qf = position_covariance(f);
    let qb = position_covariance(b);
    let (qf_inv, qb_inv) = match (crate::linalg::sym_inverse(&qf), crate::linalg::sym_inverse(&qb)) {
        (Ok(a), Ok(c)) => (a, c),
        _ => {
            // Degenerate covariance on either side: fall back to whichever
            // solution ranks higher rather than fusing.
            return if f.quality.priority_rank() <= b.quality.priority_rank() { f.clone() } else { b.clone() };
        }
    };

    let q_s_inv = &qf_inv + &qb_inv;
    let q_s = match crate::linalg::sym_inverse(&q_s_inv) {
        Ok(m) => m,
        Err(_) => return if f.quality.priority_rank() <= b.quality.priority_rank() { f.clone() } else { b.clone() },
    };

    let xf = DVector::from_row_slice(&f.position_ecef_m);
    let xb = DVector::from_row_slice(&b.position_ecef_m);
    let x_s = &q_s * (&qf_inv * &xf + &qb_inv * &xb);

    let diff = &xf - &xb;
    let sum_var = &qf + &qb;
    let either_fix = f.quality == SolutionQuality::Fix || b.quality == SolutionQuality::Fix;
    let disagrees = (0..3).any(|k| diff[k].abs() > 4.0 * sum_var[(k, k)].max(0.0).sqrt());

    let quality = if either_fix {
        if disagrees {
            SolutionQuality::Float
        } else {
            SolutionQuality::Fix
        }
    } else if f.quality.priority_rank() <= b.quality.priority_rank() {
        f.quality
    } else {
        b.quality
    };

    Solution {
        time: f.time,
        position_ecef_m: [x_s[0], x_s[1], x_s[2]],
        quality,
        satellite_count: f.satellite_count.max(b.satellite_count),
        sigma_diag: [q_s[(0, 0)], q_s[(1, 1)], q_s[(2, 2)]],
        sigma_offdiag: [q_s[(0, 1)], q_s[(1, 2)], q_s[(2, 0)]],
        age_of_differential_s: f.age_of_differential_s.min(b.age_of_differential_s),
        ar_ratio: f.ar_ratio.max(b.ar_ratio),
        dop: f.dop,
        satellites: f.satellites.clone(),
    }
}

/// Static-solution collapse (section 4.I): keeps only the single
/// highest-quality sample in the window, per the FIX > FLOAT > DGPS > SBAS >
/// SINGLE priority table.
pub fn collapse_to_static(solutions: &[Solution]) -> Option<Solution> {
    solutions.iter().min_by_key(|s| s.quality.priority_rank()).cloned()
}

/// Runs a full multi-session post-processing pass: partitions `[ts, te]`
/// into `tu`-second windows, pulls epochs from `source`, runs the
/// configured direction, and optionally collapses each window to its best
/// solution.
pub fn run_session<S: EpochSource>(
    source: &mut S,
    config: &Config,
    ts: Instant,
    te: Instant,
    tu_s: f64,
    static_solution: bool,
) -> Result<Vec<Solution>> {
    let mut all_solutions = Vec::new();

    for window in partition_windows(ts, te, tu_s) {
        if source.should_abort() {
            return Err(crate::error::Error::AbortedBySignal);
        }

        let epochs = source.epochs(window)?;
        if epochs.is_empty() {
            continue;
        }

        let window_solutions = match config.direction {
            ProcessingDirection::Forward => run_forward(&epochs, config),
            ProcessingDirection::Backward => run_backward(&epochs, config),
            ProcessingDirection::Combined => {
                let forward = run_forward(&epochs, config);
                let backward = run_backward(&epochs, config);
                smooth(&forward, &backward)
            }
        };

        if static_solution {
            if let Some(best) = collapse_to_static(&window_solutions) {
                all_solutions.push(best);
            }
        } else {
            all_solutions.extend(window_solutions);
        }
    }

    Ok(all_solutions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Instant;

    #[test]
    fn partitions_cover_the_full_span() {
        let ts = Instant::new(0, 0.0);
        let te = Instant::new(3600, 0.0);
        let windows = partition_windows(ts, te, 900.0);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].0, ts);
        assert_eq!(windows.last().unwrap().1, te);
    }

    #[test]
    fn single_window_when_tu_is_non_positive() {
        let ts = Instant::new(0, 0.0);
        let te = Instant::new(100, 0.0);
        let windows = partition_windows(ts, te, 0.0);
        assert_eq!(windows, vec![(ts, te)]);
    }

    #[test]
    fn expands_date_and_marker_keywords() {
        let t = Instant::from_gpst_epoch(hifitime::Epoch::from_gregorian_utc_at_midnight(2024, 3, 5));
        let expanded = expand_filename("%Y%m%d_%r.obs", t, "ROVR", "BASE");
        assert_eq!(expanded, "20240305_ROVR.obs");
    }

    #[test]
    fn static_collapse_picks_the_fix() {
        let t = Instant::new(0, 0.0);
        let solutions = vec![
            Solution { quality: SolutionQuality::Single, ..Solution::none_at(t) },
            Solution { quality: SolutionQuality::Fix, ..Solution::none_at(t) },
            Solution { quality: SolutionQuality::Float, ..Solution::none_at(t) },
        ];
        let best = collapse_to_static(&solutions).unwrap();
        assert_eq!(best.quality, SolutionQuality::Fix);
    }

    #[test]
    fn smooth_prefers_fix_when_both_agree() {
        let t = Instant::new(0, 0.0);
        let mut f = Solution::none_at(t);
        f.quality = SolutionQuality::Fix;
        f.position_ecef_m = [100.0, 200.0, 300.0];
        f.sigma_diag = [0.01, 0.01, 0.01];
        let mut b = Solution::none_at(t);
        b.quality = SolutionQuality::Fix;
        b.position_ecef_m = [100.01, 200.01, 300.01];
        b.sigma_diag = [0.01, 0.01, 0.01];

        let s = smooth_one(&f, &b);
        assert_eq!(s.quality, SolutionQuality::Fix);
    }

    #[test]
    fn smooth_degrades_to_float_on_disagreement() {
        let t = Instant::new(0, 0.0);
        let mut f = Solution::none_at(t);
        f.quality = SolutionQuality::Fix;
        f.position_ecef_m = [100.0, 200.0, 300.0];
        f.sigma_diag = [0.0001, 0.0001, 0.0001];
        let mut b = Solution::none_at(t);
        b.quality = SolutionQuality::Fix;
        b.position_ecef_m = [105.0, 200.0, 300.0];
        b.sigma_diag = [0.0001, 0.0001, 0.0001];

        let s = smooth_one(&f, &b);
        assert_eq!(s.quality, SolutionQuality::Float);
    }
}
