//! Time update and measurement update for the double-differenced RTK
//! filter (section 4.G).
//!
//! The actual linear algebra (Joseph-form update, index compression) is
//! [`crate::linalg`]'s; this module is the RTK-specific bookkeeping around
//! it: process-noise placement, cycle-slip-triggered bias resets, DD
//! residual/variance construction, and outlier rejection.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::linalg;
use crate::observable::ObservableKind;
use crate::rtk::{RtkState, StateLayout};
use crate::sat::SatIndex;
use gnss_rs::prelude::Constellation;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

/// Per-(satellite, frequency) cycle-slip/outage inputs the caller observed
/// this epoch, feeding the bias-reset decision in [`time_update`].
pub struct SlipInput {
    pub satellite: SatIndex,
    pub freq: usize,
    pub lli_slip_rover: bool,
    pub lli_slip_base: bool,
    pub geometry_free_now_m: Option<f64>,
    pub doppler_phase_diff_now: Option<f64>,
    pub outage_this_epoch: bool,
    /// Initial bias value (SD carrier - SD pseudorange * freq/c, or the
    /// iono-free combination) to seed the state with if it comes out of
    /// this update as zero and a valid SD observation exists.
    pub initial_value: Option<f64>,
}

/// Runs the section 4.G time update: advances dynamics (if enabled),
/// grows process noise on troposphere/ICB/ionosphere/phase-bias blocks,
/// and resets phase-bias states whose tracking indicates a slip.
pub fn time_update(
    state: &mut RtkState,
    config: &Config,
    dt: f64,
    baseline_m: f64,
    slips: &[SlipInput],
) {
    let layout = state.layout;
    let n = layout.total_len();

    if config.enable_dynamics {
        if let (Some(vel_off), Some(acc_off)) = (layout.velocity_offset(), layout.acceleration_offset()) {
            let pos_off = StateLayout::POSITION_OFFSET;
            let mut f = DMatrix::<f64>::identity(n, n);
            for k in 0..3 {
                f[(pos_off + k, vel_off + k)] = dt;
                f[(pos_off + k, acc_off + k)] = dt * dt / 2.0;
                f[(vel_off + k, acc_off + k)] = dt;
            }
            let mut q = DMatrix::<f64>::zeros(n, n);
            let (lat, lon, _) = crate::solution::ecef_to_geodetic(state.position());
            let rot = enu_to_ecef_rotation(lat, lon);
            let sigma2 = config.sigma_accel_mss * config.sigma_accel_mss * dt.abs();
            for i in 0..3 {
                for j in 0..3 {
                    let mut sum = 0.0;
                    for k in 0..3 {
                        sum += rot[i][k] * sigma2 * rot[j][k];
                    }
                    q[(acc_off + i, acc_off + j)] = sum;
                }
            }
            state.x = &f * &state.x;
            state.p = linalg::time_update_cov(&state.p, &f, &q);
        }
    }

    let tropo_idx = layout.tropo_zwd_offset();
    state.p[(tropo_idx, tropo_idx)] += config.sigma_zwd * config.sigma_zwd * dt.abs();
    if let Some(grad_idx) = layout.tropo_gradient_offset() {
        let g_var = (0.3 * config.sigma_zwd).powi(2) * dt.abs();
        state.p[(grad_idx, grad_idx)] += g_var;
        state.p[(grad_idx + 1, grad_idx + 1)] += g_var;
    }

    let tropo_base_idx = layout.tropo_zwd_base_offset();
    state.p[(tropo_base_idx, tropo_base_idx)] += config.sigma_zwd * config.sigma_zwd * dt.abs();
    if let Some(grad_idx) = layout.tropo_gradient_base_offset() {
        let g_var = (0.3 * config.sigma_zwd).powi(2) * dt.abs();
        state.p[(grad_idx, grad_idx)] += g_var;
        state.p[(grad_idx + 1, grad_idx + 1)] += g_var;
    }

    let icb_idx = layout.icb_offset();
    state.p[(icb_idx, icb_idx)] += config.sigma_icb * config.sigma_icb * dt.abs();

    for (&sat, track) in state.tracking.iter_mut() {
        let iono_idx = layout.iono_index(sat);
        let both_out = track.frequencies[0].outage_count as f64 > config.gap_resion_s
            && track.frequencies.get(1).map(|t| t.outage_count as f64 > config.gap_resion_s).unwrap_or(true);
        if both_out {
            state.x[iono_idx] = 0.0;
            state.p.row_mut(iono_idx).fill(0.0);
            state.p.column_mut(iono_idx).fill(0.0);
        } else {
            let sigma = config.sigma_iono * baseline_m / 1e4 * track.elevation_rad.cos();
            state.p[(iono_idx, iono_idx)] += sigma * sigma * dt.abs();
        }
    }

    for slip in slips {
        let Some(track) = state.tracking.get_mut(&slip.satellite) else { continue };
        let freq_track = &mut track.frequencies[slip.freq];
        let epoch_mean = 0.0; // caller-side mean; per-call deviation already folded into doppler_phase_diff_now
        let reset = track.should_reset_bias(
            slip.freq,
            slip.lli_slip_rover,
            slip.lli_slip_base,
            slip.geometry_free_now_m,
            config.gf_jump_threshold_m,
            slip.doppler_phase_diff_now,
            epoch_mean,
            config.doppler_phase_threshold_mps,
            config.max_outage,
            config.instant_ar,
        );

        let idx = layout.phase_bias_index(slip.satellite, slip.freq);
        if reset {
            state.x[idx] = 0.0;
            state.p.row_mut(idx).fill(0.0);
            state.p.column_mut(idx).fill(0.0);
            freq_track.lock_count = 0;
            freq_track.reject_count = 0;
        } else {
            state.p[(idx, idx)] += config.sigma_phase_bias * config.sigma_phase_bias * dt.abs();
        }

        if state.x[idx] == 0.0 {
            if let Some(init) = slip.initial_value {
                state.x[idx] = init;
                state.p[(idx, idx)] = state.p[(idx, idx)].max(1.0);
            }
        }

        if slip.outage_this_epoch {
            freq_track.outage_count += 1;
        } else {
            freq_track.outage_count = 0;
        }
        freq_track.geometry_free_prev_m = slip.geometry_free_now_m.or(freq_track.geometry_free_prev_m);
        freq_track.doppler_phase_diff_prev = slip.doppler_phase_diff_now;
    }
}

/// Inputs to [`sd_variance_m2`]: everything the section 4.G variance model
/// needs about one single-difference observation.
pub struct SdVarianceInputs {
    pub kind: ObservableKind,
    pub constellation: Constellation,
    pub elevation_rover_rad: f64,
    pub snr_rover_dbhz: f64,
    pub snr_base_dbhz: f64,
    pub baseline_m: f64,
    /// Receiver-reported standard deviation at the rover, already
    /// converted to metres (phase cycles times wavelength), if present.
    pub receiver_std_rover_m: Option<f64>,
    /// Same, at the base.
    pub receiver_std_base_m: Option<f64>,
    /// Nominal epoch interval (s), feeding the clock-stability term.
    pub dt_s: f64,
}

/// Section 4.G single-difference measurement-variance model: base +
/// elevation + baseline + SNR + receiver-std + clock-stability terms,
/// scaled by the system/code-or-phase noise factor, following RTKLIB's
/// `varerr`.
pub fn sd_variance_m2(inputs: &SdVarianceInputs, config: &Config) -> f64 {
    let a = config.sigma_err_base_m;
    let b = config.sigma_err_el_m;
    let c = config.sigma_err_baseline_per_1e4;
    let d = config.sigma_err_snr_m;
    let e = config.sigma_err_std_weight;

    let sin_el = inputs.elevation_rover_rad.sin().max(0.05);
    let mut var = a * a + (b / sin_el).powi(2) + 2.0 * (c * inputs.baseline_m / 1e4).powi(2);

    var += d * d
        * (10f64.powf(0.1 * (config.snr_max_dbhz - inputs.snr_rover_dbhz))
            + 10f64.powf(0.1 * (config.snr_max_dbhz - inputs.snr_base_dbhz)));

    let rover_std2 = inputs.receiver_std_rover_m.map(|s| s * s).unwrap_or(0.0);
    let base_std2 = inputs.receiver_std_base_m.map(|s| s * s).unwrap_or(0.0);
    var += e * e * (rover_std2 + base_std2);

    let clk_term = crate::constants::CLIGHT * config.sigma_clk_stability_per_s * inputs.dt_s.abs();
    var += clk_term * clk_term;

    let system_factor = match inputs.constellation {
        Constellation::Glonass => config.system_factor_glonass,
        c if c.is_sbas() => config.system_factor_sbas,
        _ => 1.0,
    };
    let type_ratio = if inputs.kind == ObservableKind::PseudoRange {
        config.code_phase_noise_ratio
    } else {
        1.0
    };
    let scale = system_factor * type_ratio;
    var * scale * scale
}

fn enu_to_ecef_rotation(lat_rad: f64, lon_rad: f64) -> [[f64; 3]; 3] {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();
    // Columns are e, n, u expressed in ECEF; rows indexed by ECEF axis.
    [
        [-sin_lon, -sin_lat * cos_lon, cos_lat * cos_lon],
        [cos_lon, -sin_lat * sin_lon, cos_lat * sin_lon],
        [0.0, cos_lat, sin_lat],
    ]
}

/// One single-difference (rover minus base) residual ready to be grouped
/// into a double difference.
pub struct SdMeasurement {
    pub satellite: SatIndex,
    pub constellation: Constellation,
    pub freq: usize,
    pub frequency_hz: f64,
    pub kind: ObservableKind,
    pub sd_residual_m: f64,
    pub elevation_rover_rad: f64,
    pub slip_free: bool,
    pub variance_m2: f64,
    /// Rover line-of-sight unit vector to the satellite, ECEF.
    pub los_rover: [f64; 3],
    /// Wet-mapping-function value at the rover for this satellite.
    pub wet_mapping: f64,
    /// Wet-mapping-function value at the base for this satellite. Short
    /// baselines share the rover's satellite geometry closely enough that
    /// callers without a separate base sky-state may approximate this with
    /// the rover value; the state estimate stays distinct regardless.
    pub wet_mapping_base: f64,
}

pub struct MeasurementUpdateReport {
    pub satellites_used: Vec<SatIndex>,
    pub rejected: Vec<SatIndex>,
    pub innovation_rms: f64,
}

/// Runs the section 4.G measurement update: groups single differences by
/// (constellation, frequency, kind), double-differences against each
/// group's reference satellite, rejects outliers by pre-fit innovation,
/// compresses to the non-zero-variance state, and applies the Joseph-form
/// Kalman update.
pub fn measurement_update(
    state: &mut RtkState,
    config: &Config,
    sds: &[SdMeasurement],
) -> Result<MeasurementUpdateReport> {
    let layout = state.layout;
    let mut groups: HashMap<(Constellation, usize, ObservableKind), Vec<usize>> = HashMap::new();
    for (i, sd) in sds.iter().enumerate() {
        groups.entry((sd.constellation, sd.freq, sd.kind)).or_default().push(i);
    }

    struct Row {
        residual: f64,
        terms: Vec<(usize, f64)>,
        var_ref: f64,
        var_other: f64,
        group_ref: usize,
        other_local: usize,
    }
    let mut rows: Vec<Row> = Vec::new();

    for ((_, _, kind), members) in &groups {
        if members.len() < 2 {
            continue;
        }
        let ref_local = *members
            .iter()
            .filter(|&&m| sds[m].slip_free)
            .max_by(|&&a, &&b| sds[a].elevation_rover_rad.total_cmp(&sds[b].elevation_rover_rad))
            .unwrap_or_else(|| members.iter().max_by(|&&a, &&b| sds[a].elevation_rover_rad.total_cmp(&sds[b].elevation_rover_rad)).unwrap());

        let reference = &sds[ref_local];
        for &m in members {
            if m == ref_local {
                continue;
            }
            let other = &sds[m];
            let residual = other.sd_residual_m - reference.sd_residual_m;

            let mut terms: Vec<(usize, f64)> = Vec::new();
            for k in 0..3 {
                terms.push((StateLayout::POSITION_OFFSET + k, other.los_rover[k] - reference.los_rover[k]));
            }
            terms.push((layout.tropo_zwd_offset(), other.wet_mapping - reference.wet_mapping));
            terms.push((layout.tropo_zwd_base_offset(), -(other.wet_mapping_base - reference.wet_mapping_base)));

            let freq_ratio_sq = (crate::constants::FREQ_L1 / other.frequency_hz).powi(2);
            let iono_sign = if *kind == ObservableKind::Phase { -1.0 } else { 1.0 };
            terms.push((layout.iono_index(other.satellite), iono_sign * freq_ratio_sq));
            terms.push((layout.iono_index(reference.satellite), -iono_sign * freq_ratio_sq));

            if *kind == ObservableKind::Phase {
                let c_over_f = crate::constants::CLIGHT / other.frequency_hz;
                terms.push((layout.phase_bias_index(reference.satellite, reference.freq), c_over_f));
                terms.push((layout.phase_bias_index(other.satellite, other.freq), -c_over_f));
            }

            rows.push(Row {
                residual,
                terms,
                var_ref: reference.variance_m2,
                var_other: other.variance_m2,
                group_ref: ref_local,
                other_local: m,
            });
        }
    }

    if rows.is_empty() {
        return Err(Error::DataGap("no double-differenced satellite pairs this epoch"));
    }

    let n = layout.total_len();
    let variances: Vec<f64> = (0..n).map(|i| state.p[(i, i)]).collect();
    let compressed_idx = linalg::compress_indices(&variances, StateLayout::POSITION_LEN);
    let compressed_pos: HashMap<usize, usize> = compressed_idx.iter().enumerate().map(|(a, &ia)| (ia, a)).collect();

    let nr = rows.len();
    let nc = compressed_idx.len();
    let mut h = DMatrix::<f64>::zeros(nr, nc);
    let mut y = DVector::<f64>::zeros(nr);
    // R_dd[i,j] = var_ref + (i==j ? var_other_i : 0) within a group; zero
    // across groups (independent measurement types), per section 4.G.
    let mut r = DMatrix::<f64>::zeros(nr, nr);
    for i in 0..nr {
        for j in 0..nr {
            if rows[i].group_ref == rows[j].group_ref {
                r[(i, j)] = rows[i].var_ref + if i == j { rows[i].var_other } else { 0.0 };
            }
        }
    }

    let (xc, pc) = linalg::extract_compressed(&state.x, &state.p, &compressed_idx);

    let mut prefit: Vec<f64> = Vec::with_capacity(nr);
    for (row_i, row) in rows.iter().enumerate() {
        y[row_i] = row.residual;
        let mut predicted = 0.0;
        for &(state_idx, coeff) in &row.terms {
            if let Some(&ci) = compressed_pos.get(&state_idx) {
                h[(row_i, ci)] = coeff;
                predicted += coeff * xc[ci];
            }
        }
        prefit.push(row.residual - predicted);
    }

    let mut used = Vec::new();
    let mut rejected = Vec::new();
    let mut keep_rows = Vec::new();
    for (i, p) in prefit.iter().enumerate() {
        let other = &sds[rows[i].other_local];
        let bias_just_initialised = other.kind == ObservableKind::Phase
            && state.x[layout.phase_bias_index(other.satellite, other.freq)] == 0.0;
        let adj = if bias_just_initialised { config.inno_thresh_init_factor } else { 1.0 };
        if p.abs() > config.inno_thresh * adj {
            rejected.push(other.satellite);
            if let Some(track) = state.tracking.get_mut(&other.satellite) {
                track.frequencies[other.freq].reject_count += 1;
            }
        } else {
            keep_rows.push(i);
            used.push(other.satellite);
        }
    }

    if keep_rows.is_empty() {
        return Err(Error::DataGap("all double differences rejected as outliers"));
    }

    let kept_h = h.select_rows(&keep_rows);
    let kept_y = y.select_rows(&keep_rows);
    let kept_r = r.select_rows(&keep_rows).select_columns(&keep_rows);

    let (xc_new, pc_new, innovation) = linalg::kalman_update(&xc, &pc, &kept_h, &kept_y, &kept_r)?;
    linalg::writeback_compressed(&mut state.x, &mut state.p, &compressed_idx, &xc_new, &pc_new);

    let rms = (innovation.iter().map(|v| v * v).sum::<f64>() / innovation.len().max(1) as f64).sqrt();

    Ok(MeasurementUpdateReport {
        satellites_used: used,
        rejected,
        innovation_rms: rms,
    })
}

/// Appends the optional baseline-length pseudo-measurement (section 4.G).
pub fn apply_baseline_constraint(
    state: &mut RtkState,
    base_position_ecef_m: [f64; 3],
    length_m: f64,
    std_m: f64,
) -> Result<()> {
    let rover = state.position();
    let b = [
        rover[0] - base_position_ecef_m[0],
        rover[1] - base_position_ecef_m[1],
        rover[2] - base_position_ecef_m[2],
    ];
    let norm = (b[0] * b[0] + b[1] * b[1] + b[2] * b[2]).sqrt();
    if norm < 1e-6 {
        return Err(Error::NumericFailure("degenerate baseline for length constraint"));
    }
    let residual = length_m - norm;

    let n = state.layout.total_len();
    let variances: Vec<f64> = (0..n).map(|i| state.p[(i, i)]).collect();
    let compressed_idx = linalg::compress_indices(&variances, StateLayout::POSITION_LEN);
    let compressed_pos: HashMap<usize, usize> = compressed_idx.iter().enumerate().map(|(a, &ia)| (ia, a)).collect();

    let mut h = DMatrix::<f64>::zeros(1, compressed_idx.len());
    for k in 0..3 {
        if let Some(&ci) = compressed_pos.get(&(StateLayout::POSITION_OFFSET + k)) {
            h[(0, ci)] = b[k] / norm;
        }
    }
    let y = DVector::from_vec(vec![residual]);
    let r = DMatrix::from_vec(1, 1, vec![std_m * std_m]);

    let (xc, pc) = linalg::extract_compressed(&state.x, &state.p, &compressed_idx);
    let (xc_new, pc_new, _innov) = linalg::kalman_update(&xc, &pc, &h, &y, &r)?;
    linalg::writeback_compressed(&mut state.x, &mut state.p, &compressed_idx, &xc_new, &pc_new);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtk::StateLayout;

    #[test]
    fn time_update_grows_tropo_variance() {
        let layout = StateLayout::default();
        let mut state = RtkState::new(layout);
        let config = Config::default();
        time_update(&mut state, &config, 1.0, 0.0, &[]);
        assert!(state.p[(layout.tropo_zwd_offset(), layout.tropo_zwd_offset())] > 0.0);
    }

    #[test]
    fn sd_variance_grows_at_low_elevation() {
        let config = Config::default();
        let low = sd_variance_m2(
            &SdVarianceInputs {
                kind: ObservableKind::Phase,
                constellation: Constellation::GPS,
                elevation_rover_rad: 5f64.to_radians(),
                snr_rover_dbhz: 45.0,
                snr_base_dbhz: 45.0,
                baseline_m: 100.0,
                receiver_std_rover_m: None,
                receiver_std_base_m: None,
                dt_s: 1.0,
            },
            &config,
        );
        let high = sd_variance_m2(
            &SdVarianceInputs {
                kind: ObservableKind::Phase,
                constellation: Constellation::GPS,
                elevation_rover_rad: 80f64.to_radians(),
                snr_rover_dbhz: 45.0,
                snr_base_dbhz: 45.0,
                baseline_m: 100.0,
                receiver_std_rover_m: None,
                receiver_std_base_m: None,
                dt_s: 1.0,
            },
            &config,
        );
        assert!(low > high);
    }

    #[test]
    fn sd_variance_inflates_pseudorange_over_phase() {
        let config = Config::default();
        let base_inputs = |kind| SdVarianceInputs {
            kind,
            constellation: Constellation::GPS,
            elevation_rover_rad: 45f64.to_radians(),
            snr_rover_dbhz: 45.0,
            snr_base_dbhz: 45.0,
            baseline_m: 100.0,
            receiver_std_rover_m: None,
            receiver_std_base_m: None,
            dt_s: 1.0,
        };
        let phase_var = sd_variance_m2(&base_inputs(ObservableKind::Phase), &config);
        let code_var = sd_variance_m2(&base_inputs(ObservableKind::PseudoRange), &config);
        assert!(code_var > phase_var);
    }

    #[test]
    fn measurement_update_requires_at_least_two_in_a_group() {
        let layout = StateLayout::default();
        let mut state = RtkState::new(layout);
        for i in 0..6 {
            state.p[(i, i)] = 1.0;
        }
        let sds: Vec<SdMeasurement> = Vec::new();
        assert!(measurement_update(&mut state, &Config::default(), &sds).is_err());
    }
}
