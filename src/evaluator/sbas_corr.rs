//! SBAS fast + long-term correction application (section 4.D).

use super::SatState;
use crate::sat::SatIndex;
use crate::store::Context;
use crate::time::Instant;

/// Maximum age (in units of the correction broadcast interval) beyond
/// which a fast correction's range-rate-correction term is no longer
/// trusted.
const FAST_CORR_MAX_AGE_INTERVALS: f64 = 8.0;

/// Nominal SBAS fast-correction broadcast interval (seconds), used to age
/// out the range-rate-correction term.
const NOMINAL_FAST_CORR_INTERVAL_S: f64 = 6.0;

pub fn apply(ctx: &Context, time: Instant, satellite: SatIndex, state: &mut SatState) {
    if let Some(corr) = ctx.sbas_corrections.get(&(satellite.0 as u16)) {
        apply_decoded(time, corr, NOMINAL_FAST_CORR_INTERVAL_S, state);
    }
}

/// Applies a decoded [`crate::store::sbas::SbasCorrectionState`] to a
/// satellite state in place, per the long-term + fast correction formulas:
/// `long-term = dpos + dvel*(t-t0), daf0 + daf1*(t-t0)`;
/// `fast = prc + rrc*(t-t_fc)` when the correction's age is within the
/// trusted window.
pub fn apply_decoded(
    time: Instant,
    corr: &crate::store::sbas::SbasCorrectionState,
    nominal_interval_s: f64,
    state: &mut SatState,
) {
    if let Some(t0) = corr.t0 {
        let dt = time.diff_seconds(t0);
        for i in 0..3 {
            state.position_m[i] += corr.dpos[i] + corr.dvel[i] * dt;
        }
        state.clock_bias_s += corr.daf0 + corr.daf1 * dt;
    }

    if let Some(t_fc) = corr.t_fc {
        let dt = time.diff_seconds(t_fc);
        let age_intervals = if nominal_interval_s > 0.0 {
            dt.abs() / nominal_interval_s
        } else {
            f64::INFINITY
        };
        if age_intervals <= FAST_CORR_MAX_AGE_INTERVALS {
            state.clock_bias_s += corr.prc + corr.rrc * dt;
        }
    }

    let degradation_ai = 0.0; // conservative default absent an explicit degradation-factor table
    let udre_var = udre_to_variance(corr.udre);
    state.variance_m2 += udre_var + degradation_ai * 0.0;
}

fn udre_to_variance(udre_index: u8) -> f64 {
    // Standard UDRE index -> sigma^2 (m^2) table (WAAS MOPS).
    const TABLE: [f64; 16] = [
        0.0520, 0.0924, 0.1444, 0.2830, 0.4678, 0.8315, 1.2992, 1.8709, 2.5465, 3.3260, 5.1968,
        20.7870, 230.9661, 2078.695, 0.0, 0.0,
    ];
    TABLE.get(udre_index as usize).copied().unwrap_or(20.0)
}
