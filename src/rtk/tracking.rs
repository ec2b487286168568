//! Per-satellite tracking bookkeeping carried across epochs: elevation and
//! azimuth, validity flags, geometry-free history for cycle-slip
//! detection, and the lock/outage/reject counters the filter and
//! ambiguity resolver read and write.

use crate::constants::NFREQ;

/// Per-frequency tracking detail for one satellite.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FrequencyTrack {
    /// Geometry-free combination (L1 - L2 style) from the previous epoch,
    /// in metres; `None` until two frequencies have been observed once.
    pub geometry_free_prev_m: Option<f64>,
    /// Consecutive epochs without an accepted observation on this
    /// frequency.
    pub outage_count: u32,
    /// Consecutive epochs since the last cycle slip or bias reset;
    /// negative values are the "staggered" lock used by partial-fix
    /// retries (section 4.H).
    pub lock_count: i32,
    /// Consecutive pre-fit outlier rejections on this frequency.
    pub reject_count: u32,
    /// Doppler-minus-phase-difference from the previous epoch (m/s),
    /// used for the per-epoch-mean deviation slip test.
    pub doppler_phase_diff_prev: Option<f64>,
}

/// Everything the filter and ambiguity resolver track for one satellite
/// across the life of a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingRecord {
    pub elevation_rad: f64,
    pub azimuth_rad: f64,
    /// Valid (used in this epoch's geometry) at the rover.
    pub valid_rover: bool,
    /// Valid at the base.
    pub valid_base: bool,
    pub frequencies: [FrequencyTrack; NFREQ],
    /// GLONASS/SBAS inter-channel (frequency-dependent) hardware bias
    /// estimate, metres; fed by fix-and-hold's ICB move (section 4.H) and
    /// re-initialised to the post-fix value after a hold.
    pub inter_channel_bias_m: f64,
}

impl TrackingRecord {
    /// A cycle slip or outage severe enough to force a phase-bias reset,
    /// per section 4.G's time-update rule: an LLI slip bit at either end,
    /// a geometry-free jump past `gf_threshold_m`, a doppler-phase
    /// deviation past `doppler_threshold`, an outage past `max_outage`, or
    /// two or more consecutive pre-fit rejects.
    #[allow(clippy::too_many_arguments)]
    pub fn should_reset_bias(
        &self,
        freq: usize,
        lli_slip_rover: bool,
        lli_slip_base: bool,
        geometry_free_now_m: Option<f64>,
        gf_threshold_m: f64,
        doppler_phase_diff_now: Option<f64>,
        epoch_mean_doppler_phase_diff: f64,
        doppler_threshold: f64,
        max_outage: u32,
        instant_ar: bool,
    ) -> bool {
        if instant_ar {
            return true;
        }
        if lli_slip_rover || lli_slip_base {
            return true;
        }
        let track = &self.frequencies[freq];
        if let (Some(prev), Some(now)) = (track.geometry_free_prev_m, geometry_free_now_m) {
            if (now - prev).abs() > gf_threshold_m {
                return true;
            }
        }
        if let Some(now) = doppler_phase_diff_now {
            if (now - epoch_mean_doppler_phase_diff).abs() > doppler_threshold {
                return true;
            }
        }
        if track.outage_count > max_outage {
            return true;
        }
        if track.reject_count >= 2 {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slip_bit_forces_reset() {
        let rec = TrackingRecord::default();
        assert!(rec.should_reset_bias(0, true, false, None, 0.05, None, 0.0, 1.0, 10, false));
    }

    #[test]
    fn geometry_free_jump_forces_reset() {
        let mut rec = TrackingRecord::default();
        rec.frequencies[0].geometry_free_prev_m = Some(1.0);
        assert!(rec.should_reset_bias(0, false, false, Some(1.2), 0.05, None, 0.0, 1.0, 10, false));
        assert!(!rec.should_reset_bias(0, false, false, Some(1.01), 0.05, None, 0.0, 1.0, 10, false));
    }

    #[test]
    fn instant_ar_always_resets() {
        let rec = TrackingRecord::default();
        assert!(rec.should_reset_bias(0, false, false, None, 0.05, None, 0.0, 1.0, 10, true));
    }
}
