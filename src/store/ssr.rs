//! RTCM 3 SSR correction storage.
//!
//! Bit-level RTCM3 decode is explicitly out of scope (section 1): this
//! module only defines the shape an external decoder hands updates in
//! through, and the [`SsrSource`] trait contract the satellite-state
//! evaluator consumes it via (section 6's "external collaborator").

use crate::sat::SatIndex;
use crate::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrbitCorrection {
    /// Radial/along-track/cross-track correction (m).
    pub radial_along_cross_m: [f64; 3],
    pub radial_along_cross_rate_m_s: [f64; 3],
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockCorrection {
    /// Polynomial coefficients c0 (m), c1 (m/s), c2 (m/s^2).
    pub coefficients: [f64; 3],
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SsrCorrection {
    pub satellite: SatIndex,
    /// The broadcast IODE this correction is bound to; applied only when
    /// the currently-selected broadcast ephemeris matches.
    pub iode: i32,
    pub t0: Instant,
    pub validity_s: f64,
    pub orbit: OrbitCorrection,
    pub clock: ClockCorrection,
    /// Per-frequency-slot code bias (m).
    pub code_bias_m: Vec<f64>,
    /// Per-frequency-slot phase bias (m).
    pub phase_bias_m: Vec<f64>,
    pub udre: u8,
}

impl SsrCorrection {
    pub fn is_valid_at(&self, t: Instant) -> bool {
        let dt = t.diff_seconds(self.t0);
        (0.0..=self.validity_s).contains(&dt)
    }

    /// Clock correction (m) at time `t`, evaluated as a polynomial in
    /// `t - t0`.
    pub fn clock_correction_m(&self, t: Instant) -> f64 {
        let dt = t.diff_seconds(self.t0);
        let [c0, c1, c2] = self.clock.coefficients;
        c0 + c1 * dt + c2 * dt * dt
    }
}

/// Contract an external RTCM3 SSR decoder exposes to the core: surface
/// per-satellite SSR updates with IOD binding and validity times. The core
/// never parses RTCM3 bytes itself.
pub trait SsrSource {
    /// Returns the next decoded SSR update, if any is pending, without
    /// blocking.
    fn poll_update(&mut self) -> Option<SsrCorrection>;
}
