//! Precise-ephemeris and precise-clock sample tables (SP3/CLK products).

use crate::sat::SatIndex;
use crate::time::Instant;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One satellite's position/clock at a precise-orbit sample epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreciseSatState {
    pub position_m: [f64; 3],
    pub clock_bias_s: f64,
    pub position_std_m: [f64; 3],
    pub clock_std_s: f64,
    pub velocity_m_s: Option<[f64; 3]>,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreciseOrbitSample {
    pub time: Instant,
    pub satellites: HashMap<SatIndex, PreciseSatState>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreciseClockEntry {
    pub bias_s: f64,
    pub std_s: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreciseClockSample {
    pub time: Instant,
    pub satellites: HashMap<SatIndex, PreciseClockEntry>,
}

/// Copies non-zero per-satellite fields from `newer` into `earlier`,
/// preferring newly-loaded values for the merged (identical-timestamp)
/// sample, per `combine_precise()`.
pub fn merge_orbit_sample(earlier: &mut PreciseOrbitSample, newer: &PreciseOrbitSample) {
    for (sat, state) in &newer.satellites {
        let is_nonzero = state.position_m.iter().any(|v| *v != 0.0);
        if is_nonzero {
            earlier.satellites.insert(*sat, *state);
        }
    }
}

pub fn merge_clock_sample(earlier: &mut PreciseClockSample, newer: &PreciseClockSample) {
    for (sat, entry) in &newer.satellites {
        if entry.bias_s != 0.0 {
            earlier.satellites.insert(*sat, *entry);
        }
    }
}

/// Position sentinel SP3 uses to mark an absent sample; must be dropped
/// rather than stored, per the SP3 decoder rule.
pub const SP3_POSITION_SENTINEL: f64 = 999_999.999_999;

pub fn is_sp3_sentinel(v: f64) -> bool {
    (v - SP3_POSITION_SENTINEL).abs() < 1e-3 || (v + SP3_POSITION_SENTINEL).abs() < 1e-3
}
