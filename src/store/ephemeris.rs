//! Broadcast ephemeris record, grounded on
//! `rinex::navigation::ephemeris::Ephemeris` (its clock polynomial +
//! keyed-orbit-parameter-map shape, `toe()`/`clock_correction()` methods)
//! but reshaped to the spec's explicit field layout rather than a generic
//! string-keyed bag, since the RTK core needs direct field access inside
//! the hot satellite-state evaluator loop.

use crate::sat::SatIndex;
use crate::time::Instant;
use gnss_rs::prelude::Constellation;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clock polynomial shared by every constellation's broadcast ephemeris.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockPolynomial {
    pub bias: f64,
    pub drift: f64,
    pub drift_rate: f64,
}

/// Keplerian broadcast ephemeris (GPS/Galileo/BeiDou/QZSS/IRNSS shape).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeplerianOrbit {
    pub sqrt_a: f64,
    pub e: f64,
    pub i0: f64,
    pub idot: f64,
    pub omega0: f64,
    pub omega_dot: f64,
    pub omega: f64,
    pub m0: f64,
    pub delta_n: f64,
    pub cuc: f64,
    pub cus: f64,
    pub crc: f64,
    pub crs: f64,
    pub cic: f64,
    pub cis: f64,
}

/// GLONASS / SBAS state-vector broadcast record (position, velocity,
/// acceleration in PZ-90/WGS84, per section 3's "separate record types
/// with the same container shape").
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateVectorOrbit {
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub accel: [f64; 3],
    /// GLONASS frequency channel number; unused for SBAS.
    pub freq_num: i8,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrbitModel {
    Keplerian(KeplerianOrbit),
    StateVector(StateVectorOrbit),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadcastEphemeris {
    pub satellite: SatIndex,
    pub constellation: Constellation,
    pub clock: ClockPolynomial,
    pub orbit: OrbitModel,
    /// Issue of data, ephemeris.
    pub iode: i32,
    /// Issue of data, clock.
    pub iodc: i32,
    /// Group delay(s): TGD (single-frequency) or BGD (dual).
    pub tgd: [f64; 2],
    pub week: u32,
    pub health: u32,
    pub toe: Instant,
    pub toc: Instant,
    /// Transmission time.
    pub ttr: Instant,
    pub ura: f64,
}

impl BroadcastEphemeris {
    /// Satellite clock correction via Newton iteration on the clock
    /// polynomial, converging on `dt` such that
    /// `dt = a0 + a1*dt + a2*dt^2` evaluated at `t - toc`.
    pub fn clock_correction(&self, t: Instant, max_iter: usize) -> f64 {
        let (a0, a1, a2) = (self.clock.bias, self.clock.drift, self.clock.drift_rate);
        let mut dt = t.diff_seconds(self.toc);
        for _ in 0..max_iter {
            dt -= a0 + a1 * dt + a2 * dt * dt;
        }
        a0 + a1 * dt + a2 * dt * dt
    }

    /// Ephemeris validity window for this constellation (section 3/4.D).
    pub fn validity_seconds(constellation: Constellation) -> Option<f64> {
        match constellation {
            Constellation::GPS | Constellation::QZSS => Some(7200.0),
            Constellation::Galileo => Some(10800.0),
            Constellation::BeiDou => Some(21600.0),
            Constellation::IRNSS => Some(7200.0),
            Constellation::Glonass => Some(1800.0),
            c if c.is_sbas() => Some(86400.0),
            _ => None,
        }
    }

    pub fn is_valid(&self, t: Instant) -> bool {
        match Self::validity_seconds(self.constellation) {
            Some(max_dtoe) => {
                let dt = t.diff_seconds(self.toe);
                dt.abs() < max_dtoe
            }
            None => false,
        }
    }
}
