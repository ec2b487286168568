//! Time primitives: a two-part [`Instant`] representation plus the
//! GPST/UTC/BDT/GLONASST handling the observation and navigation parsers
//! need.
//!
//! Calendar and time-scale arithmetic is delegated to [`hifitime`], the way
//! the broadcast-ephemeris code grounds its own `toe`/`toc` handling on
//! `hifitime::{Epoch, Duration, TimeScale}`. [`Instant`] adds the
//! second/fractional-second split the filter's long-arc numerics require:
//! naive single-`f64`-seconds-since-epoch storage loses sub-nanosecond
//! precision once the whole-seconds count grows past a few million.

use hifitime::{Duration, Epoch, TimeScale};
use std::cmp::Ordering;
use std::ops::{Add, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Seconds in a GPS week.
pub const SECONDS_PER_WEEK: f64 = 604_800.0;
/// Seconds in a day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// A point in time, stored as whole seconds since the GPST epoch
/// (1980-01-06T00:00:00 GPST) plus a fractional remainder in `[0, 1)`.
///
/// The split keeps addition and subtraction exact to double precision even
/// after decades of whole seconds have accumulated, which a single `f64`
/// "seconds since epoch" cannot guarantee.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Instant {
    pub whole_seconds: i64,
    pub fractional: f64,
}

impl Instant {
    /// Builds an [`Instant`], renormalising so `fractional` lands in `[0, 1)`.
    pub fn new(whole_seconds: i64, fractional: f64) -> Self {
        let mut s = whole_seconds;
        let mut f = fractional;
        if !f.is_finite() {
            f = 0.0;
        }
        let carry = f.floor();
        s += carry as i64;
        f -= carry;
        Self {
            whole_seconds: s,
            fractional: f,
        }
    }

    pub fn from_gpst_epoch(epoch: Epoch) -> Self {
        let gpst = epoch.to_time_scale(TimeScale::GPST);
        let total = gpst.to_gpst_seconds();
        let whole = total.floor();
        Self::new(whole as i64, total - whole)
    }

    pub fn to_gpst_epoch(self) -> Epoch {
        Epoch::from_gpst_seconds(self.whole_seconds as f64 + self.fractional)
    }

    /// Adds a real-valued delta (seconds), splitting into whole + fractional
    /// parts before combining so that large whole-second counts don't
    /// swallow sub-second precision.
    pub fn add_seconds(self, delta: f64) -> Self {
        let delta_whole = delta.floor();
        let delta_frac = delta - delta_whole;
        Self::new(
            self.whole_seconds + delta_whole as i64,
            self.fractional + delta_frac,
        )
    }

    /// Returns `self - other` as a real number of seconds. Exact for deltas
    /// up to +/- 2^31 seconds (~68 years), per the whole-seconds difference
    /// fitting in an f64 mantissa alongside the fractional remainder.
    pub fn diff_seconds(self, other: Instant) -> f64 {
        (self.whole_seconds - other.whole_seconds) as f64 + (self.fractional - other.fractional)
    }

    /// Week-handover adjustment: snaps `self` by +/- one week if it differs
    /// from `reference` by more than half a week. Used when a time-of-week
    /// field must be reinterpreted close to a reference epoch (e.g. toe/ttr
    /// vs toc).
    pub fn week_handover(self, reference: Instant) -> Self {
        let dt = self.diff_seconds(reference);
        if dt > SECONDS_PER_WEEK / 2.0 {
            self.add_seconds(-SECONDS_PER_WEEK)
        } else if dt < -SECONDS_PER_WEEK / 2.0 {
            self.add_seconds(SECONDS_PER_WEEK)
        } else {
            self
        }
    }

    /// Day-handover adjustment (used by BeiDou/SBAS time fields that wrap
    /// daily rather than weekly).
    pub fn day_handover(self, reference: Instant) -> Self {
        let dt = self.diff_seconds(reference);
        if dt > SECONDS_PER_DAY / 2.0 {
            self.add_seconds(-SECONDS_PER_DAY)
        } else if dt < -SECONDS_PER_DAY / 2.0 {
            self.add_seconds(SECONDS_PER_DAY)
        } else {
            self
        }
    }
}

impl Add<f64> for Instant {
    type Output = Instant;
    fn add(self, rhs: f64) -> Instant {
        self.add_seconds(rhs)
    }
}

impl Sub for Instant {
    type Output = f64;
    fn sub(self, rhs: Instant) -> f64 {
        self.diff_seconds(rhs)
    }
}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let dt = self.diff_seconds(*other);
        if dt > 0.0 {
            Some(Ordering::Greater)
        } else if dt < 0.0 {
            Some(Ordering::Less)
        } else {
            Some(Ordering::Equal)
        }
    }
}

/// Resolves a raw time-of-week field plus week counter, snapped onto the
/// same week as `toc`, into an [`Instant`] in GPST. Used for toe/ttr
/// resolution in the NAV decoder (section 4.C).
pub fn toe_from_week_tow(week: u32, tow: f64, toc: Instant) -> Instant {
    let week_dur = Duration::from_days((week * 7) as f64);
    let tow_dur = Duration::from_seconds(tow);
    let epoch = Epoch::from_duration(week_dur + tow_dur, TimeScale::GPST);
    Instant::from_gpst_epoch(epoch).week_handover(toc)
}

/// Converts a BeiDou time-of-week (BDT) reading into GPST, matching the
/// "for BDS, first convert toc from BDT to GPST" NAV-decoder rule.
pub fn bdt_to_gpst(week: u32, tow: f64) -> Instant {
    let week_dur = Duration::from_days((week * 7) as f64);
    let tow_dur = Duration::from_seconds(tow);
    let epoch = Epoch::from_bdt_duration(week_dur + tow_dur).to_time_scale(TimeScale::GPST);
    Instant::from_gpst_epoch(epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renormalises_fractional_overflow() {
        let t = Instant::new(100, 1.5);
        assert_eq!(t.whole_seconds, 101);
        assert!((t.fractional - 0.5).abs() < 1e-12);
    }

    #[test]
    fn renormalises_negative_fractional() {
        let t = Instant::new(100, -0.25);
        assert_eq!(t.whole_seconds, 99);
        assert!((t.fractional - 0.75).abs() < 1e-12);
    }

    #[test]
    fn diff_is_exact_for_large_whole_seconds() {
        let a = Instant::new(1_600_000_000, 0.25);
        let b = a.add_seconds(30.5);
        assert!((b.diff_seconds(a) - 30.5).abs() < 1e-9);
    }

    #[test]
    fn week_handover_snaps_by_one_week() {
        let reference = Instant::new(1_000_000, 0.0);
        let drifted = reference.add_seconds(SECONDS_PER_WEEK - 100.0);
        let snapped = drifted.week_handover(reference);
        assert!(snapped.diff_seconds(reference).abs() < 200.0);
    }

    #[test]
    fn day_handover_snaps_by_one_day() {
        let reference = Instant::new(1_000_000, 0.0);
        let drifted = reference.add_seconds(-(SECONDS_PER_DAY - 50.0));
        let snapped = drifted.day_handover(reference);
        assert!(snapped.diff_seconds(reference).abs() < 100.0);
    }
}
