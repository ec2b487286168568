//! Solution record and writer (section 6's produced-file formats, plus
//! the supplemented DOP/quality-ordering helpers of SPEC_FULL section 11).

use crate::config::{Config, OutputFormat};
use crate::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solution-quality code. Ordering for the "highest quality wins" rules
/// (static-solution collapse, combined-mode disagreement fallback, section
/// 4.I) is exposed via [`Self::priority_rank`] rather than derived `Ord`,
/// since the RINEX numeric codes assigned below (`single=5, DGPS=4,
/// float=2, fix=1, ...`) don't happen to sort in priority order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolutionQuality {
    None = 0,
    Single = 5,
    Sbas = 3,
    Dgps = 4,
    Float = 2,
    Fix = 1,
    Ppp = 6,
    Dr = 7,
}

impl SolutionQuality {
    /// Priority rank used for the FIX > FLOAT > DGPS > SBAS > SINGLE
    /// ordering; lower is better. `None` always loses.
    pub fn priority_rank(self) -> u8 {
        match self {
            SolutionQuality::Fix => 0,
            SolutionQuality::Float => 1,
            SolutionQuality::Dgps => 2,
            SolutionQuality::Sbas => 3,
            SolutionQuality::Single => 4,
            SolutionQuality::Ppp => 5,
            SolutionQuality::Dr => 6,
            SolutionQuality::None => 7,
        }
    }

    /// The RINEX/NMEA-compatible numeric quality code (section 6).
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Dilution-of-precision family, computed alongside the SPP solution
/// (SPEC_FULL section 11), generalizing
/// `gnss-rtk::estimate::SolverEstimate`'s PDOP/TDOP-only tracking.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dop {
    pub gdop: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub tdop: f64,
}

/// Per-satellite debug bookkeeping exposed on the solution's debug
/// surface (status-file equivalent, SPEC_FULL section 11): elevation and
/// azimuth are kept structured rather than formatted to fixed columns.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SatelliteDebugInfo {
    pub satellite: crate::sat::SatIndex,
    pub elevation_rad: f64,
    pub azimuth_rad: f64,
    pub used_in_fix: bool,
}

/// One emitted position solution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Solution {
    pub time: Instant,
    pub position_ecef_m: [f64; 3],
    pub quality: SolutionQuality,
    pub satellite_count: u32,
    /// Diagonal of the position covariance (m^2).
    pub sigma_diag: [f64; 3],
    /// Off-diagonal terms of the position covariance (m^2): xy, yz, zx.
    pub sigma_offdiag: [f64; 3],
    pub age_of_differential_s: f64,
    pub ar_ratio: f64,
    pub dop: Dop,
    pub satellites: Vec<SatelliteDebugInfo>,
}

impl Solution {
    pub fn none_at(time: Instant) -> Self {
        Self {
            time,
            position_ecef_m: [0.0; 3],
            quality: SolutionQuality::None,
            satellite_count: 0,
            sigma_diag: [0.0; 3],
            sigma_offdiag: [0.0; 3],
            age_of_differential_s: 0.0,
            ar_ratio: 0.0,
            dop: Dop::default(),
            satellites: Vec::new(),
        }
    }
}

/// ECEF -> geodetic (lat, lon rad, height m) via an iterative Bowring-style
/// solve, following the WGS84 constants shared with the evaluator.
pub fn ecef_to_geodetic(ecef: [f64; 3]) -> (f64, f64, f64) {
    use crate::constants::{FE_WGS84, RE_WGS84};
    let [x, y, z] = ecef;
    let a = RE_WGS84;
    let f = FE_WGS84;
    let e2 = f * (2.0 - f);

    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();
    let mut lat = z.atan2(p * (1.0 - e2));
    let mut height = 0.0;
    for _ in 0..10 {
        let sin_lat = lat.sin();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        height = p / lat.cos() - n;
        lat = (z / p) .atan2(1.0 - e2 * n / (n + height));
    }
    (lat, lon, height)
}

/// Geodetic -> ECEF, inverse of [`ecef_to_geodetic`].
pub fn geodetic_to_ecef(lat_rad: f64, lon_rad: f64, height_m: f64) -> [f64; 3] {
    use crate::constants::{FE_WGS84, RE_WGS84};
    let a = RE_WGS84;
    let f = FE_WGS84;
    let e2 = f * (2.0 - f);
    let sin_lat = lat_rad.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    [
        (n + height_m) * lat_rad.cos() * lon_rad.cos(),
        (n + height_m) * lat_rad.cos() * lon_rad.sin(),
        (n * (1.0 - e2) + height_m) * sin_lat,
    ]
}

/// ECEF -> local ENU, relative to an origin geodetic position.
pub fn ecef_to_enu(ecef: [f64; 3], origin_ecef: [f64; 3]) -> [f64; 3] {
    let (lat, lon, _) = ecef_to_geodetic(origin_ecef);
    let dx = ecef[0] - origin_ecef[0];
    let dy = ecef[1] - origin_ecef[1];
    let dz = ecef[2] - origin_ecef[2];

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let e = -sin_lon * dx + cos_lon * dy;
    let n = -sin_lat * cos_lon * dx - sin_lat * sin_lon * dy + cos_lat * dz;
    let u = cos_lat * cos_lon * dx + cos_lat * sin_lon * dy + sin_lat * dz;

    [e, n, u]
}

/// Formats a solution as one text record per [`Config::output_format`].
/// Does not attempt bit-perfect legacy status-file column layout (an
/// explicit non-goal); this returns a single delimited line for
/// LLH/XYZ/ENU/NMEA formats and a multi-field debug line for `Status`.
pub fn format_solution(solution: &Solution, config: &Config) -> String {
    let sep = &config.separator;
    let decimals = config.decimals as usize;

    match config.output_format {
        OutputFormat::Xyz => format!(
            "{}{sep}{:.*}{sep}{:.*}{sep}{:.*}{sep}{}{sep}{}",
            solution.time.whole_seconds,
            decimals,
            solution.position_ecef_m[0],
            decimals,
            solution.position_ecef_m[1],
            decimals,
            solution.position_ecef_m[2],
            solution.quality.code(),
            solution.satellite_count,
        ),
        OutputFormat::Llh => {
            let (lat, lon, h) = ecef_to_geodetic(solution.position_ecef_m);
            format!(
                "{}{sep}{:.*}{sep}{:.*}{sep}{:.*}{sep}{}{sep}{}",
                solution.time.whole_seconds,
                decimals,
                lat.to_degrees(),
                decimals,
                lon.to_degrees(),
                decimals,
                h,
                solution.quality.code(),
                solution.satellite_count,
            )
        }
        OutputFormat::Enu => {
            format!(
                "{}{sep}{:.*}{sep}{:.*}{sep}{:.*}",
                solution.time.whole_seconds,
                decimals,
                solution.position_ecef_m[0],
                decimals,
                solution.position_ecef_m[1],
                decimals,
                solution.position_ecef_m[2],
            )
        }
        OutputFormat::Nmea => format_nmea_gga(solution),
        OutputFormat::Status => format!(
            "{} quality={:?} nsat={} pdop={:.2} ratio={:.2}",
            solution.time.whole_seconds,
            solution.quality,
            solution.satellite_count,
            solution.dop.pdop,
            solution.ar_ratio,
        ),
    }
}

fn format_nmea_gga(solution: &Solution) -> String {
    let (lat, lon, h) = ecef_to_geodetic(solution.position_ecef_m);
    let lat_deg = lat.to_degrees().abs();
    let lon_deg = lon.to_degrees().abs();
    let lat_min = (lat_deg.fract()) * 60.0;
    let lon_min = (lon_deg.fract()) * 60.0;
    let ns = if lat >= 0.0 { 'N' } else { 'S' };
    let ew = if lon >= 0.0 { 'E' } else { 'W' };

    let fix_quality = match solution.quality {
        SolutionQuality::Fix => 4,
        SolutionQuality::Float => 5,
        SolutionQuality::Dgps => 2,
        SolutionQuality::Single => 1,
        _ => 0,
    };

    let body = format!(
        "GPGGA,{:06},{:02}{:07.4},{},{:03}{:07.4},{},{},{:02},{:.1},{:.2},M,0.0,M,,",
        solution.time.whole_seconds.rem_euclid(240_000),
        lat_deg.floor() as u32,
        lat_min,
        ns,
        lon_deg.floor() as u32,
        lon_min,
        ew,
        fix_quality,
        solution.satellite_count,
        solution.dop.hdop,
        h,
    );
    let checksum = nmea_checksum(&body);
    format!("${body}*{checksum:02X}")
}

fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geodetic_roundtrip() {
        let ecef = geodetic_to_ecef(45.0_f64.to_radians(), -75.0_f64.to_radians(), 123.0);
        let (lat, lon, h) = ecef_to_geodetic(ecef);
        assert!((lat.to_degrees() - 45.0).abs() < 1e-6);
        assert!((lon.to_degrees() - (-75.0)).abs() < 1e-6);
        assert!((h - 123.0).abs() < 1e-3);
    }

    #[test]
    fn quality_priority_orders_fix_above_float() {
        assert!(SolutionQuality::Fix.priority_rank() < SolutionQuality::Float.priority_rank());
        assert!(SolutionQuality::Float.priority_rank() < SolutionQuality::Dgps.priority_rank());
        assert!(SolutionQuality::Single.priority_rank() > SolutionQuality::Sbas.priority_rank());
    }

    #[test]
    fn enu_of_origin_is_zero() {
        let origin = geodetic_to_ecef(10.0_f64.to_radians(), 20.0_f64.to_radians(), 0.0);
        let enu = ecef_to_enu(origin, origin);
        for v in enu {
            assert!(v.abs() < 1e-6);
        }
    }
}
