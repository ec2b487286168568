//! IONEX TEC grid storage.

use crate::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense lat/lon/height range description for an IONEX map.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl GridRange {
    pub fn len(&self) -> usize {
        if self.step == 0.0 {
            1
        } else {
            (((self.end - self.start) / self.step).round() as i64 + 1).max(1) as usize
        }
    }
}

/// One TEC/RMS map at a given epoch, stored as dense `nlat*nlon*nhgt`
/// arrays, per section 3's IONEX TEC map shape.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IonexMap {
    pub time: Instant,
    pub lat: GridRange,
    pub lon: GridRange,
    pub hgt: GridRange,
    pub earth_radius_km: f64,
    /// TEC values in TECU, row-major over (lat, lon, hgt).
    pub tec: Vec<f64>,
    /// RMS values in TECU, same shape as `tec`; empty if not provided.
    pub rms: Vec<f64>,
}

impl IonexMap {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.lat.len(), self.lon.len(), self.hgt.len())
    }

    /// Dense-array index for grid indices (i_lat, i_lon, i_hgt), or `None`
    /// if out of range.
    pub fn index(&self, i_lat: usize, i_lon: usize, i_hgt: usize) -> Option<usize> {
        let (nlat, nlon, nhgt) = self.shape();
        if i_lat >= nlat || i_lon >= nlon || i_hgt >= nhgt {
            return None;
        }
        Some((i_lat * nlon + i_lon) * nhgt + i_hgt)
    }

    pub fn tec_at(&self, i_lat: usize, i_lon: usize, i_hgt: usize) -> Option<f64> {
        self.index(i_lat, i_lon, i_hgt).and_then(|i| self.tec.get(i).copied())
    }

    /// Nearest grid indices for a given lat/lon (degrees), clamped to range.
    pub fn nearest_indices(&self, lat_deg: f64, lon_deg: f64) -> (usize, usize) {
        let i_lat = (((lat_deg - self.lat.start) / self.lat.step).round().max(0.0)) as usize;
        let i_lon = (((lon_deg - self.lon.start) / self.lon.step).round().max(0.0)) as usize;
        (
            i_lat.min(self.lat.len().saturating_sub(1)),
            i_lon.min(self.lon.len().saturating_sub(1)),
        )
    }
}

/// IONEX sentinel for missing TEC/RMS values; must be dropped.
pub const IONEX_SENTINEL: i32 = 9999;
