//! IONEX bilinear interpolation with four-corner fallbacks, sun-fixed
//! earth-rotation correction, and the Modified Single-Layer Mapping
//! function (section 4.E).

use crate::store::ionex::IonexMap;
use crate::time::Instant;

/// Modified Single-Layer Mapping factor:
/// `1/sqrt(1-(R/(R+h)*sin(0.9782*(pi/2-el)))^2)`.
pub fn mslm_mapping(elevation_rad: f64, earth_radius_km: f64, shell_height_km: f64) -> f64 {
    let zenith = std::f64::consts::FRAC_PI_2 - elevation_rad;
    let term = (earth_radius_km / (earth_radius_km + shell_height_km)) * (0.9782 * zenith).sin();
    1.0 / (1.0 - term * term).sqrt()
}

/// Rotates the IPP longitude for the sun-fixed grid convention: `+2*pi *
/// (t - t_map) / 86400s`, expressed here in degrees to match
/// [`IonexMap`]'s degree-based grid ranges.
pub fn sun_fixed_longitude_deg(ipp_lon_deg: f64, t: Instant, t_map: Instant) -> f64 {
    let dt = t.diff_seconds(t_map);
    let shift_deg = 360.0 * dt / 86_400.0;
    let mut lon = ipp_lon_deg + shift_deg;
    lon = ((lon + 180.0).rem_euclid(360.0)) - 180.0;
    lon
}

/// Bilinear interpolation of TEC at (lat, lon) degrees from `map`, with
/// the documented four-corner fallback: nearest corner if one valid, mean
/// if two, zero if none. Out-of-grid latitude/longitude values are clamped
/// to the nearest edge before interpolation.
pub fn bilinear_tec(map: &IonexMap, lat_deg: f64, lon_deg: f64, hgt_index: usize) -> f64 {
    let (nlat, nlon, _) = map.shape();
    if nlat == 0 || nlon == 0 {
        return 0.0;
    }

    let lat_f = ((lat_deg - map.lat.start) / map.lat.step).clamp(0.0, (nlat.saturating_sub(1)) as f64);
    let lon_f = ((lon_deg - map.lon.start) / map.lon.step).clamp(0.0, (nlon.saturating_sub(1)) as f64);

    let i0 = lat_f.floor() as usize;
    let i1 = (i0 + 1).min(nlat - 1);
    let j0 = lon_f.floor() as usize;
    let j1 = (j0 + 1).min(nlon - 1);

    let di = lat_f - i0 as f64;
    let dj = lon_f - j0 as f64;

    let corners = [
        ((1.0 - di) * (1.0 - dj), map.tec_at(i0, j0, hgt_index)),
        (di * (1.0 - dj), map.tec_at(i1, j0, hgt_index)),
        ((1.0 - di) * dj, map.tec_at(i0, j1, hgt_index)),
        (di * dj, map.tec_at(i1, j1, hgt_index)),
    ];

    let valid: Vec<(f64, f64)> = corners
        .into_iter()
        .filter_map(|(w, v)| v.map(|val| (w, val)))
        .collect();

    match valid.len() {
        4 => valid.iter().map(|(w, v)| w * v).sum(),
        0 => 0.0,
        1 => valid[0].1,
        _ => valid.iter().map(|(_, v)| v).sum::<f64>() / valid.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ionex::GridRange;

    fn test_map() -> IonexMap {
        let lat = GridRange {
            start: 0.0,
            end: 10.0,
            step: 10.0,
        };
        let lon = GridRange {
            start: 0.0,
            end: 10.0,
            step: 10.0,
        };
        let hgt = GridRange {
            start: 0.0,
            end: 0.0,
            step: 0.0,
        };
        IonexMap {
            time: Instant::new(0, 0.0),
            lat,
            lon,
            hgt,
            earth_radius_km: 6371.0,
            tec: vec![10.0, 20.0, 30.0, 40.0],
            rms: vec![],
        }
    }

    #[test]
    fn bilinear_interpolates_midpoint() {
        let map = test_map();
        let mid = bilinear_tec(&map, 5.0, 5.0, 0);
        assert!((mid - 25.0).abs() < 1e-9);
    }

    #[test]
    fn bilinear_reproduces_corner() {
        let map = test_map();
        let corner = bilinear_tec(&map, 0.0, 0.0, 0);
        assert!((corner - 10.0).abs() < 1e-9);
    }

    #[test]
    fn mslm_mapping_exceeds_one_away_from_zenith() {
        let m = mslm_mapping(30.0_f64.to_radians(), 6371.0, 450.0);
        assert!(m > 1.0);
    }
}
