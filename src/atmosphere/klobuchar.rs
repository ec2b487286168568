//! Klobuchar single-frequency ionospheric delay model, using the 8
//! broadcast alpha/beta parameters evaluated at the ionospheric pierce
//! point (section 4.E).

/// Klobuchar's 8 broadcast parameters (4 alpha + 4 beta).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct KlobucharParams {
    pub alpha: [f64; 4],
    pub beta: [f64; 4],
}

/// Computes the ionospheric pierce point (lat, lon in radians) and the
/// earth-centred angle, given receiver geodetic position and the
/// satellite's elevation/azimuth (radians).
pub fn pierce_point(rx_lat_rad: f64, rx_lon_rad: f64, elevation_rad: f64, azimuth_rad: f64) -> (f64, f64) {
    let psi = std::f64::consts::FRAC_PI_2 - elevation_rad - (0.137 / (elevation_rad / std::f64::consts::PI + 0.11)).asin();

    let mut lat = rx_lat_rad / std::f64::consts::PI + psi * azimuth_rad.cos();
    if lat > 0.416 {
        lat = 0.416;
    } else if lat < -0.416 {
        lat = -0.416;
    }

    let lon = rx_lon_rad / std::f64::consts::PI + psi * azimuth_rad.sin() / lat.cos();

    (lat * std::f64::consts::PI, lon * std::f64::consts::PI)
}

/// Klobuchar vertical-to-slant L1 ionospheric delay (m) at `gpst_tow`
/// seconds-of-week.
pub fn klobuchar_delay(
    params: &KlobucharParams,
    rx_lat_rad: f64,
    rx_lon_rad: f64,
    elevation_rad: f64,
    azimuth_rad: f64,
    gpst_tow: f64,
) -> f64 {
    let (phi_i, lambda_i) = pierce_point(rx_lat_rad, rx_lon_rad, elevation_rad, azimuth_rad);
    let phi_i_semi = phi_i / std::f64::consts::PI;

    let phi_m = phi_i_semi + 0.064 * (lambda_i / std::f64::consts::PI - 1.617).cos();

    let mut t = 43_200.0 * (lambda_i / std::f64::consts::PI) + gpst_tow;
    t -= (t / 86_400.0).floor() * 86_400.0;

    let f = 1.0 + 16.0 * (0.53 - elevation_rad / std::f64::consts::PI).powi(3);

    let amp = params.alpha[0]
        + phi_m * (params.alpha[1] + phi_m * (params.alpha[2] + phi_m * params.alpha[3]));
    let amp = amp.max(0.0);

    let per = params.beta[0] + phi_m * (params.beta[1] + phi_m * (params.beta[2] + phi_m * params.beta[3]));
    let per = per.max(72_000.0);

    let x = 2.0 * std::f64::consts::PI * (t - 50_400.0) / per;

    let delay_iono = if x.abs() < 1.57 {
        f * (5e-9 + amp * (1.0 - x * x / 2.0 + x.powi(4) / 24.0))
    } else {
        f * 5e-9
    };

    delay_iono * crate::constants::CLIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_nonnegative_and_bounded() {
        let params = KlobucharParams {
            alpha: [0.1116e-7, 0.7451e-8, -0.5960e-7, 0.5960e-7],
            beta: [0.1167e6, 0.1638e6, -0.6554e5, -0.1311e6],
        };
        let d = klobuchar_delay(
            &params,
            45.0_f64.to_radians(),
            -75.0_f64.to_radians(),
            30.0_f64.to_radians(),
            90.0_f64.to_radians(),
            43_200.0,
        );
        assert!(d >= 0.0 && d < 50.0, "d={d}");
    }
}
