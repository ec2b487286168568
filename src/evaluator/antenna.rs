//! Antenna phase-centre offset: iono-free L1/L2 (or constellation-specific
//! pair) combination of per-frequency offset vectors, rotated into the
//! satellite-body frame built from the sun vector and `-position` (section
//! 4.D).
//!
//! Grounded on `gnss-rtk`'s own sun-vector helper
//! (`gnss_rtk::sun_earth_vector`), generalized away from its `nyx_space`
//! ephemeris dependency to a low-precision analytic solar position, since
//! this crate does not carry a planetary ephemeris dependency.

/// Low-precision sun position in ECEF (m), accurate to a few arcminutes --
/// sufficient for constructing the satellite-body frame, which only needs
/// the sun direction, not a precise solar ephemeris.
pub fn sun_position_ecef(days_since_j2000: f64) -> [f64; 3] {
    let n = days_since_j2000;
    let l = (280.460 + 0.9856474 * n).to_radians();
    let g = (357.528 + 0.9856003 * n).to_radians();
    let lambda = l + (1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
    let epsilon = (23.439 - 0.0000004 * n).to_radians();
    let r_au = 1.00014 - 0.01671 * g.cos() - 0.00014 * (2.0 * g).cos();
    const AU_M: f64 = 1.495_978_707e11;
    let r = r_au * AU_M;
    [
        r * lambda.cos(),
        r * lambda.sin() * epsilon.cos(),
        r * lambda.sin() * epsilon.sin(),
    ]
}

/// Satellite-body unit triad {ex, ey, ez} built from the sun vector and
/// `-position` (nominal yaw-steering attitude model): `ez` points from the
/// satellite to earth centre, `ey` is perpendicular to the sun-earth-sat
/// plane, `ex` completes the right-handed triad facing roughly sunward.
pub fn satellite_body_frame(position: [f64; 3], sun_position: [f64; 3]) -> ([f64; 3], [f64; 3], [f64; 3]) {
    let ez = normalize(neg(position));
    let sat_to_sun = sub(sun_position, position);
    let ey = normalize(cross(ez, sat_to_sun));
    let ex = normalize(cross(ey, ez));
    (ex, ey, ez)
}

/// Iono-free linear combination coefficients for two frequencies:
/// `C1 = f1^2/(f1^2-f2^2)`, `C2 = -f2^2/(f1^2-f2^2)`.
pub fn iono_free_coefficients(f1: f64, f2: f64) -> (f64, f64) {
    let f1_2 = f1 * f1;
    let f2_2 = f2 * f2;
    let denom = f1_2 - f2_2;
    (f1_2 / denom, -f2_2 / denom)
}

/// Rotates a per-frequency antenna phase-centre offset (given in the
/// satellite-body frame) into ECEF and combines two frequencies with the
/// iono-free coefficients.
pub fn iono_free_pco_ecef(
    body_frame: ([f64; 3], [f64; 3], [f64; 3]),
    pco_f1_body: [f64; 3],
    pco_f2_body: [f64; 3],
    f1: f64,
    f2: f64,
) -> [f64; 3] {
    let (ex, ey, ez) = body_frame;
    let to_ecef = |pco_body: [f64; 3]| -> [f64; 3] {
        let mut out = [0.0; 3];
        for i in 0..3 {
            out[i] = pco_body[0] * ex[i] + pco_body[1] * ey[i] + pco_body[2] * ez[i];
        }
        out
    };
    let pco1 = to_ecef(pco_f1_body);
    let pco2 = to_ecef(pco_f2_body);
    let (c1, c2) = iono_free_coefficients(f1, f2);
    let mut out = [0.0; 3];
    for i in 0..3 {
        out[i] = c1 * pco1[i] + c2 * pco2[i];
    }
    out
}

fn neg(v: [f64; 3]) -> [f64; 3] {
    [-v[0], -v[1], -v[2]]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if n < 1e-9 {
        return [0.0; 3];
    }
    [v[0] / n, v[1] / n, v[2] / n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_frame_is_orthonormal() {
        let position = [20_000_000.0, 10_000_000.0, 5_000_000.0];
        let sun = sun_position_ecef(1000.0);
        let (ex, ey, ez) = satellite_body_frame(position, sun);
        let dot = |a: [f64; 3], b: [f64; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
        assert!(dot(ex, ey).abs() < 1e-9);
        assert!(dot(ey, ez).abs() < 1e-9);
        assert!(dot(ex, ez).abs() < 1e-9);
    }

    #[test]
    fn iono_free_coefficients_sum_to_one() {
        let (c1, c2) = iono_free_coefficients(crate::constants::FREQ_L1, crate::constants::FREQ_L2);
        assert!((c1 + c2 - 1.0).abs() < 1e-9);
    }
}
