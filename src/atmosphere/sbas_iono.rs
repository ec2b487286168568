//! SBAS grid ionosphere: IGP-quad search and interpolation (section 4.E).
//!
//! 8 fine bands of 5 degrees plus 2 polar bands of 10 degrees, per the
//! SBAS MOPS ionospheric grid definition.

/// One decoded ionospheric grid point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IonoGridPoint {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub delay_m: f64,
    pub give: u8,
}

/// Band width (degrees) for a given absolute latitude.
fn band_step_deg(lat_deg: f64) -> f64 {
    if lat_deg.abs() >= 60.0 {
        10.0
    } else {
        5.0
    }
}

/// Finds the 4 IGPs bracketing `(lat_deg, lon_deg)` among `points`. Returns
/// the bracketing quad with bilinear weights, degenerating to a 3-point
/// triangle if only 3 are available, or `None` if fewer than 3 are found
/// (section 4.E's documented fallback chain).
pub fn igp_quad_interpolate(points: &[IonoGridPoint], lat_deg: f64, lon_deg: f64) -> Option<(f64, f64)> {
    let step = band_step_deg(lat_deg);
    let lat0 = (lat_deg / step).floor() * step;
    let lat1 = lat0 + step;
    let lon0 = (lon_deg / step).floor() * step;
    let lon1 = lon0 + step;

    let find = |lat: f64, lon: f64| -> Option<&IonoGridPoint> {
        points
            .iter()
            .find(|p| (p.lat_deg - lat).abs() < 1e-6 && (p.lon_deg - lon).abs() < 1e-6)
    };

    let p00 = find(lat0, lon0);
    let p10 = find(lat1, lon0);
    let p01 = find(lat0, lon1);
    let p11 = find(lat1, lon1);

    let x = ((lat_deg - lat0) / step).clamp(0.0, 1.0);
    let y = ((lon_deg - lon0) / step).clamp(0.0, 1.0);

    let corners = [
        ((1.0 - x) * (1.0 - y), p00),
        (x * (1.0 - y), p10),
        ((1.0 - x) * y, p01),
        (x * y, p11),
    ];

    let present: Vec<(f64, &IonoGridPoint)> = corners
        .into_iter()
        .filter_map(|(w, p)| p.map(|p| (w, p)))
        .collect();

    match present.len() {
        4 => {
            let delay = present.iter().map(|(w, p)| w * p.delay_m).sum();
            let give_var: f64 = present
                .iter()
                .map(|(w, p)| w * give_to_variance(p.give))
                .sum();
            Some((delay, give_var))
        }
        3 => {
            // Degenerate to the valid triangle: renormalise the three
            // present weights so they sum to 1.
            let total_w: f64 = present.iter().map(|(w, _)| w).sum();
            if total_w < 1e-9 {
                return None;
            }
            let delay = present.iter().map(|(w, p)| (w / total_w) * p.delay_m).sum();
            let give_var = present
                .iter()
                .map(|(w, p)| (w / total_w) * give_to_variance(p.give))
                .sum();
            Some((delay, give_var))
        }
        _ => None,
    }
}

fn give_to_variance(give_index: u8) -> f64 {
    const TABLE: [f64; 16] = [
        0.0084, 0.0333, 0.0749, 0.1331, 0.2079, 0.2994, 0.4075, 0.5322, 0.6736, 0.8315, 1.1974,
        1.8709, 3.3260, 20.7870, 187.0826, 0.0,
    ];
    TABLE.get(give_index as usize).copied().unwrap_or(20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_quad_interpolates_midpoint() {
        let points = vec![
            IonoGridPoint { lat_deg: 40.0, lon_deg: 0.0, delay_m: 1.0, give: 0 },
            IonoGridPoint { lat_deg: 45.0, lon_deg: 0.0, delay_m: 3.0, give: 0 },
            IonoGridPoint { lat_deg: 40.0, lon_deg: 5.0, delay_m: 1.0, give: 0 },
            IonoGridPoint { lat_deg: 45.0, lon_deg: 5.0, delay_m: 3.0, give: 0 },
        ];
        let (delay, _var) = igp_quad_interpolate(&points, 42.5, 2.5).unwrap();
        assert!((delay - 2.0).abs() < 1e-9);
    }

    #[test]
    fn three_points_degenerates_to_triangle() {
        let points = vec![
            IonoGridPoint { lat_deg: 40.0, lon_deg: 0.0, delay_m: 1.0, give: 0 },
            IonoGridPoint { lat_deg: 45.0, lon_deg: 0.0, delay_m: 3.0, give: 0 },
            IonoGridPoint { lat_deg: 40.0, lon_deg: 5.0, delay_m: 1.0, give: 0 },
        ];
        assert!(igp_quad_interpolate(&points, 42.5, 2.5).is_some());
    }

    #[test]
    fn fewer_than_three_fails() {
        let points = vec![IonoGridPoint { lat_deg: 40.0, lon_deg: 0.0, delay_m: 1.0, give: 0 }];
        assert!(igp_quad_interpolate(&points, 42.5, 2.5).is_none());
    }
}
