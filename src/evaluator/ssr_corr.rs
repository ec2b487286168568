//! SSR correction application: IODE-gated, orbit correction rotated from
//! radial/along/cross into ECEF, clock correction as a time polynomial
//! (section 4.D).

use super::{no_ephemeris_error, SatState};
use crate::error::Result;
use crate::sat::SatIndex;
use crate::store::Context;
use crate::time::Instant;

pub fn apply(ctx: &Context, time: Instant, satellite: SatIndex, state: &mut SatState) -> Result<()> {
    let Some(corr) = ctx.ssr_corrections.get(&(satellite.0 as u16)) else {
        return Ok(());
    };
    let ring = ctx
        .broadcast_ephemeris
        .get(&(satellite.0 as u16))
        .ok_or_else(no_ephemeris_error)?;
    let bound = ring.iter().any(|eph| eph.iode == corr.iode);
    if !bound {
        // IODE mismatch: the SSR message is bound to a broadcast record we
        // no longer hold (or haven't received yet). Leave the broadcast
        // state uncorrected rather than apply a mismatched correction.
        return Ok(());
    }
    if !corr.is_valid_at(time) {
        return Ok(());
    }

    let rac = rotate_rac_to_ecef(state.position_m, state.velocity_m_s, corr.orbit.radial_along_cross_m);
    for i in 0..3 {
        state.position_m[i] -= rac[i];
    }

    state.clock_bias_s -= corr.clock_correction_m(time) / crate::constants::CLIGHT;
    state.variance_m2 += (corr.udre as f64 + 1.0).powi(2) * 0.01;
    Ok(())
}

/// Builds the radial/along-track/cross-track unit triad from position and
/// velocity, then rotates an RAC-frame correction vector into ECEF.
fn rotate_rac_to_ecef(position: [f64; 3], velocity: [f64; 3], rac: [f64; 3]) -> [f64; 3] {
    let r = normalize(position);
    let h = cross(position, velocity);
    let c = normalize(h);
    let a = cross(c, r);

    let mut out = [0.0; 3];
    for i in 0..3 {
        out[i] = rac[0] * r[i] + rac[1] * a[i] + rac[2] * c[i];
    }
    out
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if n < 1e-9 {
        return [0.0; 3];
    }
    [v[0] / n, v[1] / n, v[2] / n]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
