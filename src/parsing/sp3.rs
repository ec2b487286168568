//! SP3 c/d decoder (section 4.C): `#c`/`#d` header, `%c` time-system and
//! `%f` base-factor lines, then `*`-delimited epochs of `P`/`V` records.
//!
//! Grounded on the `rtk-rs/sp3` crate's header/body split (its `Header`
//! carrying `n_sat`/the PRN list/base-factors, its entry map keyed by
//! `(SV, Epoch)`), reshaped to write directly into
//! [`crate::store::precise::PreciseOrbitSample`]/[`PreciseClockSample`]
//! rather than a `BTreeMap<SP3Key, SP3Entry>`.

use crate::error::{Error, ParseError, Result};
use crate::sat::SatIndex;
use crate::store::precise::{is_sp3_sentinel, PreciseClockEntry, PreciseClockSample, PreciseOrbitSample, PreciseSatState};
use crate::time::Instant;
use gnss_rs::prelude::{Constellation, SV};
use hifitime::Epoch;
use std::collections::HashMap;
use std::str::FromStr;

/// Parsed SP3 header: satellite list and the base-factor scaling the `P`/`V`
/// record's std-dev columns use (`base^n`, section 4.C).
#[derive(Clone, Debug, Default)]
pub struct Sp3Header {
    pub satellites: Vec<SV>,
    pub orbit_base: f64,
    pub clock_base: f64,
}

pub fn parse_header<'a>(lines: &mut std::iter::Peekable<std::str::Lines<'a>>) -> Result<Sp3Header> {
    let mut header = Sp3Header { orbit_base: 2.0, clock_base: 2.0, satellites: Vec::new() };
    let mut consumed_sat_lines = 0usize;

    while let Some(line) = lines.peek().copied() {
        if line.starts_with('*') {
            break;
        }
        let line = lines.next().unwrap();

        if line.starts_with("#c") || line.starts_with("#d") {
            // header line 1: version/type/epoch count, not needed beyond
            // triggering satellite-list lines to follow.
        } else if line.starts_with("+ ") || (line.starts_with('+') && consumed_sat_lines < 5) {
            consumed_sat_lines += 1;
            let rest = &line[2..];
            for chunk in rest.as_bytes().chunks(3) {
                let token = std::str::from_utf8(chunk).unwrap_or("").trim();
                if token.is_empty() || token == "0" {
                    continue;
                }
                if let Ok(sv) = SV::from_str(token) {
                    header.satellites.push(sv);
                }
            }
        } else if line.starts_with("%f") {
            let mut fields = line[2..].split_whitespace();
            if let Some(b1) = fields.next().and_then(|s| s.parse::<f64>().ok()) {
                if b1 != 0.0 {
                    header.orbit_base = b1;
                }
            }
            if let Some(b2) = fields.next().and_then(|s| s.parse::<f64>().ok()) {
                if b2 != 0.0 {
                    header.clock_base = b2;
                }
            }
        }
    }

    if header.satellites.is_empty() {
        return Err(Error::Header { file: "sp3".into(), source: ParseError::MissingHeaderLine("+ (satellite list)") });
    }
    Ok(header)
}

fn parse_epoch_line(line: &str) -> Result<Instant> {
    let rest = line.strip_prefix('*').ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let mut fields = rest.split_whitespace();
    let year: i32 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let month: u8 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let day: u8 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let hour: u8 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let minute: u8 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let second: f64 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let whole = second.floor() as u8;
    let epoch = Epoch::from_gregorian_utc(year, month, day, hour, minute, whole, ((second - whole as f64) * 1e9) as u32);
    Ok(Instant::from_gpst_epoch(epoch))
}

fn base_power(base: f64, n: i32) -> f64 {
    if n == 0 {
        0.0
    } else {
        base.powi(n)
    }
}

/// Parses every epoch in the body, accumulating into orbit and clock
/// sample sequences (one of each per distinct epoch timestamp).
pub fn parse_body(header: &Sp3Header, content: &str) -> Result<(Vec<PreciseOrbitSample>, Vec<PreciseClockSample>)> {
    let mut orbits = Vec::new();
    let mut clocks = Vec::new();

    let mut lines = content.lines().peekable();
    while let Some(line) = lines.next() {
        if line.starts_with("EOF") {
            break;
        }
        if !line.starts_with('*') {
            continue;
        }
        let time = parse_epoch_line(line)?;
        let mut orbit_sample = PreciseOrbitSample { time, satellites: HashMap::new() };
        let mut clock_sample = PreciseClockSample { time, satellites: HashMap::new() };

        while let Some(&next) = lines.peek() {
            if !(next.starts_with('P') || next.starts_with('V')) {
                break;
            }
            let line = lines.next().unwrap();
            let is_velocity = line.starts_with('V');
            let sv_token = line.get(1..4).unwrap_or("").trim();
            let sv = match SV::from_str(sv_token) {
                Ok(sv) => sv,
                Err(_) => continue,
            };
            let sat = match SatIndex::from_sv(sv) {
                Some(s) => s,
                None => continue,
            };

            let mut fields = line[4..].split_whitespace();
            let x: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let y: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let z: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let clk: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let xstd: Option<i32> = fields.next().and_then(|s| s.trim().parse().ok());
            let ystd: Option<i32> = fields.next().and_then(|s| s.trim().parse().ok());
            let zstd: Option<i32> = fields.next().and_then(|s| s.trim().parse().ok());
            let cstd: Option<i32> = fields.next().and_then(|s| s.trim().parse().ok());

            if is_sp3_sentinel(x) || is_sp3_sentinel(y) || is_sp3_sentinel(z) {
                continue;
            }

            if is_velocity {
                let state = orbit_sample.satellites.entry(sat).or_default();
                // SP3 velocities are dm/s; convert to m/s alongside the
                // km->m conversion the position fields already need.
                state.velocity_m_s = Some([x * 0.1, y * 0.1, z * 0.1]);
            } else {
                let position_std_m = [
                    xstd.map(|n| base_power(header.orbit_base, n) * 1e-3).unwrap_or(0.0),
                    ystd.map(|n| base_power(header.orbit_base, n) * 1e-3).unwrap_or(0.0),
                    zstd.map(|n| base_power(header.orbit_base, n) * 1e-3).unwrap_or(0.0),
                ];
                let state = PreciseSatState {
                    position_m: [x * 1000.0, y * 1000.0, z * 1000.0],
                    clock_bias_s: clk * 1e-6,
                    position_std_m,
                    clock_std_s: cstd.map(|n| base_power(header.clock_base, n) * 1e-12).unwrap_or(0.0),
                    velocity_m_s: None,
                };
                if clk != 999999.999999 {
                    clock_sample.satellites.insert(sat, PreciseClockEntry { bias_s: state.clock_bias_s, std_s: state.clock_std_s });
                }
                orbit_sample.satellites.insert(sat, state);
            }
        }

        orbits.push(orbit_sample);
        clocks.push(clock_sample);
    }

    Ok((orbits, clocks))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#dP2021  1  1  0  0  0.00000000     289 ORBIT IGS14 HLM  IGS
%f  1.2500000  1.025000000
+    3   G01G02G03  0  0  0  0  0  0  0  0  0  0  0  0  0  0  0  0
*  2021  1  1  0  0  0.00000000
PG01  -11044.805513  -10586.470103  21595.380777    -11.111111  8  8  8
PG02    1234.567890    2345.678901   23456.789012      5.555555  4  4  4
EOF
";

    #[test]
    fn parses_header_satellite_list() {
        let mut lines = SAMPLE.lines().peekable();
        let header = parse_header(&mut lines).unwrap();
        assert_eq!(header.satellites.len(), 3);
        assert!((header.orbit_base - 1.25).abs() < 1e-9);
    }

    #[test]
    fn parses_one_epoch_of_positions() {
        let mut lines = SAMPLE.lines().peekable();
        let header = parse_header(&mut lines).unwrap();
        let body: String = lines.collect::<Vec<_>>().join("\n");
        let (orbits, clocks) = parse_body(&header, &body).unwrap();
        assert_eq!(orbits.len(), 1);
        assert_eq!(orbits[0].satellites.len(), 2);
        assert_eq!(clocks[0].satellites.len(), 2);
    }
}
