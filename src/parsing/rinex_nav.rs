//! RINEX NAV decoder (section 4.C): fixed-column per-constellation record
//! layout, grounded on `rinex::navigation::ephemeris::parsing::parse_v2v3`'s
//! 19-char-word splitting and 'D'-exponent handling, but targeting
//! [`crate::store::ephemeris::BroadcastEphemeris`]'s explicit field layout
//! instead of a generic string-keyed orbit map.

use super::{split_header_line, RinexVersion};
use crate::atmosphere::klobuchar::KlobucharParams;
use crate::error::{Error, ParseError, Result};
use crate::sat::SatIndex;
use crate::store::ephemeris::{BroadcastEphemeris, ClockPolynomial, KeplerianOrbit, OrbitModel, StateVectorOrbit};
use crate::time::{self, Instant};
use gnss_rs::prelude::{Constellation, SV};
use hifitime::Epoch;
use std::str::FromStr;

const WORD: usize = 19;

#[derive(Clone, Debug, Default)]
pub struct NavHeader {
    pub version: RinexVersion,
    /// Broadcast ionospheric corrections, from `IONOSPHERIC CORR` (v3+,
    /// `GPSA`/`GPSB` records) or `ION ALPHA`/`ION BETA` (v2).
    pub klobuchar: Option<KlobucharParams>,
}

fn parse_four(body: &str) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (slot, tok) in out.iter_mut().zip(body.split_whitespace()) {
        *slot = parse_d_float(tok);
    }
    out
}

pub fn parse_header(content: &str) -> Result<NavHeader> {
    let mut header = NavHeader::default();
    for line in content.lines() {
        let (body, label) = split_header_line(line);
        let label = label.trim();
        if label == "RINEX VERSION / TYPE" {
            let version_field = body.get(0..9).unwrap_or(body);
            header.version = RinexVersion::parse(version_field)
                .ok_or_else(|| Error::Header { file: "nav".into(), source: ParseError::UnsupportedVersion(version_field.to_string()) })?;
        } else if label == "IONOSPHERIC CORR" {
            let trimmed = body.trim_start();
            let kp = header.klobuchar.get_or_insert_with(KlobucharParams::default);
            if let Some(rest) = trimmed.strip_prefix("GPSA") {
                kp.alpha = parse_four(rest);
            } else if let Some(rest) = trimmed.strip_prefix("GPSB") {
                kp.beta = parse_four(rest);
            }
        } else if label == "ION ALPHA" {
            header.klobuchar.get_or_insert_with(KlobucharParams::default).alpha = parse_four(body);
        } else if label == "ION BETA" {
            header.klobuchar.get_or_insert_with(KlobucharParams::default).beta = parse_four(body);
        } else if label == "END OF HEADER" {
            break;
        }
    }
    Ok(header)
}

fn parse_d_float(field: &str) -> f64 {
    field.trim().replace('D', "E").replace('d', "E").parse().unwrap_or(0.0)
}

/// Splits `line` into up to 4 [`WORD`]-char words starting at `offset`.
fn words(line: &str, offset: usize) -> Vec<f64> {
    let rest = if offset < line.len() { &line[offset..] } else { "" };
    let mut out = Vec::with_capacity(4);
    let mut pos = 0;
    for _ in 0..4 {
        if pos >= rest.len() {
            out.push(0.0);
            continue;
        }
        let end = (pos + WORD).min(rest.len());
        out.push(parse_d_float(&rest[pos..end]));
        pos = end;
    }
    out
}

fn parse_sv(field: &str, fallback: Constellation) -> Option<SV> {
    let trimmed = field.trim();
    if let Ok(sv) = SV::from_str(trimmed) {
        return Some(sv);
    }
    let prn: u8 = trimmed.parse().ok()?;
    Some(SV::new(fallback, prn))
}

/// Decodes one NAV record (the epoch/clock line plus 7 or 3 orbit lines,
/// per constellation) starting at `lines[0]`. `file_constellation` supplies
/// the fallback system for files that omit it on old single-sat-letter
/// epoch lines (RINEX 2 GPS/GLONASS-only NAV files).
pub fn parse_record(header: &NavHeader, file_constellation: Constellation, lines: &[&str]) -> Result<(BroadcastEphemeris, usize)> {
    if lines.is_empty() {
        return Err(Error::Parse(ParseError::MalformedColumn(0)));
    }
    let svnn_offset = if header.version.major < 3 { 3 } else { 4 };
    let line0 = lines[0];
    if line0.len() < svnn_offset {
        return Err(Error::Parse(ParseError::MalformedColumn(0)));
    }
    let (svnn, rem0) = line0.split_at(svnn_offset);
    let sv = parse_sv(svnn, file_constellation).ok_or_else(|| Error::Parse(ParseError::UnknownSatellite(svnn.to_string())))?;
    let satellite = SatIndex::from_sv(sv).ok_or_else(|| Error::Parse(ParseError::UnknownSatellite(svnn.to_string())))?;

    let date_field = rem0.get(0..19).unwrap_or("");
    let toc = parse_epoch_field(date_field, sv.constellation)?;

    let clk_fields = words(rem0, 19);
    let clock = ClockPolynomial { bias: clk_fields[0], drift: clk_fields[1], drift_rate: clk_fields[2] };

    if sv.constellation == Constellation::Glonass || sv.constellation.is_sbas() {
        if lines.len() < 4 {
            return Err(Error::Parse(ParseError::MalformedColumn(0)));
        }
        let l1 = words(lines[1], svnn_offset - 1);
        let l2 = words(lines[2], svnn_offset - 1);
        let l3 = words(lines[3], svnn_offset - 1);
        let scale = 1000.0; // km -> m, km/s -> m/s, km/s^2 -> m/s^2
        let orbit = StateVectorOrbit {
            pos: [l1[0] * scale, l2[0] * scale, l3[0] * scale],
            vel: [l1[1] * scale, l2[1] * scale, l3[1] * scale],
            accel: [l1[2] * scale, l2[2] * scale, l3[2] * scale],
            freq_num: l2[3] as i8,
        };
        let week = if sv.constellation.is_sbas() { clk_fields[2].round() as u32 } else { 0 };
        let eph = BroadcastEphemeris {
            satellite,
            constellation: sv.constellation,
            clock: ClockPolynomial { bias: clock.bias, drift: clock.drift, drift_rate: if sv.constellation.is_sbas() { 0.0 } else { clock.drift_rate } },
            orbit: OrbitModel::StateVector(orbit),
            iode: if sv.constellation.is_sbas() { l3[3].round() as i32 } else { 0 },
            iodc: 0,
            tgd: [0.0, 0.0],
            week,
            health: l1[3].round() as u32,
            toe: toc,
            toc,
            ttr: toc,
            ura: l2[3],
        };
        return Ok((eph, 4));
    }

    if lines.len() < 8 {
        return Err(Error::Parse(ParseError::MalformedColumn(0)));
    }
    let l1 = words(lines[1], svnn_offset - 1);
    let l2 = words(lines[2], svnn_offset - 1);
    let l3 = words(lines[3], svnn_offset - 1);
    let l4 = words(lines[4], svnn_offset - 1);
    let l5 = words(lines[5], svnn_offset - 1);
    let l6 = words(lines[6], svnn_offset - 1);
    let l7 = words(lines[7], svnn_offset - 1);

    let iode = l1[0].round() as i32;
    let orbit = KeplerianOrbit {
        sqrt_a: l2[3],
        e: l2[1],
        i0: l4[0],
        idot: l5[0],
        omega0: l3[2],
        omega_dot: l4[3],
        omega: l4[2],
        m0: l1[3],
        delta_n: l1[2],
        cuc: l2[0],
        cus: l2[2],
        crc: l4[1],
        crs: l1[1],
        cic: l3[1],
        cis: l3[3],
    };
    let week = l5[2].round() as u32;
    let toe_tow = l3[0];
    // BeiDou's broadcast epoch is BDT; `toc` above was parsed assuming UTC,
    // per the "first convert toc from BDT to GPST" rule re-derive it in the
    // right time scale.
    let toc_resolved = if sv.constellation == Constellation::BeiDou {
        parse_epoch_field_bdt(date_field)?
    } else {
        toc
    };
    let toe = time::toe_from_week_tow(week, toe_tow, toc_resolved);
    let ttr = time::toe_from_week_tow(week, l7[0], toc_resolved);

    let eph = BroadcastEphemeris {
        satellite,
        constellation: sv.constellation,
        clock,
        orbit: OrbitModel::Keplerian(orbit),
        iode,
        iodc: l6[3].round() as i32,
        tgd: [l6[2], 0.0],
        week,
        health: l6[1].round() as u32,
        toe,
        toc: toc_resolved,
        ttr,
        ura: l6[0],
    };
    Ok((eph, 8))
}

fn parse_epoch_field_bdt(field: &str) -> Result<Instant> {
    let trimmed = field.trim();
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 6 {
        return Err(Error::Parse(ParseError::MalformedColumn(0)));
    }
    let year: i32 = parts[0].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let year = if year < 100 { if year < 80 { 2000 + year } else { 1900 + year } } else { year };
    let month: u8 = parts[1].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let day: u8 = parts[2].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let hour: u8 = parts[3].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let minute: u8 = parts[4].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let second: f64 = parts[5].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let whole = second.floor() as u8;
    let epoch = Epoch::from_gregorian(year, month, day, hour, minute, whole, ((second - whole as f64) * 1e9) as u32, hifitime::TimeScale::BDT)
        .to_time_scale(hifitime::TimeScale::GPST);
    Ok(Instant::from_gpst_epoch(epoch))
}

fn parse_epoch_field(field: &str, constellation: Constellation) -> Result<Instant> {
    let trimmed = field.trim();
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 6 {
        return Err(Error::Parse(ParseError::MalformedColumn(0)));
    }
    let year: i32 = parts[0].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let year = if year < 100 { if year < 80 { 2000 + year } else { 1900 + year } } else { year };
    let month: u8 = parts[1].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let day: u8 = parts[2].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let hour: u8 = parts[3].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let minute: u8 = parts[4].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let second: f64 = parts[5].parse().map_err(|_| Error::Parse(ParseError::MalformedColumn(0)))?;
    let whole = second.floor() as u8;
    let epoch = Epoch::from_gregorian_utc(year, month, day, hour, minute, whole, ((second - whole as f64) * 1e9) as u32);
    let _ = constellation;
    Ok(Instant::from_gpst_epoch(epoch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_gps_keplerian_record() {
        let header = NavHeader { version: RinexVersion { major: 3, minor: 4 } };
        let lines = [
            "G01 2021 01 01 00 00 00 1.234567890123E-04 2.345678901234E-11 0.000000000000E+00",
            "    1.000000000000E+01 2.000000000000E+00 3.000000000000E-06 4.000000000000E+00",
            "    5.000000000000E-09 6.000000000000E-02 7.000000000000E-06 5.153700000000E+03",
            "    3.000000000000E+05 8.000000000000E-08 9.000000000000E-01 1.000000000000E-07",
            "    1.000000000000E+00 1.100000000000E-01 2.000000000000E+03 0.000000000000E+00",
            "    2.000000000000E+00 0.000000000000E+00 1.000000000000E-08 1.000000000000E+02",
            "    3.050000000000E+02 1.000000000000E+00 3.000000000000E+05 0.000000000000E+00",
            "    0.000000000000E+00 0.000000000000E+00 0.000000000000E+00 0.000000000000E+00",
        ];
        let header_ref = &header;
        let refs: Vec<&str> = lines.iter().copied().collect();
        let (eph, consumed) = parse_record(header_ref, Constellation::GPS, &refs).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(eph.constellation, Constellation::GPS);
        match eph.orbit {
            OrbitModel::Keplerian(k) => assert!((k.sqrt_a - 5153.7).abs() < 1e-6),
            _ => panic!("expected keplerian orbit"),
        }
    }
}
