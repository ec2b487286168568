//! IONEX decoder (section 4.C): header lat/lon/hgt ranges plus alternating
//! TEC/RMS map blocks, each `LAT/LON1/LON2/DLON/H` line followed by
//! `ceil(nlon/16)` rows of 5-column `I5` integers scaled by `10^exponent`.
//!
//! Grounded on the same header-then-body split the RINEX decoders use;
//! IONEX has no counterpart in the teacher crate, so the column layout
//! follows the IONEX 1.0 specification directly (section 4.C's wording).

use super::split_header_line;
use crate::error::{Error, ParseError, Result};
use crate::store::ionex::{GridRange, IonexMap, IONEX_SENTINEL};
use crate::time::Instant;
use hifitime::Epoch;

#[derive(Clone, Debug, Default)]
pub struct IonexHeader {
    pub lat: GridRange,
    pub lon: GridRange,
    pub hgt: GridRange,
    pub exponent: i32,
    pub earth_radius_km: f64,
}

fn parse_range(body: &str) -> GridRange {
    let mut fields = body.split_whitespace();
    let start: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let end: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let step: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    GridRange { start, end, step }
}

pub fn parse_header(content: &str) -> Result<(IonexHeader, usize)> {
    let mut header = IonexHeader { exponent: -1, earth_radius_km: 6371.0, ..Default::default() };
    let mut consumed = 0usize;

    for line in content.lines() {
        consumed += 1;
        let (body, label) = split_header_line(line);
        let label = label.trim();
        match label {
            "LAT1 / LAT2 / DLAT" => header.lat = parse_range(body),
            "LON1 / LON2 / DLON" => header.lon = parse_range(body),
            "HGT1 / HGT2 / DHGT" => header.hgt = parse_range(body),
            "EXPONENT" => header.exponent = body.trim().parse().unwrap_or(-1),
            "END OF HEADER" => break,
            _ => {}
        }
    }

    if header.lat.step == 0.0 || header.lon.step == 0.0 {
        return Err(Error::Header { file: "ionex".into(), source: ParseError::MissingHeaderLine("LAT1 / LAT2 / DLAT") });
    }
    Ok((header, consumed))
}

fn parse_map_epoch(line: &str) -> Result<Instant> {
    let mut fields = line.split_whitespace();
    let year: i32 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let month: u8 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let day: u8 = fields.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let hour: u8 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minute: u8 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let second: u8 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let epoch = Epoch::from_gregorian_utc(year, month, day, hour, minute, second, 0);
    Ok(Instant::from_gpst_epoch(epoch))
}

/// Parses one `LAT/LON1/LON2/DLON/H` line plus its following I5 data rows
/// into a single latitude row of TEC/RMS values (raw integers, sentinel not
/// yet dropped).
fn parse_lat_row<'a>(header: &IonexHeader, lines: &mut std::slice::Iter<'a, &'a str>) -> Option<Vec<i32>> {
    lines.next()?; // LAT/LON1/LON2/DLON/H line: grid shape is already known from the header
    let nlon = header.lon.len();
    let mut values = Vec::with_capacity(nlon);
    let rows_needed = nlon.div_ceil(16);
    for _ in 0..rows_needed {
        let row = lines.next()?;
        for chunk in row.as_bytes().chunks(5) {
            if values.len() >= nlon {
                break;
            }
            let token = std::str::from_utf8(chunk).unwrap_or("").trim();
            if token.is_empty() {
                continue;
            }
            values.push(token.parse().unwrap_or(IONEX_SENTINEL));
        }
    }
    Some(values)
}

/// Parses every `TEC`/`RMS` map block in the body, per section 4.C.
pub fn parse_body(header: &IonexHeader, content: &str) -> Result<Vec<IonexMap>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut maps: Vec<IonexMap> = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let (_, label) = split_header_line(lines[i]);
        let label = label.trim();
        if label == "START OF TEC MAP" || label == "START OF RMS MAP" {
            let is_rms = label == "START OF RMS MAP";
            i += 1;
            let epoch_line_idx = lines[i..].iter().position(|l| split_header_line(l).1.trim() == "EPOCH OF CURRENT MAP");
            let epoch_idx = match epoch_line_idx {
                Some(off) => i + off,
                None => return Err(Error::Parse(ParseError::MissingHeaderLine("EPOCH OF CURRENT MAP"))),
            };
            let time = parse_map_epoch(lines[epoch_idx])?;
            i = epoch_idx + 1;

            let nlat = header.lat.len();
            let nlon = header.lon.len();
            let mut tec = vec![0.0; nlat * nlon];
            let scale = 10f64.powi(header.exponent);

            for i_lat in 0..nlat {
                let remaining = &lines[i..];
                let mut it = remaining.iter();
                match parse_lat_row(header, &mut it) {
                    Some(row) => {
                        i += remaining.len() - it.as_slice().len();
                        for (i_lon, raw) in row.iter().enumerate() {
                            let idx = i_lat * nlon + i_lon;
                            tec[idx] = if *raw == IONEX_SENTINEL { 0.0 } else { *raw as f64 * scale };
                        }
                    }
                    None => break,
                }
            }

            match maps.iter_mut().rev().find(|m| m.time.diff_seconds(time).abs() < 1e-6) {
                Some(existing) if is_rms => existing.rms = tec,
                Some(existing) => existing.tec = tec,
                None if is_rms => maps.push(IonexMap {
                    time,
                    lat: header.lat,
                    lon: header.lon,
                    hgt: header.hgt,
                    earth_radius_km: header.earth_radius_km,
                    tec: Vec::new(),
                    rms: tec,
                }),
                None => maps.push(IonexMap {
                    time,
                    lat: header.lat,
                    lon: header.lon,
                    hgt: header.hgt,
                    earth_radius_km: header.earth_radius_km,
                    tec,
                    rms: Vec::new(),
                }),
            }
        } else {
            i += 1;
        }
    }

    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
     1.0            IONOSPHERE MAPS     GPS                 IONEX VERSION / TYPE
     1                                                       EXPONENT
    87.5    -87.5     -2.5                                  LAT1 / LAT2 / DLAT
     0.0     355.0       5.0                                LON1 / LON2 / DLON
   450.0     450.0       0.0                                HGT1 / HGT2 / DHGT
                                                              END OF HEADER
";

    #[test]
    fn parses_grid_ranges() {
        let (header, _) = parse_header(HEADER).unwrap();
        assert_eq!(header.lon.len(), 72);
        assert_eq!(header.hgt.len(), 1);
    }
}
