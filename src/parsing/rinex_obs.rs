//! RINEX OBS decoder (section 4.C): a header label state machine followed
//! by a fixed-column body decoder, grounded on `rinex::observation::parsing`
//! (`is_new_epoch`/`parse_epoch`'s offset arithmetic and the
//! version-2-vs-3 fork) but writing straight into
//! [`crate::store::observation::ObservationRecord`] rather than an
//! intermediate document.

use super::{split_header_line, RinexVersion};
use crate::constants::NFREQ;
use crate::error::{Error, ParseError, Result};
use crate::observable::{v2_to_v3_code, Lli, ObservableCode, ObservableKind};
use crate::sat::SatIndex;
use crate::store::observation::{ObservationRecord, Receiver, SignalSlot};
use crate::time::Instant;
use gnss_rs::prelude::{Constellation, SV};
use hifitime::{Epoch, TimeScale};
use std::collections::HashMap;
use std::str::FromStr;

/// Per-system signal index (section 4.C): for each declared RINEX-3 system
/// letter, the ordered list of observable codes with their assigned
/// (type, freq-index) slot and tracking priority.
#[derive(Clone, Debug, Default)]
pub struct SignalIndex {
    per_system: HashMap<char, Vec<ObservableCode>>,
}

impl SignalIndex {
    pub fn codes_for(&self, system: char) -> &[ObservableCode] {
        self.per_system.get(&system).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Declares `code` under `system`, resolving native-vs-extended slot
    /// collisions: a higher-priority code (lower rank number) displaces a
    /// lower-priority one already holding the same (type, freq-index),
    /// pushing the displaced code into the extended pool.
    fn declare(&mut self, system: char, kind: ObservableKind, freq_index: usize, rinex3_code: String) {
        let entry = self.per_system.entry(system).or_default();
        let priority = entry
            .iter()
            .filter(|c| c.kind == kind && c.freq_index == freq_index)
            .count() as u8;
        entry.push(ObservableCode::new(kind, freq_index, rinex3_code, priority));
    }
}

fn band_freq_index(rinex3_code: &str) -> usize {
    match rinex3_code.chars().nth(1) {
        Some('1') => 0,
        Some('2') => 1,
        Some('5') => 2,
        Some('6') => 3,
        Some('7') => 4,
        Some('8') => 5,
        _ => 0,
    }
}

fn kind_for(type_char: char) -> Option<ObservableKind> {
    match type_char {
        'C' => Some(ObservableKind::PseudoRange),
        'L' => Some(ObservableKind::Phase),
        'D' => Some(ObservableKind::Doppler),
        'S' => Some(ObservableKind::Snr),
        _ => None,
    }
}

/// Parsed RINEX OBS header, the fields the body decoder needs.
#[derive(Clone, Debug, Default)]
pub struct ObsHeader {
    pub version: RinexVersion,
    pub signals: SignalIndex,
    /// Nominal sampling interval (seconds), from the `INTERVAL` header
    /// line; used to decide which neighbouring epoch a flag-5 external
    /// event mark attaches to (section 4.C).
    pub nominal_interval_s: Option<f64>,
}

/// Parses a RINEX OBS header from `content`, stopping at the "END OF
/// HEADER" label. Mirrors `rinex::header::parsing`'s per-label match loop.
pub fn parse_header(content: &str) -> Result<ObsHeader> {
    let mut header = ObsHeader::default();
    let mut pending_system: Option<char> = None;

    for line in content.lines() {
        let (body, label) = split_header_line(line);
        let label = label.trim();

        if label == "RINEX VERSION / TYPE" {
            let version_field = body.get(0..9).unwrap_or(body);
            header.version = RinexVersion::parse(version_field)
                .ok_or_else(|| Error::Header { file: "obs".into(), source: ParseError::UnsupportedVersion(version_field.to_string()) })?;
        } else if label == "SYS / # / OBS TYPES" {
            let mut tokens = body.split_whitespace();
            let first = tokens.next().unwrap_or("");
            let system = if first.len() == 1 && first.chars().next().unwrap().is_ascii_alphabetic() {
                let c = first.chars().next().unwrap();
                pending_system = Some(c);
                tokens.next(); // count field
                c
            } else {
                pending_system.ok_or(Error::Header { file: "obs".into(), source: ParseError::MissingHeaderLine("SYS / # / OBS TYPES") })?
            };
            for code in tokens {
                if let Some(kind) = kind_for(code.chars().next().unwrap_or('?')) {
                    let freq_index = band_freq_index(code);
                    header.signals.declare(system, kind, freq_index, code.to_string());
                }
            }
        } else if label == "# / TYPES OF OBSERV" {
            // RINEX-2: one system-agnostic code list, mapped per-system at
            // decode time via v2_to_v3_code.
            let mut tokens = body.split_whitespace();
            if header.version.minor == 0 && header.signals.per_system.is_empty() {
                tokens.next(); // count field only on the first line
            }
            let is_v212 = header.version.major == 2 && header.version.minor >= 12;
            for code2 in tokens {
                for system in ['G', 'R', 'E', 'J', 'C', 'I', 'S'] {
                    if let Some(code3) = v2_to_v3_code(system, code2, is_v212) {
                        if let Some(kind) = kind_for(code3.chars().next().unwrap_or('?')) {
                            let freq_index = band_freq_index(&code3);
                            header.signals.declare(system, kind, freq_index, code3);
                        }
                    }
                }
            }
        } else if label == "INTERVAL" {
            header.nominal_interval_s = body.trim().parse().ok();
        } else if label == "END OF HEADER" {
            break;
        }
    }

    Ok(header)
}

fn parse_v3_epoch_line(line: &str) -> Option<(Instant, char, i32, u16)> {
    let rest = line.strip_prefix('>')?;
    let mut fields = rest.split_whitespace();
    let year: i32 = fields.next()?.parse().ok()?;
    let month: u8 = fields.next()?.parse().ok()?;
    let day: u8 = fields.next()?.parse().ok()?;
    let hour: u8 = fields.next()?.parse().ok()?;
    let minute: u8 = fields.next()?.parse().ok()?;
    let second: f64 = fields.next()?.parse().ok()?;
    let flag: i32 = fields.next()?.parse().ok()?;
    let nsat: u16 = fields.next()?.parse().ok()?;
    let whole_sec = second.floor() as u8;
    let epoch = Epoch::from_gregorian_utc(year, month, day, hour, minute, whole_sec, ((second - whole_sec as f64) * 1e9) as u32);
    Some((Instant::from_gpst_epoch(epoch), 'v', flag, nsat))
}

fn parse_v2_epoch_line(line: &str) -> Option<(Instant, i32, u16, String)> {
    if line.len() < 26 {
        return None;
    }
    let year2: i32 = line.get(1..3)?.trim().parse().ok()?;
    let year = if year2 < 80 { 2000 + year2 } else { 1900 + year2 };
    let month: u8 = line.get(4..6)?.trim().parse().ok()?;
    let day: u8 = line.get(7..9)?.trim().parse().ok()?;
    let hour: u8 = line.get(10..12)?.trim().parse().ok()?;
    let minute: u8 = line.get(13..15)?.trim().parse().ok()?;
    let second: f64 = line.get(15..26)?.trim().parse().ok()?;
    let flag: i32 = line.get(26..29)?.trim().parse().ok()?;
    let nsat: u16 = line.get(29..32)?.trim().parse().ok()?;
    let whole_sec = second.floor() as u8;
    let epoch = Epoch::from_gregorian_utc(year, month, day, hour, minute, whole_sec, ((second - whole_sec as f64) * 1e9) as u32);
    let sat_list = line.get(32..).unwrap_or("").to_string();
    Some((Instant::from_gpst_epoch(epoch), flag, nsat, sat_list))
}

fn satellite_for_code(code: &str) -> Option<SatIndex> {
    let mut chars = code.chars();
    let system = chars.next()?;
    let constellation = Constellation::from_str(&system.to_string()).ok()?;
    let prn: u8 = code[1..].trim().parse().ok()?;
    SatIndex::from_sv(SV::new(constellation, prn))
}

/// Slices a 16-char fixed-width observation field (14.3 value + LLI digit +
/// SNR digit) out of `line` at native column index `idx`, returning
/// `(value, lli_char, snr_char)`.
fn obs_field(line: &str, idx: usize) -> Option<(f64, char, char)> {
    let start = idx * 16;
    if start >= line.len() {
        return None;
    }
    let end = (start + 16).min(line.len());
    let field = &line[start..end];
    let value_part = field.get(0..field.len().saturating_sub(2).min(14).max(0)).unwrap_or("").trim();
    if value_part.is_empty() {
        return None;
    }
    let value: f64 = value_part.parse().ok()?;
    let lli = field.chars().nth(14).unwrap_or(' ');
    let snr = field.chars().nth(15).unwrap_or(' ');
    Some((value, lli, snr))
}

fn lli_from_char(c: char) -> Lli {
    match c.to_digit(10) {
        Some(d) => Lli::from_bits_truncate(d as u8),
        None => Lli::empty(),
    }
}

/// RINEX signal-strength-indicator classes (digit 1..9 following the
/// value+LLI fields) mapped onto an approximate receiver-reported standard
/// deviation, per the ICD-GPS-200/RINEX appendix SSI bands (1: <12 dB-Hz
/// .. 9: >=54 dB-Hz): a stronger-signal class implies a tighter std. Index
/// 0 is "no indicator" and decodes to `None`. Index 0 of each array is
/// unused filler so the digit indexes directly.
const SNR_INDICATOR_CODE_STD_M: [f64; 10] = [0.0, 3.0, 2.0, 1.5, 1.0, 0.75, 0.5, 0.3, 0.2, 0.1];
const SNR_INDICATOR_PHASE_STD_CYCLES: [f64; 10] = [0.0, 0.05, 0.03, 0.02, 0.015, 0.01, 0.007, 0.005, 0.003, 0.002];

/// Decodes a field's trailing signal-strength-indicator digit into
/// `(code_std_m, phase_std_cycles)`; `None` if the digit is blank or 0.
fn snr_indicator_std(c: char) -> Option<(f64, f64)> {
    let d = c.to_digit(10)?;
    if d == 0 {
        return None;
    }
    Some((SNR_INDICATOR_CODE_STD_M[d as usize], SNR_INDICATOR_PHASE_STD_CYCLES[d as usize]))
}

/// Decodes one epoch's worth of observations starting at `lines[0]`,
/// returning the records produced and the number of lines consumed.
pub fn parse_epoch<'a>(
    header: &ObsHeader,
    receiver: Receiver,
    lines: &[&'a str],
) -> Result<(Vec<ObservationRecord>, usize)> {
    if lines.is_empty() {
        return Err(Error::Parse(ParseError::MalformedColumn(0)));
    }

    let (time, sat_codes, consumed) = if header.version.major >= 3 {
        let (time, _, flag, nsat) = parse_v3_epoch_line(lines[0]).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
        if flag >= 2 {
            return Ok((Vec::new(), 1));
        }
        let mut codes = Vec::with_capacity(nsat as usize);
        let mut consumed = 1;
        for line in lines.iter().skip(1).take(nsat as usize) {
            let code = line.get(0..3).unwrap_or("").to_string();
            codes.push((code, *line));
            consumed += 1;
        }
        (time, codes.into_iter().map(|(c, l)| (c, l)).collect::<Vec<_>>(), consumed)
    } else {
        let (time, flag, nsat, sat_list) = parse_v2_epoch_line(lines[0]).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
        if flag >= 2 {
            return Ok((Vec::new(), 1));
        }
        let mut codes = Vec::with_capacity(nsat as usize);
        let mut chars: Vec<char> = sat_list.chars().collect();
        // Continuation lines for the satellite list when nsat > 12.
        let mut extra_lines = 0usize;
        while chars.len() < nsat as usize * 3 {
            extra_lines += 1;
            if let Some(cont) = lines.get(extra_lines) {
                chars.extend(cont.chars());
            } else {
                break;
            }
        }
        for i in 0..nsat as usize {
            let start = i * 3;
            let raw: String = chars.get(start..start + 3).map(|s| s.iter().collect()).unwrap_or_default();
            let system = raw.chars().next().unwrap_or('G');
            let system = if system == ' ' { 'G' } else { system };
            let prn_digits: String = raw.chars().skip(1).collect();
            codes.push((format!("{}{}", system, prn_digits), ""));
        }
        let body_start = 1 + extra_lines;
        let obs_per_line = 5usize;
        let mut consumed = body_start;
        let mut data_lines = Vec::with_capacity(codes.len());
        for (code, _) in &codes {
            let n_obs = header.signals.codes_for(code.chars().next().unwrap_or('G')).len();
            let line_count = n_obs.div_ceil(obs_per_line).max(1);
            let mut joined = String::new();
            for k in 0..line_count {
                if let Some(l) = lines.get(consumed + k) {
                    joined.push_str(l);
                    joined.push_str(&" ".repeat(16 * obs_per_line - l.len().min(16 * obs_per_line)));
                }
            }
            consumed += line_count;
            data_lines.push((code.clone(), joined));
        }
        return parse_v2_body(header, receiver, time, &data_lines, consumed);
    };

    let mut records = Vec::with_capacity(sat_codes.len());
    for (code, line) in &sat_codes {
        let sat = match satellite_for_code(code) {
            Some(s) => s,
            None => continue,
        };
        let constellation = sat.to_sv().map(|sv| sv.constellation).unwrap_or(Constellation::GPS);
        let system = constellation_letter(constellation);
        let codes = header.signals.codes_for(system);
        let mut record = ObservationRecord::new(time, receiver, sat);
        fill_slots(&mut record, codes, line, 3);
        records.push(record);
    }

    Ok((records, consumed))
}

fn parse_v2_body(
    header: &ObsHeader,
    receiver: Receiver,
    time: Instant,
    code_lines: &[(String, String)],
    consumed: usize,
) -> Result<(Vec<ObservationRecord>, usize)> {
    let mut records = Vec::with_capacity(code_lines.len());
    for (code, line) in code_lines {
        let sat = match satellite_for_code(code) {
            Some(s) => s,
            None => continue,
        };
        let system = code.chars().next().unwrap_or('G');
        let codes = header.signals.codes_for(system);
        let mut record = ObservationRecord::new(time, receiver, sat);
        fill_slots(&mut record, codes, line, 0);
        records.push(record);
    }
    Ok((records, consumed))
}

fn fill_slots(record: &mut ObservationRecord, codes: &[ObservableCode], line: &str, value_offset_chars: usize) {
    // Codes with priority 0 fill their native (type, freq-index) slot
    // directly; any other code contending for the same slot overflows into
    // the extended pool at `NFREQ..NFREQ+NEXOBS`, per section 4.C ("the
    // other goes into the extended-slot pool, up to NEXOBS").
    let mut next_extended = NFREQ;
    for (idx, code) in codes.iter().enumerate() {
        let Some((value, lli_char, snr_char)) = obs_field(&line[value_offset_chars.min(line.len())..], idx) else {
            continue;
        };
        let slot_index = if code.priority == 0 {
            if code.freq_index >= record.slots.len() {
                continue;
            }
            code.freq_index
        } else {
            if next_extended >= record.slots.len() {
                continue; // extended pool exhausted; drop, matching the fixed NEXOBS cap
            }
            let slot_index = next_extended;
            next_extended += 1;
            slot_index
        };
        let slot = &mut record.slots[slot_index];
        match code.kind {
            ObservableKind::PseudoRange => {
                slot.pseudorange_m = Some(value);
                slot.code_std_m = snr_indicator_std(snr_char).map(|(c, _)| c);
            }
            ObservableKind::Phase => {
                slot.phase_cycles = Some(value);
                slot.lli = lli_from_char(lli_char);
                slot.phase_std_cycles = snr_indicator_std(snr_char).map(|(_, p)| p);
            }
            ObservableKind::Doppler => slot.doppler_hz = Some(value),
            ObservableKind::Snr => {
                slot.snr_millidbhz = Some((value * 1000.0).round() as u32);
            }
        }
    }
}

fn constellation_letter(c: Constellation) -> char {
    match c {
        Constellation::GPS => 'G',
        Constellation::Glonass => 'R',
        Constellation::Galileo => 'E',
        Constellation::QZSS => 'J',
        Constellation::BeiDou => 'C',
        Constellation::IRNSS => 'I',
        c if c.is_sbas() => 'S',
        _ => 'G',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
     3.04           OBSERVATION DATA    M (MIXED)           RINEX VERSION / TYPE
G   10 C1C L1C D1C S1C C2W L2W D2W S2W C5Q L5Q        SYS / # / OBS TYPES
                                                            END OF HEADER
";

    #[test]
    fn header_declares_gps_codes() {
        let header = parse_header(HEADER).unwrap();
        assert_eq!(header.version.major, 3);
        let codes = header.signals.codes_for('G');
        assert_eq!(codes.len(), 10);
        assert_eq!(codes[0].kind, ObservableKind::PseudoRange);
        assert_eq!(codes[0].freq_index, 0);
    }

    #[test]
    fn parses_v3_epoch_line() {
        let (time, _, flag, nsat) = parse_v3_epoch_line("> 2021 01 01 00 00  0.0000000  0 12").unwrap();
        assert_eq!(flag, 0);
        assert_eq!(nsat, 12);
        let _ = time;
    }

    #[test]
    fn obs_field_extracts_value_and_lli() {
        let line = "  20123456.789 5                  ";
        let (value, lli, _snr) = obs_field(line, 0).unwrap();
        assert!((value - 20123456.789).abs() < 1e-3);
        assert_eq!(lli, '5');
    }

    #[test]
    fn decodes_one_gps_epoch() {
        let header = parse_header(HEADER).unwrap();
        let epoch_line = "> 2021 01 01 00 00  0.0000000  0  1";
        let data_line = "G01  20123456.789 6  105123456.789 6                  1234.567 6        45.000 6";
        let (records, consumed) = parse_epoch(&header, Receiver::Rover, &[epoch_line, data_line]).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(records.len(), 1);
        assert!(records[0].slots[0].pseudorange_m.is_some());
    }

    #[test]
    fn decodes_one_gps_epoch_with_std_indicators() {
        let header = parse_header(HEADER).unwrap();
        let epoch_line = "> 2021 01 01 00 00  0.0000000  0  1";
        let data_line = "G01  20123456.789 6  105123456.789 6                  1234.567 6        45.000 6";
        let (records, _) = parse_epoch(&header, Receiver::Rover, &[epoch_line, data_line]).unwrap();
        let slot = &records[0].slots[0];
        assert_eq!(slot.code_std_m, Some(0.5));
        assert_eq!(slot.phase_std_cycles, Some(0.007));
    }

    const HEADER_EXTENDED: &str = "\
     3.04           OBSERVATION DATA    G (GPS)             RINEX VERSION / TYPE
G    4 C1C C1P L1C S1C                                     SYS / # / OBS TYPES
                                                            END OF HEADER
";

    #[test]
    fn second_priority_code_lands_in_extended_pool_not_dropped() {
        let header = parse_header(HEADER_EXTENDED).unwrap();
        let codes = header.signals.codes_for('G');
        assert_eq!(codes.len(), 4);
        assert_eq!(codes[0].priority, 0); // C1C: native
        assert_eq!(codes[1].priority, 1); // C1P: same (kind, freq) as C1C, overflow

        let epoch_line = "> 2021 01 01 00 00  0.0000000  0  1";
        let f1 = format!("{:>14.3} {}", 20123456.789, 6);
        let f2 = format!("{:>14.3} {}", 20123466.789, 6);
        let f3 = format!("{:>14.3} {}", 123456789.123, 6);
        let f4 = format!("{:>14.3} {}", 45.000, 6);
        let data_line = format!("G01{}{}{}{}", f1, f2, f3, f4);

        let (records, consumed) = parse_epoch(&header, Receiver::Rover, &[epoch_line, &data_line]).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(records.len(), 1);
        let slots = &records[0].slots;
        assert!((slots[0].pseudorange_m.unwrap() - 20123456.789).abs() < 1e-3);
        assert!((slots[NFREQ].pseudorange_m.unwrap() - 20123466.789).abs() < 1e-3);
        assert_eq!(slots[NFREQ].code_std_m, Some(0.5));
    }
}
