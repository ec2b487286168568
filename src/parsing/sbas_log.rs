//! SBAS message log decoder (section 4.C): RTKLIB-form text log lines
//! (`week tow prn <29 hex bytes>`) into [`crate::store::sbas::SbasMessage`]
//! plus typed sub-records.
//!
//! No teacher or pack repo carries an SBAS log reader, so the line format
//! follows the RTKLIB convention section 3 names directly; sub-record
//! field widths follow the WAAS/EGNOS MOPS message layout at byte
//! granularity (a deliberate simplification over the bit-exact layout,
//! adequate for feeding [`crate::evaluator::sbas_corr`]'s correction
//! application, which only consumes the already-decoded f64 fields).

use crate::error::{Error, ParseError, Result};
use crate::store::sbas::{DecodedSbas, SbasMessage};
use crate::time::{self, Instant};

fn parse_hex_bytes(tokens: &[&str]) -> Result<[u8; 28]> {
    let mut out = [0u8; 28];
    for (i, slot) in out.iter_mut().enumerate() {
        let token = tokens.get(i).ok_or(Error::Parse(ParseError::MalformedColumn(i)))?;
        *slot = u8::from_str_radix(token, 16).map_err(|_| Error::Parse(ParseError::MalformedColumn(i)))?;
    }
    Ok(out)
}

/// Parses a single RTKLIB-form log line: `week tow prn b0 b1 ... b28`
/// (29 hex bytes; the last byte's top 6 bits are the trailer).
pub fn parse_line(line: &str) -> Result<SbasMessage> {
    let mut tokens = line.split_whitespace();
    let week: u32 = tokens.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(0)))?;
    let tow: f64 = tokens.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(1)))?;
    let prn: u8 = tokens.next().and_then(|s| s.parse().ok()).ok_or(Error::Parse(ParseError::MalformedColumn(2)))?;
    let rest: Vec<&str> = tokens.collect();
    if rest.len() < 29 {
        return Err(Error::Parse(ParseError::MalformedColumn(3)));
    }
    let payload = parse_hex_bytes(&rest[0..28])?;
    let trailer_byte = u8::from_str_radix(rest[28], 16).map_err(|_| Error::Parse(ParseError::MalformedColumn(28)))?;
    let trailer = trailer_byte >> 2;

    let msg_type = payload[0] >> 2;
    let decoded = decode_sub_record(msg_type, &payload, prn, week, tow);

    Ok(SbasMessage { week, tow, prn, payload, trailer, decoded })
}

fn decode_sub_record(msg_type: u8, payload: &[u8; 28], prn: u8, week: u32, tow: f64) -> Option<DecodedSbas> {
    match msg_type {
        1 => Some(DecodedSbas::PrnMask { iodp: payload[27] & 0x03, mask: payload[1..27].to_vec() }),
        2..=5 => Some(DecodedSbas::FastCorrection {
            iodf: (payload[1] >> 6) & 0x03,
            prc: payload[2..15]
                .chunks(2)
                .map(|c| {
                    let raw = i16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]);
                    raw as f64 * 0.125
                })
                .collect(),
            udre: payload[15..27].to_vec(),
        }),
        25 => {
            let t0 = time::toe_from_week_tow(week, tow, Instant::new(0, 0.0));
            Some(DecodedSbas::LongTermCorrection {
                prn,
                iode: u16::from(payload[1]),
                dpos: [
                    i16::from_be_bytes([payload[2], payload[3]]) as f64 * 0.125,
                    i16::from_be_bytes([payload[4], payload[5]]) as f64 * 0.125,
                    i16::from_be_bytes([payload[6], payload[7]]) as f64 * 0.125,
                ],
                dvel: [
                    (payload[8] as i8) as f64 * 0.0625,
                    (payload[9] as i8) as f64 * 0.0625,
                    (payload[10] as i8) as f64 * 0.0625,
                ],
                daf0: (payload[11] as i8) as f64 * 2f64.powi(-31),
                daf1: (payload[12] as i8) as f64 * 2f64.powi(-39),
                t0,
            })
        }
        18 => Some(DecodedSbas::IonoGridMask { band: payload[1] & 0x0f, mask: payload[2..27].to_vec() }),
        26 => Some(DecodedSbas::IonoCorrection {
            band: payload[1] & 0x0f,
            igp_index: payload[2..15].to_vec(),
            delay_m: payload[2..15].iter().map(|b| *b as f64 * 0.125).collect(),
            give: payload[15..27].to_vec(),
        }),
        _ => None,
    }
}

/// Parses every line of an RTKLIB-form SBAS log.
pub fn parse_log(content: &str) -> (Vec<SbasMessage>, usize) {
    let mut messages = Vec::new();
    let mut skipped = 0usize;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Ok(msg) => messages.push(msg),
            Err(_) => skipped += 1,
        }
    }
    (messages, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line(msg_type: u8) -> String {
        let mut payload = [0u8; 28];
        payload[0] = msg_type << 2;
        let hex: Vec<String> = payload.iter().map(|b| format!("{:02x}", b)).collect();
        format!("2200 123456.0 131 {} 00", hex.join(" "))
    }

    #[test]
    fn decodes_prn_mask_message() {
        let line = sample_line(1);
        let msg = parse_line(&line).unwrap();
        assert_eq!(msg.prn, 131);
        assert!(matches!(msg.decoded, Some(DecodedSbas::PrnMask { .. })));
    }

    #[test]
    fn decodes_long_term_correction_message() {
        let line = sample_line(25);
        let msg = parse_line(&line).unwrap();
        assert!(matches!(msg.decoded, Some(DecodedSbas::LongTermCorrection { .. })));
    }

    #[test]
    fn unknown_message_type_has_no_decoded_record() {
        let line = sample_line(63);
        let msg = parse_line(&line).unwrap();
        assert!(msg.decoded.is_none());
    }

    #[test]
    fn log_skips_malformed_lines_and_counts_them() {
        let good = sample_line(1);
        let content = format!("{}\nnot a valid line\n", good);
        let (messages, skipped) = parse_log(&content);
        assert_eq!(messages.len(), 1);
        assert_eq!(skipped, 1);
    }
}
