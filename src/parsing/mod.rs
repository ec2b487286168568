//! Parsers (section 4.C): line-oriented decoders for RINEX OBS/NAV, SP3
//! precise orbits, IONEX TEC grids and SBAS message logs.
//!
//! Grounded on `rinex`'s header-then-body parsing split
//! (`header::parsing`/`observation::parsing`/`navigation::parsing`): a
//! small header state machine keyed on the label in columns 60..79,
//! followed by a body decoder that consumes one epoch's worth of lines at a
//! time. Unlike the teacher, records are written directly into this
//! crate's [`crate::store`] containers rather than into an intermediate
//! `Rinex` document, since the filter only ever needs the flattened
//! per-epoch view.

pub mod ionex;
pub mod rinex_nav;
pub mod rinex_obs;
pub mod sbas_log;
pub mod sp3;

/// RINEX major version, the fork point most of the per-format decoders key
/// their column layout on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RinexVersion {
    pub major: u8,
    pub minor: u8,
}

impl RinexVersion {
    pub fn parse(field: &str) -> Option<Self> {
        let trimmed = field.trim();
        let value: f64 = trimmed.parse().ok()?;
        let major = value.trunc() as u8;
        let minor = ((value - value.trunc()) * 100.0).round() as u8;
        Some(Self { major, minor })
    }
}

/// Splits a fixed-width header line into (content, label), matching RINEX's
/// "label lives in columns 60..79" convention. Lines shorter than 60 bytes
/// have no label.
pub fn split_header_line(line: &str) -> (&str, &str) {
    if line.len() <= 60 {
        (line, "")
    } else {
        line.split_at(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rinex_version() {
        let v = RinexVersion::parse("3.04").unwrap();
        assert_eq!(v.major, 3);
        assert_eq!(v.minor, 4);
    }

    #[test]
    fn splits_label_column() {
        let line = "     2.11           OBSERVATION DATA    G (GPS)             RINEX VERSION / TYPE";
        let (content, label) = split_header_line(line);
        assert!(label.trim().starts_with("RINEX VERSION"));
        assert!(content.contains("2.11"));
    }
}
