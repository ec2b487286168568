//! Observation-code tagging and loss-of-lock indicator flags.

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The four observation kinds RINEX encodes per frequency slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ObservableKind {
    /// Pseudorange (m).
    PseudoRange,
    /// Carrier phase (cycles).
    Phase,
    /// Doppler (Hz).
    Doppler,
    /// Signal-to-noise ratio, encoded in 0.001 dB-Hz units.
    Snr,
}

bitflags! {
    /// Loss-of-lock indicator bits, matching the RINEX LLI digit.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Lli: u8 {
        /// Cycle slip since previous observation.
        const SLIP = 0b001;
        /// Half-cycle ambiguity not yet resolved.
        const HALF_CYCLE = 0b010;
        /// BOC tracking (galileo/beidou) marker.
        const BOC_TRACKING = 0b100;
    }
}

/// A fully-qualified observation code tag: which type, which frequency
/// slot, and the raw 3-character RINEX-3 code it was mapped from (e.g.
/// `"L1C"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObservableCode {
    pub kind: ObservableKind,
    /// Zero-based frequency index into the NFREQ+NEXOBS slot array.
    pub freq_index: usize,
    /// RINEX-3 three-character code, e.g. "C1C", "L1C", "D1C", "S1C".
    pub rinex3_code: String,
    /// Tracking-priority rank used to resolve native-slot collisions; lower
    /// is higher priority.
    pub priority: u8,
}

impl ObservableCode {
    pub fn new(kind: ObservableKind, freq_index: usize, rinex3_code: impl Into<String>, priority: u8) -> Self {
        Self {
            kind,
            freq_index,
            rinex3_code: rinex3_code.into(),
            priority,
        }
    }

    /// First character of the RINEX-3 code: 'C' | 'L' | 'D' | 'S'.
    pub fn type_char(&self) -> char {
        self.rinex3_code.chars().next().unwrap_or('?')
    }
}

/// Converts a RINEX-2 two-character observation code to its RINEX-3
/// equivalent for a given constellation, per the "reject plain C1 at
/// v2.12" and "map P1/P2 to the precise-code variant" rules (section 4.C).
///
/// `system` is the RINEX one-letter constellation code ('G','R','E', ...).
pub fn v2_to_v3_code(system: char, code2: &str, is_v212: bool) -> Option<String> {
    match code2 {
        "C1" if is_v212 => None, // rejected at v2.12: ambiguous with C1C/C1P
        "C1" => Some("C1C".to_string()),
        "P1" => Some(format!("C1{}", precise_tracking_letter(system, 1))),
        "P2" => Some(format!("C2{}", precise_tracking_letter(system, 2))),
        "C2" => Some("C2C".to_string()),
        "C5" => Some("C5X".to_string()),
        "L1" => Some("L1C".to_string()),
        "L2" => Some("L2C".to_string()),
        "L5" => Some("L5X".to_string()),
        "D1" => Some("D1C".to_string()),
        "D2" => Some("D2C".to_string()),
        "S1" => Some("S1C".to_string()),
        "S2" => Some("S2C".to_string()),
        _ => None,
    }
}

fn precise_tracking_letter(system: char, freq: u8) -> char {
    match (system, freq) {
        ('R', _) => 'P', // GLONASS P-code
        (_, 1) => 'P',
        (_, 2) => 'P',
        _ => 'C',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plain_c1_at_v212() {
        assert_eq!(v2_to_v3_code('G', "C1", true), None);
        assert_eq!(v2_to_v3_code('G', "C1", false), Some("C1C".to_string()));
    }

    #[test]
    fn maps_precise_code_tracking() {
        assert_eq!(v2_to_v3_code('G', "P1", false), Some("C1P".to_string()));
        assert_eq!(v2_to_v3_code('R', "P2", false), Some("C2P".to_string()));
    }

    #[test]
    fn lli_bits_combine() {
        let lli = Lli::SLIP | Lli::HALF_CYCLE;
        assert!(lli.contains(Lli::SLIP));
        assert!(lli.contains(Lli::HALF_CYCLE));
        assert!(!lli.contains(Lli::BOC_TRACKING));
    }
}
