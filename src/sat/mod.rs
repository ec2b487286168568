//! Dense satellite numbering: a bijection between `(constellation, prn)`,
//! as carried by [`gnss_rs::sv::SV`], and a compact `[1, MAXSAT]` integer
//! index used everywhere the state vector and tracking-record arrays are
//! indexed by satellite.
//!
//! Grounded on `gnss_rs::sv::SV`'s own `(prn, constellation)` pair and
//! `Display`/`FromStr` conventions; the dense index itself (GPS -> GLONASS
//! -> Galileo -> QZSS -> BeiDou -> IRNSS -> SBAS, section 3 of the spec)
//! has no counterpart in the teacher crate and is added fresh here.

use crate::constants::*;
use gnss_rs::prelude::{Constellation, SV};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A dense `[0, MAXSAT)` index, convertible to/from [`SV`].
///
/// Index 0 in each constellation's block corresponds to PRN 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SatIndex(pub usize);

impl SatIndex {
    pub const MAXSAT: usize = MAXSAT;

    /// Builds the dense index for `sv`, or `None` if the PRN is out of the
    /// range this build knows about for its constellation.
    pub fn from_sv(sv: SV) -> Option<Self> {
        let prn = sv.prn as u16;
        let base_and_max = match sv.constellation {
            Constellation::GPS => Some((0u16, MAXPRNGPS)),
            Constellation::Glonass => Some((MAXPRNGPS, MAXPRNGLO)),
            Constellation::Galileo => Some((MAXPRNGPS + MAXPRNGLO, MAXPRNGAL)),
            Constellation::QZSS => Some((MAXPRNGPS + MAXPRNGLO + MAXPRNGAL, MAXPRNQZS)),
            Constellation::BeiDou => Some((
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL + MAXPRNQZS,
                MAXPRNCMP,
            )),
            Constellation::IRNSS => Some((
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL + MAXPRNQZS + MAXPRNCMP,
                MAXPRNIRN,
            )),
            c if c.is_sbas() => Some((
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL + MAXPRNQZS + MAXPRNCMP + MAXPRNIRN,
                MAXPRNSBS,
            )),
            _ => None,
        }?;
        let (base, max) = base_and_max;
        if prn == 0 || prn > max {
            return None;
        }
        Some(SatIndex((base + prn - 1) as usize))
    }

    /// Inverse of [`Self::from_sv`]; SBAS vehicles are recovered as the
    /// generic [`Constellation::SBAS`] tag (detailed SBAS sub-constellation
    /// identity, if any, must be tracked by the caller alongside the index).
    pub fn to_sv(self) -> Option<SV> {
        let i = self.0 as u16;
        let bounds: [(u16, u16, Constellation); 7] = [
            (0, MAXPRNGPS, Constellation::GPS),
            (MAXPRNGPS, MAXPRNGLO, Constellation::Glonass),
            (MAXPRNGPS + MAXPRNGLO, MAXPRNGAL, Constellation::Galileo),
            (
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL,
                MAXPRNQZS,
                Constellation::QZSS,
            ),
            (
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL + MAXPRNQZS,
                MAXPRNCMP,
                Constellation::BeiDou,
            ),
            (
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL + MAXPRNQZS + MAXPRNCMP,
                MAXPRNIRN,
                Constellation::IRNSS,
            ),
            (
                MAXPRNGPS + MAXPRNGLO + MAXPRNGAL + MAXPRNQZS + MAXPRNCMP + MAXPRNIRN,
                MAXPRNSBS,
                Constellation::SBAS,
            ),
        ];
        for (base, max, c) in bounds {
            if i >= base && i < base + max {
                return Some(SV::new(c, (i - base + 1) as u8));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection_roundtrips() {
        for (c, prn) in [
            (Constellation::GPS, 1u8),
            (Constellation::GPS, 32),
            (Constellation::Glonass, 1),
            (Constellation::Galileo, 36),
            (Constellation::QZSS, 10),
            (Constellation::BeiDou, 63),
            (Constellation::IRNSS, 14),
        ] {
            let sv = SV::new(c, prn);
            let idx = SatIndex::from_sv(sv).expect("in range");
            assert!(idx.0 < SatIndex::MAXSAT);
            let back = idx.to_sv().expect("invertible");
            assert_eq!(back, sv);
        }
    }

    #[test]
    fn out_of_range_prn_rejected() {
        let sv = SV::new(Constellation::GPS, 200);
        assert!(SatIndex::from_sv(sv).is_none());
    }

    #[test]
    fn distinct_constellations_never_collide() {
        let a = SatIndex::from_sv(SV::new(Constellation::GPS, 32)).unwrap();
        let b = SatIndex::from_sv(SV::new(Constellation::Glonass, 1)).unwrap();
        assert_ne!(a.0, b.0);
        assert_eq!(b.0, a.0 + 1);
    }
}
