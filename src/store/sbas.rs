//! SBAS message log storage and decoded sub-records (section 3).

use crate::sat::SatIndex;
use crate::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A raw SBAS message as read off the log: 250 bits (28 payload bytes + a
/// 6-bit trailer), alongside the week/tow/PRN the log line carried.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SbasMessage {
    pub week: u32,
    pub tow: f64,
    pub prn: u8,
    pub payload: [u8; 28],
    pub trailer: u8,
    pub decoded: Option<DecodedSbas>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DecodedSbas {
    PrnMask {
        iodp: u8,
        mask: Vec<u8>,
    },
    FastCorrection {
        iodf: u8,
        prc: Vec<f64>,
        udre: Vec<u8>,
    },
    LongTermCorrection {
        prn: u8,
        iode: u16,
        dpos: [f64; 3],
        dvel: [f64; 3],
        daf0: f64,
        daf1: f64,
        t0: Instant,
    },
    IonoGridMask {
        band: u8,
        mask: Vec<u8>,
    },
    IonoCorrection {
        band: u8,
        igp_index: Vec<u8>,
        delay_m: Vec<f64>,
        give: Vec<u8>,
    },
}

/// Per-satellite decoded long-term + fast correction state, assembled from
/// the sub-records above, ready for application by the satellite-state
/// evaluator.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SbasCorrectionState {
    pub satellite: Option<SatIndex>,
    pub dpos: [f64; 3],
    pub dvel: [f64; 3],
    pub daf0: f64,
    pub daf1: f64,
    pub t0: Option<Instant>,
    pub iode: u16,
    pub prc: f64,
    pub rrc: f64,
    pub t_fc: Option<Instant>,
    pub udre: u8,
}
