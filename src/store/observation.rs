//! Observation record: the per-epoch, per-satellite measurement tuple.

use crate::constants::{NEXOBS, NFREQ};
use crate::observable::Lli;
use crate::sat::SatIndex;
use crate::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which receiver an [`ObservationRecord`] was collected by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Receiver {
    Rover = 0,
    Base = 1,
}

/// A single frequency slot's measurements.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalSlot {
    pub pseudorange_m: Option<f64>,
    pub phase_cycles: Option<f64>,
    pub doppler_hz: Option<f64>,
    /// SNR in encoded 0.001 dB-Hz units.
    pub snr_millidbhz: Option<u32>,
    pub lli: Lli,
    /// Receiver-reported pseudorange standard deviation (m), if present.
    pub code_std_m: Option<f64>,
    /// Receiver-reported phase standard deviation (cycles), if present.
    pub phase_std_cycles: Option<f64>,
}

/// An observation record for one (time, receiver, satellite) triple,
/// holding up to `NFREQ + NEXOBS` frequency slots.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObservationRecord {
    pub time: Instant,
    pub receiver: Receiver,
    pub satellite: SatIndex,
    pub slots: Vec<SignalSlot>,
    /// Timestamp of an epoch-flag-5 external event mark attached to this
    /// epoch's records (section 4.C): the event's own timestamp, not this
    /// record's `time`.
    pub external_event_time: Option<Instant>,
}

impl ObservationRecord {
    pub fn new(time: Instant, receiver: Receiver, satellite: SatIndex) -> Self {
        Self {
            time,
            receiver,
            satellite,
            slots: vec![SignalSlot::default(); NFREQ + NEXOBS],
            external_event_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnss_rs::prelude::Constellation;

    #[test]
    fn new_record_has_nfreq_plus_nexobs_slots() {
        let sv = SatIndex::from_sv(gnss_rs::prelude::SV::new(Constellation::GPS, 1)).unwrap();
        let rec = ObservationRecord::new(Instant::new(0, 0.0), Receiver::Rover, sv);
        assert_eq!(rec.slots.len(), NFREQ + NEXOBS);
    }
}
