//! RTK server (section 4.J): a parallel-threads producer/consumer model
//! around the same filter core the post-processing [`crate::driver`] drives.
//!
//! Transport is abstracted the way `nav-solutions-ubx2rinex`'s `device`
//! module abstracts a UBX byte source behind a plain [`std::io::Read`]: the
//! server doesn't know or care whether bytes come from a serial port, a TCP
//! socket or a file, it only owns the ring buffer a producer thread fills
//! and the consumer thread drains. Per section 5, the consumer holds one
//! server-wide lock across each "drain -> filter -> emit" cycle and never
//! holds it across blocking I/O.

use crate::sat::SatIndex;
use crate::time::Instant;
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The three producer roles section 4.J names.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Rover,
    Base,
    Correction,
}

/// A single-producer/single-consumer byte queue. A real ring buffer with
/// atomic head/tail indices would avoid the lock section 5 allows as a
/// fallback; this is that fallback, kept simple since the producer and
/// consumer sides here are already separated by role rather than needing
/// lock-free throughput.
#[derive(Default)]
pub struct ByteRing {
    inner: Mutex<VecDeque<u8>>,
}

impl ByteRing {
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }

    fn push(&self, bytes: &[u8]) {
        let mut guard = self.inner.lock().unwrap();
        guard.extend(bytes.iter().copied());
    }

    /// Drains every byte currently queued, leaving the ring empty. Never
    /// blocks on I/O: this only touches the in-memory queue.
    pub fn drain(&self) -> Vec<u8> {
        let mut guard = self.inner.lock().unwrap();
        guard.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// Spawns a producer thread that reads from `source` into `ring` until
/// `stop` is set. A zero-byte read (the stream's inactivity timeout) is not
/// an error, per section 5's "surfaces as zero-byte reads, not errors".
pub fn spawn_producer<R>(mut source: R, ring: Arc<ByteRing>, stop: Arc<AtomicBool>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        while !stop.load(Ordering::Relaxed) {
            match source.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => ring.push(&buf[..n]),
                Err(_) => continue,
            }
        }
    })
}

/// A binding key for one ephemeris record: the fields section 4.J gates the
/// current/previous swap on.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EphemerisKey {
    pub iode: u16,
    pub toe: Instant,
    pub toc: Instant,
}

/// Current/previous ephemeris pair for one satellite. Generalizes
/// `positioning::eph::EphemerisSource`'s "latest wins" `HashMap<SV, (Epoch,
/// Ephemeris)>` into an explicit two-slot history, since the filter needs
/// the previous set alive during the handover window.
pub struct EphemerisSlot<T> {
    current: Option<(T, EphemerisKey)>,
    previous: Option<(T, EphemerisKey)>,
}

impl<T> Default for EphemerisSlot<T> {
    fn default() -> Self {
        Self { current: None, previous: None }
    }
}

impl<T> EphemerisSlot<T> {
    /// Installs `eph` as the current record if its key differs from what's
    /// already current, demoting the old current to previous. Returns
    /// whether the swap happened.
    pub fn update(&mut self, eph: T, key: EphemerisKey) -> bool {
        let is_new = match &self.current {
            Some((_, cur_key)) => *cur_key != key,
            None => true,
        };
        if is_new {
            self.previous = self.current.take();
            self.current = Some((eph, key));
        }
        is_new
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref().map(|(e, _)| e)
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref().map(|(e, _)| e)
    }
}

/// Shared server-wide state: everything the consumer's drain-filter-emit
/// cycle touches under the single lock section 5 describes.
pub struct ServerState<T> {
    pub ephemerides: HashMap<SatIndex, EphemerisSlot<T>>,
    pub rtk_state: crate::rtk::RtkState,
    pub solutions: VecDeque<crate::solution::Solution>,
    pub last_observation_time: HashMap<Role, Instant>,
    pub dropped_out_of_order: u64,
}

impl<T> ServerState<T> {
    pub fn new(layout: crate::rtk::StateLayout) -> Self {
        Self {
            ephemerides: HashMap::new(),
            rtk_state: crate::rtk::RtkState::new(layout),
            solutions: VecDeque::new(),
            last_observation_time: HashMap::new(),
            dropped_out_of_order: 0,
        }
    }

    /// Section 5's ordering guarantee: observations delivered to the filter
    /// are monotonic non-decreasing in time per receiver. Returns `false`
    /// (and bumps the drop counter) for an out-of-order arrival.
    pub fn accept_observation_time(&mut self, role: Role, t: Instant) -> bool {
        if let Some(&last) = self.last_observation_time.get(&role) {
            if t.diff_seconds(last) < 0.0 {
                self.dropped_out_of_order += 1;
                return false;
            }
        }
        self.last_observation_time.insert(role, t);
        true
    }
}

/// Moving-base variant (section 4.J): estimates the base position each
/// epoch from its own single-point fix, low-pass filtered and with zero
/// velocity, gated on rover/base clock agreement.
#[derive(Default)]
pub struct MovingBaseEstimator {
    filtered_position_ecef_m: Option<[f64; 3]>,
}

impl MovingBaseEstimator {
    /// Low-pass filters `spp_position` (0.95 * previous + 0.05 * new) and
    /// returns the filtered estimate with implicit zero velocity (the
    /// estimator carries no velocity state to begin with).
    pub fn update(&mut self, spp_position_ecef_m: [f64; 3]) -> [f64; 3] {
        let filtered = match self.filtered_position_ecef_m {
            Some(prev) => {
                let mut out = [0.0; 3];
                for k in 0..3 {
                    out[k] = 0.95 * prev[k] + 0.05 * spp_position_ecef_m[k];
                }
                out
            }
            None => spp_position_ecef_m,
        };
        self.filtered_position_ecef_m = Some(filtered);
        filtered
    }

    pub fn position_ecef_m(&self) -> Option<[f64; 3]> {
        self.filtered_position_ecef_m
    }
}

/// Rover/base timestamps must be within this tolerance (seconds) for the
/// moving-base estimate to be trusted this epoch (section 4.J's
/// `TTOL_MOVEB`).
pub fn within_moving_base_tolerance(rover_time: Instant, base_time: Instant, ttol_moveb_s: f64) -> bool {
    rover_time.diff_seconds(base_time).abs() <= ttol_moveb_s
}

/// NMEA up-link mode selector (to stream 1), section 4.J.
#[derive(Clone, Debug, PartialEq)]
pub enum NmeaUplinkMode {
    Off,
    Fixed { lat_rad: f64, lon_rad: f64, height_m: f64 },
    RepeatedCurrent,
    ResetAndCurrent { reset_threshold_m: f64, min_interval_ms: u64 },
}

/// Tracks the reset-and-current mode's last-reset bookkeeping across calls.
#[derive(Default)]
pub struct NmeaUplink {
    last_reset: Option<Instant>,
}

/// One outgoing up-link message: either a reset command sent to the base or
/// a regular solution sentence.
pub enum UplinkMessage {
    Reset(String),
    Solution(String),
}

impl NmeaUplink {
    /// Computes this cycle's up-link message (if any), per `mode`.
    /// `baseline_m` is the current rover-base separation; `rover_speed_mps`
    /// gates the forward-prediction rule for reset-and-current mode.
    pub fn next_message(
        &mut self,
        mode: &NmeaUplinkMode,
        current: &crate::solution::Solution,
        baseline_m: f64,
        rover_speed_mps: f64,
    ) -> Option<UplinkMessage> {
        match mode {
            NmeaUplinkMode::Off => None,
            NmeaUplinkMode::Fixed { lat_rad, lon_rad, height_m } => {
                let position_ecef_m = crate::solution::geodetic_to_ecef(*lat_rad, *lon_rad, *height_m);
                let mut fixed = current.clone();
                fixed.position_ecef_m = position_ecef_m;
                Some(UplinkMessage::Solution(format_gga(&fixed)))
            }
            NmeaUplinkMode::RepeatedCurrent => Some(UplinkMessage::Solution(format_gga(current))),
            NmeaUplinkMode::ResetAndCurrent { reset_threshold_m, min_interval_ms } => {
                let due_for_reset = baseline_m > *reset_threshold_m
                    && self
                        .last_reset
                        .map(|last| current.time.diff_seconds(last) * 1000.0 >= *min_interval_ms as f64)
                        .unwrap_or(true);

                if due_for_reset {
                    self.last_reset = Some(current.time);
                    return Some(UplinkMessage::Reset(format_gga(current)));
                }

                let mut predicted = current.clone();
                if rover_speed_mps > 10.0 {
                    // Predict one baseline-reset distance forward along the
                    // current position vector's own direction, per section
                    // 4.J; a true course-made-good would need a velocity
                    // state this estimator does not carry.
                    let norm = (predicted.position_ecef_m[0].powi(2)
                        + predicted.position_ecef_m[1].powi(2)
                        + predicted.position_ecef_m[2].powi(2))
                    .sqrt();
                    if norm > 1e-6 {
                        for k in 0..3 {
                            predicted.position_ecef_m[k] += reset_threshold_m * predicted.position_ecef_m[k] / norm;
                        }
                    }
                }
                Some(UplinkMessage::Solution(format_gga(&predicted)))
            }
        }
    }
}

fn format_gga(solution: &crate::solution::Solution) -> String {
    let mut config = crate::config::Config::default();
    config.output_format = crate::config::OutputFormat::Nmea;
    crate::solution::format_solution(solution, &config)
}

/// Runs one consumer cycle: drains the byte rings (parsing is left to the
/// caller, section 4.J puts decoding behind the ring boundary), then runs
/// the filter's time/measurement update via the closures supplied, and
/// pushes the resulting solution. Returns `false` if `stop` was set, in
/// which case the caller should join its producer threads and exit.
pub fn run_cycle<T>(
    state: &Mutex<ServerState<T>>,
    stop: &AtomicBool,
    cycle: Duration,
    mut drain_and_filter: impl FnMut(&mut ServerState<T>),
) -> bool {
    if stop.load(Ordering::Relaxed) {
        return false;
    }
    let cycle_start = std::time::Instant::now();
    {
        let mut guard = state.lock().unwrap();
        drain_and_filter(&mut guard);
    }
    let elapsed = cycle_start.elapsed();
    if elapsed < cycle {
        thread::sleep(cycle - elapsed);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ring_drains_pushed_bytes() {
        let ring = ByteRing::new();
        ring.push(&[1, 2, 3]);
        assert_eq!(ring.drain(), vec![1, 2, 3]);
        assert!(ring.is_empty());
    }

    #[test]
    fn ephemeris_slot_swaps_on_new_key() {
        let mut slot: EphemerisSlot<u32> = EphemerisSlot::default();
        let k1 = EphemerisKey { iode: 1, toe: Instant::new(0, 0.0), toc: Instant::new(0, 0.0) };
        let k2 = EphemerisKey { iode: 2, toe: Instant::new(7200, 0.0), toc: Instant::new(7200, 0.0) };
        assert!(slot.update(100, k1));
        assert!(!slot.update(100, k1));
        assert!(slot.update(200, k2));
        assert_eq!(*slot.current().unwrap(), 200);
        assert_eq!(*slot.previous().unwrap(), 100);
    }

    #[test]
    fn moving_base_low_pass_filters_toward_new_position() {
        let mut est = MovingBaseEstimator::default();
        est.update([100.0, 0.0, 0.0]);
        let second = est.update([200.0, 0.0, 0.0]);
        assert!((second[0] - 105.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_order_observation_is_dropped() {
        let layout = crate::rtk::StateLayout::default();
        let mut state: ServerState<u32> = ServerState::new(layout);
        assert!(state.accept_observation_time(Role::Rover, Instant::new(100, 0.0)));
        assert!(!state.accept_observation_time(Role::Rover, Instant::new(90, 0.0)));
        assert_eq!(state.dropped_out_of_order, 1);
    }

    #[test]
    fn reset_and_current_fires_once_past_threshold() {
        let mut uplink = NmeaUplink::default();
        let mode = NmeaUplinkMode::ResetAndCurrent { reset_threshold_m: 10.0, min_interval_ms: 1000 };
        let sol = crate::solution::Solution::none_at(Instant::new(0, 0.0));
        let msg = uplink.next_message(&mode, &sol, 20.0, 0.0);
        assert!(matches!(msg, Some(UplinkMessage::Reset(_))));

        let sol2 = crate::solution::Solution::none_at(Instant::new(0, 0.3));
        let msg2 = uplink.next_message(&mode, &sol2, 20.0, 0.0);
        assert!(matches!(msg2, Some(UplinkMessage::Solution(_))));
    }
}
