//! Observation & ephemeris store: growable containers, per-satellite
//! ephemeris rings, precise-orbit/clock tables, and the session [`Context`]
//! that owns them all.
//!
//! The "process-wide mutable state" pattern the design notes call out is
//! replaced here by [`Context`]: every operation in the crate takes a
//! `&Context` or `&mut Context` rather than reaching for statics, mirroring
//! how `gnss-rtk::Solver` threads its own config/cosmic-model state through
//! an owned struct instead of globals.

pub mod ephemeris;
pub mod ionex;
pub mod observation;
pub mod precise;
pub mod sbas;
pub mod ssr;

use crate::error::{Error, Result};
use std::collections::HashMap;

/// A growable sequence that doubles its backing capacity when full, never
/// shrinking below the high-water mark reached during a session. Matches
/// the "realloc-grow arrays with error fall-through" pattern from the
/// design notes: growth failure invalidates the whole container rather
/// than leaving it partially grown.
#[derive(Debug, Clone)]
pub struct GrowableSeq<T> {
    items: Vec<T>,
    high_water_mark: usize,
}

impl<T> Default for GrowableSeq<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            high_water_mark: 0,
        }
    }
}

impl<T> GrowableSeq<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Appends `item`, doubling capacity ahead of time if the backing
    /// storage is full. A capacity overflow invalidates the container
    /// (drops all items) and surfaces [`Error::ResourceExhausted`], per the
    /// store's documented failure mode.
    pub fn append(&mut self, item: T) -> Result<()> {
        if self.items.len() == self.items.capacity() {
            let new_cap = (self.items.capacity().max(4)).saturating_mul(2);
            if new_cap > (isize::MAX as usize) / std::mem::size_of::<T>().max(1) {
                self.items.clear();
                self.items.shrink_to_fit();
                return Err(Error::ResourceExhausted("growable sequence capacity overflow"));
            }
            self.items.reserve(new_cap - self.items.len());
        }
        self.items.push(item);
        self.high_water_mark = self.high_water_mark.max(self.items.len());
        Ok(())
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) -> Result<()> {
        for item in items {
            self.append(item)?;
        }
        Ok(())
    }

    pub fn sort_by<F: FnMut(&T, &T) -> std::cmp::Ordering>(&mut self, f: F) {
        self.items.sort_by(f);
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, f: F) {
        self.items.retain(f);
    }

    pub fn dedup_by<F: FnMut(&mut T, &mut T) -> bool>(&mut self, f: F) {
        self.items.dedup_by(f);
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

impl<T> std::ops::Index<usize> for GrowableSeq<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.items[i]
    }
}

/// A per-satellite ring of the given fixed capacity (2 for broadcast
/// ephemeris in post-processing mode, 4 in server mode to track dual
/// Galileo I/NAV and F/NAV sets), with write-once-then-swap semantics.
#[derive(Debug, Clone)]
pub struct EphemerisRing<T> {
    slots: Vec<Option<T>>,
    write_cursor: usize,
}

impl<T> EphemerisRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.max(2)).map(|_| None).collect(),
            write_cursor: 0,
        }
    }

    /// Inserts `item` into the next slot, overwriting the oldest. Returns
    /// the slot index written.
    pub fn push(&mut self, item: T) -> usize {
        let idx = self.write_cursor;
        self.slots[idx] = Some(item);
        self.write_cursor = (self.write_cursor + 1) % self.slots.len();
        idx
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn latest(&self) -> Option<&T> {
        let last = (self.write_cursor + self.slots.len() - 1) % self.slots.len();
        self.slots[last].as_ref()
    }
}

/// The session context: the single owner of every loaded table. Created by
/// the caller before a processing run, freed when the run ends (freeing the
/// store and any filter scratch carried alongside it).
#[derive(Debug, Default)]
pub struct Context {
    pub observations: GrowableSeq<observation::ObservationRecord>,
    pub broadcast_ephemeris: HashMap<u16, EphemerisRing<ephemeris::BroadcastEphemeris>>,
    pub precise_orbits: GrowableSeq<precise::PreciseOrbitSample>,
    pub precise_clocks: GrowableSeq<precise::PreciseClockSample>,
    pub ionex_maps: GrowableSeq<ionex::IonexMap>,
    pub sbas_messages: GrowableSeq<sbas::SbasMessage>,
    /// Per-satellite decoded SBAS correction state, assembled from the raw
    /// message log as sub-records arrive.
    pub sbas_corrections: HashMap<u16, sbas::SbasCorrectionState>,
    pub ssr_corrections: HashMap<u16, ssr::SsrCorrection>,
    /// Broadcast Klobuchar alpha/beta parameters, when the NAV header
    /// carried an `IONOSPHERIC CORR`/`ION ALPHA`+`ION BETA` block.
    pub klobuchar: Option<crate::atmosphere::klobuchar::KlobucharParams>,
    /// Count of distinct rover epochs seen after the last sort.
    pub nepoch: usize,
    /// Ephemeris-ring capacity: 2 for post-processing, 4 for server mode.
    pub ephemeris_ring_capacity: usize,
}

impl Context {
    pub fn new(ephemeris_ring_capacity: usize) -> Self {
        Self {
            ephemeris_ring_capacity,
            ..Default::default()
        }
    }

    /// Stable lexicographic sort by (time, satellite, receiver); also
    /// recomputes [`Self::nepoch`] as the count of distinct rover epochs.
    pub fn sort_observations(&mut self) {
        self.observations.sort_by(|a, b| {
            a.time
                .partial_cmp(&b.time)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.satellite.0.cmp(&b.satellite.0))
                .then((a.receiver as u8).cmp(&(b.receiver as u8)))
        });
        let mut last_rover_time: Option<crate::time::Instant> = None;
        let mut count = 0usize;
        for obs in self.observations.iter() {
            if obs.receiver == observation::Receiver::Rover {
                let is_new = match last_rover_time {
                    Some(t) => (obs.time.diff_seconds(t)).abs() > 1e-9,
                    None => true,
                };
                if is_new {
                    count += 1;
                    last_rover_time = Some(obs.time);
                }
            }
        }
        self.nepoch = count;
    }

    /// For each satellite, sorts its ephemeris ring by (toe, ttr) and
    /// collapses entries within 1ns sharing the same IODE. The ring's fixed
    /// capacity already bounds how much history is kept; this only
    /// normalises ordering within what's present.
    pub fn unique_nav(&mut self) {
        for ring in self.broadcast_ephemeris.values_mut() {
            let mut items: Vec<_> = ring.slots.iter().filter_map(|s| s.clone()).collect();
            items.sort_by(|a, b| {
                a.toe
                    .partial_cmp(&b.toe)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(
                        a.ttr
                            .partial_cmp(&b.ttr)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
            });
            items.dedup_by(|a, b| a.iode == b.iode && (a.toe.diff_seconds(b.toe)).abs() < 1e-9);
            for slot in ring.slots.iter_mut() {
                *slot = None;
            }
            ring.write_cursor = 0;
            for item in items {
                ring.push(item);
            }
        }
    }

    /// Merges precise-orbit and precise-clock samples with identical
    /// timestamps, preferring newly-loaded non-zero values over earlier
    /// ones, per the "combine_precise" operation.
    pub fn combine_precise(&mut self) {
        self.precise_orbits
            .sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
        self.precise_orbits.dedup_by(|newer, earlier| {
            let same_time = (newer.time.diff_seconds(earlier.time)).abs() < 1e-9;
            if same_time {
                precise::merge_orbit_sample(earlier, newer);
            }
            same_time
        });

        self.precise_clocks
            .sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
        self.precise_clocks.dedup_by(|newer, earlier| {
            let same_time = (newer.time.diff_seconds(earlier.time)).abs() < 1e-9;
            if same_time {
                precise::merge_clock_sample(earlier, newer);
            }
            same_time
        });
    }
}
