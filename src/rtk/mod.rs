//! RTK Kalman core (section 4.G) and ambiguity resolver (section 4.H).
//!
//! Grounded on `gnss-rtk`'s filter/solver split (a time-update + a
//! measurement-update step feeding a shared state), generalized from its
//! single-receiver PPP-style filter to the double-differenced short-
//! baseline filter section 4.G describes, and on [`crate::linalg`]'s
//! compressed-system Kalman update for the actual numerics.

pub mod ambiguity;
pub mod filter;
pub mod state;
pub mod tracking;

pub use state::StateLayout;
pub use tracking::{FrequencyTrack, TrackingRecord};

use crate::sat::SatIndex;
use crate::time::Instant;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

/// The filter's full state: position (and optionally velocity/acceleration),
/// troposphere, receiver hardware bias, per-satellite ionosphere and
/// per-satellite-per-frequency phase bias, plus the per-satellite tracking
/// bookkeeping the time/measurement updates consult.
pub struct RtkState {
    pub layout: StateLayout,
    pub x: DVector<f64>,
    pub p: DMatrix<f64>,
    /// Fixed single-difference bias solution and its covariance, held
    /// separately from the float `x`/`p` (section 4.H): set on a validated
    /// fix, cleared otherwise, and never fed back into the float state
    /// directly. Output and fix-and-hold both read from here, not `x`/`p`.
    pub xa: Option<DVector<f64>>,
    pub pa: Option<DMatrix<f64>>,
    pub tracking: HashMap<SatIndex, TrackingRecord>,
    pub prev_time: Option<Instant>,
    /// Number of consecutive epochs the ambiguity resolver has produced a
    /// validated fix; feeds the fix-and-hold trigger (section 4.H).
    pub consecutive_fixes: u32,
    pub last_quality_was_fix: bool,
    /// Round-robin cursor for partial-fix satellite exclusion retries.
    pub excsat_cursor: usize,
}

impl RtkState {
    pub fn new(layout: StateLayout) -> Self {
        let n = layout.total_len();
        Self {
            layout,
            x: DVector::zeros(n),
            p: DMatrix::zeros(n, n),
            xa: None,
            pa: None,
            tracking: HashMap::new(),
            prev_time: None,
            consecutive_fixes: 0,
            last_quality_was_fix: false,
            excsat_cursor: 0,
        }
    }

    pub fn position(&self) -> [f64; 3] {
        let off = StateLayout::POSITION_OFFSET;
        [self.x[off], self.x[off + 1], self.x[off + 2]]
    }

    pub fn set_position(&mut self, pos: [f64; 3]) {
        let off = StateLayout::POSITION_OFFSET;
        for k in 0..3 {
            self.x[off + k] = pos[k];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_layout_dimension() {
        let layout = StateLayout::default();
        let state = RtkState::new(layout);
        assert_eq!(state.x.len(), layout.total_len());
        assert_eq!(state.p.nrows(), layout.total_len());
    }
}
