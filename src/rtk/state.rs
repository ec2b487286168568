//! RTK filter state layout (section 4.G): a flat `x`/`P` with a fixed
//! block order, indexed through helpers rather than scattered magic
//! offsets, following the "compressed-index accessor" pattern called for
//! in the design notes and implemented in [`crate::linalg`].

use crate::constants::{MAXSAT, NFREQ};
use crate::sat::SatIndex;

/// Fixed block layout of the state vector. Every block is present at a
/// fixed offset; zero-variance entries within a block mean "not
/// currently estimated", handled by [`crate::linalg::compress_indices`]
/// rather than by resizing the vector (section 9's "state dimensionality"
/// invariant: x and P always have the configured dimension n).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StateLayout {
    pub dynamics: bool,
    pub gradients: bool,
}

impl StateLayout {
    pub const POSITION_OFFSET: usize = 0;
    pub const POSITION_LEN: usize = 3;

    pub fn velocity_offset(self) -> Option<usize> {
        self.dynamics.then_some(Self::POSITION_OFFSET + Self::POSITION_LEN)
    }

    pub fn acceleration_offset(self) -> Option<usize> {
        self.dynamics.then_some(self.velocity_offset().unwrap() + 3)
    }

    fn after_dynamics(self) -> usize {
        if self.dynamics {
            Self::POSITION_OFFSET + Self::POSITION_LEN + 3 + 3
        } else {
            Self::POSITION_OFFSET + Self::POSITION_LEN
        }
    }

    pub fn tropo_zwd_offset(self) -> usize {
        self.after_dynamics()
    }

    pub fn tropo_gradient_offset(self) -> Option<usize> {
        self.gradients.then_some(self.tropo_zwd_offset() + 1)
    }

    fn after_rover_tropo(self) -> usize {
        self.tropo_zwd_offset() + 1 + if self.gradients { 2 } else { 0 }
    }

    /// Base-side zenith tropospheric delay (section 4.G's data model calls
    /// for a ZWD state at each end, not just the rover).
    pub fn tropo_zwd_base_offset(self) -> usize {
        self.after_rover_tropo()
    }

    pub fn tropo_gradient_base_offset(self) -> Option<usize> {
        self.gradients.then_some(self.tropo_zwd_base_offset() + 1)
    }

    fn after_tropo(self) -> usize {
        self.tropo_zwd_base_offset() + 1 + if self.gradients { 2 } else { 0 }
    }

    pub fn icb_offset(self) -> usize {
        self.after_tropo()
    }

    pub fn iono_offset(self) -> usize {
        self.icb_offset() + 1
    }

    pub fn iono_index(self, sat: SatIndex) -> usize {
        self.iono_offset() + sat.0
    }

    pub fn phase_bias_offset(self) -> usize {
        self.iono_offset() + MAXSAT
    }

    pub fn phase_bias_index(self, sat: SatIndex, freq: usize) -> usize {
        self.phase_bias_offset() + sat.0 * NFREQ + freq
    }

    pub fn total_len(self) -> usize {
        self.phase_bias_offset() + MAXSAT * NFREQ
    }
}

impl Default for StateLayout {
    fn default() -> Self {
        Self { dynamics: false, gradients: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_bias_indices_do_not_overlap_iono() {
        let layout = StateLayout::default();
        let last_iono = layout.iono_index(SatIndex(MAXSAT - 1));
        let first_bias = layout.phase_bias_index(SatIndex(0), 0);
        assert!(first_bias > last_iono);
    }

    #[test]
    fn dynamics_shifts_tropo_block() {
        let without = StateLayout { dynamics: false, gradients: false };
        let with = StateLayout { dynamics: true, gradients: false };
        assert_eq!(with.tropo_zwd_offset(), without.tropo_zwd_offset() + 6);
    }

    #[test]
    fn total_len_accounts_for_every_block() {
        let layout = StateLayout { dynamics: true, gradients: true };
        let expected = 3 + 3 + 3 + (1 + 2) + (1 + 2) + 1 + MAXSAT + MAXSAT * NFREQ;
        assert_eq!(layout.total_len(), expected);
    }
}
