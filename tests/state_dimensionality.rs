//! "State dimensionality" (section 8): x and P always have the configured
//! dimension n, and zero-variance entries carry a zero state value.
#[cfg(test)]
mod test {
    use rtk_core::prelude::*;

    #[test]
    fn static_layout_matches_x_and_p_dimensions() {
        let layout = StateLayout { dynamics: false, gradients: false };
        let state = RtkState::new(layout);
        assert_eq!(state.x.len(), layout.total_len());
        assert_eq!(state.p.nrows(), layout.total_len());
        assert_eq!(state.p.ncols(), layout.total_len());
    }

    #[test]
    fn kinematic_layout_is_larger_than_static() {
        let static_layout = StateLayout { dynamics: false, gradients: false };
        let kinematic_layout = StateLayout { dynamics: true, gradients: true };
        assert!(kinematic_layout.total_len() > static_layout.total_len());
    }

    #[test]
    fn fresh_state_has_all_zero_entries() {
        let layout = StateLayout::default();
        let state = RtkState::new(layout);
        assert!(state.x.iter().all(|&v| v == 0.0));
        for i in 0..layout.total_len() {
            assert_eq!(state.p[(i, i)], 0.0);
        }
    }

    #[test]
    fn phase_bias_and_iono_blocks_stay_within_total_len() {
        let layout = StateLayout::default();
        let sat = SatIndex(SatIndex::MAXSAT - 1);
        assert!(layout.iono_index(sat) < layout.total_len());
        assert!(layout.phase_bias_index(sat, 1) < layout.total_len());
    }
}
