//! "Baseline constraint" (section 8): once enabled with length L and
//! sigma_L, the pseudo-measurement pulls the rover-to-base distance toward
//! L within a few sigma.
#[cfg(test)]
mod test {
    use rtk_core::prelude::*;
    use rtk_core::rtk::filter::apply_baseline_constraint;

    #[test]
    fn constraint_pulls_baseline_length_toward_target() {
        let layout = StateLayout::default();
        let mut state = RtkState::new(layout);

        let base = [4_510_731.0_f64, 1_351_174.0, 4_408_130.0];
        // Rover placed 105 m north of the base along a simple axis offset;
        // constrained to a 100 m baseline.
        state.set_position([base[0], base[1], base[2] + 105.0]);
        for k in 0..3 {
            state.p[(StateLayout::POSITION_OFFSET + k, StateLayout::POSITION_OFFSET + k)] = 25.0;
        }

        let length_m = 100.0;
        let std_m = 0.02;

        for _ in 0..5 {
            apply_baseline_constraint(&mut state, base, length_m, std_m).unwrap();
        }

        let rover = state.position();
        let norm = ((rover[0] - base[0]).powi(2) + (rover[1] - base[1]).powi(2) + (rover[2] - base[2]).powi(2)).sqrt();
        let k_sigma = 4.0;
        assert!(
            (norm - length_m).abs() <= k_sigma * std_m,
            "baseline length {norm} did not converge toward {length_m} within {k_sigma} sigma"
        );
    }
}
