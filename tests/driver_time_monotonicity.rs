//! "Time monotonicity" (section 8): in forward mode, successive solutions
//! never go backward in time.
#[cfg(test)]
mod test {
    use rtk_core::driver::{run_forward, EpochInput};
    use rtk_core::prelude::*;

    fn empty_epoch(whole_seconds: i64) -> EpochInput {
        EpochInput {
            time: Instant::new(whole_seconds, 0.0),
            nominal_dt_s: 1.0,
            spp_candidates: Vec::new(),
            sd_measurements: Vec::new(),
            slips: Vec::new(),
            ambiguity_candidates: Vec::new(),
            tracking_updates: Vec::new(),
            baseline_m: 0.0,
            base_position_ecef_m: None,
        }
    }

    #[test]
    fn forward_solutions_never_go_backward_in_time() {
        let config = Config::default_for(PositioningMode::Static);
        let epochs: Vec<EpochInput> = (0..10).map(|k| empty_epoch(k as i64)).collect();

        let solutions = run_forward(&epochs, &config);
        assert_eq!(solutions.len(), epochs.len());

        for pair in solutions.windows(2) {
            let dt = pair[1].time.diff_seconds(pair[0].time);
            assert!(dt >= -1e-9, "solution time went backward: {dt}");
        }
    }

    #[test]
    fn forward_solutions_echo_input_epoch_times() {
        let config = Config::default_for(PositioningMode::Static);
        let epochs: Vec<EpochInput> = (0..5).map(|k| empty_epoch(100 + k as i64)).collect();
        let solutions = run_forward(&epochs, &config);
        for (epoch, solution) in epochs.iter().zip(solutions.iter()) {
            assert_eq!(solution.time.diff_seconds(epoch.time).abs() < 1e-9, true);
        }
    }
}
