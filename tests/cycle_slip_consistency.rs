//! "Cycle-slip consistency" (section 8): an LLI slip bit on (sat, freq) at
//! epoch k forces that phase-bias state to zero at the start of epoch
//! k+1's measurement update, i.e. right after the corresponding time
//! update runs.
#[cfg(test)]
mod test {
    use rtk_core::prelude::*;
    use rtk_core::rtk::filter::{time_update, SlipInput};
    use rtk_core::rtk::tracking::TrackingRecord;

    fn gps_sat(prn: u8) -> SatIndex {
        SatIndex::from_sv(SV::new(Constellation::GPS, prn)).unwrap()
    }

    #[test]
    fn slip_resets_phase_bias_to_zero() {
        let config = Config::default_for(PositioningMode::Static);
        let layout = StateLayout::default();
        let mut state = RtkState::new(layout);
        let sat = gps_sat(5);
        let idx = layout.phase_bias_index(sat, 0);

        // Seed a non-zero bias as if several epochs had already locked it.
        state.x[idx] = 123.456;
        state.p[(idx, idx)] = 4.0;
        state.tracking.insert(sat, TrackingRecord::default());

        let slip = SlipInput {
            satellite: sat,
            freq: 0,
            lli_slip_rover: true,
            lli_slip_base: false,
            geometry_free_now_m: None,
            doppler_phase_diff_now: None,
            outage_this_epoch: false,
            initial_value: None,
        };
        time_update(&mut state, &config, 1.0, 0.0, std::slice::from_ref(&slip));

        assert_eq!(state.x[idx], 0.0);
        assert_eq!(state.p[(idx, idx)], 0.0);
    }

    #[test]
    fn no_slip_leaves_phase_bias_untouched_and_grows_variance() {
        let config = Config::default_for(PositioningMode::Static);
        let layout = StateLayout::default();
        let mut state = RtkState::new(layout);
        let sat = gps_sat(7);
        let idx = layout.phase_bias_index(sat, 0);

        state.x[idx] = 42.0;
        state.p[(idx, idx)] = 4.0;
        state.tracking.insert(sat, TrackingRecord::default());

        let slip = SlipInput {
            satellite: sat,
            freq: 0,
            lli_slip_rover: false,
            lli_slip_base: false,
            geometry_free_now_m: None,
            doppler_phase_diff_now: None,
            outage_this_epoch: false,
            initial_value: None,
        };
        time_update(&mut state, &config, 1.0, 0.0, std::slice::from_ref(&slip));

        assert_eq!(state.x[idx], 42.0);
        assert!(state.p[(idx, idx)] > 4.0);
    }
}
