//! Session configuration, grounded on `gnss-rtk::cfg::RTKConfig`'s
//! per-field `serde(default = "fn")` shape, generalized to the full CLI
//! surface of section 6 and the filter/ambiguity knobs of sections 4.G-4.H.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Positioning mode requested of the driver/server.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PositioningMode {
    #[default]
    Static,
    Kinematic,
}

/// Post-processing direction, matching `-b`/`-c` (section 6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProcessingDirection {
    #[default]
    Forward,
    Backward,
    Combined,
}

/// Output record format selector (`-e`/`-a`/`-n` etc).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutputFormat {
    #[default]
    Llh,
    Xyz,
    Enu,
    Nmea,
    Status,
}

/// Which frequency-dependent modelling toggles are enabled, mirroring
/// `gnss-rtk::model::Modeling`'s boolean bag.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Modeling {
    pub sv_clock_bias: bool,
    pub tropo_delay: bool,
    pub iono_delay: bool,
    pub sv_total_group_delay: bool,
    pub earth_rotation: bool,
    pub relativistic_clock_corr: bool,
}

impl Default for Modeling {
    fn default() -> Self {
        Self {
            sv_clock_bias: true,
            tropo_delay: true,
            iono_delay: true,
            sv_total_group_delay: true,
            earth_rotation: true,
            relativistic_clock_corr: true,
        }
    }
}

/// Baseline-length constraint (section 4.G), applied as a pseudo-measurement
/// when both a length and a standard deviation are configured.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineConstraint {
    pub length_m: f64,
    pub std_m: f64,
}

/// Full session configuration: every knob the CLI (section 6) exposes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    pub mode: PositioningMode,
    pub direction: ProcessingDirection,
    pub sampling_interval_s: f64,
    pub elevation_mask_deg: f64,
    pub enabled_constellations: Vec<gnss_rs::prelude::Constellation>,
    pub frequency_count: u8,
    pub instant_ar: bool,
    pub fix_and_hold: bool,
    pub baseline: Option<BaselineConstraint>,
    pub output_format: OutputFormat,
    pub nmea: bool,
    pub dms: bool,
    pub formatted_time: bool,
    pub utc: bool,
    pub decimals: u8,
    pub separator: String,
    pub reference_ecef: Option<[f64; 3]>,
    pub reference_llh: Option<[f64; 3]>,
    pub status_level: u8,
    pub trace_level: u8,
    pub modeling: Modeling,
    pub min_sv_elev_deg: f64,
    pub min_sv_snr_dbhz: f64,
    pub min_lock_count: i32,
    pub gain_hold_amb: f64,
    pub min_fix_count: u32,
    pub sigma_phase_bias: f64,
    pub sigma_zwd: f64,
    pub sigma_iono: f64,
    pub sigma_icb: f64,
    pub max_outage: u32,
    pub gap_resion_s: f64,
    pub inno_thresh: f64,
    /// Chi-squared residual-sum-of-squares threshold past which the
    /// single-point solver triggers RAIM re-selection (section 4.F).
    pub raim_chi2_threshold: f64,
    pub ratio_threshold_min: f64,
    pub ratio_threshold_max: f64,
    pub enable_dynamics: bool,
    /// Process noise on the acceleration states (m/s^2 per sqrt(s)), applied
    /// equally on east/north/up before rotation into ECEF, when dynamics
    /// are enabled (section 4.G).
    pub sigma_accel_mss: f64,
    /// Elevation mask (radians) below which a phase-bias state cannot
    /// become a reference in the ambiguity resolver (section 4.H's
    /// `elmaskar`).
    pub elevation_mask_ar_deg: f64,
    /// Innovation rejection threshold (section 4.G's `inno_thresh`,
    /// metres) scaled by 10x for just-initialised bias states.
    pub inno_thresh_init_factor: f64,
    pub sigma_hold_m: f64,
    /// Geometry-free jump (m) past which a cycle slip is declared (section
    /// 4.G's time-update bias-reset rule).
    pub gf_jump_threshold_m: f64,
    /// Doppler-minus-phase-difference deviation (m/s) from the epoch mean
    /// past which a cycle slip is declared.
    pub doppler_phase_threshold_mps: f64,
    /// Section 4.G single-difference variance model, following RTKLIB's
    /// `varerr`: base-noise term `a` (metres), common to every SD.
    pub sigma_err_base_m: f64,
    /// Elevation-dependent term `b` (metres), scaled by `1/sin(el)`.
    pub sigma_err_el_m: f64,
    /// Baseline-length term coefficient `c` (metres per 1e4 m of
    /// baseline), applied as `2*(c*baseline/1e4)^2`.
    pub sigma_err_baseline_per_1e4: f64,
    /// SNR term coefficient `d` (metres), scaled by
    /// `10^(0.1*(snr_max-snr))` at each end of the single difference.
    pub sigma_err_snr_m: f64,
    /// Reference (best-case) SNR (dB-Hz) the SNR term is measured against.
    pub snr_max_dbhz: f64,
    /// Trust weight `e` applied to the receiver-reported standard
    /// deviation term, when present.
    pub sigma_err_std_weight: f64,
    /// Clock-stability term (s/s), scaled by `CLIGHT * sigma * dt`.
    pub sigma_clk_stability_per_s: f64,
    /// Pseudorange-vs-phase noise ratio (RTKLIB's `eratio`): code
    /// single-differences are scaled by this factor relative to phase.
    pub code_phase_noise_ratio: f64,
    /// GLONASS system-noise inflation factor (RTKLIB's `EFACT_GLO`).
    pub system_factor_glonass: f64,
    /// SBAS system-noise inflation factor (RTKLIB's `EFACT_SBS`).
    pub system_factor_sbas: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: PositioningMode::Static,
            direction: ProcessingDirection::Forward,
            sampling_interval_s: 1.0,
            elevation_mask_deg: 15.0,
            enabled_constellations: vec![gnss_rs::prelude::Constellation::GPS],
            frequency_count: 2,
            instant_ar: false,
            fix_and_hold: false,
            baseline: None,
            output_format: OutputFormat::Llh,
            nmea: false,
            dms: false,
            formatted_time: true,
            utc: false,
            decimals: 4,
            separator: " ".to_string(),
            reference_ecef: None,
            reference_llh: None,
            status_level: 0,
            trace_level: 0,
            modeling: Modeling::default(),
            min_sv_elev_deg: 15.0,
            min_sv_snr_dbhz: 35.0,
            min_lock_count: 0,
            gain_hold_amb: 0.01,
            min_fix_count: 5,
            sigma_phase_bias: 1e-4,
            sigma_zwd: 1e-4,
            sigma_iono: 1e-3,
            sigma_icb: 1e-6,
            max_outage: 5,
            gap_resion_s: crate::constants::GAP_RESION,
            inno_thresh: 30.0,
            raim_chi2_threshold: 30.0,
            ratio_threshold_min: 2.5,
            ratio_threshold_max: 5.0,
            enable_dynamics: false,
            sigma_accel_mss: 1.0,
            elevation_mask_ar_deg: 15.0,
            inno_thresh_init_factor: 10.0,
            sigma_hold_m: 0.01,
            gf_jump_threshold_m: 0.05,
            doppler_phase_threshold_mps: 10.0,
            sigma_err_base_m: 0.003,
            sigma_err_el_m: 0.003,
            sigma_err_baseline_per_1e4: 0.0,
            sigma_err_snr_m: 0.003,
            snr_max_dbhz: 52.0,
            sigma_err_std_weight: 1.0,
            sigma_clk_stability_per_s: 5e-12,
            code_phase_noise_ratio: 100.0,
            system_factor_glonass: 1.5,
            system_factor_sbas: 3.0,
        }
    }
}

impl Config {
    /// Sensible defaults for a static single-baseline RTK run; the
    /// kinematic variant relaxes process noise and widens the elevation
    /// mask's interaction with lock-time requirements, mirroring
    /// `gnss-rtk::cfg::RTKConfig::default`'s mode-branching constructor.
    pub fn default_for(mode: PositioningMode) -> Self {
        let mut cfg = Self::default();
        cfg.mode = mode;
        if mode == PositioningMode::Kinematic {
            cfg.enable_dynamics = true;
            cfg.sigma_phase_bias = 1e-3;
        }
        cfg
    }
}
