//! Physical and WGS84 constants shared across the evaluator, atmosphere
//! and filter modules.

/// Speed of light in vacuum (m/s).
pub const CLIGHT: f64 = 299_792_458.0;
/// WGS84 earth semi-major axis (m).
pub const RE_WGS84: f64 = 6_378_137.0;
/// WGS84 earth flattening.
pub const FE_WGS84: f64 = 1.0 / 298.257223563;
/// Earth gravitational constant (m^3/s^2), WGS84/GPS value.
pub const GM_EARTH: f64 = 3.986005e14;
/// Earth gravitational constant, GLONASS (PZ-90) value.
pub const GM_EARTH_GLO: f64 = 3.9860044e14;
/// Earth rotation rate (rad/s), WGS84/GPS value.
pub const OMGE: f64 = 7.2921151467e-5;
/// Earth rotation rate (rad/s), GLONASS value.
pub const OMGE_GLO: f64 = 7.292115e-5;
/// Second zonal harmonic, GLONASS (PZ-90).
pub const J2_GLO: f64 = 1.0826257e-3;
/// Relativistic correction constant F = -2*sqrt(GM)/c^2.
pub const RELATIVISTIC_F: f64 = -4.442807633e-10;

/// Max number of frequencies modelled per satellite.
pub const NFREQ: usize = 3;
/// Max number of "extra" observation slots beyond NFREQ per system.
pub const NEXOBS: usize = 3;

/// Dense satellite numbering ranges, GPS -> GLONASS -> Galileo -> QZSS ->
/// BeiDou -> IRNSS -> SBAS, matching the data model's MAXSAT bijection.
pub const MAXPRNGPS: u16 = 32;
pub const MAXPRNGLO: u16 = 27;
pub const MAXPRNGAL: u16 = 36;
pub const MAXPRNQZS: u16 = 10;
pub const MAXPRNCMP: u16 = 63;
pub const MAXPRNIRN: u16 = 14;
pub const MAXPRNSBS: u16 = 39;

pub const MAXSAT: usize = (MAXPRNGPS
    + MAXPRNGLO
    + MAXPRNGAL
    + MAXPRNQZS
    + MAXPRNCMP
    + MAXPRNIRN
    + MAXPRNSBS) as usize;

/// Extrapolation-error growth factor for precise-orbit interpolation.
pub const EXTERR_EPH: f64 = 5e-7;
/// Extrapolation-error growth factor for precise-clock interpolation.
pub const EXTERR_CLK: f64 = 1e-6;

/// Gap (seconds) after which an ionospheric delay state is reset rather
/// than propagated.
pub const GAP_RESION: f64 = 120.0;

/// Minimum time (ms) between successive NMEA base-reset commands.
pub const MIN_INT_RESET_MS: f64 = 20_000.0;
/// Speed (m/s) above which the uplinked position is extrapolated forward.
pub const SPEED_PREDICTION_THRESHOLD: f64 = 10.0;

/// L1 frequency (Hz).
pub const FREQ_L1: f64 = 1.57542e9;
/// L2 frequency (Hz).
pub const FREQ_L2: f64 = 1.22760e9;
/// L5/E5a frequency (Hz).
pub const FREQ_L5: f64 = 1.17645e9;

/// One TEC unit's effect on the L1 range (m), per 1e16 electrons/m^2.
pub const TECU_TO_L1_METERS: f64 = 0.162;
