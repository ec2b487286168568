//! Atmospheric delay models (section 4.E): Saastamoinen troposphere with
//! Niell mapping, Klobuchar and IONEX ionosphere, SBAS grid ionosphere.

pub mod ionex_interp;
pub mod klobuchar;
pub mod sbas_iono;
pub mod tropo;

pub use tropo::{niell_mapping, saastamoinen_zenith_delays, tropo_delay};
