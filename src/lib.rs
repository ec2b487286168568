//! Real-time kinematic GNSS positioning core.
//!
//! Observation/ephemeris parsing, satellite-state evaluation, atmospheric
//! corrections, single-point and RTK positioning, ambiguity resolution,
//! a post-processing driver and a plain-threads streaming server.
//!
//! Module boundaries follow the component design: [`store`] owns the
//! dense-satellite-indexed data model, [`evaluator`] turns stored
//! ephemerides into sky states, [`spp`]/[`rtk`] turn sky states and
//! observations into solutions, and [`driver`]/[`server`] drive those
//! solvers over a file set or a live byte stream respectively.

pub mod atmosphere;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod linalg;
pub mod logging;
pub mod observable;
pub mod rtk;
pub mod sat;
pub mod server;
pub mod solution;
pub mod spp;
pub mod store;
pub mod time;

#[cfg(any(feature = "obs", feature = "nav", feature = "sp3", feature = "ionex", feature = "sbas"))]
pub mod parsing;

/// Common imports for downstream crates, following the teacher's
/// `rinex::prelude` convention: the types most callers construct or match
/// on, re-exported from wherever they actually live.
pub mod prelude {
    pub use crate::config::{BaselineConstraint, Config, Modeling, OutputFormat, PositioningMode, ProcessingDirection};
    pub use crate::error::{Error, ParseError, Result};
    pub use crate::observable::{Lli, ObservableCode, ObservableKind};
    pub use crate::sat::SatIndex;
    pub use crate::solution::{Dop, Solution, SolutionQuality};
    pub use crate::time::Instant;

    pub use crate::evaluator::{EphemerisSource, SatState};
    pub use crate::rtk::{RtkState, StateLayout};
    pub use crate::spp::{SppCandidate, SppResult};
    pub use crate::store::Context;

    pub use gnss_rs::prelude::{Constellation, SV};
    pub use hifitime::Epoch;
}
