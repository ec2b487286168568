//! Crate-wide error taxonomy.
//!
//! Per-record parse failures are recoverable: the caller bumps a counter and
//! keeps going. Header, allocation and signal failures propagate and abort
//! the file (header) or the session (allocation), matching the propagation
//! rules laid out for the post-processing driver and server.

use thiserror::Error;

/// Errors surfaced by the observation/ephemeris parsers.
///
/// Variants here are always *locally recoverable*: the caller skips the
/// offending record, bumps a counter, and continues. A malformed file
/// header is the one exception and is reported through [`Error::Header`]
/// instead, which aborts that file only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("bad checksum")]
    BadChecksum,
    #[error("malformed column at byte {0}")]
    MalformedColumn(usize),
    #[error("unknown satellite code \"{0}\"")]
    UnknownSatellite(String),
    #[error("time outside valid range")]
    TimeOutOfRange,
    #[error("unsupported rinex version {0}")]
    UnsupportedVersion(String),
    #[error("missing required header line \"{0}\"")]
    MissingHeaderLine(&'static str),
}

/// Crate-wide error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Per-record parse failure; the record was skipped.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A file header could not be parsed; the whole file is unusable.
    #[error("header error in {file}: {source}")]
    Header { file: String, source: ParseError },

    /// Not enough data to produce a solution this epoch: filter state is
    /// preserved and a `none` solution is emitted.
    #[error("data gap: {0}")]
    DataGap(&'static str),

    /// A linear-algebra or integer-search routine failed to converge or hit
    /// a singular system; the filter rolls x back to its pre-update snapshot.
    #[error("numeric failure: {0}")]
    NumericFailure(&'static str),

    /// A single observation was rejected as an outlier.
    #[error("outlier rejected on satellite index {sat}")]
    OutlierRejected { sat: u16 },

    /// Ambiguity ratio test failed to clear the configured threshold.
    #[error("ambiguity validation failed: ratio {ratio:.2} < threshold {threshold:.2}")]
    AmbiguityValidationFail { ratio: f64, threshold: f64 },

    /// Fatal: a growable container failed to allocate. Surfaces to the
    /// caller as session failure; partial results already emitted remain
    /// valid.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// Fatal to the run: an abort callback returned true.
    #[error("aborted by signal")]
    AbortedBySignal,

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
