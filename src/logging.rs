//! Logging initialization (section 10.A).
//!
//! Event content is structured (epoch, satellite, component, counters),
//! never an attempt to reproduce legacy trace-file text; callers format
//! their own messages with the `log` macros and this module only wires up
//! the backend once per process.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes `env_logger` exactly once, honouring `RUST_LOG` as usual.
/// Safe to call from every binary entry point and every test; repeat calls
/// are no-ops. `env_logger` is only pulled in under the `cli` feature (the
/// `rtkpost` binary) or in tests (a dev-dependency); library builds without
/// `cli` log through whatever backend the host binary installs.
#[cfg(any(feature = "cli", test))]
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}

#[cfg(not(any(feature = "cli", test)))]
pub fn init() {
    INIT.call_once(|| {});
}

/// Counters a caller accumulates across a parsing or filtering pass and
/// logs once at the end, rather than emitting one line per record (section
/// 10.A: structured counters, not line-for-line trace text).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventCounters {
    pub records_parsed: u64,
    pub records_skipped: u64,
    pub outliers_rejected: u64,
    pub data_gaps: u64,
}

impl EventCounters {
    pub fn record_parsed(&mut self) {
        self.records_parsed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.records_skipped += 1;
    }

    pub fn outlier_rejected(&mut self) {
        self.outliers_rejected += 1;
    }

    pub fn data_gap(&mut self) {
        self.data_gaps += 1;
    }

    /// Emits one summary line at `info` level; call at the end of a pass.
    pub fn log_summary(&self, component: &str) {
        log::info!(
            "{component}: parsed={} skipped={} outliers={} gaps={}",
            self.records_parsed,
            self.records_skipped,
            self.outliers_rejected,
            self.data_gaps
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut counters = EventCounters::default();
        counters.record_parsed();
        counters.record_parsed();
        counters.record_skipped();
        counters.outlier_rejected();
        counters.data_gap();
        assert_eq!(counters.records_parsed, 2);
        assert_eq!(counters.records_skipped, 1);
        assert_eq!(counters.outliers_rejected, 1);
        assert_eq!(counters.data_gaps, 1);
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
