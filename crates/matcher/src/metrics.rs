// Metrics hooks for the `matcher` crate.
//
// Callers install a global `MatchMetrics` implementation via [`set_match_metrics`],
// then every bulk match run by a `MatchEngine` reports its latency and counters.
// This keeps instrumentation decoupled from any specific metrics backend.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fingerprint::MatchMode;
use once_cell::sync::OnceCell;

use crate::types::MatchStats;

/// Metrics observer for bulk match runs.
pub trait MatchMetrics: Send + Sync {
    /// Record the outcome of one bulk match.
    ///
    /// `mode` is the sensitivity the run used, `latency` the wall-clock time of
    /// the whole run and `stats` its pair counters.
    fn record_match(&self, mode: MatchMode, latency: Duration, stats: &MatchStats);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global match metrics recorder.
///
/// This is typically called once during startup so all engines share the
/// same metrics backend.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
