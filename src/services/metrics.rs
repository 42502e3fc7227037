//! Metrics registry for observability.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-wide counters, exported in Prometheus format by the coordinator
/// API surface.
pub struct Metrics {
    pub articles_fetched: AtomicU64,
    pub articles_new: AtomicU64,
    pub articles_duplicate: AtomicU64,
    pub articles_dropped: AtomicU64,
    pub source_errors: AtomicU64,
    pub confirmations: AtomicU64,
    pub scans_completed: AtomicU64,
    pub candidates_selected: AtomicU64,
    pub cycles_completed: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub trades_executed: AtomicU64,
    pub outcome_updates: AtomicU64,
    /// Millidollars of realized PnL; gauge, can go negative.
    pub cycle_pnl_milli: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            articles_fetched: AtomicU64::new(0),
            articles_new: AtomicU64::new(0),
            articles_duplicate: AtomicU64::new(0),
            articles_dropped: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
            confirmations: AtomicU64::new(0),
            scans_completed: AtomicU64::new(0),
            candidates_selected: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            outcome_updates: AtomicU64::new(0),
            cycle_pnl_milli: AtomicI64::new(0),
        }
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        format!(
            r#"# HELP catalyst_articles_fetched_total Articles fetched from all sources
# TYPE catalyst_articles_fetched_total counter
catalyst_articles_fetched_total {}

# HELP catalyst_articles_new_total New (non-duplicate) articles stored
# TYPE catalyst_articles_new_total counter
catalyst_articles_new_total {}

# HELP catalyst_articles_duplicate_total Duplicate submissions absorbed by upsert
# TYPE catalyst_articles_duplicate_total counter
catalyst_articles_duplicate_total {}

# HELP catalyst_articles_dropped_total Articles dropped by backpressure caps
# TYPE catalyst_articles_dropped_total counter
catalyst_articles_dropped_total {}

# HELP catalyst_source_errors_total Source fetch failures after retries
# TYPE catalyst_source_errors_total counter
catalyst_source_errors_total {}

# HELP catalyst_confirmations_total Lower-tier articles confirmed by tier-1/2 coverage
# TYPE catalyst_confirmations_total counter
catalyst_confirmations_total {}

# HELP catalyst_scans_completed_total Scanner invocations completed
# TYPE catalyst_scans_completed_total counter
catalyst_scans_completed_total {}

# HELP catalyst_candidates_selected_total Candidates emitted across all scans
# TYPE catalyst_candidates_selected_total counter
catalyst_candidates_selected_total {}

# HELP catalyst_cycles_completed_total Trading cycles completed
# TYPE catalyst_cycles_completed_total counter
catalyst_cycles_completed_total {}

# HELP catalyst_cycles_failed_total Trading cycles failed
# TYPE catalyst_cycles_failed_total counter
catalyst_cycles_failed_total {}

# HELP catalyst_trades_executed_total Paper trades executed
# TYPE catalyst_trades_executed_total counter
catalyst_trades_executed_total {}

# HELP catalyst_outcome_updates_total News outcome updates applied
# TYPE catalyst_outcome_updates_total counter
catalyst_outcome_updates_total {}

# HELP catalyst_cycle_pnl_dollars Cumulative realized cycle PnL
# TYPE catalyst_cycle_pnl_dollars gauge
catalyst_cycle_pnl_dollars {}
"#,
            self.articles_fetched.load(Ordering::Relaxed),
            self.articles_new.load(Ordering::Relaxed),
            self.articles_duplicate.load(Ordering::Relaxed),
            self.articles_dropped.load(Ordering::Relaxed),
            self.source_errors.load(Ordering::Relaxed),
            self.confirmations.load(Ordering::Relaxed),
            self.scans_completed.load(Ordering::Relaxed),
            self.candidates_selected.load(Ordering::Relaxed),
            self.cycles_completed.load(Ordering::Relaxed),
            self.cycles_failed.load(Ordering::Relaxed),
            self.trades_executed.load(Ordering::Relaxed),
            self.outcome_updates.load(Ordering::Relaxed),
            self.cycle_pnl_milli.load(Ordering::Relaxed) as f64 / 1000.0,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_export_contains_counters() {
        let m = Metrics::new();
        m.add(&m.articles_new, 7);
        m.cycle_pnl_milli.store(-1500, Ordering::Relaxed);
        let text = m.prometheus();
        assert!(text.contains("catalyst_articles_new_total 7"));
        assert!(text.contains("catalyst_cycle_pnl_dollars -1.5"));
    }
}
