//! Cycle Coordinator — drives the end-to-end trading workflow.
//!
//! One cycle runs collect -> scan -> analyze -> signal -> execute ->
//! finalize, strictly in order, with per-stage audit rows and counters. At
//! most one cycle is active at a time; cancellation propagates to in-flight
//! stage calls through a watch channel.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use super::collaborators::{Collaborators, PatternReport, TradeSignal};
use crate::collector::NewsCollector;
use crate::domain::{
    CollectionMode, CycleStage, CycleStatus, CycleView, StageCounters, StageOutcome,
    TradingCandidate, TradingCycle, WorkflowLogEntry,
};
use crate::error::{CatalystError, Result};
use crate::persistence::{Persistence, RuntimeSettings};
use crate::scanner::CatalystScanner;
use crate::services::{ComponentHealth, HealthMonitor, Metrics};

struct ActiveCycle {
    cycle: TradingCycle,
    stage: CycleStage,
    cancel_tx: watch::Sender<bool>,
    cancel_reason: Option<String>,
}

pub struct CycleCoordinator {
    store: Arc<dyn Persistence>,
    collector: Arc<NewsCollector>,
    scanner: Arc<CatalystScanner>,
    collaborators: Arc<dyn Collaborators>,
    health: Arc<HealthMonitor>,
    settings: Arc<RuntimeSettings>,
    metrics: Arc<Metrics>,
    confidence_floor: f64,
    active: RwLock<Option<ActiveCycle>>,
}

/// How a stage error affects the cycle.
fn is_fatal(e: &CatalystError) -> bool {
    matches!(
        e,
        CatalystError::Database(_)
            | CatalystError::Migration(_)
            | CatalystError::DependencyDown { .. }
            | CatalystError::Cancelled
    )
}

impl CycleCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Persistence>,
        collector: Arc<NewsCollector>,
        scanner: Arc<CatalystScanner>,
        collaborators: Arc<dyn Collaborators>,
        health: Arc<HealthMonitor>,
        settings: Arc<RuntimeSettings>,
        metrics: Arc<Metrics>,
        confidence_floor: f64,
    ) -> Self {
        Self {
            store,
            collector,
            scanner,
            collaborators,
            health,
            settings,
            metrics,
            confidence_floor,
            active: RwLock::new(None),
        }
    }

    /// Reserve the single active-cycle slot and persist the running row.
    async fn begin(&self, mode: CollectionMode) -> Result<(String, watch::Receiver<bool>)> {
        // An unreachable store is fatal before any work starts.
        self.store
            .ping()
            .await
            .map_err(|e| CatalystError::DependencyDown {
                component: "persistence".to_string(),
                reason: e.to_string(),
            })?;

        let cycle_id = format!("CYCLE_{}", Utc::now().format("%Y%m%d_%H%M%S%3f"));
        let cycle = TradingCycle::begin(cycle_id.clone(), mode, Utc::now());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut guard = self.active.write().await;
            if let Some(active) = guard.as_ref() {
                return Err(CatalystError::Busy(active.cycle.cycle_id.clone()));
            }
            *guard = Some(ActiveCycle {
                cycle: cycle.clone(),
                stage: CycleStage::Collect,
                cancel_tx,
                cancel_reason: None,
            });
        }

        if let Err(e) = self.store.insert_cycle(&cycle).await {
            // Could not record the cycle: release the slot and fail.
            *self.active.write().await = None;
            return Err(e);
        }
        Ok((cycle_id, cancel_rx))
    }

    /// Start a cycle in the background. Returns its id immediately.
    pub async fn start_cycle(self: &Arc<Self>, mode: CollectionMode) -> Result<String> {
        let (cycle_id, cancel_rx) = self.begin(mode).await?;
        let this = Arc::clone(self);
        let id = cycle_id.clone();
        tokio::spawn(async move {
            this.drive(id, mode, cancel_rx).await;
        });
        Ok(cycle_id)
    }

    /// Run a full cycle inline and return the final record. CLI and tests.
    pub async fn run_once(self: &Arc<Self>, mode: CollectionMode) -> Result<TradingCycle> {
        let (cycle_id, cancel_rx) = self.begin(mode).await?;
        Ok(self.clone().drive(cycle_id, mode, cancel_rx).await)
    }

    /// Live view of the active cycle, if any.
    pub async fn current_cycle(&self) -> Option<CycleView> {
        let guard = self.active.read().await;
        guard.as_ref().map(|active| CycleView {
            cycle_id: active.cycle.cycle_id.clone(),
            mode: active.cycle.mode,
            status: active.cycle.status,
            stage: active.stage,
            counters: active.cycle.counters,
            started_at: active.cycle.started_at,
            elapsed_seconds: (Utc::now() - active.cycle.started_at).num_seconds(),
        })
    }

    /// Operator cancellation. In-flight stage calls abort at their next
    /// suspension point, well inside the 2s contract.
    pub async fn cancel_cycle(&self, reason: &str) -> Result<String> {
        let mut guard = self.active.write().await;
        let active = guard
            .as_mut()
            .ok_or_else(|| CatalystError::NotFound("no active cycle".into()))?;
        active.cancel_reason = Some(reason.to_string());
        let _ = active.cancel_tx.send(true);
        info!(cycle_id = %active.cycle.cycle_id, reason, "cycle cancellation requested");
        Ok(active.cycle.cycle_id.clone())
    }

    /// Auto-cancel a cycle that exceeded its age limit (5x tick interval).
    pub async fn cancel_if_overdue(&self, max_age: std::time::Duration) {
        let overdue = {
            let guard = self.active.read().await;
            guard.as_ref().is_some_and(|active| {
                (Utc::now() - active.cycle.started_at).num_seconds()
                    > max_age.as_secs() as i64
            })
        };
        if overdue {
            if let Ok(cycle_id) = self.cancel_cycle("exceeded 5x tick interval").await {
                warn!(cycle_id = %cycle_id, "overdue cycle auto-cancelled");
            }
        }
    }

    /// Probe every registered collaborator now (5s timeout each).
    pub async fn service_health(&self) -> HashMap<String, ComponentHealth> {
        self.health.probe_all().await
    }

    /// Transactional runtime-config update with cache invalidation.
    pub async fn update_config(&self, key: &str, value: &str, modified_by: &str) -> Result<()> {
        self.settings.set(key, value, modified_by).await?;
        info!(key, value, modified_by, "runtime config updated");
        Ok(())
    }

    /// Re-read schedule boundaries and every cached config value.
    pub fn reload_config(&self) {
        self.settings.reload();
        info!("runtime config cache flushed");
    }

    /// Stored runtime-config value, if any.
    pub async fn read_config_value(&self, key: &str) -> Result<Option<String>> {
        self.settings.get_opt(key).await
    }

    async fn set_stage(&self, stage: CycleStage) {
        if let Some(active) = self.active.write().await.as_mut() {
            active.stage = stage;
        }
    }

    async fn update_counters(&self, f: impl FnOnce(&mut StageCounters)) -> Option<TradingCycle> {
        let mut guard = self.active.write().await;
        let active = guard.as_mut()?;
        f(&mut active.cycle.counters);
        Some(active.cycle.clone())
    }

    async fn persist_counters(&self) {
        let snapshot = {
            let guard = self.active.read().await;
            guard.as_ref().map(|a| a.cycle.clone())
        };
        if let Some(cycle) = snapshot {
            if let Err(e) = self.store.update_cycle(&cycle).await {
                warn!(cycle_id = %cycle.cycle_id, error = %e, "failed to persist cycle counters");
            }
        }
    }

    /// Run one stage under cancellation, recording the workflow-log row.
    async fn run_stage<T>(
        &self,
        cycle_id: &str,
        stage: CycleStage,
        cancel_rx: &mut watch::Receiver<bool>,
        fut: impl std::future::Future<Output = Result<(T, i64)>>,
    ) -> Result<T> {
        self.set_stage(stage).await;
        let started_at = Utc::now();
        info!(cycle_id, stage = %stage, "stage started");

        let result = tokio::select! {
            r = fut => r,
            _ = cancel_rx.changed() => Err(CatalystError::Cancelled),
        };

        let (outcome, records, error) = match &result {
            Ok((_, records)) => (StageOutcome::Completed, *records, None),
            Err(e) if is_fatal(e) => (StageOutcome::Failed, 0, Some(e.to_string())),
            Err(e) => (StageOutcome::Partial, 0, Some(e.to_string())),
        };
        let entry = WorkflowLogEntry {
            cycle_id: cycle_id.to_string(),
            stage,
            outcome,
            started_at,
            ended_at: Utc::now(),
            records,
            error,
        };
        if let Err(e) = self.store.log_workflow_stage(&entry).await {
            warn!(cycle_id, stage = %stage, error = %e, "failed to write workflow log");
        }

        result.map(|(value, _)| value)
    }

    /// Execute all stages and finalize. Always returns the terminal record.
    async fn drive(
        self: Arc<Self>,
        cycle_id: String,
        mode: CollectionMode,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> TradingCycle {
        info!(cycle_id = %cycle_id, mode = %mode, "cycle started");
        let outcome = self
            .execute_stages(&cycle_id, mode, &mut cancel_rx)
            .await;

        let failure_reason = match outcome {
            Ok(()) => None,
            Err(CatalystError::Cancelled) => {
                let guard = self.active.read().await;
                Some(
                    guard
                        .as_ref()
                        .and_then(|a| a.cancel_reason.clone())
                        .unwrap_or_else(|| "cancelled".to_string()),
                )
            }
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "cycle failed");
                Some(e.to_string())
            }
        };

        // Finalize: flip to a terminal status, compute the success rate,
        // persist, release the active slot.
        self.set_stage(CycleStage::Finalize).await;
        let mut final_cycle = {
            let mut guard = self.active.write().await;
            match guard.take() {
                Some(active) => active.cycle,
                None => TradingCycle::begin(cycle_id.clone(), mode, Utc::now()),
            }
        };

        let status = if failure_reason.is_some() {
            CycleStatus::Failed
        } else {
            CycleStatus::Completed
        };
        if let Err(e) = final_cycle.transition(status, Utc::now()) {
            warn!(cycle_id = %cycle_id, error = %e, "cycle already terminal");
        }
        final_cycle.failure_reason = failure_reason;
        if final_cycle.counters.signals_generated > 0 {
            final_cycle.success_rate = Some(
                final_cycle.counters.trades_executed as f64
                    / final_cycle.counters.signals_generated as f64,
            );
        }

        if let Err(e) = self.store.finalize_cycle(&final_cycle).await {
            error!(cycle_id = %cycle_id, error = %e, "failed to finalize cycle record");
        }

        match final_cycle.status {
            CycleStatus::Completed => {
                self.metrics.add(&self.metrics.cycles_completed, 1);
                info!(
                    cycle_id = %cycle_id,
                    news = final_cycle.counters.news_collected,
                    candidates = final_cycle.counters.candidates_selected,
                    patterns = final_cycle.counters.patterns_analyzed,
                    signals = final_cycle.counters.signals_generated,
                    trades = final_cycle.counters.trades_executed,
                    "cycle completed"
                );
            }
            _ => {
                self.metrics.add(&self.metrics.cycles_failed, 1);
                warn!(
                    cycle_id = %cycle_id,
                    reason = final_cycle.failure_reason.as_deref().unwrap_or(""),
                    "cycle did not complete"
                );
            }
        }
        final_cycle
    }

    async fn execute_stages(
        &self,
        cycle_id: &str,
        mode: CollectionMode,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        // Stage 1: collect. A collection failure that is not fatal still
        // lets the scanner run over previously stored news.
        let collect = self
            .run_stage(cycle_id, CycleStage::Collect, cancel_rx, async {
                let report = self.collector.collect(mode).await?;
                let new = report.new as i64;
                Ok((report, new))
            })
            .await;
        match collect {
            Ok(report) => {
                self.update_counters(|c| c.news_collected = report.new as i64)
                    .await;
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => warn!(cycle_id, error = %e, "collect stage degraded"),
        }
        self.persist_counters().await;

        // Stage 2: scan.
        let scan = self
            .run_stage(cycle_id, CycleStage::Scan, cancel_rx, async {
                let result = self.scanner.scan(mode).await?;
                let n = result.candidates.len() as i64;
                Ok((result, n))
            })
            .await;
        let candidates: Vec<TradingCandidate> = match scan {
            Ok(result) => {
                self.update_counters(|c| c.candidates_selected = result.candidates.len() as i64)
                    .await;
                result.candidates
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!(cycle_id, error = %e, "scan stage degraded");
                Vec::new()
            }
        };
        self.persist_counters().await;

        if candidates.is_empty() {
            info!(cycle_id, "no candidates selected, skipping analysis stages");
            return Ok(());
        }

        // Stage 3: pattern analysis. Collaborator failures drop the affected
        // candidate only.
        let patterns = self
            .run_stage(cycle_id, CycleStage::Analyze, cancel_rx, async {
                let mut reports: Vec<(TradingCandidate, PatternReport)> = Vec::new();
                for candidate in &candidates {
                    match self.collaborators.analyze_pattern(candidate).await {
                        Ok(report) => reports.push((candidate.clone(), report)),
                        Err(e) if is_fatal(&e) => return Err(e),
                        Err(e) => {
                            warn!(symbol = %candidate.symbol, error = %e, "pattern analysis failed");
                        }
                    }
                }
                let n = reports.len() as i64;
                Ok((reports, n))
            })
            .await?;
        self.update_counters(|c| c.patterns_analyzed = patterns.len() as i64)
            .await;
        self.persist_counters().await;

        // Stage 4: signal generation, filtered by the confidence floor.
        let patterns_ref = &patterns;
        let signals = self
            .run_stage(cycle_id, CycleStage::Signal, cancel_rx, async {
                let mut signals: Vec<TradeSignal> = Vec::new();
                for (candidate, report) in patterns_ref {
                    match self.collaborators.generate_signal(candidate, report).await {
                        Ok(Some(signal)) if signal.confidence >= self.confidence_floor => {
                            signals.push(signal)
                        }
                        Ok(_) => {}
                        Err(e) if is_fatal(&e) => return Err(e),
                        Err(e) => {
                            warn!(symbol = %candidate.symbol, error = %e, "signal generation failed");
                        }
                    }
                }
                let n = signals.len() as i64;
                Ok((signals, n))
            })
            .await?;
        self.update_counters(|c| c.signals_generated = signals.len() as i64)
            .await;
        self.persist_counters().await;

        // Stage 5: execution.
        let signals_ref = &signals;
        let (trade_ids, pnl) = self
            .run_stage(cycle_id, CycleStage::Execute, cancel_rx, async {
                let mut ids: Vec<String> = Vec::new();
                let mut pnl = Decimal::ZERO;
                for signal in signals_ref {
                    match self.collaborators.execute_trade(signal).await {
                        Ok(execution) => {
                            if let Some(p) = execution.pnl {
                                pnl += p;
                            }
                            ids.push(execution.trade_id);
                        }
                        Err(e) if is_fatal(&e) => return Err(e),
                        Err(e) => {
                            warn!(symbol = %signal.symbol, error = %e, "trade execution failed");
                        }
                    }
                }
                let n = ids.len() as i64;
                Ok(((ids, pnl), n))
            })
            .await?;
        self.metrics
            .add(&self.metrics.trades_executed, trade_ids.len() as u64);
        {
            let mut guard = self.active.write().await;
            if let Some(active) = guard.as_mut() {
                active.cycle.counters.trades_executed = trade_ids.len() as i64;
                if pnl != Decimal::ZERO {
                    active.cycle.cycle_pnl = Some(pnl);
                }
            }
        }
        self.persist_counters().await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::collaborators::TradeExecution;
    use super::*;
    use crate::collector::Normalizer;
    use crate::config::{CacheConfig, CoordinatorConfig, NewsConfig, ScannerConfig, ScheduleConfig};
    use crate::domain::{
        ConfirmationStatus, KeywordCategory, MarketSnapshot, MarketState, NewsItem, SourceTier,
    };
    use crate::persistence::{Cache, MemoryStore};
    use crate::scanner::MarketData;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubMarket;

    #[async_trait]
    impl MarketData for StubMarket {
        async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                symbol: symbol.to_string(),
                price: dec!(50.0),
                volume: 2_000_000,
                relative_volume: 2.0,
                price_change_pct: 3.0,
                premarket_volume: None,
                premarket_change_pct: None,
            })
        }
    }

    /// Scenario collaborators: patterns succeed, a fixed number of signals
    /// clear the floor, every signal executes.
    struct StubCollaborators {
        signal_confidences: Vec<f64>,
        executed: AtomicUsize,
        slow: bool,
    }

    impl StubCollaborators {
        fn new(signal_confidences: Vec<f64>) -> Self {
            Self {
                signal_confidences,
                executed: AtomicUsize::new(0),
                slow: false,
            }
        }
    }

    #[async_trait]
    impl Collaborators for StubCollaborators {
        async fn analyze_pattern(&self, candidate: &TradingCandidate) -> Result<PatternReport> {
            if self.slow {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(PatternReport {
                symbol: candidate.symbol.clone(),
                patterns: vec!["bull_flag".into()],
                confidence: 0.8,
            })
        }

        async fn generate_signal(
            &self,
            candidate: &TradingCandidate,
            _patterns: &PatternReport,
        ) -> Result<Option<TradeSignal>> {
            // Deterministic per-call confidence draw.
            let idx = self.executed.load(Ordering::SeqCst);
            let confidence = self
                .signal_confidences
                .get(idx % self.signal_confidences.len())
                .copied()
                .unwrap_or(0.0);
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(Some(TradeSignal {
                symbol: candidate.symbol.clone(),
                action: "BUY".into(),
                confidence,
                entry_price: Some(dec!(50.0)),
                stop_loss: None,
                take_profit: None,
                catalyst_score: candidate.catalyst_score,
            }))
        }

        async fn execute_trade(&self, signal: &TradeSignal) -> Result<TradeExecution> {
            Ok(TradeExecution {
                trade_id: format!("T-{}", signal.symbol),
                symbol: signal.symbol.clone(),
                pnl: Some(dec!(10.00)),
            })
        }
    }

    fn news_item(symbol: &str) -> NewsItem {
        let now = Utc::now();
        NewsItem {
            news_id: format!("{:0>64}", symbol),
            symbol: Some(symbol.to_string()),
            headline: format!("{symbol} beats earnings"),
            source: "Reuters".into(),
            source_url: None,
            published_at: now - ChronoDuration::hours(1),
            collected_at: now,
            snippet: None,
            keywords: vec![KeywordCategory::Earnings],
            mentioned_tickers: vec![symbol.to_string()],
            market_state: MarketState::Regular,
            is_breaking: false,
            source_tier: SourceTier::Institutional,
            cluster_id: None,
            sentiment_keywords: Vec::new(),
            article_length: 0,
            metadata: serde_json::Value::Null,
            update_count: 0,
            first_seen: now,
            last_seen: now,
            price_move_1h: None,
            price_move_24h: None,
            volume_surge_ratio: None,
            was_accurate: None,
            confirmation: ConfirmationStatus::Unconfirmed,
            confirmed_by: None,
            confirmation_delay_minutes: None,
        }
    }

    async fn coordinator_with(
        collaborators: Arc<dyn Collaborators>,
        symbols: &[&str],
    ) -> (Arc<CycleCoordinator>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Persistence> = store.clone();
        for symbol in symbols {
            dyn_store.upsert_news_item(&news_item(symbol)).await.unwrap();
        }

        let cache = Arc::new(Cache::new());
        let metrics = Arc::new(Metrics::new());
        let settings = Arc::new(RuntimeSettings::new(
            dyn_store.clone(),
            cache.clone(),
            Duration::from_secs(60),
        ));
        let news_config = NewsConfig::default();
        let collector = Arc::new(NewsCollector::new(
            dyn_store.clone(),
            cache.clone(),
            metrics.clone(),
            Vec::new(),
            Normalizer::new(&news_config, &ScheduleConfig::default()).unwrap(),
            &news_config,
            &CacheConfig::default(),
        ));
        let mut scanner_config = ScannerConfig::default();
        scanner_config.baseline_universe = Vec::new();
        let scanner = Arc::new(CatalystScanner::new(
            dyn_store.clone(),
            cache.clone(),
            metrics.clone(),
            settings.clone(),
            Arc::new(StubMarket),
            scanner_config,
            &CacheConfig::default(),
        ));
        let health = Arc::new(HealthMonitor::new(
            reqwest::Client::new(),
            dyn_store.clone(),
            Vec::new(),
        ));
        let coordinator = Arc::new(CycleCoordinator::new(
            dyn_store,
            collector,
            scanner,
            collaborators,
            health,
            settings,
            metrics,
            CoordinatorConfig::default().confidence_floor,
        ));
        (coordinator, store)
    }

    #[tokio::test]
    async fn full_cycle_orders_stages_and_counts() {
        // Three candidates; signal confidences 0.9, 0.9, 0.3: two clear the
        // 0.6 floor and execute.
        let collaborators = Arc::new(StubCollaborators::new(vec![0.9, 0.9, 0.3]));
        let (coordinator, store) =
            coordinator_with(collaborators, &["AAPL", "MSFT", "GME"]).await;

        let cycle = coordinator.run_once(CollectionMode::Normal).await.unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert_eq!(cycle.counters.candidates_selected, 3);
        assert_eq!(cycle.counters.patterns_analyzed, 3);
        assert_eq!(cycle.counters.signals_generated, 2);
        assert_eq!(cycle.counters.trades_executed, 2);
        assert_eq!(cycle.cycle_pnl, Some(dec!(20.00)));
        assert_eq!(cycle.success_rate, Some(1.0));

        // Stage log covers collect through execute, in order.
        let stages: Vec<CycleStage> = store
            .workflow_entries()
            .iter()
            .map(|e| e.stage)
            .collect();
        assert_eq!(
            stages,
            vec![
                CycleStage::Collect,
                CycleStage::Scan,
                CycleStage::Analyze,
                CycleStage::Signal,
                CycleStage::Execute,
            ]
        );

        // The slot is released; a new cycle can start.
        assert!(coordinator.current_cycle().await.is_none());
        assert!(coordinator.run_once(CollectionMode::Normal).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_start_is_rejected_with_busy() {
        let collaborators = Arc::new(StubCollaborators {
            signal_confidences: vec![0.9],
            executed: AtomicUsize::new(0),
            slow: true,
        });
        let (coordinator, _store) = coordinator_with(collaborators, &["AAPL"]).await;

        let cycle_id = coordinator
            .start_cycle(CollectionMode::Normal)
            .await
            .unwrap();

        // Give the background cycle a moment to reach the slow stage.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = coordinator
            .start_cycle(CollectionMode::Normal)
            .await
            .unwrap_err();
        match err {
            CatalystError::Busy(active) => assert_eq!(active, cycle_id),
            other => panic!("expected Busy, got {other}"),
        }

        let view = coordinator.current_cycle().await.unwrap();
        assert_eq!(view.cycle_id, cycle_id);
        assert_eq!(view.status, CycleStatus::Running);

        // Clean up: cancel the in-flight cycle.
        coordinator.cancel_cycle("test teardown").await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_fails_cycle_and_preserves_counters() {
        let collaborators = Arc::new(StubCollaborators {
            signal_confidences: vec![0.9],
            executed: AtomicUsize::new(0),
            slow: true,
        });
        let (coordinator, store) = coordinator_with(collaborators, &["AAPL"]).await;

        let cycle_id = coordinator
            .start_cycle(CollectionMode::Normal)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The cycle is stuck in the analyze stage; cancel it.
        coordinator.cancel_cycle("operator requested").await.unwrap();

        // Wait for the background task to observe the cancel and finalize.
        let mut waited = 0;
        while coordinator.current_cycle().await.is_some() && waited < 40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += 1;
        }
        assert!(coordinator.current_cycle().await.is_none());

        let entries = store.workflow_entries();
        let analyze = entries
            .iter()
            .find(|e| e.stage == CycleStage::Analyze)
            .unwrap();
        assert_eq!(analyze.outcome, StageOutcome::Failed);
        assert_eq!(analyze.cycle_id, cycle_id);
    }

    #[tokio::test]
    async fn empty_scan_completes_without_analysis_stages() {
        let collaborators = Arc::new(StubCollaborators::new(vec![0.9]));
        let (coordinator, store) = coordinator_with(collaborators, &[]).await;

        let cycle = coordinator.run_once(CollectionMode::Normal).await.unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert_eq!(cycle.counters.candidates_selected, 0);
        assert_eq!(cycle.counters.trades_executed, 0);
        assert!(cycle.success_rate.is_none());

        let stages: Vec<CycleStage> = store
            .workflow_entries()
            .iter()
            .map(|e| e.stage)
            .collect();
        assert_eq!(stages, vec![CycleStage::Collect, CycleStage::Scan]);
    }

    #[tokio::test]
    async fn unknown_config_key_is_rejected() {
        let collaborators = Arc::new(StubCollaborators::new(vec![0.9]));
        let (coordinator, _store) = coordinator_with(collaborators, &[]).await;
        let err = coordinator
            .update_config("favorite_color", "green", "operator")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        coordinator
            .update_config("min_catalyst_score", "25", "operator")
            .await
            .unwrap();
    }
}
