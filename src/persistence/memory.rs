//! In-memory implementation of the persistence port.
//!
//! Backs the integration tests and `--in-memory` runs where no Postgres DSN
//! is configured. Semantics mirror the Postgres adapter: idempotent upserts,
//! deterministic set unions, append-only outcome fields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{NewsFilter, Persistence, UpsertOutcome};
use crate::domain::{
    CollectionReport, CollectionStats, NarrativeCluster, NewsItem, NewsOutcome, ScanResult,
    ServiceHealthRecord, SourceCount, SourceMetrics, SourceMetricsDelta, TradeRecord,
    TradingCycle, TrendingStory, WorkflowLogEntry,
};
use crate::error::{CatalystError, Result};

#[derive(Default)]
struct Inner {
    news: HashMap<String, NewsItem>,
    scans: HashMap<Uuid, ScanResult>,
    cycles: HashMap<String, TradingCycle>,
    workflow_log: Vec<WorkflowLogEntry>,
    config: HashMap<String, String>,
    metrics: HashMap<String, SourceMetrics>,
    early_samples: HashMap<String, (f64, i64)>,
    clusters: Vec<NarrativeCluster>,
    collection_reports: Vec<CollectionReport>,
    service_health: Vec<ServiceHealthRecord>,
    trades: HashMap<String, TradeRecord>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Test helper: seed a closed trade for the outcome-feedback sweep.
    pub fn seed_trade(&self, trade: TradeRecord) {
        self.lock().trades.insert(trade.trade_id.clone(), trade);
    }

    /// Test helper: number of stored news rows.
    pub fn news_len(&self) -> usize {
        self.lock().news.len()
    }

    /// Test helper: workflow log snapshot.
    pub fn workflow_entries(&self) -> Vec<WorkflowLogEntry> {
        self.lock().workflow_log.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn union_into(dst: &mut Vec<String>, src: &[String]) {
    for s in src {
        if !dst.contains(s) {
            dst.push(s.clone());
        }
    }
    dst.sort();
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn upsert_news_item(&self, item: &NewsItem) -> Result<UpsertOutcome> {
        let mut inner = self.lock();
        match inner.news.get_mut(&item.news_id) {
            Some(existing) => {
                existing.update_count += 1;
                existing.last_seen = item.last_seen.max(existing.last_seen);
                union_into(&mut existing.mentioned_tickers, &item.mentioned_tickers);
                for k in &item.keywords {
                    if !existing.keywords.contains(k) {
                        existing.keywords.push(*k);
                    }
                }
                existing.keywords.sort();
                Ok(UpsertOutcome::Duplicate {
                    update_count: existing.update_count,
                })
            }
            None => {
                inner.news.insert(item.news_id.clone(), item.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get_news_item(&self, news_id: &str) -> Result<Option<NewsItem>> {
        Ok(self.lock().news.get(news_id).cloned())
    }

    async fn read_news_range(&self, filter: &NewsFilter) -> Result<Vec<NewsItem>> {
        let inner = self.lock();
        let mut items: Vec<NewsItem> = inner
            .news
            .values()
            .filter(|n| {
                filter
                    .symbol
                    .as_ref()
                    .map(|s| {
                        n.symbol.as_deref() == Some(s.as_str())
                            || n.mentioned_tickers.iter().any(|t| t == s)
                    })
                    .unwrap_or(true)
                    && filter.since.map(|t| n.published_at >= t).unwrap_or(true)
                    && filter.until.map(|t| n.published_at < t).unwrap_or(true)
                    && filter
                        .max_tier
                        .map(|t| n.source_tier <= t)
                        .unwrap_or(true)
                    && (!filter.unconfirmed_only
                        || n.confirmation == crate::domain::ConfirmationStatus::Unconfirmed)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(filter.effective_limit());
        Ok(items)
    }

    async fn update_news_outcome(&self, news_id: &str, outcome: &NewsOutcome) -> Result<bool> {
        let mut inner = self.lock();
        let item = inner
            .news
            .get_mut(news_id)
            .ok_or_else(|| CatalystError::NotFound(format!("news item {news_id}")))?;
        // Append-only: once set, a repeated application is a no-op.
        if item.was_accurate.is_some() {
            return Ok(false);
        }
        item.price_move_1h = Some(outcome.price_move_1h);
        item.price_move_24h = Some(outcome.price_move_24h);
        item.volume_surge_ratio = Some(outcome.volume_surge_ratio);
        item.was_accurate = Some(outcome.was_accurate);
        Ok(true)
    }

    async fn mark_confirmed(
        &self,
        news_id: &str,
        confirmed_by: &str,
        delay_minutes: i64,
    ) -> Result<()> {
        let mut inner = self.lock();
        let item = inner
            .news
            .get_mut(news_id)
            .ok_or_else(|| CatalystError::NotFound(format!("news item {news_id}")))?;
        if item.confirmation == crate::domain::ConfirmationStatus::Confirmed {
            return Ok(());
        }
        item.confirmation = crate::domain::ConfirmationStatus::Confirmed;
        item.confirmed_by = Some(confirmed_by.to_string());
        item.confirmation_delay_minutes = Some(delay_minutes);
        Ok(())
    }

    async fn insert_candidates(&self, scan: &ScanResult) -> Result<()> {
        if !scan.ranks_consistent() {
            return Err(CatalystError::Validation(format!(
                "scan {} has inconsistent selection ranks",
                scan.scan_id
            )));
        }
        self.lock().scans.insert(scan.scan_id, scan.clone());
        Ok(())
    }

    async fn get_scan_result(&self, scan_id: Uuid) -> Result<Option<ScanResult>> {
        Ok(self.lock().scans.get(&scan_id).cloned())
    }

    async fn insert_cycle(&self, cycle: &TradingCycle) -> Result<()> {
        self.lock()
            .cycles
            .insert(cycle.cycle_id.clone(), cycle.clone());
        Ok(())
    }

    async fn update_cycle(&self, cycle: &TradingCycle) -> Result<()> {
        let mut inner = self.lock();
        if !inner.cycles.contains_key(&cycle.cycle_id) {
            return Err(CatalystError::NotFound(format!("cycle {}", cycle.cycle_id)));
        }
        inner.cycles.insert(cycle.cycle_id.clone(), cycle.clone());
        Ok(())
    }

    async fn finalize_cycle(&self, cycle: &TradingCycle) -> Result<()> {
        self.update_cycle(cycle).await
    }

    async fn log_workflow_stage(&self, entry: &WorkflowLogEntry) -> Result<()> {
        self.lock().workflow_log.push(entry.clone());
        Ok(())
    }

    async fn read_config(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().config.get(key).cloned())
    }

    async fn write_config(&self, key: &str, value: &str, _modified_by: &str) -> Result<()> {
        self.lock().config.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn increment_source_metrics(&self, delta: &SourceMetricsDelta) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner
            .metrics
            .entry(delta.source.clone())
            .or_insert_with(|| {
                SourceMetrics::seed(
                    delta.source.clone(),
                    delta.seed_tier.unwrap_or(crate::domain::SourceTier::Unknown),
                )
            });
        entry.total_articles += delta.articles;
        entry.confirmed_articles += delta.confirmed;
        entry.accurate_articles += delta.accurate;
        entry.false_articles += delta.false_count;
        let judged = entry.accurate_articles + entry.false_articles;
        entry.accuracy_rate = if judged > 0 {
            entry.accurate_articles as f64 / judged as f64
        } else {
            0.0
        };
        if let Some(b) = &delta.beneficiary {
            if !entry.frequent_beneficiaries.contains(b) {
                entry.frequent_beneficiaries.push(b.clone());
            }
        }
        if let Some(c) = &delta.cluster {
            if !entry.top_clusters.contains(c) {
                entry.top_clusters.push(c.clone());
            }
        }
        entry.updated_at = Utc::now();
        if let Some(sample) = delta.early_minutes_sample {
            let (sum, n) = inner
                .early_samples
                .entry(delta.source.clone())
                .or_insert((0.0, 0));
            *sum += sample;
            *n += 1;
            let avg = *sum / *n as f64;
            if let Some(m) = inner.metrics.get_mut(&delta.source) {
                m.avg_early_minutes = Some(avg);
            }
        }
        Ok(())
    }

    async fn source_metrics(&self) -> Result<Vec<SourceMetrics>> {
        let mut rows: Vec<SourceMetrics> = self.lock().metrics.values().cloned().collect();
        rows.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(rows)
    }

    async fn insert_narrative_cluster(&self, cluster: &NarrativeCluster) -> Result<()> {
        let mut inner = self.lock();
        // One row per (cluster_id, detection day); refresh counts on re-detect.
        inner.clusters.retain(|c| c.cluster_id != cluster.cluster_id);
        inner.clusters.push(cluster.clone());
        Ok(())
    }

    async fn narrative_clusters_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NarrativeCluster>> {
        let mut rows: Vec<NarrativeCluster> = self
            .lock()
            .clusters
            .iter()
            .filter(|c| c.detected_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.coordination_score
                .partial_cmp(&a.coordination_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    async fn trending_stories(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TrendingStory>> {
        let inner = self.lock();
        let mut grouped: HashMap<String, TrendingStory> = HashMap::new();
        for item in inner.news.values() {
            if item.published_at < since {
                continue;
            }
            let Some(cluster_id) = item.cluster_id.clone() else {
                continue;
            };
            let entry = grouped.entry(cluster_id.clone()).or_insert(TrendingStory {
                cluster_id,
                symbol: item.symbol.clone(),
                headline: item.headline.clone(),
                article_count: 0,
                update_count: 0,
                first_seen: item.first_seen,
                latest: item.published_at,
                has_breaking: false,
            });
            entry.article_count += 1;
            entry.update_count += item.update_count as i64;
            entry.first_seen = entry.first_seen.min(item.first_seen);
            if item.published_at > entry.latest {
                entry.latest = item.published_at;
                entry.headline = item.headline.clone();
            }
            entry.has_breaking |= item.is_breaking;
        }
        let mut stories: Vec<TrendingStory> = grouped.into_values().collect();
        stories.sort_by(|a, b| {
            (b.article_count, b.update_count).cmp(&(a.article_count, a.update_count))
        });
        stories.truncate(limit);
        Ok(stories)
    }

    async fn record_collection_stats(&self, report: &CollectionReport) -> Result<()> {
        self.lock().collection_reports.push(report.clone());
        Ok(())
    }

    async fn collection_stats(&self, window_hours: i64) -> Result<CollectionStats> {
        let inner = self.lock();
        let since = Utc::now() - chrono::Duration::hours(window_hours);
        let mut stats = CollectionStats {
            window_hours,
            runs: 0,
            articles: 0,
            new: 0,
            duplicate: 0,
            per_source: HashMap::new(),
        };
        for report in inner
            .collection_reports
            .iter()
            .filter(|r| r.collected_at >= since)
        {
            stats.runs += 1;
            stats.articles += report.articles as i64;
            stats.new += report.new as i64;
            stats.duplicate += report.duplicate as i64;
            for (source, count) in &report.per_source {
                let agg = stats
                    .per_source
                    .entry(source.clone())
                    .or_insert_with(SourceCount::default);
                agg.fetched += count.fetched;
                agg.new += count.new;
                agg.duplicate += count.duplicate;
                agg.dropped += count.dropped;
                agg.errors += count.errors;
            }
        }
        Ok(stats)
    }

    async fn record_service_health(&self, record: &ServiceHealthRecord) -> Result<()> {
        self.lock().service_health.push(record.clone());
        Ok(())
    }

    async fn closed_trades_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
        let mut rows: Vec<TradeRecord> = self
            .lock()
            .trades
            .values()
            .filter(|t| {
                !t.outcome_applied && t.closed_at.map(|c| c >= since).unwrap_or(false)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.closed_at);
        Ok(rows)
    }

    async fn mark_trade_outcome_applied(&self, trade_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let trade = inner
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| CatalystError::NotFound(format!("trade {trade_id}")))?;
        trade.outcome_applied = true;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
