//! The News Collector: concurrent multi-source fan-out feeding the
//! normalization pipeline and the idempotent news store.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::confirm::{apply_confirmations, EarlyMinutesBasis};
use super::narratives::detect_narratives;
use super::normalize::Normalizer;
use crate::config::{CacheConfig, NewsConfig};
use crate::domain::{
    CollectionMode, CollectionReport, CollectionStats, NarrativeCluster, NewsItem, NewsOutcome,
    RawArticle, ServiceHealthRecord, SourceMetrics, SourceMetricsDelta, TrendingStory,
};
use crate::error::{CatalystError, Result};
use crate::persistence::{Cache, NewsFilter, Persistence};
use crate::services::Metrics;
use crate::sources::RegisteredSource;
use crate::util::retry_transient;

/// How far back a collection run asks each source to look.
const FETCH_LOOKBACK_HOURS: i64 = 24;

pub struct NewsCollector {
    store: Arc<dyn Persistence>,
    cache: Arc<Cache>,
    metrics: Arc<Metrics>,
    sources: Vec<Arc<RegisteredSource>>,
    normalizer: Arc<Normalizer>,
    fetch_concurrency: usize,
    fetch_retries: u32,
    queue_capacity: usize,
    news_ttl: Duration,
    early_basis: EarlyMinutesBasis,
}

impl NewsCollector {
    pub fn new(
        store: Arc<dyn Persistence>,
        cache: Arc<Cache>,
        metrics: Arc<Metrics>,
        sources: Vec<RegisteredSource>,
        normalizer: Normalizer,
        news_config: &NewsConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
            sources: sources.into_iter().map(Arc::new).collect(),
            normalizer: Arc::new(normalizer),
            fetch_concurrency: news_config.fetch_concurrency,
            fetch_retries: news_config.fetch_retries,
            queue_capacity: news_config.queue_capacity,
            news_ttl: Duration::from_secs(cache_config.news_ttl_secs),
            early_basis: EarlyMinutesBasis::from_config(&news_config.early_minutes_basis),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Run one collection cycle in the given mode: fetch eligible sources in
    /// parallel under the mode's budget, then normalize, dedup, and persist.
    pub async fn collect(&self, mode: CollectionMode) -> Result<CollectionReport> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + mode.budget();
        let since = Utc::now() - ChronoDuration::hours(FETCH_LOOKBACK_HOURS);
        let cap = mode.per_source_cap();

        let eligible: Vec<Arc<RegisteredSource>> = self
            .sources
            .iter()
            .filter(|s| s.source.source_tier() <= mode.max_source_tier())
            .cloned()
            .collect();
        info!(
            mode = %mode,
            sources = eligible.len(),
            "starting news collection"
        );

        let semaphore = Arc::new(Semaphore::new(self.fetch_concurrency));
        let mut tasks: JoinSet<(String, Result<Vec<RawArticle>>)> = JoinSet::new();
        for registered in &eligible {
            let registered = Arc::clone(registered);
            let semaphore = Arc::clone(&semaphore);
            let retries = self.fetch_retries;
            tasks.spawn(async move {
                let name = registered.source.source_name().to_string();
                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(_) => return (name, Err(CatalystError::Cancelled)),
                };
                registered.limiter.acquire().await;
                let result = retry_transient(&name, retries, 500, || {
                    registered.source.fetch(since, cap)
                })
                .await;
                if let Err(CatalystError::RateLimited {
                    retry_after_secs, ..
                }) = &result
                {
                    registered.limiter.penalize(*retry_after_secs).await;
                }
                (name, result)
            });
        }

        let mut report = CollectionReport::empty(mode);
        let mut fetched: Vec<(String, Vec<RawArticle>)> = Vec::new();

        // Drain tasks until done or the mode budget expires; tasks still in
        // flight at the deadline are aborted and counted as errors.
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((name, Ok(articles))))) => {
                    fetched.push((name, articles));
                }
                Ok(Some(Ok((name, Err(e))))) => {
                    warn!(source = %name, error = %e, "source fetch failed");
                    self.metrics.add(&self.metrics.source_errors, 1);
                    report.per_source.entry(name.clone()).or_default().errors += 1;
                    let record = ServiceHealthRecord {
                        service: format!("source:{name}"),
                        status: "unhealthy".to_string(),
                        checked_at: Utc::now(),
                        response_time_ms: None,
                        error: Some(e.to_string()),
                    };
                    if let Err(persist_err) = self.store.record_service_health(&record).await {
                        warn!(error = %persist_err, "failed to persist source health record");
                    }
                    report.errors.push(format!("{name}: {e}"));
                }
                Ok(Some(Err(join_err))) => {
                    report.errors.push(format!("fetch task panicked: {join_err}"));
                }
                Ok(None) => break,
                Err(_) => {
                    let unfinished = tasks.len();
                    tasks.abort_all();
                    warn!(
                        unfinished,
                        budget_secs = mode.budget().as_secs(),
                        "collection budget exhausted, aborting in-flight fetches"
                    );
                    report
                        .errors
                        .push(format!("budget exhausted with {unfinished} fetches in flight"));
                    break;
                }
            }
        }

        // Persist sequentially; the store serializes per-fingerprint writes.
        let mut accepted_total = 0usize;
        for (name, articles) in fetched {
            let counts = report.per_source.entry(name.clone()).or_default();
            counts.fetched = articles.len();
            for raw in articles.into_iter() {
                if counts.new + counts.duplicate >= cap
                    || accepted_total >= self.queue_capacity
                {
                    counts.dropped += 1;
                    continue;
                }
                accepted_total += 1;
                match self.ingest(&raw).await {
                    Ok(true) => counts.new += 1,
                    Ok(false) => counts.duplicate += 1,
                    Err(e) => {
                        warn!(source = %name, error = %e, "failed to store article");
                        counts.errors += 1;
                        report.errors.push(format!("{name}: {e}"));
                    }
                }
            }
            if counts.dropped > 0 {
                warn!(
                    source = %name,
                    dropped = counts.dropped,
                    "per-source queue saturated, articles dropped for this cycle"
                );
            }
        }

        for counts in report.per_source.values() {
            report.articles += counts.fetched;
            report.new += counts.new;
            report.duplicate += counts.duplicate;
            report.dropped += counts.dropped;
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.collected_at = Utc::now();

        self.metrics
            .add(&self.metrics.articles_fetched, report.articles as u64);
        self.metrics.add(&self.metrics.articles_new, report.new as u64);
        self.metrics
            .add(&self.metrics.articles_duplicate, report.duplicate as u64);
        self.metrics
            .add(&self.metrics.articles_dropped, report.dropped as u64);

        self.store.record_collection_stats(&report).await?;
        info!(
            mode = %mode,
            articles = report.articles,
            new = report.new,
            duplicate = report.duplicate,
            dropped = report.dropped,
            elapsed_ms = report.elapsed_ms,
            "news collection complete"
        );
        Ok(report)
    }

    /// Normalize and store one raw article. Returns true when it was new.
    async fn ingest(&self, raw: &RawArticle) -> Result<bool> {
        let item = self.normalizer.normalize(raw, Utc::now());

        // Operator-supplied cluster ids lose to the content-derived one.
        if let Some(operator_id) = raw.metadata.get("cluster_id").and_then(|v| v.as_str()) {
            if item.cluster_id.as_deref() != Some(operator_id) {
                warn!(
                    news_id = %item.news_id,
                    operator_cluster = operator_id,
                    derived_cluster = item.cluster_id.as_deref().unwrap_or("none"),
                    "operator cluster id disagrees with content-derived id; keeping derived"
                );
            }
        }

        let outcome = self.store.upsert_news_item(&item).await?;
        if !outcome.is_new() {
            return Ok(false);
        }

        self.store
            .increment_source_metrics(&SourceMetricsDelta::article(
                &item.source,
                item.source_tier,
            ))
            .await?;

        if item.source_tier.can_confirm() {
            let confirmed = apply_confirmations(&self.store, &item, self.early_basis).await?;
            self.metrics
                .add(&self.metrics.confirmations, confirmed as u64);
        }
        Ok(true)
    }

    /// Search stored news. Bounded by the filter limit, newest first.
    pub async fn search(&self, filter: &NewsFilter) -> Result<Vec<NewsItem>> {
        self.store.read_news_range(filter).await
    }

    /// Read one item through the news cache.
    pub async fn get_item(&self, news_id: &str) -> Result<Option<NewsItem>> {
        let cache_key = format!("news:{news_id}");
        if let Some(item) = self.cache.get::<NewsItem>(&cache_key) {
            return Ok(Some(item));
        }
        let item = self.store.get_news_item(news_id).await?;
        if let Some(ref item) = item {
            self.cache.set(&cache_key, item, self.news_ttl);
        }
        Ok(item)
    }

    /// Apply a trade outcome to a news item. Single-writer, idempotent: the
    /// source-metrics counters move only on the first application.
    pub async fn update_outcome(&self, news_id: &str, outcome: &NewsOutcome) -> Result<()> {
        let applied = self.store.update_news_outcome(news_id, outcome).await?;
        if !applied {
            return Ok(());
        }
        self.cache.invalidate(&format!("news:{news_id}"));
        self.metrics.add(&self.metrics.outcome_updates, 1);

        if let Some(item) = self.store.get_news_item(news_id).await? {
            let delta = SourceMetricsDelta {
                source: item.source.clone(),
                seed_tier: Some(item.source_tier),
                accurate: outcome.was_accurate as i64,
                false_count: !outcome.was_accurate as i64,
                beneficiary: item.symbol.clone(),
                ..Default::default()
            };
            self.store.increment_source_metrics(&delta).await?;
        }
        Ok(())
    }

    pub async fn trending(&self, window_hours: i64, limit: usize) -> Result<Vec<TrendingStory>> {
        let since = Utc::now() - ChronoDuration::hours(window_hours);
        self.store.trending_stories(since, limit).await
    }

    pub async fn stats(&self, window_hours: i64) -> Result<CollectionStats> {
        self.store.collection_stats(window_hours).await
    }

    pub async fn source_analysis(&self) -> Result<Vec<SourceMetrics>> {
        self.store.source_metrics().await
    }

    pub async fn coordinated_narratives(&self, window_hours: i64) -> Result<Vec<NarrativeCluster>> {
        let since = Utc::now() - ChronoDuration::hours(window_hours);
        self.store.narrative_clusters_since(since).await
    }

    /// One pass of the hourly narrative sweep.
    pub async fn narrative_sweep(&self) -> Result<Vec<NarrativeCluster>> {
        detect_narratives(&self.store, self.normalizer.market_timezone(), Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, NewsConfig, ScheduleConfig};
    use crate::domain::SourceTier;
    use crate::persistence::MemoryStore;
    use crate::sources::{NewsSource, RateSpec};
    use async_trait::async_trait;
    use chrono::DateTime;

    /// Source stub yielding a fixed article list.
    struct FixedSource {
        name: String,
        tier: SourceTier,
        articles: Vec<RawArticle>,
        fail: bool,
    }

    #[async_trait]
    impl NewsSource for FixedSource {
        async fn fetch(&self, _since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>> {
            if self.fail {
                return Err(CatalystError::RateLimited {
                    source_name: self.name.clone(),
                    retry_after_secs: 30,
                });
            }
            Ok(self.articles.iter().take(limit).cloned().collect())
        }

        fn source_name(&self) -> &str {
            &self.name
        }

        fn source_tier(&self) -> SourceTier {
            self.tier
        }

        fn rate_limit(&self) -> RateSpec {
            RateSpec::new(100, 60)
        }
    }

    fn article(headline: &str, source: &str) -> RawArticle {
        RawArticle {
            symbol: None,
            headline: headline.to_string(),
            source: source.to_string(),
            source_url: None,
            published_at: Utc::now() - ChronoDuration::minutes(10),
            snippet: None,
            metadata: HashMap::new(),
        }
    }

    fn collector_with(sources: Vec<FixedSource>) -> (NewsCollector, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let news_config = NewsConfig::default();
        let registered = sources
            .into_iter()
            .map(|s| {
                let limiter = crate::sources::TokenBucket::new(s.rate_limit());
                RegisteredSource {
                    source: Arc::new(s),
                    limiter,
                }
            })
            .collect();
        let collector = NewsCollector::new(
            store.clone(),
            Arc::new(Cache::new()),
            Arc::new(Metrics::new()),
            registered,
            Normalizer::new(&news_config, &ScheduleConfig::default()).unwrap(),
            &news_config,
            &CacheConfig::default(),
        );
        (collector, store)
    }

    #[tokio::test]
    async fn collect_stores_and_counts_new_articles() {
        let (collector, store) = collector_with(vec![FixedSource {
            name: "wire_a".into(),
            tier: SourceTier::Verified,
            articles: vec![
                article("AAPL beats earnings", "wire_a"),
                article("MSFT announces buyout", "wire_a"),
            ],
            fail: false,
        }]);

        let report = collector.collect(CollectionMode::Normal).await.unwrap();
        assert_eq!(report.new, 2);
        assert_eq!(report.duplicate, 0);
        assert_eq!(store.news_len(), 2);

        // Second run over identical upstream data: all duplicates.
        let report = collector.collect(CollectionMode::Normal).await.unwrap();
        assert_eq!(report.new, 0);
        assert_eq!(report.duplicate, 2);
        assert_eq!(store.news_len(), 2);
    }

    #[tokio::test]
    async fn rate_limited_source_is_skipped_not_fatal() {
        let (collector, store) = collector_with(vec![
            FixedSource {
                name: "healthy".into(),
                tier: SourceTier::Verified,
                articles: vec![article("AAPL beats earnings", "healthy")],
                fail: false,
            },
            FixedSource {
                name: "throttled".into(),
                tier: SourceTier::Verified,
                articles: Vec::new(),
                fail: true,
            },
        ]);

        let report = collector.collect(CollectionMode::Normal).await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(report.per_source["throttled"].errors, 1);
        assert!(!report.errors.is_empty());
        assert_eq!(store.news_len(), 1);
    }

    #[tokio::test]
    async fn light_mode_excludes_low_tier_sources() {
        let (collector, store) = collector_with(vec![
            FixedSource {
                name: "wire".into(),
                tier: SourceTier::Verified,
                articles: vec![article("AAPL beats earnings", "wire")],
                fail: false,
            },
            FixedSource {
                name: "blog".into(),
                tier: SourceTier::Unknown,
                articles: vec![article("GME to the moon", "blog")],
                fail: false,
            },
        ]);

        let report = collector.collect(CollectionMode::Light).await.unwrap();
        assert_eq!(report.new, 1);
        assert!(!report.per_source.contains_key("blog"));
        assert_eq!(store.news_len(), 1);
    }

    #[tokio::test]
    async fn outcome_update_is_idempotent_for_source_metrics() {
        let (collector, store) = collector_with(vec![FixedSource {
            name: "wire".into(),
            tier: SourceTier::Verified,
            articles: vec![article("AAPL beats earnings", "wire")],
            fail: false,
        }]);
        collector.collect(CollectionMode::Normal).await.unwrap();

        let items = collector.search(&NewsFilter::default()).await.unwrap();
        let news_id = items[0].news_id.clone();
        let outcome = NewsOutcome {
            price_move_1h: 2.5,
            price_move_24h: 4.0,
            volume_surge_ratio: 3.1,
            was_accurate: true,
        };

        collector.update_outcome(&news_id, &outcome).await.unwrap();
        collector.update_outcome(&news_id, &outcome).await.unwrap();

        let metrics = store.source_metrics().await.unwrap();
        let wire = metrics.iter().find(|m| m.source == "wire").unwrap();
        assert_eq!(wire.accurate_articles, 1);
        assert_eq!(wire.false_articles, 0);
        assert_eq!(wire.accuracy_rate, 1.0);
    }
}
