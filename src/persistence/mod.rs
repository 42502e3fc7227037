//! Persistence port: the abstract store interface the three core components
//! consume, plus its Postgres and in-memory implementations and the TTL cache.

pub mod cache;
pub mod memory;
pub mod postgres;
pub mod settings;

pub use cache::Cache;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use settings::RuntimeSettings;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CollectionReport, CollectionStats, NarrativeCluster, NewsItem, NewsOutcome, ScanResult,
    ServiceHealthRecord, SourceMetrics, SourceMetricsDelta, SourceTier, TradeRecord, TradingCycle,
    TrendingStory, WorkflowLogEntry,
};
use crate::error::Result;

/// Outcome of a news upsert: was the fingerprint new?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Duplicate fingerprint; `update_count` is the post-bump value.
    Duplicate { update_count: i32 },
}

impl UpsertOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Filters for time-range news reads. `max_tier` keeps items whose tier is at
/// least that reliable (numerically <=).
#[derive(Debug, Clone, Default)]
pub struct NewsFilter {
    pub symbol: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub max_tier: Option<SourceTier>,
    pub unconfirmed_only: bool,
    /// Default 1000, newest first.
    pub limit: Option<usize>,
}

impl NewsFilter {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Default::default()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(1000)
    }
}

/// The store interface consumed by the coordinator, collector, and scanner.
///
/// Implementations must provide read-committed transactions for multi-row
/// writes and idempotency for `upsert_news_item` and `update_news_outcome`.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ---- news ----

    /// Idempotent upsert keyed by fingerprint. On conflict: bump
    /// update_count, refresh last_seen, union ticker/keyword sets; original
    /// fields are never overwritten.
    async fn upsert_news_item(&self, item: &NewsItem) -> Result<UpsertOutcome>;

    async fn get_news_item(&self, news_id: &str) -> Result<Option<NewsItem>>;

    async fn read_news_range(&self, filter: &NewsFilter) -> Result<Vec<NewsItem>>;

    /// Append-only outcome update; serialized per news_id, idempotent.
    /// Returns true when the fields were newly set, false on a repeat.
    async fn update_news_outcome(&self, news_id: &str, outcome: &NewsOutcome) -> Result<bool>;

    /// Mark an article confirmed by a higher-tier source.
    async fn mark_confirmed(
        &self,
        news_id: &str,
        confirmed_by: &str,
        delay_minutes: i64,
    ) -> Result<()>;

    // ---- scans ----

    /// All-or-nothing insert of a scan and its ranked candidates.
    async fn insert_candidates(&self, scan: &ScanResult) -> Result<()>;

    async fn get_scan_result(&self, scan_id: uuid::Uuid) -> Result<Option<ScanResult>>;

    // ---- cycles ----

    async fn insert_cycle(&self, cycle: &TradingCycle) -> Result<()>;

    async fn update_cycle(&self, cycle: &TradingCycle) -> Result<()>;

    async fn finalize_cycle(&self, cycle: &TradingCycle) -> Result<()>;

    async fn log_workflow_stage(&self, entry: &WorkflowLogEntry) -> Result<()>;

    // ---- runtime config ----

    async fn read_config(&self, key: &str) -> Result<Option<String>>;

    async fn write_config(&self, key: &str, value: &str, modified_by: &str) -> Result<()>;

    // ---- source metrics / narratives ----

    async fn increment_source_metrics(&self, delta: &SourceMetricsDelta) -> Result<()>;

    async fn source_metrics(&self) -> Result<Vec<SourceMetrics>>;

    async fn insert_narrative_cluster(&self, cluster: &NarrativeCluster) -> Result<()>;

    async fn narrative_clusters_since(&self, since: DateTime<Utc>)
        -> Result<Vec<NarrativeCluster>>;

    async fn trending_stories(&self, since: DateTime<Utc>, limit: usize)
        -> Result<Vec<TrendingStory>>;

    // ---- collection stats / service health ----

    async fn record_collection_stats(&self, report: &CollectionReport) -> Result<()>;

    async fn collection_stats(&self, window_hours: i64) -> Result<CollectionStats>;

    async fn record_service_health(&self, record: &ServiceHealthRecord) -> Result<()>;

    // ---- trade feedback ----

    async fn closed_trades_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>>;

    async fn mark_trade_outcome_applied(&self, trade_id: &str) -> Result<()>;

    /// Connectivity probe used by health checks.
    async fn ping(&self) -> Result<()>;
}
