//! Source reliability metrics, narrative clusters, and the trade-closure
//! projection consumed by the outcome-feedback sweep.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::news::{KeywordCategory, SourceTier};

/// Per-source reliability row. Tier is immutable after seeding; counters only
/// ever increase and satisfy `accurate + false <= confirmed <= total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub source: String,
    pub tier: SourceTier,
    pub total_articles: i64,
    pub confirmed_articles: i64,
    pub accurate_articles: i64,
    pub false_articles: i64,
    pub accuracy_rate: f64,
    pub avg_early_minutes: Option<f64>,
    /// Narrative clusters this source most often participates in.
    pub top_clusters: Vec<String>,
    /// Symbols that most often benefit from this source's coverage.
    pub frequent_beneficiaries: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl SourceMetrics {
    pub fn seed(source: String, tier: SourceTier) -> Self {
        Self {
            source,
            tier,
            total_articles: 0,
            confirmed_articles: 0,
            accurate_articles: 0,
            false_articles: 0,
            accuracy_rate: 0.0,
            avg_early_minutes: None,
            top_clusters: Vec::new(),
            frequent_beneficiaries: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn counters_consistent(&self) -> bool {
        self.accurate_articles + self.false_articles <= self.confirmed_articles
            && self.confirmed_articles <= self.total_articles
    }
}

/// Incremental update applied transactionally when a trade closes or an
/// article lands/confirms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetricsDelta {
    pub source: String,
    /// Tier used only when the row does not exist yet.
    pub seed_tier: Option<SourceTier>,
    pub articles: i64,
    pub confirmed: i64,
    pub accurate: i64,
    pub false_count: i64,
    /// One observation for the early-minutes running mean.
    pub early_minutes_sample: Option<f64>,
    pub beneficiary: Option<String>,
    pub cluster: Option<String>,
}

impl SourceMetricsDelta {
    pub fn article(source: &str, tier: SourceTier) -> Self {
        Self {
            source: source.to_string(),
            seed_tier: Some(tier),
            articles: 1,
            ..Default::default()
        }
    }
}

/// A group of articles sharing symbol, date, and keyword categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeCluster {
    pub cluster_id: String,
    pub symbol: String,
    pub cluster_date: NaiveDate,
    pub categories: Vec<KeywordCategory>,
    pub article_count: i64,
    pub distinct_sources: i64,
    pub time_spread_minutes: i64,
    /// 0..=100; higher means tighter, broader, faster coverage.
    pub coordination_score: f64,
    pub detected_at: DateTime<Utc>,
}

impl NarrativeCluster {
    /// `min(100, 20*sources + 10*articles - 5*spread_hours)`
    pub fn score(distinct_sources: i64, articles: i64, time_spread_minutes: i64) -> f64 {
        let spread_hours = time_spread_minutes as f64 / 60.0;
        let raw = 20.0 * distinct_sources as f64 + 10.0 * articles as f64 - 5.0 * spread_hours;
        raw.clamp(0.0, 100.0)
    }
}

/// Projection of a paper-trade closure, joined back to the originating news.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub news_id: Option<String>,
    pub symbol: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,
    /// Realized move as a percent of entry, the proxy recorded into the
    /// originating article's outcome fields.
    pub realized_pnl_pct: Option<f64>,
    /// Set once the feedback sweep has applied this closure, making the
    /// sweep idempotent per trade.
    pub outcome_applied: bool,
}

/// Persisted outcome of one collaborator health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    pub service: String,
    pub status: String,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordination_score_caps_at_100() {
        assert_eq!(NarrativeCluster::score(10, 50, 0), 100.0);
    }

    #[test]
    fn coordination_score_formula() {
        // 3 sources, 4 articles, 90 minutes spread:
        // 60 + 40 - 7.5 = 92.5
        let s = NarrativeCluster::score(3, 4, 90);
        assert!((s - 92.5).abs() < f64::EPSILON);
    }

    #[test]
    fn metrics_consistency_bounds() {
        let mut m = SourceMetrics::seed("Reuters".into(), SourceTier::Institutional);
        assert!(m.counters_consistent());
        m.total_articles = 10;
        m.confirmed_articles = 4;
        m.accurate_articles = 3;
        m.false_articles = 1;
        assert!(m.counters_consistent());
        m.false_articles = 2;
        assert!(!m.counters_consistent());
    }
}
