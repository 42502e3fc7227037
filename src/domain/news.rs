//! News domain types: raw articles as fetched from sources, and the
//! normalized `NewsItem` records the collector persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalystError;

/// Market session in effect when an article was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketState {
    PreMarket,
    Regular,
    AfterHours,
    Weekend,
    Closed,
}

impl MarketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMarket => "pre-market",
            Self::Regular => "regular",
            Self::AfterHours => "after-hours",
            Self::Weekend => "weekend",
            Self::Closed => "closed",
        }
    }

    /// Scoring weight for catalyst scoring. Pre-market news moves thin books;
    /// weekend and overnight items have usually been priced in by the open.
    pub fn weight(&self) -> f64 {
        match self {
            Self::PreMarket => 2.0,
            Self::Regular => 1.0,
            Self::AfterHours => 0.8,
            Self::Weekend | Self::Closed => 0.5,
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketState {
    type Err = CatalystError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre-market" => Ok(Self::PreMarket),
            "regular" => Ok(Self::Regular),
            "after-hours" => Ok(Self::AfterHours),
            "weekend" => Ok(Self::Weekend),
            "closed" => Ok(Self::Closed),
            other => Err(CatalystError::Validation(format!(
                "unknown market state: {other}"
            ))),
        }
    }
}

/// Editorial reliability bucket, 1 (institutional wires) to 5 (unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum SourceTier {
    Institutional,
    Verified,
    Standard,
    Aggregated,
    Unknown,
}

impl SourceTier {
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Institutional => 1,
            Self::Verified => 2,
            Self::Standard => 3,
            Self::Aggregated => 4,
            Self::Unknown => 5,
        }
    }

    pub fn from_i16(v: i16) -> Self {
        match v {
            1 => Self::Institutional,
            2 => Self::Verified,
            3 => Self::Standard,
            4 => Self::Aggregated,
            _ => Self::Unknown,
        }
    }

    /// Default catalyst-scoring weight; overridable via `tier_N_weight` config.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::Institutional => 1.0,
            Self::Verified => 0.8,
            Self::Standard => 0.6,
            Self::Aggregated => 0.4,
            Self::Unknown => 0.2,
        }
    }

    /// Tier-1/2 sources can confirm earlier lower-tier reporting.
    pub fn can_confirm(&self) -> bool {
        self.as_i16() <= 2
    }
}

impl TryFrom<i16> for SourceTier {
    type Error = String;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        if (1..=5).contains(&v) {
            Ok(Self::from_i16(v))
        } else {
            Err(format!("source tier out of range: {v}"))
        }
    }
}

impl From<SourceTier> for i16 {
    fn from(t: SourceTier) -> i16 {
        t.as_i16()
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i16())
    }
}

/// Recognized headline keyword categories. Categories, not raw keywords:
/// the lexicon mapping raw phrases to categories lives in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCategory {
    Earnings,
    Fda,
    Merger,
    Guidance,
    Lawsuit,
    Bankruptcy,
    Insider,
    Short,
    Pump,
    Dump,
    Breakthrough,
    Concerns,
}

impl KeywordCategory {
    pub const ALL: [KeywordCategory; 12] = [
        Self::Earnings,
        Self::Fda,
        Self::Merger,
        Self::Guidance,
        Self::Lawsuit,
        Self::Bankruptcy,
        Self::Insider,
        Self::Short,
        Self::Pump,
        Self::Dump,
        Self::Breakthrough,
        Self::Concerns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earnings => "earnings",
            Self::Fda => "fda",
            Self::Merger => "merger",
            Self::Guidance => "guidance",
            Self::Lawsuit => "lawsuit",
            Self::Bankruptcy => "bankruptcy",
            Self::Insider => "insider",
            Self::Short => "short",
            Self::Pump => "pump",
            Self::Dump => "dump",
            Self::Breakthrough => "breakthrough",
            Self::Concerns => "concerns",
        }
    }

    /// Per-category multiplier used by the catalyst score.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Earnings => 1.2,
            Self::Fda => 1.5,
            Self::Merger => 1.3,
            Self::Bankruptcy => 1.3,
            Self::Guidance => 1.15,
            _ => 1.0,
        }
    }
}

impl fmt::Display for KeywordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeywordCategory {
    type Err = CatalystError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CatalystError::Validation(format!("unknown keyword category: {s}")))
    }
}

/// An article exactly as a source returned it, before normalization.
/// Unknown fields from the upstream payload are preserved in `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub symbol: Option<String>,
    pub headline: String,
    pub source: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub snippet: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Confirmation state of a lower-tier article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Unconfirmed,
    Confirmed,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfirmed => "unconfirmed",
            Self::Confirmed => "confirmed",
        }
    }
}

/// A normalized, deduplicated news record. Immutable after insertion except
/// for the outcome fields, the confirmation fields, and the dedup counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// Content-derived fingerprint, 64 hex chars. Primary identity.
    pub news_id: String,
    pub symbol: Option<String>,
    pub headline: String,
    pub source: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    pub snippet: Option<String>,
    pub keywords: Vec<KeywordCategory>,
    pub mentioned_tickers: Vec<String>,
    pub market_state: MarketState,
    pub is_breaking: bool,
    pub source_tier: SourceTier,
    pub cluster_id: Option<String>,
    pub sentiment_keywords: Vec<String>,
    pub article_length: i32,
    pub metadata: serde_json::Value,

    // Dedup counters
    pub update_count: i32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    // Outcome fields, appended after trade closure, never rewritten once set
    pub price_move_1h: Option<f64>,
    pub price_move_24h: Option<f64>,
    pub volume_surge_ratio: Option<f64>,
    pub was_accurate: Option<bool>,

    // Confirmation fields
    pub confirmation: ConfirmationStatus,
    pub confirmed_by: Option<String>,
    pub confirmation_delay_minutes: Option<i64>,
}

impl NewsItem {
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.published_at).num_seconds().max(0) as f64 / 3600.0
    }
}

/// Outcome payload applied by the coordinator's feedback sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewsOutcome {
    pub price_move_1h: f64,
    pub price_move_24h: f64,
    pub volume_surge_ratio: f64,
    pub was_accurate: bool,
}

/// Collection aggressiveness, selected by the scheduler from market time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    Aggressive,
    Normal,
    Light,
    Minimal,
}

impl CollectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Normal => "normal",
            Self::Light => "light",
            Self::Minimal => "minimal",
        }
    }

    /// Maximum items accepted per source in one collection run.
    pub fn per_source_cap(&self) -> usize {
        match self {
            Self::Aggressive => 100,
            Self::Normal => 50,
            Self::Light => 30,
            Self::Minimal => 20,
        }
    }

    /// Overall wall-clock budget for one collection run.
    pub fn budget(&self) -> std::time::Duration {
        let secs = match self {
            Self::Aggressive => 120,
            Self::Normal | Self::Light => 180,
            Self::Minimal => 300,
        };
        std::time::Duration::from_secs(secs)
    }

    /// Worst (numerically highest) source tier pulled in this mode.
    pub fn max_source_tier(&self) -> SourceTier {
        match self {
            Self::Aggressive | Self::Normal => SourceTier::Unknown,
            Self::Light => SourceTier::Standard,
            Self::Minimal => SourceTier::Verified,
        }
    }
}

impl fmt::Display for CollectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionMode {
    type Err = CatalystError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggressive" => Ok(Self::Aggressive),
            "normal" => Ok(Self::Normal),
            "light" => Ok(Self::Light),
            "minimal" => Ok(Self::Minimal),
            other => Err(CatalystError::Validation(format!(
                "unknown collection mode: {other}"
            ))),
        }
    }
}

/// Per-source counters inside a collection report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SourceCount {
    pub fetched: usize,
    pub new: usize,
    pub duplicate: usize,
    pub dropped: usize,
    pub errors: usize,
}

/// What one `collect(mode)` run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub mode: CollectionMode,
    pub articles: usize,
    pub new: usize,
    pub duplicate: usize,
    pub dropped: usize,
    pub per_source: HashMap<String, SourceCount>,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
    pub collected_at: DateTime<Utc>,
}

/// Rollup of collection runs over a trailing window, served by /news_stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub window_hours: i64,
    pub runs: i64,
    pub articles: i64,
    pub new: i64,
    pub duplicate: i64,
    pub per_source: HashMap<String, SourceCount>,
}

/// A story grouped by narrative cluster for /trending_news.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingStory {
    pub cluster_id: String,
    pub symbol: Option<String>,
    pub headline: String,
    pub article_count: i64,
    pub update_count: i64,
    pub first_seen: DateTime<Utc>,
    pub latest: DateTime<Utc>,
    pub has_breaking: bool,
}

impl CollectionReport {
    pub fn empty(mode: CollectionMode) -> Self {
        Self {
            mode,
            articles: 0,
            new: 0,
            duplicate: 0,
            dropped: 0,
            per_source: HashMap::new(),
            errors: Vec::new(),
            elapsed_ms: 0,
            collected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_round_trips_through_i16() {
        for v in 1..=5 {
            assert_eq!(SourceTier::from_i16(v).as_i16(), v);
        }
        assert_eq!(SourceTier::from_i16(0), SourceTier::Unknown);
        assert_eq!(SourceTier::from_i16(9), SourceTier::Unknown);
    }

    #[test]
    fn mode_caps_match_contract() {
        assert_eq!(CollectionMode::Aggressive.per_source_cap(), 100);
        assert_eq!(CollectionMode::Normal.per_source_cap(), 50);
        assert_eq!(CollectionMode::Light.per_source_cap(), 30);
        assert_eq!(CollectionMode::Minimal.per_source_cap(), 20);
        assert_eq!(
            CollectionMode::Light.max_source_tier(),
            SourceTier::Standard
        );
        assert_eq!(
            CollectionMode::Minimal.max_source_tier(),
            SourceTier::Verified
        );
    }

    #[test]
    fn keyword_weights() {
        assert_eq!(KeywordCategory::Fda.weight(), 1.5);
        assert_eq!(KeywordCategory::Earnings.weight(), 1.2);
        assert_eq!(KeywordCategory::Lawsuit.weight(), 1.0);
    }

    #[test]
    fn market_state_parses() {
        assert_eq!(
            "pre-market".parse::<MarketState>().unwrap(),
            MarketState::PreMarket
        );
        assert!("lunch".parse::<MarketState>().is_err());
    }
}
