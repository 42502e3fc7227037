use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CatalystError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres DSN. Usually supplied via DATABASE_URL.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

/// Market-time schedule windows. Times are HH:MM in `market_timezone`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_market_timezone")]
    pub market_timezone: String,
    #[serde(default = "default_premarket_start")]
    pub premarket_start: String,
    #[serde(default = "default_premarket_end")]
    pub premarket_end: String,
    #[serde(default = "default_regular_end")]
    pub regular_end: String,
    #[serde(default = "default_afterhours_end")]
    pub afterhours_end: String,
    /// Tick intervals per mode, minutes.
    #[serde(default = "default_premarket_interval")]
    pub premarket_interval: u64,
    #[serde(default = "default_market_interval")]
    pub market_interval: u64,
    #[serde(default = "default_afterhours_interval")]
    pub afterhours_interval: u64,
    #[serde(default = "default_overnight_interval")]
    pub overnight_interval: u64,
}

fn default_market_timezone() -> String {
    "US/Eastern".to_string()
}
fn default_premarket_start() -> String {
    "04:00".to_string()
}
fn default_premarket_end() -> String {
    "09:30".to_string()
}
fn default_regular_end() -> String {
    "16:00".to_string()
}
fn default_afterhours_end() -> String {
    "20:00".to_string()
}
fn default_premarket_interval() -> u64 {
    5
}
fn default_market_interval() -> u64 {
    30
}
fn default_afterhours_interval() -> u64 {
    60
}
fn default_overnight_interval() -> u64 {
    240
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            market_timezone: default_market_timezone(),
            premarket_start: default_premarket_start(),
            premarket_end: default_premarket_end(),
            regular_end: default_regular_end(),
            afterhours_end: default_afterhours_end(),
            premarket_interval: default_premarket_interval(),
            market_interval: default_market_interval(),
            afterhours_interval: default_afterhours_interval(),
            overnight_interval: default_overnight_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.market_timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(format!("unknown market timezone: {}", self.market_timezone));
        }
        for (label, value) in [
            ("premarket_start", &self.premarket_start),
            ("premarket_end", &self.premarket_end),
            ("regular_end", &self.regular_end),
            ("afterhours_end", &self.afterhours_end),
        ] {
            if parse_hhmm(value).is_none() {
                errors.push(format!("{label} must be HH:MM, got \"{value}\""));
            }
        }
        for (label, minutes) in [
            ("premarket_interval", self.premarket_interval),
            ("market_interval", self.market_interval),
            ("afterhours_interval", self.afterhours_interval),
            ("overnight_interval", self.overnight_interval),
        ] {
            if minutes == 0 {
                errors.push(format!("{label} must be > 0"));
            }
        }
        errors
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.market_timezone
            .parse()
            .unwrap_or(chrono_tz::US::Eastern)
    }
}

/// Parse "HH:MM" into minutes since midnight.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h < 24 && m < 60 {
        Some(h * 60 + m)
    } else {
        None
    }
}

/// One configured RSS/Atom feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RssFeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_rss_tier")]
    pub tier: i16,
}

fn default_rss_tier() -> i16 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    /// Bounded fan-out across sources.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    /// Enable the NewsAPI source (key from NEWSAPI_KEY).
    #[serde(default)]
    pub newsapi_enabled: bool,
    /// Enable the Alpha Vantage source (key from ALPHAVANTAGE_KEY).
    #[serde(default)]
    pub alphavantage_enabled: bool,
    #[serde(default = "default_rss_feeds")]
    pub rss_feeds: Vec<RssFeedConfig>,
    /// Source name -> tier overrides; unlisted sources default to tier 5.
    #[serde(default = "default_source_tiers")]
    pub source_tiers: HashMap<String, i16>,
    /// Known exchange symbols for ticker extraction.
    #[serde(default = "default_symbol_allowlist")]
    pub symbol_allowlist: Vec<String>,
    /// Headline regex marking breaking coverage.
    #[serde(default = "default_breaking_pattern")]
    pub breaking_pattern: String,
    /// Basis for avg_early_minutes: "confirmation" or "price_move".
    #[serde(default = "default_early_minutes_basis")]
    pub early_minutes_basis: String,
    /// Bounded per-source queue; overflow is dropped for the cycle.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_fetch_concurrency() -> usize {
    8
}
fn default_fetch_retries() -> u32 {
    2
}
fn default_queue_capacity() -> usize {
    512
}
fn default_breaking_pattern() -> String {
    r"(?i)\b(breaking|alert|urgent|just in|developing|exclusive|flash)\b".to_string()
}
fn default_early_minutes_basis() -> String {
    "confirmation".to_string()
}

fn default_rss_feeds() -> Vec<RssFeedConfig> {
    [
        ("marketwatch", "https://feeds.marketwatch.com/marketwatch/topstories/", 3),
        ("yahoo_finance", "https://finance.yahoo.com/news/rssindex", 3),
        ("seeking_alpha", "https://seekingalpha.com/feed.xml", 4),
    ]
    .into_iter()
    .map(|(name, url, tier)| RssFeedConfig {
        name: name.to_string(),
        url: url.to_string(),
        tier,
    })
    .collect()
}

fn default_source_tiers() -> HashMap<String, i16> {
    [
        ("Reuters", 1),
        ("Bloomberg", 1),
        ("Dow Jones", 1),
        ("Associated Press", 1),
        ("CNBC", 2),
        ("MarketWatch", 2),
        ("marketwatch", 2),
        ("yahoo_finance", 3),
        ("Benzinga", 3),
        ("seeking_alpha", 4),
        ("newsapi", 4),
        ("alphavantage", 3),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_symbol_allowlist() -> Vec<String> {
    // Liquid US large caps plus the high-beta names the scanner's baseline
    // universe watches. Operators extend this in config.
    [
        "AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "TSLA", "JPM", "V", "JNJ", "WMT", "PG",
        "MA", "HD", "DIS", "BAC", "XOM", "CVX", "ABBV", "PFE", "KO", "PEP", "MRK", "TMO", "CSCO",
        "VZ", "INTC", "AMD", "ADBE", "CRM", "NFLX", "PYPL", "QCOM", "TXN", "AVGO", "ORCL", "NOW",
        "UBER", "ABNB", "SHOP", "SNAP", "PINS", "ROKU", "ZM", "GILD", "AMGN", "VRTX", "REGN",
        "MRNA", "BIIB", "ILMN", "GS", "MS", "C", "WFC", "AXP", "SCHW", "BLK", "SPGI", "TGT",
        "COST", "NKE", "SBUX", "MCD", "LOW", "CVS", "COP", "SLB", "EOG", "PSX", "MPC", "VLO",
        "GME", "AMC", "BB", "PLTR", "SOFI", "RIVN", "LCID",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            fetch_retries: default_fetch_retries(),
            newsapi_enabled: false,
            alphavantage_enabled: false,
            rss_feeds: default_rss_feeds(),
            source_tiers: default_source_tiers(),
            symbol_allowlist: default_symbol_allowlist(),
            breaking_pattern: default_breaking_pattern(),
            early_minutes_basis: default_early_minutes_basis(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl NewsConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.fetch_concurrency == 0 {
            errors.push("fetch_concurrency must be > 0".to_string());
        }
        if regex::Regex::new(&self.breaking_pattern).is_err() {
            errors.push(format!(
                "breaking_pattern is not a valid regex: \"{}\"",
                self.breaking_pattern
            ));
        }
        for (source, tier) in &self.source_tiers {
            if !(1..=5).contains(tier) {
                errors.push(format!("tier for source {source} must be 1..=5, got {tier}"));
            }
        }
        if !matches!(self.early_minutes_basis.as_str(), "confirmation" | "price_move") {
            errors.push(format!(
                "early_minutes_basis must be \"confirmation\" or \"price_move\", got \"{}\"",
                self.early_minutes_basis
            ));
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_min_catalyst_score")]
    pub min_catalyst_score: f64,
    #[serde(default = "default_aggressive_min_catalyst_score")]
    pub aggressive_min_catalyst_score: f64,
    /// Per-item score floor for universe admission.
    #[serde(default = "default_item_score_threshold")]
    pub item_score_threshold: f64,
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    #[serde(default = "default_max_price")]
    pub max_price: f64,
    #[serde(default = "default_min_volume")]
    pub min_volume: i64,
    #[serde(default = "default_aggressive_min_volume")]
    pub aggressive_min_volume: i64,
    #[serde(default = "default_min_relative_volume")]
    pub min_relative_volume: f64,
    /// Final picks per scan.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Cap after the catalyst filter stage.
    #[serde(default = "default_catalyst_cap")]
    pub catalyst_cap: usize,
    /// Most-active baseline symbols unioned into the universe.
    #[serde(default = "default_baseline_universe")]
    pub baseline_universe: Vec<String>,
    #[serde(default = "default_universe_size")]
    pub universe_size: usize,
    /// Market-data collaborator base URL.
    #[serde(default = "default_market_data_url")]
    pub market_data_url: String,
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
}

fn default_min_catalyst_score() -> f64 {
    30.0
}
fn default_aggressive_min_catalyst_score() -> f64 {
    20.0
}
fn default_item_score_threshold() -> f64 {
    0.1
}
fn default_min_price() -> f64 {
    1.0
}
fn default_max_price() -> f64 {
    500.0
}
fn default_min_volume() -> i64 {
    500_000
}
fn default_aggressive_min_volume() -> i64 {
    100_000
}
fn default_min_relative_volume() -> f64 {
    1.5
}
fn default_top_k() -> usize {
    5
}
fn default_catalyst_cap() -> usize {
    20
}
fn default_universe_size() -> usize {
    100
}
fn default_market_data_url() -> String {
    "http://localhost:5011".to_string()
}
fn default_scan_timeout() -> u64 {
    30
}

fn default_baseline_universe() -> Vec<String> {
    default_symbol_allowlist()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_catalyst_score: default_min_catalyst_score(),
            aggressive_min_catalyst_score: default_aggressive_min_catalyst_score(),
            item_score_threshold: default_item_score_threshold(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            min_volume: default_min_volume(),
            aggressive_min_volume: default_aggressive_min_volume(),
            min_relative_volume: default_min_relative_volume(),
            top_k: default_top_k(),
            catalyst_cap: default_catalyst_cap(),
            baseline_universe: default_baseline_universe(),
            universe_size: default_universe_size(),
            market_data_url: default_market_data_url(),
            scan_timeout_secs: default_scan_timeout(),
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.min_price <= 0.0 || self.max_price <= self.min_price {
            errors.push(format!(
                "price gate must satisfy 0 < min < max, got [{}, {}]",
                self.min_price, self.max_price
            ));
        }
        if self.top_k == 0 {
            errors.push("top_k must be > 0".to_string());
        }
        if self.catalyst_cap < self.top_k {
            errors.push(format!(
                "catalyst_cap ({}) must be >= top_k ({})",
                self.catalyst_cap, self.top_k
            ));
        }
        if !(0.0..=100.0).contains(&self.min_catalyst_score) {
            errors.push(format!(
                "min_catalyst_score must be in [0, 100], got {}",
                self.min_catalyst_score
            ));
        }
        errors
    }
}

/// One downstream collaborator service.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    pub url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    pub timeout_secs: u64,
}

fn default_health_path() -> String {
    "/health".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_pattern_collaborator")]
    pub pattern: CollaboratorConfig,
    #[serde(default = "default_technical_collaborator")]
    pub technical: CollaboratorConfig,
    #[serde(default = "default_trading_collaborator")]
    pub trading: CollaboratorConfig,
    /// Signals below this confidence are not executed.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_outcome_sweep_minutes")]
    pub outcome_sweep_minutes: u64,
    #[serde(default = "default_narrative_sweep_minutes")]
    pub narrative_sweep_minutes: u64,
    #[serde(default = "default_health_check_secs")]
    pub health_check_secs: u64,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_pattern_collaborator() -> CollaboratorConfig {
    CollaboratorConfig {
        url: "http://localhost:5002".to_string(),
        health_path: default_health_path(),
        timeout_secs: 30,
    }
}
fn default_technical_collaborator() -> CollaboratorConfig {
    CollaboratorConfig {
        url: "http://localhost:5003".to_string(),
        health_path: default_health_path(),
        timeout_secs: 30,
    }
}
fn default_trading_collaborator() -> CollaboratorConfig {
    CollaboratorConfig {
        url: "http://localhost:5005".to_string(),
        health_path: default_health_path(),
        timeout_secs: 10,
    }
}
fn default_confidence_floor() -> f64 {
    0.6
}
fn default_outcome_sweep_minutes() -> u64 {
    15
}
fn default_narrative_sweep_minutes() -> u64 {
    60
}
fn default_health_check_secs() -> u64 {
    30
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_retry_attempts() -> u32 {
    2
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern_collaborator(),
            technical: default_technical_collaborator(),
            trading: default_trading_collaborator(),
            confidence_floor: default_confidence_floor(),
            outcome_sweep_minutes: default_outcome_sweep_minutes(),
            narrative_sweep_minutes: default_narrative_sweep_minutes(),
            health_check_secs: default_health_check_secs(),
            retry_base_ms: default_retry_base_ms(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            errors.push(format!(
                "confidence_floor must be in [0, 1], got {}",
                self.confidence_floor
            ));
        }
        for (name, c) in [
            ("pattern", &self.pattern),
            ("technical", &self.technical),
            ("trading", &self.trading),
        ] {
            if c.timeout_secs == 0 {
                errors.push(format!("{name} collaborator timeout must be > 0"));
            }
            if url::Url::parse(&c.url).is_err() {
                errors.push(format!("{name} collaborator URL is invalid: {}", c.url));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_coordinator_port")]
    pub coordinator_port: u16,
    #[serde(default = "default_news_port")]
    pub news_port: u16,
    #[serde(default = "default_scanner_port")]
    pub scanner_port: u16,
}

fn default_coordinator_port() -> u16 {
    5000
}
fn default_news_port() -> u16 {
    5008
}
fn default_scanner_port() -> u16 {
    5001
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            coordinator_port: default_coordinator_port(),
            news_port: default_news_port(),
            scanner_port: default_scanner_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_news_ttl")]
    pub news_ttl_secs: u64,
    #[serde(default = "default_candidates_ttl")]
    pub candidates_ttl_secs: u64,
    #[serde(default = "default_config_ttl")]
    pub config_ttl_secs: u64,
}

fn default_news_ttl() -> u64 {
    3600
}
fn default_candidates_ttl() -> u64 {
    300
}
fn default_config_ttl() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            news_ttl_secs: default_news_ttl(),
            candidates_ttl_secs: default_candidates_ttl(),
            config_ttl_secs: default_config_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    /// Load from config/default.toml, an optional CATALYST_CONFIG file, and
    /// CATALYST_-prefixed environment variables. DATABASE_URL wins for the
    /// database DSN.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false));

        if let Ok(path) = std::env::var("CATALYST_CONFIG") {
            if Path::new(&path).exists() {
                builder = builder.add_source(File::with_name(&path));
            }
        }

        builder = builder
            .add_source(Environment::with_prefix("CATALYST").separator("__"))
            .set_default("database.url", "postgres://localhost/catalyst")?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }

        let cfg: AppConfig = builder.build()?.try_deserialize()?;

        let problems = cfg.validate();
        if !problems.is_empty() {
            return Err(CatalystError::Validation(problems.join("; ")));
        }
        Ok(cfg)
    }

    /// Validate config invariants. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.schedule.validate());
        errors.extend(self.news.validate());
        errors.extend(self.scanner.validate());
        errors.extend(self.coordinator.validate());
        errors
    }
}

/// Recognized runtime-tunable keys stored in trading_config. Everything else
/// passed to updateConfig is rejected with a validation error.
pub const RUNTIME_CONFIG_KEYS: &[&str] = &[
    "max_positions",
    "min_catalyst_score",
    "min_price",
    "max_price",
    "min_volume",
    "min_relative_volume",
    "premarket_start",
    "premarket_end",
    "market_interval",
    "premarket_interval",
    "afterhours_interval",
    "tier_1_weight",
    "tier_2_weight",
    "tier_3_weight",
    "tier_4_weight",
    "tier_5_weight",
    "news_cache_ttl",
    "api_timeout",
];

pub fn is_runtime_config_key(key: &str) -> bool {
    RUNTIME_CONFIG_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/catalyst".into(),
                max_connections: 20,
            },
            schedule: ScheduleConfig::default(),
            news: NewsConfig::default(),
            scanner: ScannerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        };
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("04:00"), Some(240));
        assert_eq!(parse_hhmm("09:30"), Some(570));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("9:75"), None);
        assert_eq!(parse_hhmm("nine"), None);
    }

    #[test]
    fn bad_price_gate_is_rejected() {
        let mut cfg = ScannerConfig::default();
        cfg.max_price = cfg.min_price;
        assert!(!cfg.validate().is_empty());
    }

    #[test]
    fn runtime_keys_recognized() {
        assert!(is_runtime_config_key("min_catalyst_score"));
        assert!(is_runtime_config_key("tier_3_weight"));
        assert!(!is_runtime_config_key("favorite_color"));
    }
}
