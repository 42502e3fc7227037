//! News source abstraction and the build-time source registry.
//!
//! A source is anything that can produce `RawArticle`s: REST APIs with keyed
//! auth, paginated search APIs, RSS/Atom feeds. Adding a source means
//! implementing `NewsSource` and registering it in `build_sources`;
//! configuration selects which registered sources are active and supplies
//! credentials via environment variables.

pub mod alphavantage;
pub mod newsapi;
pub mod rate_limit;
pub mod rss;

pub use alphavantage::AlphaVantageSource;
pub use newsapi::NewsApiSource;
pub use rate_limit::TokenBucket;
pub use rss::RssSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NewsConfig;
use crate::domain::{RawArticle, SourceTier};
use crate::error::Result;

/// Declared request budget for a source, used to size its token bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateSpec {
    pub max_requests: u32,
    pub per_seconds: u64,
}

impl RateSpec {
    pub const fn new(max_requests: u32, per_seconds: u64) -> Self {
        Self {
            max_requests,
            per_seconds,
        }
    }
}

/// Capability set every news source implements.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Pull up to `limit` articles published since `since`, newest first.
    async fn fetch(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>>;

    fn source_name(&self) -> &str;

    fn source_tier(&self) -> SourceTier;

    fn rate_limit(&self) -> RateSpec;
}

/// A registered source paired with its token bucket.
pub struct RegisteredSource {
    pub source: Arc<dyn NewsSource>,
    pub limiter: TokenBucket,
}

impl RegisteredSource {
    fn new(source: Arc<dyn NewsSource>) -> Self {
        let spec = source.rate_limit();
        Self {
            limiter: TokenBucket::new(spec),
            source,
        }
    }
}

fn tier_for(config: &NewsConfig, name: &str) -> SourceTier {
    config
        .source_tiers
        .get(name)
        .map(|t| SourceTier::from_i16(*t))
        .unwrap_or(SourceTier::Unknown)
}

/// Instantiate every active source from configuration. Credentialed sources
/// are skipped (with a warning) when their key is absent.
pub fn build_sources(config: &NewsConfig, http: reqwest::Client) -> Vec<RegisteredSource> {
    let mut sources: Vec<RegisteredSource> = Vec::new();

    if config.newsapi_enabled {
        match std::env::var("NEWSAPI_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let tier = tier_for(config, "newsapi");
                sources.push(RegisteredSource::new(Arc::new(NewsApiSource::new(
                    http.clone(),
                    key,
                    tier,
                ))));
            }
            _ => warn!("newsapi enabled but NEWSAPI_KEY is not set; skipping source"),
        }
    }

    if config.alphavantage_enabled {
        match std::env::var("ALPHAVANTAGE_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let tier = tier_for(config, "alphavantage");
                sources.push(RegisteredSource::new(Arc::new(AlphaVantageSource::new(
                    http.clone(),
                    key,
                    tier,
                ))));
            }
            _ => warn!("alphavantage enabled but ALPHAVANTAGE_KEY is not set; skipping source"),
        }
    }

    for feed in &config.rss_feeds {
        sources.push(RegisteredSource::new(Arc::new(RssSource::new(
            http.clone(),
            feed.name.clone(),
            feed.url.clone(),
            SourceTier::from_i16(feed.tier),
        ))));
    }

    info!(
        count = sources.len(),
        "news sources registered: [{}]",
        sources
            .iter()
            .map(|s| s.source.source_name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    sources
}
