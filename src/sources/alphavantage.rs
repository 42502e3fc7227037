//! Alpha Vantage NEWS_SENTIMENT source: keyed-auth REST JSON.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::{NewsSource, RateSpec};
use crate::domain::{RawArticle, SourceTier};
use crate::error::{CatalystError, Result};

const ALPHAVANTAGE_BASE: &str = "https://www.alphavantage.co/query";

pub struct AlphaVantageSource {
    http: reqwest::Client,
    api_key: String,
    tier: SourceTier,
}

impl AlphaVantageSource {
    pub fn new(http: reqwest::Client, api_key: String, tier: SourceTier) -> Self {
        Self {
            http,
            api_key,
            tier,
        }
    }

    fn parse_article(&self, article: &Value) -> Option<RawArticle> {
        let headline = article["title"].as_str()?.to_string();
        // Alpha Vantage timestamps look like 20250115T130500.
        let published_at = article["time_published"]
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok())
            .map(|t| t.and_utc())?;

        let symbol = article["ticker_sentiment"]
            .as_array()
            .and_then(|ts| ts.first())
            .and_then(|t| t["ticker"].as_str())
            .map(str::to_string);

        let mut metadata = HashMap::new();
        for key in ["authors", "topics", "ticker_sentiment", "source_domain"] {
            if let Some(v) = article.get(key) {
                if !v.is_null() {
                    metadata.insert(key.to_string(), v.clone());
                }
            }
        }

        Some(RawArticle {
            symbol,
            headline,
            source: "alphavantage".to_string(),
            source_url: article["url"].as_str().map(str::to_string),
            published_at,
            snippet: article["summary"]
                .as_str()
                .map(|s| s.chars().take(500).collect()),
            metadata,
        })
    }
}

#[async_trait]
impl NewsSource for AlphaVantageSource {
    async fn fetch(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>> {
        let time_from = since.format("%Y%m%dT%H%M").to_string();
        let response = self
            .http
            .get(ALPHAVANTAGE_BASE)
            .query(&[
                ("function", "NEWS_SENTIMENT"),
                ("topics", "earnings,ipo,mergers_and_acquisitions,financial_markets"),
                ("time_from", &time_from),
                ("sort", "LATEST"),
                ("limit", &limit.to_string()),
                ("apikey", &self.api_key),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;

        // Alpha Vantage signals throttling with 200 + a "Note" body.
        if body.get("Note").is_some() || body.get("Information").is_some() {
            return Err(CatalystError::RateLimited {
                source_name: self.source_name().to_string(),
                retry_after_secs: 60,
            });
        }

        let mut articles: Vec<RawArticle> = body["feed"]
            .as_array()
            .map(|feed| feed.iter().filter_map(|a| self.parse_article(a)).collect())
            .unwrap_or_default();
        articles.truncate(limit);
        debug!(count = articles.len(), "alphavantage fetch complete");
        Ok(articles)
    }

    fn source_name(&self) -> &str {
        "alphavantage"
    }

    fn source_tier(&self) -> SourceTier {
        self.tier
    }

    fn rate_limit(&self) -> RateSpec {
        // Free tier allows 5 requests per minute.
        RateSpec::new(5, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> AlphaVantageSource {
        AlphaVantageSource::new(reqwest::Client::new(), "test-key".into(), SourceTier::Standard)
    }

    #[test]
    fn parses_compact_timestamp_and_primary_ticker() {
        let article = serde_json::json!({
            "title": "BIOX wins FDA approval for lead drug",
            "url": "https://example.com/biox",
            "time_published": "20250115T130500",
            "summary": "The FDA approved BIOX's lead candidate.",
            "source": "Example Newswire",
            "ticker_sentiment": [{"ticker": "BIOX", "relevance_score": "0.9"}]
        });
        let raw = source().parse_article(&article).unwrap();
        assert_eq!(raw.symbol.as_deref(), Some("BIOX"));
        assert_eq!(
            raw.published_at,
            "2025-01-15T13:05:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let article = serde_json::json!({
            "title": "Bad time",
            "time_published": "2025-01-15 13:05"
        });
        assert!(source().parse_article(&article).is_none());
    }
}
