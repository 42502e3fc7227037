//! NewsAPI.org source: paginated search API over general market news.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::{NewsSource, RateSpec};
use crate::domain::{RawArticle, SourceTier};
use crate::error::{CatalystError, Result};

const NEWSAPI_BASE: &str = "https://newsapi.org/v2/everything";
const PAGE_SIZE: usize = 50;
const MARKET_QUERY: &str = "\"stock market\" OR NYSE OR NASDAQ OR earnings";

pub struct NewsApiSource {
    http: reqwest::Client,
    api_key: String,
    tier: SourceTier,
}

impl NewsApiSource {
    pub fn new(http: reqwest::Client, api_key: String, tier: SourceTier) -> Self {
        Self {
            http,
            api_key,
            tier,
        }
    }

    fn parse_article(&self, article: &Value) -> Option<RawArticle> {
        let headline = article["title"].as_str()?.to_string();
        let published_at = article["publishedAt"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))?;

        let mut metadata = HashMap::new();
        for key in ["author", "urlToImage"] {
            if let Some(v) = article.get(key) {
                if !v.is_null() {
                    metadata.insert(key.to_string(), v.clone());
                }
            }
        }
        if let Some(name) = article["source"]["name"].as_str() {
            metadata.insert("upstream_source".to_string(), Value::String(name.to_string()));
        }

        Some(RawArticle {
            symbol: None,
            headline,
            source: "newsapi".to_string(),
            source_url: article["url"].as_str().map(str::to_string),
            published_at,
            snippet: article["description"]
                .as_str()
                .map(|s| s.chars().take(500).collect()),
            metadata,
        })
    }
}

#[async_trait]
impl NewsSource for NewsApiSource {
    async fn fetch(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>> {
        let mut articles = Vec::new();
        let mut page = 1u32;

        while articles.len() < limit {
            let page_size = PAGE_SIZE.min(limit - articles.len());
            let response = self
                .http
                .get(NEWSAPI_BASE)
                .query(&[
                    ("q", MARKET_QUERY),
                    ("language", "en"),
                    ("sortBy", "publishedAt"),
                    ("from", &since.to_rfc3339()),
                    ("pageSize", &page_size.to_string()),
                    ("page", &page.to_string()),
                    ("apiKey", &self.api_key),
                ])
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                return Err(CatalystError::RateLimited {
                    source_name: self.source_name().to_string(),
                    retry_after_secs,
                });
            }
            let body: Value = response.error_for_status()?.json().await?;

            let batch = body["articles"].as_array().cloned().unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            articles.extend(batch.iter().filter_map(|a| self.parse_article(a)));

            // Short page means the search is exhausted.
            if batch_len < page_size {
                break;
            }
            page += 1;
        }

        articles.truncate(limit);
        debug!(count = articles.len(), page, "newsapi fetch complete");
        Ok(articles)
    }

    fn source_name(&self) -> &str {
        "newsapi"
    }

    fn source_tier(&self) -> SourceTier {
        self.tier
    }

    fn rate_limit(&self) -> RateSpec {
        // Free-tier budget: 100 requests/day; keep bursts short.
        RateSpec::new(4, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> NewsApiSource {
        NewsApiSource::new(reqwest::Client::new(), "test-key".into(), SourceTier::Aggregated)
    }

    #[test]
    fn parses_well_formed_article() {
        let article = serde_json::json!({
            "source": {"id": null, "name": "TechWire"},
            "author": "J. Doe",
            "title": "ACME beats Q3 earnings",
            "description": "ACME reported EPS of $2.10, beating estimates.",
            "url": "https://example.com/acme-q3",
            "publishedAt": "2025-01-15T13:05:00Z"
        });
        let raw = source().parse_article(&article).unwrap();
        assert_eq!(raw.headline, "ACME beats Q3 earnings");
        assert_eq!(raw.source, "newsapi");
        assert_eq!(
            raw.metadata["upstream_source"],
            serde_json::json!("TechWire")
        );
    }

    #[test]
    fn drops_articles_without_timestamp() {
        let article = serde_json::json!({
            "title": "No date here",
            "publishedAt": "not-a-date"
        });
        assert!(source().parse_article(&article).is_none());
    }
}
