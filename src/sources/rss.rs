//! RSS/Atom feed source. One instance per configured feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::{NewsSource, RateSpec};
use crate::domain::{RawArticle, SourceTier};
use crate::error::{CatalystError, Result};

pub struct RssSource {
    http: reqwest::Client,
    name: String,
    feed_url: String,
    tier: SourceTier,
}

impl RssSource {
    pub fn new(http: reqwest::Client, name: String, feed_url: String, tier: SourceTier) -> Self {
        Self {
            http,
            name,
            feed_url,
            tier,
        }
    }

    fn entry_to_article(&self, entry: &feed_rs::model::Entry) -> Option<RawArticle> {
        let headline = entry.title.as_ref()?.content.trim().to_string();
        if headline.is_empty() {
            return None;
        }
        let published_at = entry
            .published
            .or(entry.updated)
            .unwrap_or_else(Utc::now);

        let snippet = entry
            .summary
            .as_ref()
            .map(|s| strip_tags(&s.content).chars().take(500).collect::<String>());

        let mut metadata = HashMap::new();
        let tags: Vec<String> = entry
            .categories
            .iter()
            .map(|c| c.term.clone())
            .collect();
        if !tags.is_empty() {
            metadata.insert("tags".to_string(), serde_json::json!(tags));
        }

        Some(RawArticle {
            symbol: None,
            headline,
            source: self.name.clone(),
            source_url: entry.links.first().map(|l| l.href.clone()),
            published_at,
            snippet,
            metadata,
        })
    }
}

/// Feed summaries often carry inline HTML; keep the text only.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[async_trait]
impl NewsSource for RssSource {
    async fn fetch(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>> {
        let bytes = self
            .http
            .get(&self.feed_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| CatalystError::FeedParse(format!("{}: {e}", self.name)))?;

        let mut articles: Vec<RawArticle> = feed
            .entries
            .iter()
            .filter_map(|e| self.entry_to_article(e))
            .filter(|a| a.published_at >= since)
            .collect();
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        articles.truncate(limit);
        debug!(feed = %self.name, count = articles.len(), "rss fetch complete");
        Ok(articles)
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    fn source_tier(&self) -> SourceTier {
        self.tier
    }

    fn rate_limit(&self) -> RateSpec {
        // Public feeds: one poll every ~30s is plenty.
        RateSpec::new(2, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_removes_markup() {
        assert_eq!(
            strip_tags("<p>ACME <b>beats</b> earnings</p>"),
            "ACME beats earnings"
        );
        assert_eq!(strip_tags("plain text"), "plain text");
    }

    #[tokio::test]
    async fn parses_rss_document() {
        let doc = br#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
              <title>Test Wire</title>
              <item>
                <title>ACME announces merger with Widget Co</title>
                <link>https://example.com/acme-merger</link>
                <description><![CDATA[<p>Deal valued at $2B.</p>]]></description>
                <pubDate>Wed, 15 Jan 2025 13:05:00 GMT</pubDate>
              </item>
            </channel></rss>"#;
        let feed = feed_rs::parser::parse(&doc[..]).unwrap();
        let source = RssSource::new(
            reqwest::Client::new(),
            "test_wire".into(),
            "https://example.com/feed".into(),
            SourceTier::Standard,
        );
        let articles: Vec<RawArticle> = feed
            .entries
            .iter()
            .filter_map(|e| source.entry_to_article(e))
            .collect();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].headline, "ACME announces merger with Widget Co");
        assert_eq!(articles[0].snippet.as_deref(), Some("Deal valued at $2B."));
    }
}
