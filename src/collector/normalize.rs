//! Normalization pipeline: raw source articles become deduplicatable,
//! tagged `NewsItem`s.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use sha1::{Digest as Sha1Digest, Sha1};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::config::{parse_hhmm, NewsConfig, ScheduleConfig};
use crate::domain::{
    ConfirmationStatus, KeywordCategory, MarketState, NewsItem, RawArticle, SourceTier,
};
use crate::error::{CatalystError, Result};

/// Raw-phrase lexicon per category. Matching is case-insensitive substring,
/// the way the upstream editorial tagging behaves.
fn default_lexicon() -> Vec<(KeywordCategory, Vec<&'static str>)> {
    use KeywordCategory::*;
    vec![
        (Earnings, vec!["earnings", "revenue", "profit", "eps", "beat", "miss"]),
        (Fda, vec!["fda", "approval", "clinical", "trial", "phase 3", "phase iii"]),
        (Merger, vec!["merger", "acquisition", "acquire", "buyout", "takeover"]),
        (Guidance, vec!["guidance", "forecast", "outlook", "expects", "warns"]),
        (Lawsuit, vec!["lawsuit", "settlement", "investigation", "fraud", "sec charges"]),
        (Bankruptcy, vec!["bankruptcy", "chapter 11", "restructuring", "default"]),
        (Insider, vec!["insider", "ceo", "cfo", "director", "executive"]),
        (Short, vec!["short interest", "short squeeze", "short seller"]),
        (Pump, vec!["skyrocket", "moonshot", "can't miss", "guaranteed"]),
        (Dump, vec!["sell-off", "selloff", "dump", "collapse"]),
        (Breakthrough, vec!["breakthrough", "first-ever", "revolutionary", "milestone"]),
        (Concerns, vec!["concerns", "worries", "doubts", "scrutiny", "recall"]),
    ]
}

const POSITIVE_SENTIMENT: &[&str] = &[
    "beats", "surge", "soars", "record", "upgrade", "wins", "strong", "rally",
];
const NEGATIVE_SENTIMENT: &[&str] = &[
    "misses", "plunge", "downgrade", "warns", "weak", "falls", "halt", "slump",
];

/// Query parameters stripped from article URLs before storage.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "cmpid"];

pub struct Normalizer {
    ticker_re: Regex,
    breaking_re: Regex,
    allowlist: HashSet<String>,
    source_tiers: HashMap<String, i16>,
    lexicon: Vec<(KeywordCategory, Vec<&'static str>)>,
    tz: Tz,
    premarket_start: u32,
    premarket_end: u32,
    regular_end: u32,
    afterhours_end: u32,
}

impl Normalizer {
    pub fn new(news: &NewsConfig, schedule: &ScheduleConfig) -> Result<Self> {
        let breaking_re = Regex::new(&news.breaking_pattern)
            .map_err(|e| CatalystError::Validation(format!("breaking_pattern: {e}")))?;
        Ok(Self {
            ticker_re: Regex::new(r"\$?[A-Z]{1,5}\b").expect("ticker pattern is static"),
            breaking_re,
            allowlist: news.symbol_allowlist.iter().cloned().collect(),
            source_tiers: news.source_tiers.clone(),
            lexicon: default_lexicon(),
            tz: schedule.timezone(),
            premarket_start: parse_hhmm(&schedule.premarket_start).unwrap_or(4 * 60),
            premarket_end: parse_hhmm(&schedule.premarket_end).unwrap_or(9 * 60 + 30),
            regular_end: parse_hhmm(&schedule.regular_end).unwrap_or(16 * 60),
            afterhours_end: parse_hhmm(&schedule.afterhours_end).unwrap_or(20 * 60),
        })
    }

    /// Content fingerprint: SHA-256 over normalized headline, source, and the
    /// publication time rounded to the minute. 64 hex chars.
    pub fn fingerprint(headline: &str, source: &str, published_at: DateTime<Utc>) -> String {
        let normalized = headline.trim().to_lowercase();
        let minute = published_at.format("%Y-%m-%dT%H:%M");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0x1f]);
        hasher.update(source.as_bytes());
        hasher.update([0x1f]);
        hasher.update(minute.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Drop tracking parameters; leave everything else untouched.
    pub fn strip_tracking(url_str: &str) -> String {
        let Ok(mut url) = url::Url::parse(url_str) else {
            return url_str.to_string();
        };
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| {
                !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref())
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            let query = kept
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
        url.to_string()
    }

    /// Tickers mentioned in free text, filtered against the exchange
    /// allow-list so plain words in caps do not leak through.
    pub fn extract_tickers(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut tickers = Vec::new();
        for m in self.ticker_re.find_iter(text) {
            let candidate = m.as_str().trim_start_matches('$');
            if self.allowlist.contains(candidate) && seen.insert(candidate.to_string()) {
                tickers.push(candidate.to_string());
            }
        }
        tickers
    }

    /// Session classification in the market timezone. 09:30:00 is regular
    /// (inclusive lower bound); 16:00 is after-hours; 20:00 is closed.
    pub fn classify_market_state(&self, published_at: DateTime<Utc>) -> MarketState {
        let local = published_at.with_timezone(&self.tz);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketState::Weekend;
        }
        let minutes = local.hour() * 60 + local.minute();
        if (self.premarket_start..self.premarket_end).contains(&minutes) {
            MarketState::PreMarket
        } else if (self.premarket_end..self.regular_end).contains(&minutes) {
            MarketState::Regular
        } else if (self.regular_end..self.afterhours_end).contains(&minutes) {
            MarketState::AfterHours
        } else {
            MarketState::Closed
        }
    }

    pub fn extract_keywords(&self, text: &str) -> Vec<KeywordCategory> {
        let lower = text.to_lowercase();
        let mut cats: Vec<KeywordCategory> = self
            .lexicon
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
            .map(|(cat, _)| *cat)
            .collect();
        cats.sort();
        cats
    }

    pub fn extract_sentiment(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut words: Vec<String> = POSITIVE_SENTIMENT
            .iter()
            .chain(NEGATIVE_SENTIMENT.iter())
            .filter(|w| lower.contains(*w))
            .map(|w| w.to_string())
            .collect();
        words.sort();
        words.dedup();
        words
    }

    pub fn tier_for_source(&self, source: &str) -> SourceTier {
        self.source_tiers
            .get(source)
            .map(|t| SourceTier::from_i16(*t))
            .unwrap_or(SourceTier::Unknown)
    }

    pub fn is_breaking(
        &self,
        tier: SourceTier,
        headline: &str,
        published_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        tier.as_i16() <= 2
            && (now - published_at) < chrono::Duration::minutes(30)
            && self.breaking_re.is_match(headline)
    }

    /// Narrative cluster id: sha1(symbol || market-local date || sorted
    /// categories). None without a primary symbol.
    pub fn cluster_id(
        &self,
        symbol: Option<&str>,
        published_at: DateTime<Utc>,
        categories: &[KeywordCategory],
    ) -> Option<String> {
        let symbol = symbol?;
        let date = published_at.with_timezone(&self.tz).date_naive();
        let mut cats: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
        cats.sort();
        let mut hasher = Sha1::new();
        hasher.update(symbol.as_bytes());
        hasher.update(date.to_string().as_bytes());
        hasher.update(cats.join(",").as_bytes());
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Run the whole pipeline for one raw article.
    pub fn normalize(&self, raw: &RawArticle, now: DateTime<Utc>) -> NewsItem {
        let tier = self.tier_for_source(&raw.source);
        let text = match &raw.snippet {
            Some(snippet) => format!("{} {snippet}", raw.headline),
            None => raw.headline.clone(),
        };

        let mut tickers = self.extract_tickers(&text);
        let symbol = raw.symbol.clone().or_else(|| tickers.first().cloned());
        if let Some(ref s) = symbol {
            if !tickers.contains(s) {
                tickers.push(s.clone());
            }
        }
        tickers.sort();

        let keywords = self.extract_keywords(&text);
        let cluster_id = self.cluster_id(symbol.as_deref(), raw.published_at, &keywords);
        let article_length = raw.snippet.as_deref().unwrap_or("").len() as i32;

        NewsItem {
            news_id: Self::fingerprint(&raw.headline, &raw.source, raw.published_at),
            symbol,
            headline: raw.headline.clone(),
            source: raw.source.clone(),
            source_url: raw.source_url.as_deref().map(Self::strip_tracking),
            published_at: raw.published_at,
            collected_at: now,
            snippet: raw.snippet.clone(),
            keywords,
            mentioned_tickers: tickers,
            market_state: self.classify_market_state(raw.published_at),
            is_breaking: self.is_breaking(tier, &raw.headline, raw.published_at, now),
            source_tier: tier,
            cluster_id,
            sentiment_keywords: self.extract_sentiment(&text),
            article_length,
            metadata: serde_json::to_value(&raw.metadata)
                .unwrap_or(serde_json::Value::Object(Default::default())),
            update_count: 0,
            first_seen: now,
            last_seen: now,
            price_move_1h: None,
            price_move_24h: None,
            volume_surge_ratio: None,
            was_accurate: None,
            confirmation: ConfirmationStatus::Unconfirmed,
            confirmed_by: None,
            confirmation_delay_minutes: None,
        }
    }

    pub fn market_timezone(&self) -> Tz {
        self.tz
    }
}

/// Timestamp helper for tests and sweeps: a UTC instant from market-local
/// wall-clock parts.
pub fn market_local(tz: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    tz.with_ymd_and_hms(y, mo, d, h, mi, 0)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NewsConfig, ScheduleConfig};

    fn normalizer() -> Normalizer {
        Normalizer::new(&NewsConfig::default(), &ScheduleConfig::default()).unwrap()
    }

    fn raw(headline: &str, source: &str, published_at: DateTime<Utc>) -> RawArticle {
        RawArticle {
            symbol: None,
            headline: headline.to_string(),
            source: source.to_string(),
            source_url: None,
            published_at,
            snippet: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn fingerprint_is_pure_and_minute_rounded() {
        let t1 = "2025-01-15T13:05:10Z".parse().unwrap();
        let t2 = "2025-01-15T13:05:55Z".parse().unwrap();
        let t3 = "2025-01-15T13:06:00Z".parse().unwrap();
        let a = Normalizer::fingerprint("ACME beats Q3 earnings", "Reuters", t1);
        let b = Normalizer::fingerprint("ACME beats Q3 earnings", "Reuters", t2);
        let c = Normalizer::fingerprint("ACME beats Q3 earnings", "Reuters", t3);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_normalizes_headline_case() {
        let t = "2025-01-15T13:05:00Z".parse().unwrap();
        assert_eq!(
            Normalizer::fingerprint("ACME Beats Q3 Earnings ", "Reuters", t),
            Normalizer::fingerprint("acme beats q3 earnings", "Reuters", t),
        );
    }

    #[test]
    fn tracking_params_are_stripped() {
        assert_eq!(
            Normalizer::strip_tracking(
                "https://example.com/story?id=42&utm_source=x&utm_campaign=y&fbclid=z"
            ),
            "https://example.com/story?id=42"
        );
        assert_eq!(
            Normalizer::strip_tracking("https://example.com/story?utm_source=x"),
            "https://example.com/story"
        );
    }

    #[test]
    fn ticker_extraction_respects_allowlist() {
        let n = normalizer();
        let tickers = n.extract_tickers("$AAPL and MSFT rally while THE CEO talks");
        assert_eq!(tickers, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn market_state_boundaries() {
        let n = normalizer();
        let tz = n.market_timezone();
        // Wednesday 2025-01-15.
        assert_eq!(
            n.classify_market_state(market_local(tz, 2025, 1, 15, 7, 0)),
            MarketState::PreMarket
        );
        // Exactly 09:30 is regular (inclusive lower bound).
        assert_eq!(
            n.classify_market_state(market_local(tz, 2025, 1, 15, 9, 30)),
            MarketState::Regular
        );
        assert_eq!(
            n.classify_market_state(market_local(tz, 2025, 1, 15, 16, 0)),
            MarketState::AfterHours
        );
        assert_eq!(
            n.classify_market_state(market_local(tz, 2025, 1, 15, 21, 0)),
            MarketState::Closed
        );
        // Saturday.
        assert_eq!(
            n.classify_market_state(market_local(tz, 2025, 1, 18, 12, 0)),
            MarketState::Weekend
        );
    }

    #[test]
    fn keyword_categories_from_lexicon() {
        let n = normalizer();
        let cats = n.extract_keywords("ACME wins FDA approval, beats earnings forecast");
        assert!(cats.contains(&KeywordCategory::Fda));
        assert!(cats.contains(&KeywordCategory::Earnings));
        assert!(cats.contains(&KeywordCategory::Guidance));
    }

    #[test]
    fn breaking_requires_tier_recency_and_pattern() {
        let n = normalizer();
        let now = Utc::now();
        let fresh = now - chrono::Duration::minutes(5);
        let stale = now - chrono::Duration::hours(2);
        assert!(n.is_breaking(SourceTier::Institutional, "BREAKING: ACME halts trading", fresh, now));
        assert!(!n.is_breaking(SourceTier::Unknown, "BREAKING: ACME halts trading", fresh, now));
        assert!(!n.is_breaking(SourceTier::Institutional, "BREAKING: ACME halts trading", stale, now));
        assert!(!n.is_breaking(SourceTier::Institutional, "ACME quarterly report", fresh, now));
    }

    #[test]
    fn cluster_id_is_deterministic_and_order_insensitive() {
        let n = normalizer();
        let t = "2025-01-15T13:05:00Z".parse().unwrap();
        let a = n.cluster_id(
            Some("ACME"),
            t,
            &[KeywordCategory::Earnings, KeywordCategory::Guidance],
        );
        let b = n.cluster_id(
            Some("ACME"),
            t,
            &[KeywordCategory::Guidance, KeywordCategory::Earnings],
        );
        assert_eq!(a, b);
        assert!(a.is_some());
        assert_eq!(n.cluster_id(None, t, &[KeywordCategory::Earnings]), None);
    }

    #[test]
    fn normalize_sets_primary_symbol_from_first_ticker() {
        let n = normalizer();
        let t = "2025-01-15T13:05:00Z".parse().unwrap();
        let item = n.normalize(&raw("AAPL beats earnings estimates", "Reuters", t), Utc::now());
        assert_eq!(item.symbol.as_deref(), Some("AAPL"));
        assert_eq!(item.source_tier, SourceTier::Institutional);
        assert!(item.keywords.contains(&KeywordCategory::Earnings));
        assert_eq!(item.update_count, 0);
    }
}
