//! Catalyst scoring: news recency, source tier, keyword categories, and
//! market session compose into a 0..=100 per-symbol score.

use chrono::{DateTime, Utc};

use crate::domain::{KeywordCategory, NewsItem};

/// Exponential age decay constant, hours.
const AGE_DECAY_HOURS: f64 = 4.0;
/// Keyword multipliers compose via product, capped here.
const KEYWORD_CAP: f64 = 2.0;
/// A full-strength item (tier-1, fresh, neutral keywords, regular session)
/// contributes this many score points.
const ITEM_SCALE: f64 = 100.0;

/// Per-tier scoring weights, overridable via `tier_N_weight` runtime config.
#[derive(Debug, Clone, Copy)]
pub struct TierWeights(pub [f64; 5]);

impl Default for TierWeights {
    fn default() -> Self {
        Self([1.0, 0.8, 0.6, 0.4, 0.2])
    }
}

impl TierWeights {
    pub fn weight(&self, tier: i16) -> f64 {
        let idx = (tier.clamp(1, 5) - 1) as usize;
        self.0[idx]
    }
}

/// Multiplicative composition of category weights, capped.
pub fn keyword_weight(categories: &[KeywordCategory]) -> f64 {
    categories
        .iter()
        .map(|c| c.weight())
        .product::<f64>()
        .min(KEYWORD_CAP)
}

/// Contribution of one news item at `now`.
pub fn item_score(item: &NewsItem, now: DateTime<Utc>, tiers: &TierWeights) -> f64 {
    let age = item.age_hours(now);
    tiers.weight(item.source_tier.as_i16())
        * (-age / AGE_DECAY_HOURS).exp()
        * keyword_weight(&item.keywords)
        * item.market_state.weight()
}

/// Catalyst score for a symbol: scaled sum over its recent news, capped
/// at 100. One fresh tier-1 earnings item lands around 93.
pub fn catalyst_score(items: &[NewsItem], now: DateTime<Utc>, tiers: &TierWeights) -> f64 {
    let sum: f64 = items.iter().map(|i| item_score(i, now, tiers)).sum();
    (ITEM_SCALE * sum).min(100.0)
}

/// Technical score from the market snapshot: volume expansion and the day's
/// move around a neutral 50, clipped to [0, 100].
pub fn technical_score(relative_volume: f64, price_change_pct: f64) -> f64 {
    let rv = relative_volume.max(f64::MIN_POSITIVE);
    (50.0 + 10.0 * rv.log10() + 2.0 * price_change_pct).clamp(0.0, 100.0)
}

/// Final ranking metric: catalyst evidence dominates, technicals validate.
pub fn combined_score(catalyst: f64, technical: f64) -> f64 {
    (0.70 * catalyst + 0.30 * technical).clamp(0.0, 100.0)
}

/// Dominant catalyst category across a symbol's news: highest summed weight,
/// ties broken by category order.
pub fn primary_catalyst(items: &[NewsItem]) -> Option<KeywordCategory> {
    let mut totals: Vec<(KeywordCategory, f64)> = Vec::new();
    for item in items {
        for cat in &item.keywords {
            match totals.iter_mut().find(|(c, _)| c == cat) {
                Some((_, w)) => *w += cat.weight(),
                None => totals.push((*cat, cat.weight())),
            }
        }
    }
    totals
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfirmationStatus, MarketState, SourceTier};
    use chrono::Duration;

    fn item(
        tier: SourceTier,
        age_hours: i64,
        keywords: Vec<KeywordCategory>,
        state: MarketState,
        now: DateTime<Utc>,
    ) -> NewsItem {
        NewsItem {
            news_id: "f".repeat(64),
            symbol: Some("ACME".into()),
            headline: "test".into(),
            source: "Reuters".into(),
            source_url: None,
            published_at: now - Duration::hours(age_hours),
            collected_at: now,
            snippet: None,
            keywords,
            mentioned_tickers: vec!["ACME".into()],
            market_state: state,
            is_breaking: false,
            source_tier: tier,
            cluster_id: None,
            sentiment_keywords: Vec::new(),
            article_length: 0,
            metadata: serde_json::Value::Null,
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

    #[test]
    fn single_fresh_tier1_earnings_item_scores_high() {
        // tier 1, 1h old, earnings, regular session:
        // 1.0 * exp(-0.25) * 1.2 * 1.0 = 0.9345 -> catalyst 93.45
        let now = Utc::now();
        let items = vec![item(
            SourceTier::Institutional,
            1,
            vec![KeywordCategory::Earnings],
            MarketState::Regular,
            now,
        )];
        let score = catalyst_score(&items, now, &TierWeights::default());
        assert!((score - 93.45).abs() < 0.2, "score = {score}");
    }

    #[test]
    fn catalyst_score_caps_at_100() {
        let now = Utc::now();
        let items: Vec<NewsItem> = (0..10)
            .map(|_| {
                item(
                    SourceTier::Institutional,
                    0,
                    vec![KeywordCategory::Fda],
                    MarketState::PreMarket,
                    now,
                )
            })
            .collect();
        assert_eq!(catalyst_score(&items, now, &TierWeights::default()), 100.0);
    }

    #[test]
    fn zero_news_scores_zero() {
        assert_eq!(
            catalyst_score(&[], Utc::now(), &TierWeights::default()),
            0.0
        );
    }

    #[test]
    fn keyword_product_is_capped() {
        let cats = vec![
            KeywordCategory::Fda,
            KeywordCategory::Merger,
            KeywordCategory::Earnings,
        ];
        // 1.5 * 1.3 * 1.2 = 2.34 -> capped at 2.0
        assert_eq!(keyword_weight(&cats), 2.0);
        assert_eq!(keyword_weight(&[KeywordCategory::Lawsuit]), 1.0);
    }

    #[test]
    fn technical_score_matches_worked_example() {
        // rel_volume 2.0, change +3%: 50 + 10*log10(2) + 6 = 59.01
        let score = technical_score(2.0, 3.0);
        assert!((score - 59.01).abs() < 0.05, "score = {score}");
    }

    #[test]
    fn technical_score_is_clipped() {
        assert_eq!(technical_score(0.0001, -80.0), 0.0);
        assert_eq!(technical_score(1000.0, 40.0), 100.0);
    }

    #[test]
    fn combined_score_matches_worked_example() {
        // 0.7 * 93.45 + 0.3 * 59.01 = 83.12
        let combined = combined_score(93.45, 59.01);
        assert!((combined - 83.12).abs() < 0.05, "combined = {combined}");
    }

    #[test]
    fn primary_catalyst_picks_heaviest_category() {
        let now = Utc::now();
        let items = vec![
            item(
                SourceTier::Institutional,
                1,
                vec![KeywordCategory::Earnings],
                MarketState::Regular,
                now,
            ),
            item(
                SourceTier::Verified,
                2,
                vec![KeywordCategory::Fda, KeywordCategory::Earnings],
                MarketState::Regular,
                now,
            ),
        ];
        // earnings: 1.2 + 1.2 = 2.4; fda: 1.5
        assert_eq!(primary_catalyst(&items), Some(KeywordCategory::Earnings));
        assert_eq!(primary_catalyst(&[]), None);
    }

    #[test]
    fn tier_weight_override() {
        let weights = TierWeights([1.0, 0.9, 0.5, 0.3, 0.1]);
        assert_eq!(weights.weight(2), 0.9);
        assert_eq!(weights.weight(7), 0.1);
        assert_eq!(weights.weight(0), 1.0);
    }
}
