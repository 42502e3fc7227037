//! Confirmation tracking: tier-1/2 coverage confirms earlier lower-tier
//! reporting on the same symbol and story.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;

use crate::domain::{NewsItem, SourceMetricsDelta};
use crate::persistence::{NewsFilter, Persistence};
use crate::error::Result;

/// Look-back window for matching earlier articles.
const CONFIRMATION_WINDOW_HOURS: i64 = 4;

/// Basis for the avg_early_minutes metric (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyMinutesBasis {
    Confirmation,
    PriceMove,
}

impl EarlyMinutesBasis {
    pub fn from_config(value: &str) -> Self {
        if value == "price_move" {
            Self::PriceMove
        } else {
            Self::Confirmation
        }
    }
}

/// When `item` is a freshly stored tier-1/2 article, confirm every earlier
/// unconfirmed tier-3..5 article with the same symbol and an overlapping
/// keyword-category set inside the window. Returns how many were confirmed.
pub async fn apply_confirmations(
    store: &Arc<dyn Persistence>,
    item: &NewsItem,
    basis: EarlyMinutesBasis,
) -> Result<usize> {
    if !item.source_tier.can_confirm() {
        return Ok(0);
    }
    let Some(symbol) = item.symbol.as_deref() else {
        return Ok(0);
    };
    if item.keywords.is_empty() {
        return Ok(0);
    }

    let candidates = store
        .read_news_range(&NewsFilter {
            symbol: Some(symbol.to_string()),
            since: Some(item.published_at - Duration::hours(CONFIRMATION_WINDOW_HOURS)),
            until: Some(item.published_at + Duration::seconds(1)),
            unconfirmed_only: true,
            ..Default::default()
        })
        .await?;

    let mut confirmed = 0;
    for earlier in candidates {
        if earlier.source_tier.as_i16() < 3
            || earlier.published_at > item.published_at
            || earlier.news_id == item.news_id
        {
            continue;
        }
        if !earlier.keywords.iter().any(|k| item.keywords.contains(k)) {
            continue;
        }

        let delay_minutes = (item.published_at - earlier.published_at).num_minutes();
        store
            .mark_confirmed(&earlier.news_id, &item.source, delay_minutes)
            .await?;

        let mut delta = SourceMetricsDelta {
            source: earlier.source.clone(),
            seed_tier: Some(earlier.source_tier),
            confirmed: 1,
            beneficiary: earlier.symbol.clone(),
            ..Default::default()
        };
        if basis == EarlyMinutesBasis::Confirmation {
            delta.early_minutes_sample = Some(delay_minutes as f64);
        }
        store.increment_source_metrics(&delta).await?;

        info!(
            news_id = %earlier.news_id,
            source = %earlier.source,
            confirmed_by = %item.source,
            delay_minutes,
            "article confirmed by higher-tier coverage"
        );
        confirmed += 1;
    }
    Ok(confirmed)
}
