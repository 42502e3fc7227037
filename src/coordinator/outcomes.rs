//! Outcome feedback: closed paper trades flow back into news accuracy and
//! source reliability metrics.
//!
//! Runs on its own timer rather than inline in the collector, which breaks
//! the NewsItem <-> SourceMetrics <-> TradeRecord cycle.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::collector::NewsCollector;
use crate::domain::NewsOutcome;
use crate::error::Result;
use crate::persistence::Persistence;
use crate::services::Metrics;

/// First sweep after boot looks back this far.
const INITIAL_LOOKBACK_HOURS: i64 = 24;

pub struct OutcomeSweeper {
    store: Arc<dyn Persistence>,
    collector: Arc<NewsCollector>,
    metrics: Arc<Metrics>,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl OutcomeSweeper {
    pub fn new(
        store: Arc<dyn Persistence>,
        collector: Arc<NewsCollector>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            collector,
            metrics,
            last_sweep: Mutex::new(Utc::now() - ChronoDuration::hours(INITIAL_LOOKBACK_HOURS)),
        }
    }

    /// One pass: apply every unapplied closure since the high-water mark.
    /// Idempotent per trade; a crash between the outcome write and the
    /// applied-flag write is absorbed by the news-side append-only guard.
    pub async fn sweep(&self) -> Result<usize> {
        let since = *self.last_sweep.lock().await;
        let trades = self.store.closed_trades_since(since).await?;
        if trades.is_empty() {
            return Ok(0);
        }

        let mut applied = 0usize;
        let mut realized = Decimal::ZERO;
        for trade in &trades {
            if let Some(news_id) = &trade.news_id {
                let pnl_pct = trade.realized_pnl_pct.unwrap_or(0.0);
                let accurate = trade
                    .realized_pnl
                    .map(|p| p > Decimal::ZERO)
                    .unwrap_or(false);
                let outcome = NewsOutcome {
                    price_move_1h: pnl_pct,
                    price_move_24h: pnl_pct,
                    volume_surge_ratio: 0.0,
                    was_accurate: accurate,
                };
                if let Err(e) = self.collector.update_outcome(news_id, &outcome).await {
                    warn!(
                        trade_id = %trade.trade_id,
                        news_id = %news_id,
                        error = %e,
                        "failed to apply trade outcome"
                    );
                    continue;
                }
            }
            if let Some(pnl) = trade.realized_pnl {
                realized += pnl;
            }
            self.store.mark_trade_outcome_applied(&trade.trade_id).await?;
            applied += 1;
        }

        if realized != Decimal::ZERO {
            let milli = (realized * Decimal::from(1000))
                .to_i64()
                .unwrap_or(0);
            self.metrics
                .cycle_pnl_milli
                .fetch_add(milli, std::sync::atomic::Ordering::Relaxed);
        }

        let mut last = self.last_sweep.lock().await;
        *last = trades
            .iter()
            .filter_map(|t| t.closed_at)
            .max()
            .unwrap_or(*last);
        info!(applied, realized = %realized, "outcome sweep complete");
        Ok(applied)
    }

    /// Background loop on the configured cadence.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "outcome sweeper started");
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "outcome sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outcome sweeper stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{NewsCollector, Normalizer};
    use crate::config::{CacheConfig, NewsConfig, ScheduleConfig};
    use crate::domain::{RawArticle, TradeRecord};
    use crate::persistence::{Cache, MemoryStore, NewsFilter};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn collector(store: Arc<MemoryStore>) -> Arc<NewsCollector> {
        let news_config = NewsConfig::default();
        Arc::new(NewsCollector::new(
            store,
            Arc::new(Cache::new()),
            Arc::new(Metrics::new()),
            Vec::new(),
            Normalizer::new(&news_config, &ScheduleConfig::default()).unwrap(),
            &news_config,
            &CacheConfig::default(),
        ))
    }

    #[tokio::test]
    async fn closed_trade_updates_news_and_source_metrics() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Persistence> = store.clone();
        let collector = collector(store.clone());

        // Seed a news item via the normal path.
        let normalizer =
            Normalizer::new(&NewsConfig::default(), &ScheduleConfig::default()).unwrap();
        let item = normalizer.normalize(
            &RawArticle {
                symbol: Some("AAPL".into()),
                headline: "AAPL beats earnings".into(),
                source: "Reuters".into(),
                source_url: None,
                published_at: Utc::now() - ChronoDuration::hours(2),
                snippet: None,
                metadata: HashMap::new(),
            },
            Utc::now(),
        );
        dyn_store.upsert_news_item(&item).await.unwrap();

        store.seed_trade(TradeRecord {
            trade_id: "T1".into(),
            news_id: Some(item.news_id.clone()),
            symbol: "AAPL".into(),
            opened_at: Utc::now() - ChronoDuration::hours(1),
            closed_at: Some(Utc::now()),
            realized_pnl: Some(dec!(125.50)),
            realized_pnl_pct: Some(2.5),
            outcome_applied: false,
        });

        let metrics = Arc::new(Metrics::new());
        let sweeper = OutcomeSweeper::new(dyn_store.clone(), collector, metrics);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);

        let stored = dyn_store
            .get_news_item(&item.news_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.was_accurate, Some(true));
        assert_eq!(stored.price_move_1h, Some(2.5));

        let source_rows = dyn_store.source_metrics().await.unwrap();
        let reuters = source_rows.iter().find(|m| m.source == "Reuters").unwrap();
        assert_eq!(reuters.accurate_articles, 1);

        // Second sweep finds nothing: the trade is marked applied.
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn losing_trade_marks_article_inaccurate() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Persistence> = store.clone();
        let collector = collector(store.clone());

        let normalizer =
            Normalizer::new(&NewsConfig::default(), &ScheduleConfig::default()).unwrap();
        let item = normalizer.normalize(
            &RawArticle {
                symbol: Some("GME".into()),
                headline: "GME guidance raised".into(),
                source: "yahoo_finance".into(),
                source_url: None,
                published_at: Utc::now() - ChronoDuration::hours(3),
                snippet: None,
                metadata: HashMap::new(),
            },
            Utc::now(),
        );
        dyn_store.upsert_news_item(&item).await.unwrap();

        store.seed_trade(TradeRecord {
            trade_id: "T2".into(),
            news_id: Some(item.news_id.clone()),
            symbol: "GME".into(),
            opened_at: Utc::now() - ChronoDuration::hours(1),
            closed_at: Some(Utc::now()),
            realized_pnl: Some(dec!(-40.00)),
            realized_pnl_pct: Some(-1.8),
            outcome_applied: false,
        });

        let sweeper = OutcomeSweeper::new(dyn_store.clone(), collector, Arc::new(Metrics::new()));
        sweeper.sweep().await.unwrap();

        let stored = dyn_store
            .get_news_item(&item.news_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.was_accurate, Some(false));

        let rows = dyn_store.source_metrics().await.unwrap();
        let source = rows.iter().find(|m| m.source == "yahoo_finance").unwrap();
        assert_eq!(source.false_articles, 1);
        assert_eq!(source.accuracy_rate, 0.0);

        // The search surface reflects the update too.
        let found = dyn_store
            .read_news_range(&NewsFilter {
                symbol: Some("GME".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found[0].was_accurate, Some(false));
    }
}
