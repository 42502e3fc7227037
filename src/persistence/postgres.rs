//! PostgreSQL implementation of the persistence port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{NewsFilter, Persistence, UpsertOutcome};
use crate::domain::{
    CandidateStatus, CollectionReport, CollectionStats, ConfirmationStatus, KeywordCategory,
    MarketState, NarrativeCluster, NewsItem, NewsOutcome, ScanResult, ServiceHealthRecord,
    SourceCount, SourceMetrics, SourceMetricsDelta, SourceTier, TradeRecord, TradingCandidate,
    TradingCycle, TrendingStory, WorkflowLogEntry,
};
use crate::error::{CatalystError, Result};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn string_vec(value: serde_json::Value) -> Vec<String> {
    serde_json::from_value(value).unwrap_or_default()
}

fn keyword_vec(value: serde_json::Value) -> Vec<KeywordCategory> {
    serde_json::from_value(value).unwrap_or_default()
}

fn news_item_from_row(row: &PgRow) -> Result<NewsItem> {
    let market_state: String = row.try_get("market_state")?;
    let confirmation: String = row.try_get("confirmation")?;
    Ok(NewsItem {
        news_id: row.try_get("news_id")?,
        symbol: row.try_get("symbol")?,
        headline: row.try_get("headline")?,
        source: row.try_get("source")?,
        source_url: row.try_get("source_url")?,
        published_at: row.try_get("published_at")?,
        collected_at: row.try_get("collected_at")?,
        snippet: row.try_get("snippet")?,
        keywords: keyword_vec(row.try_get("keywords")?),
        mentioned_tickers: string_vec(row.try_get("mentioned_tickers")?),
        market_state: market_state
            .parse()
            .unwrap_or(MarketState::Closed),
        is_breaking: row.try_get("is_breaking")?,
        source_tier: SourceTier::from_i16(row.try_get("source_tier")?),
        cluster_id: row.try_get("cluster_id")?,
        sentiment_keywords: string_vec(row.try_get("sentiment_keywords")?),
        article_length: row.try_get("article_length")?,
        metadata: row.try_get("metadata")?,
        update_count: row.try_get("update_count")?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        price_move_1h: row.try_get("price_move_1h")?,
        price_move_24h: row.try_get("price_move_24h")?,
        volume_surge_ratio: row.try_get("volume_surge_ratio")?,
        was_accurate: row.try_get("was_accurate")?,
        confirmation: if confirmation == "confirmed" {
            ConfirmationStatus::Confirmed
        } else {
            ConfirmationStatus::Unconfirmed
        },
        confirmed_by: row.try_get("confirmed_by")?,
        confirmation_delay_minutes: row.try_get("confirmation_delay_minutes")?,
    })
}

fn candidate_from_row(row: &PgRow) -> Result<TradingCandidate> {
    let primary: Option<String> = row.try_get("primary_catalyst")?;
    let status: String = row.try_get("status")?;
    Ok(TradingCandidate {
        scan_id: row.try_get("scan_id")?,
        symbol: row.try_get("symbol")?,
        selected_at: row.try_get("selected_at")?,
        catalyst_score: row.try_get("catalyst_score")?,
        news_count: row.try_get("news_count")?,
        primary_catalyst: primary.and_then(|p| p.parse().ok()),
        catalyst_keywords: keyword_vec(row.try_get("catalyst_keywords")?),
        has_premarket_news: row.try_get("has_premarket_news")?,
        best_tier: row.try_get("best_tier")?,
        price: row.try_get::<Option<Decimal>, _>("price")?,
        volume: row.try_get("volume")?,
        relative_volume: row.try_get("relative_volume")?,
        price_change_pct: row.try_get("price_change_pct")?,
        premarket_volume: row.try_get("premarket_volume")?,
        premarket_change_pct: row.try_get("premarket_change_pct")?,
        technical_validated: row.try_get("technical_validated")?,
        technical_score: row.try_get("technical_score")?,
        combined_score: row.try_get("combined_score")?,
        selection_rank: row.try_get("selection_rank")?,
        status: match status.as_str() {
            "analyzed" => CandidateStatus::Analyzed,
            "traded" => CandidateStatus::Traded,
            _ => CandidateStatus::Selected,
        },
    })
}

#[async_trait]
impl Persistence for PostgresStore {
    #[instrument(skip(self, item), fields(news_id = %item.news_id))]
    async fn upsert_news_item(&self, item: &NewsItem) -> Result<UpsertOutcome> {
        let row = sqlx::query(
            r#"
            INSERT INTO news_raw (
                news_id, symbol, headline, source, source_url, published_at,
                collected_at, snippet, keywords, mentioned_tickers, market_state,
                is_breaking, source_tier, cluster_id, sentiment_keywords,
                article_length, metadata, update_count, first_seen, last_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, 0, $18, $19)
            ON CONFLICT (news_id) DO UPDATE SET
                update_count = news_raw.update_count + 1,
                last_seen = GREATEST(news_raw.last_seen, EXCLUDED.last_seen),
                mentioned_tickers = (
                    SELECT COALESCE(jsonb_agg(DISTINCT val ORDER BY val), '[]'::jsonb)
                    FROM jsonb_array_elements_text(
                        news_raw.mentioned_tickers || EXCLUDED.mentioned_tickers
                    ) AS t(val)
                ),
                keywords = (
                    SELECT COALESCE(jsonb_agg(DISTINCT val ORDER BY val), '[]'::jsonb)
                    FROM jsonb_array_elements_text(
                        news_raw.keywords || EXCLUDED.keywords
                    ) AS t(val)
                )
            RETURNING update_count, (xmax = 0) AS inserted
            "#,
        )
        .bind(&item.news_id)
        .bind(&item.symbol)
        .bind(&item.headline)
        .bind(&item.source)
        .bind(&item.source_url)
        .bind(item.published_at)
        .bind(item.collected_at)
        .bind(&item.snippet)
        .bind(serde_json::to_value(&item.keywords)?)
        .bind(serde_json::to_value(&item.mentioned_tickers)?)
        .bind(item.market_state.as_str())
        .bind(item.is_breaking)
        .bind(item.source_tier.as_i16())
        .bind(&item.cluster_id)
        .bind(serde_json::to_value(&item.sentiment_keywords)?)
        .bind(item.article_length)
        .bind(&item.metadata)
        .bind(item.first_seen)
        .bind(item.last_seen)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        if inserted {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Duplicate {
                update_count: row.try_get("update_count")?,
            })
        }
    }

    async fn get_news_item(&self, news_id: &str) -> Result<Option<NewsItem>> {
        let row = sqlx::query("SELECT * FROM news_raw WHERE news_id = $1")
            .bind(news_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| news_item_from_row(&r)).transpose()
    }

    async fn read_news_range(&self, filter: &NewsFilter) -> Result<Vec<NewsItem>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM news_raw WHERE 1=1");
        if let Some(ref symbol) = filter.symbol {
            qb.push(" AND (symbol = ")
                .push_bind(symbol)
                .push(" OR mentioned_tickers @> ")
                .push_bind(serde_json::json!([symbol]))
                .push(")");
        }
        if let Some(since) = filter.since {
            qb.push(" AND published_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            qb.push(" AND published_at < ").push_bind(until);
        }
        if let Some(tier) = filter.max_tier {
            qb.push(" AND source_tier <= ").push_bind(tier.as_i16());
        }
        if filter.unconfirmed_only {
            qb.push(" AND confirmation = 'unconfirmed'");
        }
        qb.push(" ORDER BY published_at DESC LIMIT ")
            .push_bind(filter.effective_limit() as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(news_item_from_row).collect()
    }

    async fn update_news_outcome(&self, news_id: &str, outcome: &NewsOutcome) -> Result<bool> {
        // Guarded update keeps the write append-only and idempotent: once
        // was_accurate is set, later applications match zero rows.
        let result = sqlx::query(
            r#"
            UPDATE news_raw
            SET price_move_1h = $2,
                price_move_24h = $3,
                volume_surge_ratio = $4,
                was_accurate = $5
            WHERE news_id = $1 AND was_accurate IS NULL
            "#,
        )
        .bind(news_id)
        .bind(outcome.price_move_1h)
        .bind(outcome.price_move_24h)
        .bind(outcome.volume_surge_ratio)
        .bind(outcome.was_accurate)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM news_raw WHERE news_id = $1")
                .bind(news_id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !exists {
                return Err(CatalystError::NotFound(format!("news item {news_id}")));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn mark_confirmed(
        &self,
        news_id: &str,
        confirmed_by: &str,
        delay_minutes: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE news_raw
            SET confirmation = 'confirmed',
                confirmed_by = $2,
                confirmation_delay_minutes = $3
            WHERE news_id = $1 AND confirmation = 'unconfirmed'
            "#,
        )
        .bind(news_id)
        .bind(confirmed_by)
        .bind(delay_minutes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM news_raw WHERE news_id = $1")
                .bind(news_id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !exists {
                return Err(CatalystError::NotFound(format!("news item {news_id}")));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, scan), fields(scan_id = %scan.scan_id, candidates = scan.candidates.len()))]
    async fn insert_candidates(&self, scan: &ScanResult) -> Result<()> {
        if !scan.ranks_consistent() {
            return Err(CatalystError::Validation(format!(
                "scan {} has inconsistent selection ranks",
                scan.scan_id
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO scans (scan_id, mode, started_at, universe_size,
                               catalyst_filtered, technical_validated, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(scan.scan_id)
        .bind(scan.mode.as_str())
        .bind(scan.started_at)
        .bind(scan.universe_size as i32)
        .bind(scan.catalyst_filtered as i32)
        .bind(scan.technical_validated)
        .bind(scan.duration_ms as i64)
        .execute(&mut *tx)
        .await?;

        for c in &scan.candidates {
            sqlx::query(
                r#"
                INSERT INTO trading_candidates (
                    scan_id, selection_rank, symbol, selected_at, catalyst_score,
                    news_count, primary_catalyst, catalyst_keywords,
                    has_premarket_news, best_tier, price, volume, relative_volume,
                    price_change_pct, premarket_volume, premarket_change_pct,
                    technical_validated, technical_score, combined_score, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                        $14, $15, $16, $17, $18, $19, $20)
                "#,
            )
            .bind(c.scan_id)
            .bind(c.selection_rank)
            .bind(&c.symbol)
            .bind(c.selected_at)
            .bind(c.catalyst_score)
            .bind(c.news_count)
            .bind(c.primary_catalyst.map(|k| k.as_str()))
            .bind(serde_json::to_value(&c.catalyst_keywords)?)
            .bind(c.has_premarket_news)
            .bind(c.best_tier)
            .bind(c.price)
            .bind(c.volume)
            .bind(c.relative_volume)
            .bind(c.price_change_pct)
            .bind(c.premarket_volume)
            .bind(c.premarket_change_pct)
            .bind(c.technical_validated)
            .bind(c.technical_score)
            .bind(c.combined_score)
            .bind(c.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_scan_result(&self, scan_id: Uuid) -> Result<Option<ScanResult>> {
        let Some(scan_row) = sqlx::query("SELECT * FROM scans WHERE scan_id = $1")
            .bind(scan_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let candidate_rows = sqlx::query(
            "SELECT * FROM trading_candidates WHERE scan_id = $1 ORDER BY selection_rank",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;

        let mode: String = scan_row.try_get("mode")?;
        Ok(Some(ScanResult {
            scan_id,
            mode: mode
                .parse()
                .map_err(|_| CatalystError::Internal(format!("bad scan mode: {mode}")))?,
            started_at: scan_row.try_get("started_at")?,
            candidates: candidate_rows
                .iter()
                .map(candidate_from_row)
                .collect::<Result<Vec<_>>>()?,
            universe_size: scan_row.try_get::<i32, _>("universe_size")? as usize,
            catalyst_filtered: scan_row.try_get::<i32, _>("catalyst_filtered")? as usize,
            technical_validated: scan_row.try_get("technical_validated")?,
            duration_ms: scan_row.try_get::<i64, _>("duration_ms")? as u64,
        }))
    }

    async fn insert_cycle(&self, cycle: &TradingCycle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trading_cycles (cycle_id, mode, status, started_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&cycle.cycle_id)
        .bind(cycle.mode.as_str())
        .bind(cycle.status.as_str())
        .bind(cycle.started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_cycle(&self, cycle: &TradingCycle) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE trading_cycles
            SET status = $2,
                ended_at = $3,
                news_collected = $4,
                candidates_selected = $5,
                patterns_analyzed = $6,
                signals_generated = $7,
                trades_executed = $8,
                cycle_pnl = $9,
                success_rate = $10,
                failure_reason = $11
            WHERE cycle_id = $1
            "#,
        )
        .bind(&cycle.cycle_id)
        .bind(cycle.status.as_str())
        .bind(cycle.ended_at)
        .bind(cycle.counters.news_collected)
        .bind(cycle.counters.candidates_selected)
        .bind(cycle.counters.patterns_analyzed)
        .bind(cycle.counters.signals_generated)
        .bind(cycle.counters.trades_executed)
        .bind(cycle.cycle_pnl)
        .bind(cycle.success_rate)
        .bind(&cycle.failure_reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalystError::NotFound(format!("cycle {}", cycle.cycle_id)));
        }
        Ok(())
    }

    async fn finalize_cycle(&self, cycle: &TradingCycle) -> Result<()> {
        self.update_cycle(cycle).await
    }

    async fn log_workflow_stage(&self, entry: &WorkflowLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_log (cycle_id, stage, outcome, started_at, ended_at, records, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.cycle_id)
        .bind(entry.stage.as_str())
        .bind(entry.outcome.as_str())
        .bind(entry.started_at)
        .bind(entry.ended_at)
        .bind(entry.records)
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_config(&self, key: &str) -> Result<Option<String>> {
        let value =
            sqlx::query_scalar::<_, String>("SELECT value FROM trading_config WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn write_config(&self, key: &str, value: &str, modified_by: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trading_config (key, value, modified_by, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                modified_by = EXCLUDED.modified_by,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(modified_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_source_metrics(&self, delta: &SourceMetricsDelta) -> Result<()> {
        // Read-modify-write under a row lock; tier never changes after
        // seeding, accuracy and the early-minutes mean are recomputed from
        // the stored aggregates.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO source_metrics (source, tier)
            VALUES ($1, $2)
            ON CONFLICT (source) DO NOTHING
            "#,
        )
        .bind(&delta.source)
        .bind(
            delta
                .seed_tier
                .unwrap_or(SourceTier::Unknown)
                .as_i16(),
        )
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT total_articles, confirmed_articles, accurate_articles,
                   false_articles, early_minutes_sum, early_minutes_count,
                   top_clusters, frequent_beneficiaries
            FROM source_metrics WHERE source = $1 FOR UPDATE
            "#,
        )
        .bind(&delta.source)
        .fetch_one(&mut *tx)
        .await?;

        let total: i64 = row.try_get::<i64, _>("total_articles")? + delta.articles;
        let confirmed: i64 = row.try_get::<i64, _>("confirmed_articles")? + delta.confirmed;
        let accurate: i64 = row.try_get::<i64, _>("accurate_articles")? + delta.accurate;
        let false_count: i64 = row.try_get::<i64, _>("false_articles")? + delta.false_count;
        let mut early_sum: f64 = row.try_get("early_minutes_sum")?;
        let mut early_count: i64 = row.try_get("early_minutes_count")?;
        if let Some(sample) = delta.early_minutes_sample {
            early_sum += sample;
            early_count += 1;
        }
        let judged = accurate + false_count;
        let accuracy = if judged > 0 {
            accurate as f64 / judged as f64
        } else {
            0.0
        };

        let mut clusters = string_vec(row.try_get("top_clusters")?);
        if let Some(c) = &delta.cluster {
            if !clusters.contains(c) {
                clusters.push(c.clone());
            }
        }
        let mut beneficiaries = string_vec(row.try_get("frequent_beneficiaries")?);
        if let Some(b) = &delta.beneficiary {
            if !beneficiaries.contains(b) {
                beneficiaries.push(b.clone());
            }
        }

        sqlx::query(
            r#"
            UPDATE source_metrics
            SET total_articles = $2,
                confirmed_articles = $3,
                accurate_articles = $4,
                false_articles = $5,
                accuracy_rate = $6,
                early_minutes_sum = $7,
                early_minutes_count = $8,
                top_clusters = $9,
                frequent_beneficiaries = $10,
                updated_at = NOW()
            WHERE source = $1
            "#,
        )
        .bind(&delta.source)
        .bind(total)
        .bind(confirmed)
        .bind(accurate)
        .bind(false_count)
        .bind(accuracy)
        .bind(early_sum)
        .bind(early_count)
        .bind(serde_json::to_value(&clusters)?)
        .bind(serde_json::to_value(&beneficiaries)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn source_metrics(&self) -> Result<Vec<SourceMetrics>> {
        let rows = sqlx::query("SELECT * FROM source_metrics ORDER BY source")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let early_sum: f64 = row.try_get("early_minutes_sum")?;
                let early_count: i64 = row.try_get("early_minutes_count")?;
                Ok(SourceMetrics {
                    source: row.try_get("source")?,
                    tier: SourceTier::from_i16(row.try_get("tier")?),
                    total_articles: row.try_get("total_articles")?,
                    confirmed_articles: row.try_get("confirmed_articles")?,
                    accurate_articles: row.try_get("accurate_articles")?,
                    false_articles: row.try_get("false_articles")?,
                    accuracy_rate: row.try_get("accuracy_rate")?,
                    avg_early_minutes: (early_count > 0)
                        .then(|| early_sum / early_count as f64),
                    top_clusters: string_vec(row.try_get("top_clusters")?),
                    frequent_beneficiaries: string_vec(row.try_get("frequent_beneficiaries")?),
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn insert_narrative_cluster(&self, cluster: &NarrativeCluster) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO narrative_clusters (
                cluster_id, symbol, cluster_date, categories, article_count,
                distinct_sources, time_spread_minutes, coordination_score, detected_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (cluster_id) DO UPDATE SET
                article_count = EXCLUDED.article_count,
                distinct_sources = EXCLUDED.distinct_sources,
                time_spread_minutes = EXCLUDED.time_spread_minutes,
                coordination_score = EXCLUDED.coordination_score,
                detected_at = EXCLUDED.detected_at
            "#,
        )
        .bind(&cluster.cluster_id)
        .bind(&cluster.symbol)
        .bind(cluster.cluster_date)
        .bind(serde_json::to_value(&cluster.categories)?)
        .bind(cluster.article_count)
        .bind(cluster.distinct_sources)
        .bind(cluster.time_spread_minutes)
        .bind(cluster.coordination_score)
        .bind(cluster.detected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn narrative_clusters_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NarrativeCluster>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM narrative_clusters
            WHERE detected_at >= $1
            ORDER BY coordination_score DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(NarrativeCluster {
                    cluster_id: row.try_get("cluster_id")?,
                    symbol: row.try_get("symbol")?,
                    cluster_date: row.try_get("cluster_date")?,
                    categories: keyword_vec(row.try_get("categories")?),
                    article_count: row.try_get("article_count")?,
                    distinct_sources: row.try_get("distinct_sources")?,
                    time_spread_minutes: row.try_get("time_spread_minutes")?,
                    coordination_score: row.try_get("coordination_score")?,
                    detected_at: row.try_get("detected_at")?,
                })
            })
            .collect()
    }

    async fn trending_stories(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TrendingStory>> {
        let rows = sqlx::query(
            r#"
            SELECT
                cluster_id,
                (array_agg(symbol ORDER BY published_at DESC))[1] AS symbol,
                (array_agg(headline ORDER BY published_at DESC))[1] AS headline,
                COUNT(*)::BIGINT AS article_count,
                SUM(update_count)::BIGINT AS update_count,
                MIN(first_seen) AS first_seen,
                MAX(published_at) AS latest,
                BOOL_OR(is_breaking) AS has_breaking
            FROM news_raw
            WHERE cluster_id IS NOT NULL AND published_at >= $1
            GROUP BY cluster_id
            ORDER BY article_count DESC, update_count DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TrendingStory {
                    cluster_id: row.try_get("cluster_id")?,
                    symbol: row.try_get("symbol")?,
                    headline: row.try_get("headline")?,
                    article_count: row.try_get("article_count")?,
                    update_count: row.try_get::<Option<i64>, _>("update_count")?.unwrap_or(0),
                    first_seen: row.try_get("first_seen")?,
                    latest: row.try_get("latest")?,
                    has_breaking: row.try_get("has_breaking")?,
                })
            })
            .collect()
    }

    async fn record_collection_stats(&self, report: &CollectionReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO news_collection_stats
                (collected_at, mode, articles, new_articles, duplicates, dropped, per_source, errors)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(report.collected_at)
        .bind(report.mode.as_str())
        .bind(report.articles as i64)
        .bind(report.new as i64)
        .bind(report.duplicate as i64)
        .bind(report.dropped as i64)
        .bind(serde_json::to_value(&report.per_source)?)
        .bind(serde_json::to_value(&report.errors)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn collection_stats(&self, window_hours: i64) -> Result<CollectionStats> {
        let since = Utc::now() - chrono::Duration::hours(window_hours);
        let rows = sqlx::query(
            r#"
            SELECT articles, new_articles, duplicates, per_source
            FROM news_collection_stats
            WHERE collected_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = CollectionStats {
            window_hours,
            runs: 0,
            articles: 0,
            new: 0,
            duplicate: 0,
            per_source: HashMap::new(),
        };
        for row in rows {
            stats.runs += 1;
            stats.articles += row.try_get::<i64, _>("articles")?;
            stats.new += row.try_get::<i64, _>("new_articles")?;
            stats.duplicate += row.try_get::<i64, _>("duplicates")?;
            let per_source: HashMap<String, SourceCount> =
                serde_json::from_value(row.try_get("per_source")?).unwrap_or_default();
            for (source, count) in per_source {
                let agg = stats.per_source.entry(source).or_default();
                agg.fetched += count.fetched;
                agg.new += count.new;
                agg.duplicate += count.duplicate;
                agg.dropped += count.dropped;
                agg.errors += count.errors;
            }
        }
        Ok(stats)
    }

    async fn record_service_health(&self, record: &ServiceHealthRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO service_health (service, status, checked_at, response_time_ms, error)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.service)
        .bind(&record.status)
        .bind(record.checked_at)
        .bind(record.response_time_ms)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn closed_trades_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, news_id, symbol, opened_at, closed_at,
                   realized_pnl, realized_pnl_pct, outcome_applied
            FROM trade_records
            WHERE closed_at >= $1 AND outcome_applied = FALSE
            ORDER BY closed_at
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TradeRecord {
                    trade_id: row.try_get("trade_id")?,
                    news_id: row.try_get("news_id")?,
                    symbol: row.try_get("symbol")?,
                    opened_at: row.try_get("opened_at")?,
                    closed_at: row.try_get("closed_at")?,
                    realized_pnl: row.try_get("realized_pnl")?,
                    realized_pnl_pct: row.try_get("realized_pnl_pct")?,
                    outcome_applied: row.try_get("outcome_applied")?,
                })
            })
            .collect()
    }

    async fn mark_trade_outcome_applied(&self, trade_id: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE trade_records SET outcome_applied = TRUE WHERE trade_id = $1")
                .bind(trade_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CatalystError::NotFound(format!("trade {trade_id}")));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
