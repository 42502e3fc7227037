//! Coordinated-narrative detection.
//!
//! Groups the last 24 h of articles by content-derived cluster id and flags
//! clusters where several sources pushed the same story in a short span.
//! Surfaced for reporting only; no automatic action is taken.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::domain::{NarrativeCluster, NewsItem};
use crate::persistence::{NewsFilter, Persistence};
use crate::error::Result;

const LOOKBACK_HOURS: i64 = 24;
const MIN_ARTICLES: usize = 4;
const MIN_SOURCES: usize = 3;
const MAX_SPREAD_MINUTES: i64 = 120;

/// One detection pass. Returns the clusters that crossed the thresholds.
pub async fn detect_narratives(
    store: &Arc<dyn Persistence>,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<Vec<NarrativeCluster>> {
    let items = store
        .read_news_range(&NewsFilter {
            since: Some(now - Duration::hours(LOOKBACK_HOURS)),
            limit: Some(5000),
            ..Default::default()
        })
        .await?;

    let mut by_cluster: HashMap<String, Vec<&NewsItem>> = HashMap::new();
    for item in &items {
        if let Some(id) = &item.cluster_id {
            by_cluster.entry(id.clone()).or_default().push(item);
        }
    }

    let mut detected = Vec::new();
    for (cluster_id, members) in by_cluster {
        if members.len() < MIN_ARTICLES {
            continue;
        }
        let mut sources: Vec<&str> = members.iter().map(|m| m.source.as_str()).collect();
        sources.sort();
        sources.dedup();
        if sources.len() < MIN_SOURCES {
            continue;
        }

        let earliest = members.iter().map(|m| m.published_at).min().unwrap_or(now);
        let latest = members.iter().map(|m| m.published_at).max().unwrap_or(now);
        let spread_minutes = (latest - earliest).num_minutes();
        if spread_minutes >= MAX_SPREAD_MINUTES {
            continue;
        }

        let mut categories = Vec::new();
        for m in &members {
            for k in &m.keywords {
                if !categories.contains(k) {
                    categories.push(*k);
                }
            }
        }
        categories.sort();

        let cluster = NarrativeCluster {
            cluster_id: cluster_id.clone(),
            symbol: members
                .iter()
                .find_map(|m| m.symbol.clone())
                .unwrap_or_default(),
            cluster_date: earliest.with_timezone(&tz).date_naive(),
            categories,
            article_count: members.len() as i64,
            distinct_sources: sources.len() as i64,
            time_spread_minutes: spread_minutes,
            coordination_score: NarrativeCluster::score(
                sources.len() as i64,
                members.len() as i64,
                spread_minutes,
            ),
            detected_at: now,
        };

        info!(
            cluster_id = %cluster.cluster_id,
            symbol = %cluster.symbol,
            articles = cluster.article_count,
            sources = cluster.distinct_sources,
            score = cluster.coordination_score,
            "coordinated narrative detected"
        );
        store.insert_narrative_cluster(&cluster).await?;
        detected.push(cluster);
    }

    detected.sort_by(|a, b| {
        b.coordination_score
            .partial_cmp(&a.coordination_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(detected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::normalize::Normalizer;
    use crate::config::{NewsConfig, ScheduleConfig};
    use crate::domain::RawArticle;
    use crate::persistence::MemoryStore;
    use std::collections::HashMap as StdHashMap;

    async fn seed(store: &Arc<dyn Persistence>, n: &Normalizer, source: &str, minute: u32) {
        let raw = RawArticle {
            symbol: Some("GME".into()),
            headline: format!("GME short squeeze brewing says {source}"),
            source: source.to_string(),
            source_url: None,
            published_at: format!("2025-01-15T14:{minute:02}:00Z").parse().unwrap(),
            snippet: None,
            metadata: StdHashMap::new(),
        };
        store
            .upsert_news_item(&n.normalize(&raw, Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dense_multi_source_cluster_is_detected() {
        let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
        let n = Normalizer::new(&NewsConfig::default(), &ScheduleConfig::default()).unwrap();

        for (source, minute) in [("blog_a", 0), ("blog_b", 10), ("blog_c", 20), ("blog_d", 30)] {
            seed(&store, &n, source, minute).await;
        }

        let now = "2025-01-15T15:00:00Z".parse().unwrap();
        let detected = detect_narratives(&store, chrono_tz::US::Eastern, now)
            .await
            .unwrap();
        assert_eq!(detected.len(), 1);
        let cluster = &detected[0];
        assert_eq!(cluster.article_count, 4);
        assert_eq!(cluster.distinct_sources, 4);
        assert_eq!(cluster.time_spread_minutes, 30);
        // 20*4 + 10*4 - 5*0.5 = 117.5 -> capped at 100.
        assert_eq!(cluster.coordination_score, 100.0);

        let persisted = store
            .narrative_clusters_since(now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn few_sources_do_not_trigger() {
        let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
        let n = Normalizer::new(&NewsConfig::default(), &ScheduleConfig::default()).unwrap();

        // Four articles but only two distinct sources.
        for (source, minute) in [("blog_a", 0), ("blog_a", 10), ("blog_b", 20), ("blog_b", 30)] {
            seed(&store, &n, source, minute).await;
        }

        let now = "2025-01-15T15:00:00Z".parse().unwrap();
        let detected = detect_narratives(&store, chrono_tz::US::Eastern, now)
            .await
            .unwrap();
        assert!(detected.is_empty());
    }
}
