//! News collector surface handlers (default port 5008).

use axum::extract::{Query, State};
use axum::Json;

use crate::api::state::AppState;
use crate::api::types::*;
use crate::domain::{CollectionMode, NewsOutcome, SourceTier};
use crate::error::CatalystError;
use crate::persistence::NewsFilter;

const SERVICE: &str = "news";

/// POST /collect_news -- trigger one collection run.
pub async fn collect_news(
    State(state): State<AppState>,
    body: Option<Json<CollectNewsRequest>>,
) -> ApiResponse {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mode: CollectionMode = request
        .mode
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e| error_response(SERVICE, e))?
        .unwrap_or(CollectionMode::Normal);
    let report = state
        .collector
        .collect(mode)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, report))
}

/// GET /search_news
pub async fn search_news(
    State(state): State<AppState>,
    Query(query): Query<SearchNewsQuery>,
) -> ApiResponse {
    if let Some(tier) = query.min_tier {
        if !(1..=5).contains(&tier) {
            return Err(error_response(
                SERVICE,
                CatalystError::Validation(format!("min_tier must be 1..=5, got {tier}")),
            ));
        }
    }
    let filter = NewsFilter {
        symbol: query.symbol,
        since: query.since,
        until: query.until,
        max_tier: query.min_tier.map(SourceTier::from_i16),
        unconfirmed_only: false,
        limit: query.limit,
    };
    let items = state
        .collector
        .search(&filter)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(
        SERVICE,
        serde_json::json!({ "count": items.len(), "results": items }),
    ))
}

/// GET /trending_news -- stories sorted by cluster size.
pub async fn trending_news(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> ApiResponse {
    let stories = state
        .collector
        .trending(query.window_h.unwrap_or(4), query.limit.unwrap_or(20))
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(
        SERVICE,
        serde_json::json!({ "count": stories.len(), "trending": stories }),
    ))
}

/// POST /update_outcome
pub async fn update_outcome(
    State(state): State<AppState>,
    Json(request): Json<UpdateOutcomeRequest>,
) -> ApiResponse {
    let outcome = NewsOutcome {
        price_move_1h: request.price_move_1h,
        price_move_24h: request.price_move_24h,
        volume_surge_ratio: request.volume_surge_ratio,
        was_accurate: request.was_accurate,
    };
    state
        .collector
        .update_outcome(&request.news_id, &outcome)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, serde_json::json!({ "ok": true })))
}

/// GET /source_analysis -- per-source reliability metrics.
pub async fn source_analysis(State(state): State<AppState>) -> ApiResponse {
    let sources = state
        .collector
        .source_analysis()
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, serde_json::json!({ "sources": sources })))
}

/// GET /coordinated_narratives
pub async fn coordinated_narratives(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> ApiResponse {
    let clusters = state
        .collector
        .coordinated_narratives(query.hours.unwrap_or(24))
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(
        SERVICE,
        serde_json::json!({ "count": clusters.len(), "narratives": clusters }),
    ))
}

/// GET /news_stats -- collection rollup over a trailing window.
pub async fn news_stats(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> ApiResponse {
    let stats = state
        .collector
        .stats(query.hours.unwrap_or(24))
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, stats))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResponse {
    Ok(ok_response(
        SERVICE,
        serde_json::json!({
            "healthy": true,
            "version": env!("CARGO_PKG_VERSION"),
            "sources": state.collector.source_count(),
            "uptime_seconds": state.uptime_seconds(),
        }),
    ))
}
