//! Scanner surface handlers (default port 5001).

use axum::extract::{Query, State};
use axum::Json;

use crate::api::state::AppState;
use crate::api::types::*;
use crate::domain::CollectionMode;

const SERVICE: &str = "scanner";

/// GET /scan -- run a full scan in the given (or normal) mode.
pub async fn scan(State(state): State<AppState>, Query(query): Query<ScanQuery>) -> ApiResponse {
    let mode: CollectionMode = query
        .mode
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e| error_response(SERVICE, e))?
        .unwrap_or(CollectionMode::Normal);
    let result = state
        .scanner
        .scan(mode)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, result))
}

/// POST /scan_symbols -- scan a fixed symbol set.
pub async fn scan_symbols(
    State(state): State<AppState>,
    Json(request): Json<ScanSymbolsRequest>,
) -> ApiResponse {
    let result = state
        .scanner
        .scan_symbols(request.symbols)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, result))
}

/// GET /get_scan_results -- idempotent read of a past scan.
pub async fn get_scan_results(
    State(state): State<AppState>,
    Query(query): Query<ScanResultsQuery>,
) -> ApiResponse {
    let result = state
        .scanner
        .get_scan_results(query.scan_id)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, result))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResponse {
    Ok(ok_response(
        SERVICE,
        serde_json::json!({
            "healthy": true,
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.uptime_seconds(),
        }),
    ))
}
