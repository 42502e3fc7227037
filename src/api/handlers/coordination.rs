//! Coordinator surface handlers (default port 5000).

use axum::extract::State;
use axum::Json;

use crate::api::state::AppState;
use crate::api::types::*;
use crate::domain::CollectionMode;
use crate::error::CatalystError;

const SERVICE: &str = "coordination";

fn parse_mode(mode: Option<&str>) -> Result<CollectionMode, CatalystError> {
    mode.map(str::parse)
        .transpose()
        .map(|m| m.unwrap_or(CollectionMode::Normal))
}

/// POST /start_trading_cycle
pub async fn start_trading_cycle(
    State(state): State<AppState>,
    body: Option<Json<StartCycleRequest>>,
) -> ApiResponse {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let mode =
        parse_mode(request.mode.as_deref()).map_err(|e| error_response(SERVICE, e))?;
    let cycle_id = state
        .coordinator
        .start_cycle(mode)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, StartCycleResponse { cycle_id }))
}

/// GET /current_cycle -- CycleView, or null when idle.
pub async fn current_cycle(State(state): State<AppState>) -> ApiResponse {
    let view = state.coordinator.current_cycle().await;
    Ok(ok_response(SERVICE, serde_json::json!({ "cycle": view })))
}

/// GET /service_health -- probe every collaborator now.
pub async fn service_health(State(state): State<AppState>) -> ApiResponse {
    let services = state.coordinator.service_health().await;
    Ok(ok_response(SERVICE, serde_json::json!({ "services": services })))
}

/// POST /workflow_config
pub async fn update_workflow_config(
    State(state): State<AppState>,
    Json(request): Json<WorkflowConfigRequest>,
) -> ApiResponse {
    let value = match &request.value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    state
        .coordinator
        .update_config(&request.key, &value, "operator")
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(
        SERVICE,
        serde_json::json!({ "updated": request.key }),
    ))
}

/// GET /workflow_config -- effective runtime-tunable values.
pub async fn get_workflow_config(State(state): State<AppState>) -> ApiResponse {
    let mut entries = serde_json::Map::new();
    for key in crate::config::RUNTIME_CONFIG_KEYS {
        let value = state
            .coordinator
            .read_config_value(key)
            .await
            .map_err(|e| error_response(SERVICE, e))?;
        entries.insert(
            key.to_string(),
            value.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
        );
    }
    Ok(ok_response(SERVICE, serde_json::json!({ "config": entries })))
}

/// POST /reload_config -- flush cached config so new values apply now.
pub async fn reload_config(State(state): State<AppState>) -> ApiResponse {
    state.coordinator.reload_config();
    Ok(ok_response(SERVICE, serde_json::json!({ "reloaded": true })))
}

/// POST /cancel_cycle
pub async fn cancel_cycle(
    State(state): State<AppState>,
    body: Option<Json<CancelCycleRequest>>,
) -> ApiResponse {
    let reason = body
        .and_then(|Json(r)| r.reason)
        .unwrap_or_else(|| "cancelled".to_string());
    let cycle_id = state
        .coordinator
        .cancel_cycle(&reason)
        .await
        .map_err(|e| error_response(SERVICE, e))?;
    Ok(ok_response(SERVICE, serde_json::json!({ "cancelled": cycle_id })))
}

/// GET /health -- liveness.
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

/// GET /metrics -- Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.prometheus(),
    )
}
