//! Wire types and the shared response envelope for the three HTTP surfaces.
//!
//! Every success body carries `{status, service, timestamp}` alongside the
//! payload; errors are `{status: "error", service, code, message, timestamp}`
//! with the status code derived from the error kind.

use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalystError;

pub type ApiResponse = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Wrap a payload in the standard envelope. Object payloads are flattened;
/// arrays and scalars land under `data`.
pub fn ok_response(service: &str, payload: impl Serialize) -> Json<Value> {
    let body = serde_json::to_value(payload).unwrap_or(Value::Null);
    let mut map = match body {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    map.insert("status".to_string(), Value::String("ok".to_string()));
    map.insert("service".to_string(), Value::String(service.to_string()));
    map.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    Json(Value::Object(map))
}

pub fn error_response(service: &str, e: CatalystError) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "service": service,
            "code": e.code(),
            "message": e.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

// ---- coordinator ----

#[derive(Debug, Default, Deserialize)]
pub struct StartCycleRequest {
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartCycleResponse {
    pub cycle_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowConfigRequest {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelCycleRequest {
    pub reason: Option<String>,
}

// ---- news ----

#[derive(Debug, Default, Deserialize)]
pub struct CollectNewsRequest {
    pub mode: Option<String>,
    /// Accepted for API compatibility; source selection follows the mode.
    #[serde(default)]
    pub sources: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SearchNewsQuery {
    pub symbol: Option<String>,
    pub since: Option<chrono::DateTime<Utc>>,
    pub until: Option<chrono::DateTime<Utc>>,
    pub min_tier: Option<i16>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub window_h: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOutcomeRequest {
    pub news_id: String,
    pub price_move_1h: f64,
    pub price_move_24h: f64,
    pub volume_surge_ratio: f64,
    pub was_accurate: bool,
}

// ---- scanner ----

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanSymbolsRequest {
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanResultsQuery {
    pub scan_id: uuid::Uuid,
}
