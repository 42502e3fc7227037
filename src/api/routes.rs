use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Coordinator surface (default port 5000).
pub fn coordination_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/start_trading_cycle",
            post(handlers::coordination::start_trading_cycle),
        )
        .route("/current_cycle", get(handlers::coordination::current_cycle))
        .route("/cancel_cycle", post(handlers::coordination::cancel_cycle))
        .route("/service_health", get(handlers::coordination::service_health))
        .route(
            "/workflow_config",
            get(handlers::coordination::get_workflow_config)
                .post(handlers::coordination::update_workflow_config),
        )
        .route("/reload_config", post(handlers::coordination::reload_config))
        .route("/health", get(handlers::coordination::health))
        .route("/metrics", get(handlers::coordination::metrics))
        .with_state(state)
        .layer(cors())
}

/// News collector surface (default port 5008).
pub fn news_router(state: AppState) -> Router {
    Router::new()
        .route("/collect_news", post(handlers::news::collect_news))
        .route("/search_news", get(handlers::news::search_news))
        .route("/trending_news", get(handlers::news::trending_news))
        .route("/update_outcome", post(handlers::news::update_outcome))
        .route("/source_analysis", get(handlers::news::source_analysis))
        .route(
            "/coordinated_narratives",
            get(handlers::news::coordinated_narratives),
        )
        .route("/news_stats", get(handlers::news::news_stats))
        .route("/health", get(handlers::news::health))
        .with_state(state)
        .layer(cors())
}

/// Scanner surface (default port 5001).
pub fn scanner_router(state: AppState) -> Router {
    Router::new()
        .route("/scan", get(handlers::scanner::scan))
        .route("/scan_symbols", post(handlers::scanner::scan_symbols))
        .route("/get_scan_results", get(handlers::scanner::get_scan_results))
        .route("/health", get(handlers::scanner::health))
        .with_state(state)
        .layer(cors())
}
