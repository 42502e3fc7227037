pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

pub use routes::{coordination_router, news_router, scanner_router};
pub use state::AppState;
