pub mod health;
pub mod metrics;

pub use health::{ComponentHealth, HealthMonitor, HealthStatus};
pub use metrics::Metrics;
