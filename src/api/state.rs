use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::collector::NewsCollector;
use crate::coordinator::CycleCoordinator;
use crate::scanner::CatalystScanner;
use crate::services::Metrics;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<CycleCoordinator>,
    pub collector: Arc<NewsCollector>,
    pub scanner: Arc<CatalystScanner>,
    pub metrics: Arc<Metrics>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<CycleCoordinator>,
        collector: Arc<NewsCollector>,
        scanner: Arc<CatalystScanner>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            coordinator,
            collector,
            scanner,
            metrics,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
