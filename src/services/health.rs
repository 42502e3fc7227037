//! Collaborator health monitoring.
//!
//! Probes each registered collaborator's health endpoint on a fixed interval,
//! keeps the latest status in memory for `GET /service_health`, and persists
//! probe outcomes for offline analysis.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::domain::ServiceHealthRecord;
use crate::persistence::Persistence;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
}

/// Probes collaborators and the persistence port.
pub struct HealthMonitor {
    http: reqwest::Client,
    store: Arc<dyn Persistence>,
    /// (name, full health URL)
    targets: Vec<(String, String)>,
    statuses: RwLock<HashMap<String, ComponentHealth>>,
}

impl HealthMonitor {
    pub fn new(
        http: reqwest::Client,
        store: Arc<dyn Persistence>,
        targets: Vec<(String, String)>,
    ) -> Self {
        Self {
            http,
            store,
            targets,
            statuses: RwLock::new(HashMap::new()),
        }
    }

    async fn probe_one(&self, name: &str, url: &str) -> ComponentHealth {
        let started = Instant::now();
        let result = tokio::time::timeout(PROBE_TIMEOUT, self.http.get(url).send()).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let (status, message) = match result {
            Ok(Ok(resp)) if resp.status().is_success() => (HealthStatus::Healthy, None),
            Ok(Ok(resp)) => (
                HealthStatus::Unhealthy,
                Some(format!("HTTP {}", resp.status())),
            ),
            Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
            Err(_) => (
                HealthStatus::Unhealthy,
                Some(format!("probe timed out after {}s", PROBE_TIMEOUT.as_secs())),
            ),
        };

        ComponentHealth {
            name: name.to_string(),
            status,
            message,
            last_check: Some(Utc::now()),
            response_time_ms: Some(elapsed_ms),
        }
    }

    /// Probe everything once and refresh the in-memory snapshot.
    pub async fn probe_all(&self) -> HashMap<String, ComponentHealth> {
        let mut results: Vec<ComponentHealth> = join_all(
            self.targets
                .iter()
                .map(|(name, url)| self.probe_one(name, url)),
        )
        .await;

        // The persistence port is probed directly, not over HTTP.
        let db_started = Instant::now();
        let db_health = match self.store.ping().await {
            Ok(()) => ComponentHealth {
                name: "persistence".to_string(),
                status: HealthStatus::Healthy,
                message: None,
                last_check: Some(Utc::now()),
                response_time_ms: Some(db_started.elapsed().as_millis() as i64),
            },
            Err(e) => ComponentHealth {
                name: "persistence".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
                last_check: Some(Utc::now()),
                response_time_ms: None,
            },
        };
        results.push(db_health);

        for health in &results {
            if !health.status.is_healthy() {
                warn!(
                    service = %health.name,
                    message = health.message.as_deref().unwrap_or(""),
                    "collaborator unhealthy"
                );
            }
            let record = ServiceHealthRecord {
                service: health.name.clone(),
                status: health.status.as_str().to_string(),
                checked_at: health.last_check.unwrap_or_else(Utc::now),
                response_time_ms: health.response_time_ms,
                error: health.message.clone(),
            };
            if let Err(e) = self.store.record_service_health(&record).await {
                debug!(error = %e, "failed to persist service health record");
            }
        }

        let map: HashMap<String, ComponentHealth> = results
            .into_iter()
            .map(|h| (h.name.clone(), h))
            .collect();
        *self.statuses.write().await = map.clone();
        map
    }

    /// Latest known statuses without probing.
    pub async fn snapshot(&self) -> HashMap<String, ComponentHealth> {
        self.statuses.read().await.clone()
    }

    /// True when the persistence port and every required collaborator are up.
    pub async fn all_required_healthy(&self) -> bool {
        let statuses = self.statuses.read().await;
        !statuses.is_empty() && statuses.values().all(|h| h.status.is_healthy())
    }

    /// Background probe loop; exits when `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "health monitor started");
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("health monitor stopping");
                        return;
                    }
                }
            }
        }
    }
}
