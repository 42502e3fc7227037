//! Runtime-tunable settings backed by the trading_config table.
//!
//! Readers go through the TTL cache, so a write is visible everywhere within
//! one config-cache TTL. Writes go through the coordinator's updateConfig
//! only, which invalidates the cached copy immediately.

use std::sync::Arc;
use std::time::Duration;

use super::{Cache, Persistence};
use crate::config::is_runtime_config_key;
use crate::error::{CatalystError, Result};

const CONFIG_CACHE_PREFIX: &str = "config:";

pub struct RuntimeSettings {
    store: Arc<dyn Persistence>,
    cache: Arc<Cache>,
    ttl: Duration,
}

impl RuntimeSettings {
    pub fn new(store: Arc<dyn Persistence>, cache: Arc<Cache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let cache_key = format!("{CONFIG_CACHE_PREFIX}{key}");
        if let Some(v) = self.cache.get::<String>(&cache_key) {
            return Ok(Some(v));
        }
        let value = self.store.read_config(key).await?;
        if let Some(ref v) = value {
            self.cache.set(&cache_key, v, self.ttl);
        }
        Ok(value)
    }

    pub async fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get_raw(key).await? {
            Some(v) => v.parse().map_err(|_| {
                CatalystError::Internal(format!("config {key} is not a number: {v}"))
            }),
            None => Ok(default),
        }
    }

    pub async fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_raw(key).await? {
            Some(v) => v.parse().map_err(|_| {
                CatalystError::Internal(format!("config {key} is not an integer: {v}"))
            }),
            None => Ok(default),
        }
    }

    pub async fn get_str(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get_raw(key).await?.unwrap_or_else(|| default.to_string()))
    }

    /// Raw stored value, if the key has ever been written.
    pub async fn get_opt(&self, key: &str) -> Result<Option<String>> {
        self.get_raw(key).await
    }

    /// Transactional write + immediate cache invalidation. Unknown keys are
    /// rejected before touching the store.
    pub async fn set(&self, key: &str, value: &str, modified_by: &str) -> Result<()> {
        if !is_runtime_config_key(key) {
            return Err(CatalystError::Validation(format!(
                "unrecognized configuration key: {key}"
            )));
        }
        self.store.write_config(key, value, modified_by).await?;
        self.cache.invalidate(&format!("{CONFIG_CACHE_PREFIX}{key}"));
        Ok(())
    }

    /// Drop every cached config value, forcing re-reads (operator reload).
    pub fn reload(&self) {
        self.cache.invalidate_pattern(CONFIG_CACHE_PREFIX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn settings() -> RuntimeSettings {
        RuntimeSettings::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Cache::new()),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn defaults_apply_when_unset() {
        let s = settings();
        assert_eq!(s.get_f64("min_catalyst_score", 30.0).await.unwrap(), 30.0);
        assert_eq!(s.get_i64("min_volume", 500_000).await.unwrap(), 500_000);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let s = settings();
        s.set("min_catalyst_score", "22.5", "operator").await.unwrap();
        assert_eq!(s.get_f64("min_catalyst_score", 30.0).await.unwrap(), 22.5);
    }

    #[tokio::test]
    async fn unknown_keys_are_rejected() {
        let s = settings();
        let err = s.set("favorite_color", "blue", "operator").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
