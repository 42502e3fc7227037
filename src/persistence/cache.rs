//! In-process TTL cache keyed by string, shared by the three components.
//!
//! Values are stored as JSON so heterogeneous records share one map. TTLs are
//! checked lazily on read; `purge_expired` exists for the periodic janitor.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

struct CacheEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

pub struct Cache {
    inner: DashMap<String, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.inner.get(key)?;
        if entry.expires_at <= Utc::now() {
            drop(entry);
            self.inner.remove(key);
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: std::time::Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(_) => return,
        };
        let expires_at = Utc::now()
            + Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(60));
        self.inner.insert(key.to_string(), CacheEntry { value, expires_at });
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.remove(key);
    }

    /// Remove every key starting with `prefix` (the `cacheInvalidatePattern`
    /// port operation; patterns are prefix-globs like `scan:`).
    pub fn invalidate_pattern(&self, prefix: &str) {
        self.inner.retain(|k, _| !k.starts_with(prefix));
    }

    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.inner.retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn set_get_round_trip() {
        let cache = Cache::new();
        cache.set("news:abc", &vec!["AAPL".to_string()], StdDuration::from_secs(60));
        let got: Option<Vec<String>> = cache.get("news:abc");
        assert_eq!(got, Some(vec!["AAPL".to_string()]));
    }

    #[test]
    fn expired_entries_are_invisible() {
        let cache = Cache::new();
        cache.set("k", &1u64, StdDuration::from_secs(0));
        let got: Option<u64> = cache.get("k");
        assert_eq!(got, None);
    }

    #[test]
    fn pattern_invalidation_is_prefix_scoped() {
        let cache = Cache::new();
        cache.set("scan:1", &1u64, StdDuration::from_secs(60));
        cache.set("scan:2", &2u64, StdDuration::from_secs(60));
        cache.set("config:min_price", &3u64, StdDuration::from_secs(60));
        cache.invalidate_pattern("scan:");
        assert_eq!(cache.get::<u64>("scan:1"), None);
        assert_eq!(cache.get::<u64>("scan:2"), None);
        assert_eq!(cache.get::<u64>("config:min_price"), Some(3));
    }
}
