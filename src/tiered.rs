//! Two-tier cache manager: process-local tier + one remote backend
//!
//! The default cache for the rest of the platform. Repeated reads are
//! served from a bounded in-process map; misses fall through to the
//! backend and populate the local tier. Writes go through to the backend
//! first, so the local tier never holds data the backend lost. Backend
//! errors degrade to misses rather than propagating.

use crate::backend::{glob_match, Backend};
use crate::stats::{CacheStats, StatsSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug)]
struct LocalEntry {
    payload: String,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Bounded local store with insertion-order eviction: when inserting
/// would exceed the cap, the single oldest-inserted entry is dropped.
#[derive(Debug, Default)]
struct LocalStore {
    entries: HashMap<String, LocalEntry>,
    order: VecDeque<String>,
}

impl LocalStore {
    fn insert(&mut self, key: &str, payload: String, ttl_seconds: u64, max_size: usize) {
        let expires_at = if ttl_seconds > 0 {
            Some(Instant::now() + Duration::from_secs(ttl_seconds))
        } else {
            None
        };

        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
        while self.entries.len() >= max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.entries.insert(key.to_string(), LocalEntry { payload, expires_at });
        self.order.push_back(key.to_string());
    }

    /// Returns the payload if present and unexpired; expired entries are
    /// evicted on the spot.
    fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                self.entries.remove(key);
                self.order.retain(|k| k != key);
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.order.retain(|k| k != key);
        }
        removed
    }

    fn remove_pattern(&mut self, pattern: &str) -> usize {
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        for key in &matching {
            self.entries.remove(key);
        }
        self.order.retain(|k| !matching.contains(k));
        matching.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Outcome of the backend round-trip self-test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub stats: StatsSnapshot,
    pub backend: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Two-tier cache: local bounded map in front of a single backend.
pub struct TieredCacheManager {
    backend: Option<Arc<dyn Backend>>,
    local: RwLock<LocalStore>,
    max_size: usize,
    /// TTL used when the local tier is populated from a backend read
    default_ttl_seconds: u64,
    stats: Arc<CacheStats>,
}

impl TieredCacheManager {
    pub fn new(backend: Option<Arc<dyn Backend>>, max_size: usize, default_ttl_seconds: u64) -> Self {
        Self {
            backend,
            local: RwLock::new(LocalStore::default()),
            max_size,
            default_ttl_seconds,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Fetch a value: local tier first, then the backend. A backend error
    /// is a miss, never a caller-visible failure.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let start = Instant::now();
        self.stats.record_request();

        {
            let mut local = self.local.write().await;
            if let Some(payload) = local.get(key) {
                drop(local);
                if let Ok(value) = serde_json::from_str(&payload) {
                    self.stats.record_hit();
                    self.stats.observe_response_time(start.elapsed());
                    return Some(value);
                }
            }
        }

        let backend = match &self.backend {
            Some(backend) => backend,
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        match backend.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    self.local.write().await.insert(
                        key,
                        payload,
                        self.default_ttl_seconds,
                        self.max_size,
                    );
                    self.stats.record_hit();
                    self.stats.observe_response_time(start.elapsed());
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "malformed payload from backend");
                    self.stats.record_miss();
                    self.stats.observe_response_time(start.elapsed());
                    None
                }
            },
            Ok(None) => {
                self.stats.record_miss();
                self.stats.observe_response_time(start.elapsed());
                None
            }
            Err(e) => {
                warn!(key, error = %e, "backend read failed, treating as miss");
                self.stats.record_miss();
                self.stats.observe_response_time(start.elapsed());
                None
            }
        }
    }

    /// Write-through set: the backend is written first; the local tier is
    /// only populated once the backend accepted the value. Without a
    /// backend the operation fails and nothing is cached.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_seconds: u64) -> bool {
        let backend = match &self.backend {
            Some(backend) => backend,
            None => {
                warn!(key, "no backend configured, write rejected");
                return false;
            }
        };

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "value is not JSON-encodable, write rejected");
                return false;
            }
        };

        match backend.set(key, &payload, ttl_seconds).await {
            Ok(()) => {
                self.local
                    .write()
                    .await
                    .insert(key, payload, ttl_seconds, self.max_size);
                debug!(key, ttl_seconds, "write-through set complete");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "backend write failed");
                false
            }
        }
    }

    /// Remove a key from both tiers.
    pub async fn delete(&self, key: &str) -> bool {
        let local_removed = self.local.write().await.remove(key);

        match &self.backend {
            Some(backend) => match backend.delete(key).await {
                Ok(count) => local_removed || count > 0,
                Err(e) => {
                    warn!(key, error = %e, "backend delete failed");
                    local_removed
                }
            },
            None => local_removed,
        }
    }

    /// Remove every key matching a glob pattern from both tiers. The
    /// backend's native pattern matching does the remote half.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let local_removed = self.local.write().await.remove_pattern(pattern) as u64;

        match &self.backend {
            Some(backend) => match backend.delete_pattern(pattern).await {
                Ok(count) => count.max(local_removed),
                Err(e) => {
                    warn!(pattern, error = %e, "backend pattern delete failed");
                    local_removed
                }
            },
            None => local_removed,
        }
    }

    /// Round-trip self-test: set a probe key, read it back, delete it.
    /// Healthy only when all three steps succeed.
    pub async fn health_check(&self) -> HealthReport {
        let stats = self.stats.snapshot(0, 0);

        let backend = match &self.backend {
            Some(backend) => backend,
            None => {
                return HealthReport {
                    status: HealthState::Unhealthy,
                    reason: Some("no backend configured".to_string()),
                    stats,
                    backend: "none".to_string(),
                }
            }
        };

        let probe_key = format!("__cache_probe__:{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));
        let verdict = async {
            backend
                .set(&probe_key, "\"ok\"", 10)
                .await
                .map_err(|e| format!("probe set failed: {}", e))?;
            match backend.get(&probe_key).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err("probe key missing after set".to_string()),
                Err(e) => return Err(format!("probe get failed: {}", e)),
            }
            backend
                .delete(&probe_key)
                .await
                .map_err(|e| format!("probe delete failed: {}", e))?;
            Ok::<(), String>(())
        }
        .await;

        match verdict {
            Ok(()) => HealthReport {
                status: HealthState::Healthy,
                reason: None,
                stats,
                backend: backend.describe(),
            },
            Err(reason) => HealthReport {
                status: HealthState::Unhealthy,
                reason: Some(reason),
                stats,
                backend: backend.describe(),
            },
        }
    }

    /// Empty the local tier and reset all counters. Backend data is left
    /// alone: it may be shared with other processes.
    pub async fn clear_all(&self) {
        self.local.write().await.clear();
        self.stats.reset();
    }

    /// Number of entries currently in the local tier.
    pub async fn local_len(&self) -> usize {
        self.local.read().await.len()
    }

    /// Whether the local tier currently holds a key (expired or not).
    pub async fn local_contains(&self, key: &str) -> bool {
        self.local.read().await.contains(key)
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn tiered(max_size: usize) -> TieredCacheManager {
        TieredCacheManager::new(Some(Arc::new(MemoryBackend::new())), max_size, 300)
    }

    #[tokio::test]
    async fn test_insertion_order_eviction() {
        let cache = tiered(3);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            assert!(cache.set(key, &serde_json::json!(i), 0).await);
        }

        // the single oldest entry was evicted, the rest remain
        assert_eq!(cache.local_len().await, 3);
        assert!(!cache.local_contains("a").await);
        for key in ["b", "c", "d"] {
            assert!(cache.local_contains(key).await);
        }
    }

    #[tokio::test]
    async fn test_no_backend_rejects_writes() {
        let cache = TieredCacheManager::new(None, 10, 300);
        assert!(!cache.set("k", &serde_json::json!(1), 60).await);
        assert_eq!(cache.local_len().await, 0);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_local_entry_falls_through() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = TieredCacheManager::new(Some(backend.clone()), 10, 300);

        assert!(cache.set("k", &serde_json::json!("v"), 5).await);
        tokio::time::advance(Duration::from_secs(6)).await;

        // local and backend copies both expired
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.local_contains("k").await);
    }

    #[tokio::test]
    async fn test_backend_hit_populates_local() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("warm", "\"data\"", 0).await.unwrap();

        let cache = TieredCacheManager::new(Some(backend), 10, 300);
        assert_eq!(cache.get("warm").await, Some(serde_json::json!("data")));
        assert!(cache.local_contains("warm").await);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let cache = tiered(10);
        cache.set("k", &serde_json::json!(1), 0).await;
        cache.get("k").await;

        cache.clear_all().await;
        assert_eq!(cache.local_len().await, 0);
        let stats = cache.stats().snapshot(0, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.cache_hits, 0);
    }

    #[tokio::test]
    async fn test_health_check_round_trip() {
        let cache = tiered(10);
        let report = cache.health_check().await;
        assert_eq!(report.status, HealthState::Healthy);
        assert_eq!(report.backend, "memory");

        let no_backend = TieredCacheManager::new(None, 10, 300);
        let report = no_backend.health_check().await;
        assert_eq!(report.status, HealthState::Unhealthy);
        assert!(report.reason.unwrap().contains("no backend"));
    }
}
