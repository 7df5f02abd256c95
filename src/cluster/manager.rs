//! Distributed cache orchestration
//!
//! The manager owns the public get/set/delete surface. Keys resolve to an
//! ordered candidate list via the ring; writes fan out to
//! `replication_factor` nodes, reads follow the configured read
//! preference, and every node-level failure is reported to the health
//! monitor without aborting the surrounding operation. Backend failures
//! never escape this layer: callers see a miss or a `false`.

use crate::backend::BackendConnector;
use crate::cluster::{CacheNode, ClusterState, NodeHealthMonitor};
use crate::config::{CacheConfig, ClusterConfig, ConsistencyLevel, ReadPreference};
use crate::error::CacheError;
use crate::stats::{CacheStats, StatsSnapshot};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Replicating cache manager backed by the consistent hash ring.
pub struct DistributedCacheManager {
    config: ClusterConfig,
    state: Arc<ClusterState>,
    stats: Arc<CacheStats>,
    monitor: NodeHealthMonitor,
    connector: Arc<dyn BackendConnector>,
    /// Serializes membership changes; ring readers are unaffected.
    admin_lock: Mutex<()>,
}

impl DistributedCacheManager {
    /// Construct a manager with an explicit backend connector. Call
    /// `initialize` to start background health monitoring.
    pub fn new(config: ClusterConfig, connector: Arc<dyn BackendConnector>) -> Self {
        let state = Arc::new(ClusterState::new(config.virtual_nodes));
        let stats = Arc::new(CacheStats::new());
        let monitor = NodeHealthMonitor::new(
            state.clone(),
            stats.clone(),
            config.health_check_duration(),
            config.request_timeout(),
            config.recovery_duration(),
        );

        Self {
            config,
            state,
            stats,
            monitor,
            connector,
            admin_lock: Mutex::new(()),
        }
    }

    /// Construct from a full configuration, selecting the backend
    /// implementation the config names.
    pub fn from_config(config: &CacheConfig) -> Self {
        let connector = crate::backend::connector_for(&config.backend);
        Self::new(config.cluster.clone(), connector)
    }

    /// Start background health monitoring.
    pub async fn initialize(&self) {
        self.monitor.start().await;
        info!(
            replication_factor = self.config.replication_factor,
            virtual_nodes = self.config.virtual_nodes,
            "distributed cache manager initialized"
        );
    }

    /// Stop background tasks. In-flight operations complete normally.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
        info!("distributed cache manager shut down");
    }

    /// Register a node and add it to the ring. The target backend must
    /// answer a ping before the node is inserted.
    pub async fn add_node(
        &self,
        node_id: &str,
        host: &str,
        port: u16,
        weight: u32,
    ) -> Result<(), CacheError> {
        let _guard = self.admin_lock.lock().await;

        if self.state.nodes.read().await.contains_key(node_id) {
            return Err(CacheError::AlreadyExists(node_id.to_string()));
        }

        let backend = self
            .connector
            .connect(host, port)
            .await
            .map_err(|source| CacheError::NodeUnreachable {
                node_id: node_id.to_string(),
                addr: format!("{}:{}", host, port),
                source,
            })?;

        match tokio::time::timeout(self.config.request_timeout(), backend.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(CacheError::NodeUnreachable {
                    node_id: node_id.to_string(),
                    addr: format!("{}:{}", host, port),
                    source,
                })
            }
            Err(_) => {
                return Err(CacheError::NodeUnreachable {
                    node_id: node_id.to_string(),
                    addr: format!("{}:{}", host, port),
                    source: crate::error::BackendError::Timeout(self.config.request_timeout()),
                })
            }
        }

        let node = CacheNode::new(node_id, host, port, weight)
            .with_max_failures(self.config.max_failures);

        // node table and connection first, ring last: a ring entry never
        // points at a node the table does not know
        self.state
            .nodes
            .write()
            .await
            .insert(node_id.to_string(), Arc::new(tokio::sync::RwLock::new(node.clone())));
        self.state
            .backends
            .write()
            .await
            .insert(node_id.to_string(), backend);
        self.state.ring.write().await.add_node(&node);

        self.monitor.refresh_gauges().await;
        info!(node_id, host, port, weight, "node added to cluster");
        Ok(())
    }

    /// Remove a node from the ring and node table, cancelling any pending
    /// recovery task. Operations already holding the node's connection
    /// finish undisturbed.
    pub async fn remove_node(&self, node_id: &str) -> Result<(), CacheError> {
        let _guard = self.admin_lock.lock().await;

        self.state.ring.write().await.remove_node(node_id);
        let removed = self.state.nodes.write().await.remove(node_id);
        self.state.backends.write().await.remove(node_id);
        self.monitor.cancel_recovery(node_id).await;

        if removed.is_none() {
            return Err(CacheError::NoSuchNode(node_id.to_string()));
        }

        self.monitor.refresh_gauges().await;
        info!(node_id, "node removed from cluster");
        Ok(())
    }

    /// Write a value to the key's replica set. Succeeds when enough
    /// replica writes land; individual failures are reported to the
    /// health monitor but never abort the fan-out.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_seconds: u64) -> bool {
        let start = Instant::now();

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "value is not JSON-encodable, write rejected");
                return false;
            }
        };

        let candidates = self
            .state
            .candidates(key, self.config.replication_factor)
            .await;
        if candidates.is_empty() {
            warn!(key, "no candidate nodes available for write");
            return false;
        }

        let mut targets = Vec::with_capacity(candidates.len());
        for node_id in &candidates {
            if let Some(backend) = self.state.backend(node_id).await {
                targets.push((node_id.clone(), backend));
            }
        }
        let target_count = targets.len();
        let timeout = self.config.request_timeout();

        let payload_ref = &payload;
        let writes = targets.into_iter().map(|(node_id, backend)| async move {
            let result =
                match tokio::time::timeout(timeout, backend.set(key, payload_ref, ttl_seconds))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(crate::error::BackendError::Timeout(timeout)),
                };
            (node_id, result)
        });

        let mut successes = 0usize;
        for (node_id, result) in join_all(writes).await {
            match result {
                Ok(()) => {
                    successes += 1;
                    self.stats.record_replication();
                }
                Err(e) => {
                    warn!(node_id = %node_id, key, error = %e, "replica write failed");
                    self.monitor.report_failure(&node_id).await;
                }
            }
        }

        let required = match self.config.consistency_level {
            ConsistencyLevel::Strong => target_count,
            ConsistencyLevel::Eventual => 1,
        };

        self.stats.observe_response_time(start.elapsed());
        debug!(key, successes, required, "replicated write finished");
        successes > 0 && successes >= required
    }

    /// Read a value following the configured read preference. Under
    /// `master` a primary failure is a miss; under `any` the read falls
    /// through to the next candidate.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let start = Instant::now();
        self.stats.record_request();

        let candidates = self
            .state
            .candidates(key, self.config.replication_factor)
            .await;
        let query: Vec<String> = match self.config.read_preference {
            ReadPreference::Master | ReadPreference::Nearest => {
                candidates.into_iter().take(1).collect()
            }
            ReadPreference::Any => candidates,
        };

        for node_id in &query {
            let backend = match self.state.backend(node_id).await {
                Some(backend) => backend,
                None => continue,
            };

            let result = match tokio::time::timeout(self.config.request_timeout(), backend.get(key))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(crate::error::BackendError::Timeout(
                    self.config.request_timeout(),
                )),
            };

            match result {
                Ok(Some(payload)) => match serde_json::from_str(&payload) {
                    Ok(value) => {
                        self.stats.record_hit();
                        self.stats.observe_response_time(start.elapsed());
                        return Some(value);
                    }
                    Err(e) => {
                        warn!(node_id = %node_id, key, error = %e, "malformed payload from node");
                        self.monitor.report_failure(node_id).await;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    if e.is_protocol() {
                        warn!(node_id = %node_id, key, error = %e, "protocol error on read");
                    } else {
                        warn!(node_id = %node_id, key, error = %e, "read failed");
                    }
                    self.monitor.report_failure(node_id).await;
                }
            }
        }

        self.stats.record_miss();
        self.stats.observe_response_time(start.elapsed());
        None
    }

    /// Delete a key from every candidate node. Succeeds when at least one
    /// node acknowledges the delete.
    pub async fn delete(&self, key: &str) -> bool {
        let start = Instant::now();

        let candidates = self
            .state
            .candidates(key, self.config.replication_factor)
            .await;
        if candidates.is_empty() {
            return false;
        }

        let mut targets = Vec::with_capacity(candidates.len());
        for node_id in &candidates {
            if let Some(backend) = self.state.backend(node_id).await {
                targets.push((node_id.clone(), backend));
            }
        }
        let timeout = self.config.request_timeout();

        let deletes = targets.into_iter().map(|(node_id, backend)| async move {
            let result = match tokio::time::timeout(timeout, backend.delete(key)).await {
                Ok(result) => result,
                Err(_) => Err(crate::error::BackendError::Timeout(timeout)),
            };
            (node_id, result)
        });

        let mut acknowledged = false;
        for (node_id, result) in join_all(deletes).await {
            match result {
                Ok(_) => acknowledged = true,
                Err(e) => {
                    warn!(node_id = %node_id, key, error = %e, "replica delete failed");
                    self.monitor.report_failure(&node_id).await;
                }
            }
        }

        self.stats.observe_response_time(start.elapsed());
        acknowledged
    }

    /// Ordered candidate nodes the ring currently assigns to a key.
    pub async fn candidate_nodes(&self, key: &str) -> Vec<String> {
        self.state
            .candidates(key, self.config.replication_factor)
            .await
    }

    /// Point-in-time statistics snapshot.
    pub async fn get_cache_statistics(&self) -> StatsSnapshot {
        self.monitor.refresh_gauges().await;
        self.stats
            .snapshot(self.config.replication_factor, self.config.virtual_nodes)
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    /// Health monitor handle, for operators driving probes directly.
    pub fn monitor(&self) -> &NodeHealthMonitor {
        &self.monitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryConnector;
    use crate::config::ClusterConfig;

    fn manager() -> DistributedCacheManager {
        DistributedCacheManager::new(ClusterConfig::default(), Arc::new(MemoryConnector))
    }

    #[tokio::test]
    async fn test_set_get_delete_round_trip() {
        let cache = manager();
        cache.add_node("n1", "127.0.0.1", 7001, 1).await.unwrap();
        cache.add_node("n2", "127.0.0.1", 7002, 1).await.unwrap();

        let quote = serde_json::json!({"symbol": "AAPL", "price": 150.0});
        assert!(cache.set("stock:AAPL", &quote, 300).await);
        assert_eq!(cache.get("stock:AAPL").await, Some(quote));
        assert!(cache.delete("stock:AAPL").await);
        assert_eq!(cache.get("stock:AAPL").await, None);
    }

    #[tokio::test]
    async fn test_set_with_no_nodes_fails() {
        let cache = manager();
        assert!(!cache.set("k", &serde_json::json!(1), 60).await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_duplicate_node_rejected() {
        let cache = manager();
        cache.add_node("n1", "127.0.0.1", 7001, 1).await.unwrap();
        assert!(matches!(
            cache.add_node("n1", "127.0.0.1", 7001, 1).await,
            Err(CacheError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_unknown_node() {
        let cache = manager();
        assert!(matches!(
            cache.remove_node("ghost").await,
            Err(CacheError::NoSuchNode(_))
        ));
    }

    #[tokio::test]
    async fn test_statistics_snapshot() {
        let cache = manager();
        cache.add_node("n1", "127.0.0.1", 7001, 1).await.unwrap();

        cache.set("k", &serde_json::json!("v"), 60).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.get_cache_statistics().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.active_nodes, 1);
        assert_eq!(stats.total_nodes, 1);
        assert_eq!(stats.replication_factor, 2);
        assert_eq!(stats.virtual_nodes, 160);
    }
}
