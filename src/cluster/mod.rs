//! Distributed cache cluster: ring placement, health monitoring, and the
//! replicating cache manager.

pub mod manager;
pub mod monitor;
pub mod ring;

pub use manager::DistributedCacheManager;
pub use monitor::NodeHealthMonitor;
pub use ring::{CacheNode, ConsistentHashRing, NodeStatus};

use crate::backend::Backend;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared cluster state: the node table, the hash ring, and the per-node
/// backend connections. Mutations take the write side of the relevant
/// lock; readers always observe the ring either before or after a
/// membership change, never mid-update.
#[derive(Debug)]
pub(crate) struct ClusterState {
    pub(crate) nodes: RwLock<HashMap<String, Arc<RwLock<CacheNode>>>>,
    pub(crate) ring: RwLock<ConsistentHashRing>,
    pub(crate) backends: RwLock<HashMap<String, Arc<dyn Backend>>>,
}

impl ClusterState {
    pub(crate) fn new(virtual_nodes: usize) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            ring: RwLock::new(ConsistentHashRing::new(virtual_nodes)),
            backends: RwLock::new(HashMap::new()),
        }
    }

    /// IDs of nodes currently eligible for traffic.
    pub(crate) async fn active_node_ids(&self) -> HashSet<String> {
        let nodes = self.nodes.read().await;
        let mut active = HashSet::with_capacity(nodes.len());
        for (id, node) in nodes.iter() {
            if node.read().await.is_active() {
                active.insert(id.clone());
            }
        }
        active
    }

    /// Ordered candidate nodes for a key, active nodes only.
    pub(crate) async fn candidates(&self, key: &str, count: usize) -> Vec<String> {
        let active = self.active_node_ids().await;
        let ring = self.ring.read().await;
        ring.candidates(key, count, &active)
    }

    pub(crate) async fn backend(&self, node_id: &str) -> Option<Arc<dyn Backend>> {
        self.backends.read().await.get(node_id).cloned()
    }

    pub(crate) async fn node(&self, node_id: &str) -> Option<Arc<RwLock<CacheNode>>> {
        self.nodes.read().await.get(node_id).cloned()
    }

    /// (active, total) node counts for the stats gauges.
    pub(crate) async fn node_counts(&self) -> (usize, usize) {
        let nodes = self.nodes.read().await;
        let total = nodes.len();
        let mut active = 0;
        for node in nodes.values() {
            if node.read().await.is_active() {
                active += 1;
            }
        }
        (active, total)
    }
}
