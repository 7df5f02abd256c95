//! Consistent hashing ring for key-to-node placement
//!
//! Keys and virtual nodes share a 128-bit hash space derived from SHA-256
//! digests, so placement is stable across processes and restarts. Each
//! physical node owns `virtual_nodes * weight` positions on the ring;
//! membership changes remap only the keys adjacent to the moved positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Health state of a physical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Inactive,
    Failed,
}

/// One backend instance participating in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheNode {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    /// Linear multiplier on the node's virtual-node count
    pub weight: u32,
    pub status: NodeStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub failure_count: u32,
    /// Consecutive failures before the node is quarantined
    pub max_failures: u32,
}

impl CacheNode {
    pub fn new(node_id: &str, host: &str, port: u16, weight: u32) -> Self {
        Self {
            node_id: node_id.to_string(),
            host: host.to_string(),
            port,
            weight: weight.max(1),
            status: NodeStatus::Active,
            last_health_check: None,
            failure_count: 0,
            max_failures: 3,
        }
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

/// Virtual node representation for better distribution
#[derive(Debug, Clone)]
pub struct VirtualNode {
    pub node_id: String,
    pub virtual_id: u32,
}

/// Consistent hash ring for key distribution
#[derive(Debug)]
pub struct ConsistentHashRing {
    ring: BTreeMap<u128, VirtualNode>,
    virtual_nodes_per_physical: usize,
}

impl ConsistentHashRing {
    pub fn new(virtual_nodes_per_physical: usize) -> Self {
        Self {
            ring: BTreeMap::new(),
            virtual_nodes_per_physical,
        }
    }

    /// Add a physical node to the hash ring. Entries for other nodes are
    /// untouched, so only keys landing on the new positions move.
    pub fn add_node(&mut self, node: &CacheNode) {
        let count = self.virtual_nodes_per_physical * node.weight as usize;
        for i in 0..count {
            let hash = hash_position(&format!("{}:{}", node.node_id, i));
            self.ring.insert(
                hash,
                VirtualNode {
                    node_id: node.node_id.clone(),
                    virtual_id: i as u32,
                },
            );
        }
    }

    /// Remove all of a node's virtual entries. Keys in its ranges move to
    /// the next clockwise node; no other assignment changes.
    pub fn remove_node(&mut self, node_id: &str) {
        self.ring.retain(|_, vn| vn.node_id != node_id);
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.ring.values().any(|vn| vn.node_id == node_id)
    }

    /// Collect up to `count` distinct node IDs for a key, walking
    /// clockwise from the key's hash and wrapping around. Nodes absent
    /// from `active` are skipped, including dangling entries left by a
    /// racing membership change.
    pub fn candidates(&self, key: &str, count: usize, active: &HashSet<String>) -> Vec<String> {
        if self.ring.is_empty() || count == 0 {
            return Vec::new();
        }

        let key_hash = hash_position(key);
        let mut result: Vec<String> = Vec::with_capacity(count);

        let walk = self
            .ring
            .range(key_hash..)
            .chain(self.ring.range(..key_hash));
        for (_, vn) in walk {
            if !active.contains(&vn.node_id) {
                continue;
            }
            if result.iter().any(|id| id == &vn.node_id) {
                continue;
            }
            result.push(vn.node_id.clone());
            if result.len() == count {
                break;
            }
        }

        result
    }

    /// Get all physical node IDs present in the ring
    pub fn node_ids(&self) -> HashSet<String> {
        self.ring.values().map(|vn| vn.node_id.clone()).collect()
    }

    pub fn virtual_node_count(&self) -> usize {
        self.ring.len()
    }

    pub fn physical_node_count(&self) -> usize {
        self.node_ids().len()
    }
}

/// Ring position for an arbitrary string: SHA-256 digest truncated to
/// 128 bits. Stable across processes, which candidate ordering relies on.
pub fn hash_position(input: &str) -> u128 {
    let digest = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn three_node_ring(virtual_nodes: usize) -> ConsistentHashRing {
        let mut ring = ConsistentHashRing::new(virtual_nodes);
        ring.add_node(&CacheNode::new("node-1", "127.0.0.1", 7001, 1));
        ring.add_node(&CacheNode::new("node-2", "127.0.0.1", 7002, 1));
        ring.add_node(&CacheNode::new("node-3", "127.0.0.1", 7003, 1));
        ring
    }

    #[test]
    fn test_virtual_node_counts() {
        let ring = three_node_ring(160);
        assert_eq!(ring.physical_node_count(), 3);
        assert_eq!(ring.virtual_node_count(), 480);
    }

    #[test]
    fn test_weight_scales_virtual_nodes() {
        let mut ring = ConsistentHashRing::new(100);
        ring.add_node(&CacheNode::new("heavy", "127.0.0.1", 7001, 3));
        assert_eq!(ring.virtual_node_count(), 300);
    }

    #[test]
    fn test_candidate_determinism() {
        let ring = three_node_ring(160);
        let active = active_set(&["node-1", "node-2", "node-3"]);

        let first = ring.candidates("stock:AAPL", 2, &active);
        for _ in 0..10 {
            assert_eq!(ring.candidates("stock:AAPL", 2, &active), first);
        }
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn test_candidates_skip_inactive_nodes() {
        let ring = three_node_ring(160);
        let all = active_set(&["node-1", "node-2", "node-3"]);
        let full = ring.candidates("stock:TSLA", 3, &all);
        assert_eq!(full.len(), 3);

        let without_primary = active_set(
            &full[1..].iter().map(String::as_str).collect::<Vec<_>>(),
        );
        let narrowed = ring.candidates("stock:TSLA", 3, &without_primary);
        assert_eq!(narrowed.len(), 2);
        assert!(!narrowed.contains(&full[0]));
        // surviving candidates keep their relative order
        assert_eq!(narrowed[0], full[1]);
    }

    #[test]
    fn test_empty_and_exhausted_ring() {
        let ring = ConsistentHashRing::new(160);
        assert!(ring.candidates("k", 2, &active_set(&[])).is_empty());

        let ring = three_node_ring(160);
        assert!(ring.candidates("k", 2, &active_set(&[])).is_empty());
    }

    #[test]
    fn test_single_node_serves_every_key() {
        let mut ring = ConsistentHashRing::new(160);
        ring.add_node(&CacheNode::new("only", "127.0.0.1", 7001, 1));
        let active = active_set(&["only"]);

        for key in ["stock:AAPL", "sentiment:TSLA", "news:MSFT", ""] {
            assert_eq!(ring.candidates(key, 3, &active), vec!["only".to_string()]);
        }
    }

    #[test]
    fn test_remove_node_is_minimally_disruptive() {
        use rand::{distributions::Alphanumeric, Rng, SeedableRng};

        let mut ring = three_node_ring(160);
        let active = active_set(&["node-1", "node-2", "node-3"]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        let keys: Vec<String> = (0..3000)
            .map(|_| {
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(12)
                    .map(char::from)
                    .collect()
            })
            .collect();

        let before: Vec<String> = keys
            .iter()
            .map(|k| ring.candidates(k, 1, &active)[0].clone())
            .collect();

        ring.remove_node("node-2");
        let active_after = active_set(&["node-1", "node-3"]);
        let mut moved = 0;
        for (key, owner) in keys.iter().zip(&before) {
            let new_owner = &ring.candidates(key, 1, &active_after)[0];
            if owner == "node-2" {
                // keys from the removed node must move somewhere else
                assert_ne!(new_owner, owner);
            } else if new_owner != owner {
                moved += 1;
            }
        }
        // only keys owned by the removed node are remapped
        assert_eq!(moved, 0);

        let removed_share = before.iter().filter(|o| *o == "node-2").count() as f64
            / keys.len() as f64;
        // with 160 virtual nodes the removed node held roughly a third
        assert!(removed_share > 0.2 && removed_share < 0.5);
    }

    #[test]
    fn test_hash_position_is_stable() {
        assert_eq!(hash_position("stock:AAPL"), hash_position("stock:AAPL"));
        assert_ne!(hash_position("stock:AAPL"), hash_position("stock:AAPl"));
    }
}
