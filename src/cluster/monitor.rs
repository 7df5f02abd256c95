//! Node health monitoring and recovery
//!
//! A background loop probes every known node on a fixed interval; each
//! probe runs in its own task so a slow node never delays the others.
//! Nodes that accumulate `max_failures` consecutive failures are
//! quarantined: their virtual entries leave the ring immediately and a
//! per-node recovery task re-probes them on the recovery timeout until
//! they heal or are administratively removed. Recovery tasks are keyed by
//! node ID so removal can cancel them.

use crate::cluster::{ClusterState, NodeStatus};
use crate::stats::CacheStats;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodic liveness prober driving node status transitions.
#[derive(Clone)]
pub struct NodeHealthMonitor {
    state: Arc<ClusterState>,
    stats: Arc<CacheStats>,
    check_interval: Duration,
    probe_timeout: Duration,
    recovery_timeout: Duration,
    recovery_tasks: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    monitor_task: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl NodeHealthMonitor {
    pub(crate) fn new(
        state: Arc<ClusterState>,
        stats: Arc<CacheStats>,
        check_interval: Duration,
        probe_timeout: Duration,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            state,
            stats,
            check_interval,
            probe_timeout,
            recovery_timeout,
            recovery_tasks: Arc::new(RwLock::new(HashMap::new())),
            monitor_task: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the periodic health check loop.
    pub async fn start(&self) {
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let node_ids: Vec<String> =
                    monitor.state.nodes.read().await.keys().cloned().collect();
                for node_id in node_ids {
                    // probes are isolated per node
                    let probe = monitor.clone();
                    tokio::spawn(async move {
                        probe.check_node_health(&node_id).await;
                    });
                }
            }
        });

        let mut task = self.monitor_task.write().await;
        if let Some(old) = task.replace(handle) {
            old.abort();
        }
    }

    /// Stop the check loop and every pending recovery task.
    pub async fn stop(&self) {
        if let Some(handle) = self.monitor_task.write().await.take() {
            handle.abort();
        }
        let mut tasks = self.recovery_tasks.write().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    /// Probe one node and apply the status transition. Returns whether
    /// the probe succeeded.
    pub async fn check_node_health(&self, node_id: &str) -> bool {
        let backend = match self.state.backend(node_id).await {
            Some(backend) => backend,
            None => return false,
        };

        let probe = tokio::time::timeout(self.probe_timeout, backend.ping()).await;
        match probe {
            Ok(Ok(())) => {
                self.mark_healthy(node_id).await;
                true
            }
            Ok(Err(e)) => {
                debug!(node_id, error = %e, "health probe failed");
                self.report_failure(node_id).await;
                false
            }
            Err(_) => {
                debug!(node_id, timeout_ms = self.probe_timeout.as_millis() as u64, "health probe timed out");
                self.report_failure(node_id).await;
                false
            }
        }
    }

    /// Record a failed probe or RPC against a node. Crossing the node's
    /// failure threshold quarantines it: all of its virtual entries leave
    /// the ring and a recovery task is scheduled.
    pub async fn report_failure(&self, node_id: &str) {
        let node_arc = match self.state.node(node_id).await {
            Some(node) => node,
            None => return,
        };

        self.stats.record_node_failure();

        let quarantine = {
            let mut node = node_arc.write().await;
            node.failure_count += 1;
            node.last_health_check = Some(chrono::Utc::now());
            if node.failure_count >= node.max_failures && node.status != NodeStatus::Failed {
                node.status = NodeStatus::Failed;
                true
            } else {
                false
            }
        };

        if quarantine {
            warn!(node_id, "node crossed failure threshold, quarantining");
            self.state.ring.write().await.remove_node(node_id);
            self.refresh_gauges().await;
            self.schedule_recovery(node_id).await;
        }
    }

    /// Reset a node's failure tracking and, if it was quarantined, put
    /// its virtual entries back on the ring.
    async fn mark_healthy(&self, node_id: &str) {
        let node_arc = match self.state.node(node_id).await {
            Some(node) => node,
            None => return,
        };

        let (was_failed, snapshot) = {
            let mut node = node_arc.write().await;
            let was_failed = node.status == NodeStatus::Failed;
            node.status = NodeStatus::Active;
            node.failure_count = 0;
            node.last_health_check = Some(chrono::Utc::now());
            (was_failed, node.clone())
        };

        if was_failed {
            let mut ring = self.state.ring.write().await;
            if !ring.contains_node(node_id) {
                ring.add_node(&snapshot);
            }
            drop(ring);
            info!(node_id, "node recovered, restored to ring");
            self.refresh_gauges().await;
        }
    }

    /// Spawn the unbounded-but-cancellable recovery loop for a
    /// quarantined node. Idempotent while a task is already pending.
    async fn schedule_recovery(&self, node_id: &str) {
        let mut tasks = self.recovery_tasks.write().await;
        if let Some(existing) = tasks.get(node_id) {
            if !existing.is_finished() {
                return;
            }
        }

        let monitor = self.clone();
        let id = node_id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(monitor.recovery_timeout).await;
                if monitor.state.node(&id).await.is_none() {
                    // node was removed while we slept
                    break;
                }
                if monitor.try_recover(&id).await {
                    break;
                }
                info!(node_id = %id, "recovery probe failed, rescheduling");
            }
            monitor.recovery_tasks.write().await.remove(&id);
        });
        tasks.insert(node_id.to_string(), handle);
    }

    /// Single recovery probe. Restores the node on success.
    async fn try_recover(&self, node_id: &str) -> bool {
        let backend = match self.state.backend(node_id).await {
            Some(backend) => backend,
            None => return true,
        };
        match tokio::time::timeout(self.probe_timeout, backend.ping()).await {
            Ok(Ok(())) => {
                self.mark_healthy(node_id).await;
                true
            }
            _ => false,
        }
    }

    /// Abort a node's pending recovery task, if any. Called when the
    /// node is administratively removed.
    pub(crate) async fn cancel_recovery(&self, node_id: &str) {
        if let Some(handle) = self.recovery_tasks.write().await.remove(node_id) {
            handle.abort();
        }
    }

    /// Whether a recovery task is currently pending for a node.
    pub async fn recovery_pending(&self, node_id: &str) -> bool {
        self.recovery_tasks
            .read()
            .await
            .get(node_id)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub(crate) async fn refresh_gauges(&self) {
        let (active, total) = self.state.node_counts().await;
        self.stats.set_node_counts(active, total);
    }
}
