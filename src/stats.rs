//! Operation statistics for the cache layer
//!
//! A single `CacheStats` instance is shared by every concurrent operation.
//! Counters use relaxed atomics: eventual accuracy under high concurrency
//! is acceptable, exact linearizable counting is not required.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Shared cache operation counters.
///
/// `total_requests` counts read operations, so `hit_rate` is always
/// `cache_hits / total_requests`. Response times are tracked as an
/// exponential moving average in microseconds.
#[derive(Debug, Default)]
pub struct CacheStats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    node_failures: AtomicU64,
    data_replications: AtomicU64,
    avg_response_micros: AtomicU64,
    active_nodes: AtomicUsize,
    total_nodes: AtomicUsize,
}

/// Read-only snapshot of the statistics, exposed to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Hit percentage, 0.0 when no requests were served
    pub hit_rate: f64,
    pub node_failures: u64,
    pub data_replications: u64,
    /// Exponential moving average of operation latency in milliseconds
    pub avg_response_time_ms: f64,
    pub active_nodes: usize,
    pub total_nodes: usize,
    pub replication_factor: usize,
    pub virtual_nodes: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_failure(&self) {
        self.node_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replication(&self) {
        self.data_replications.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a completed operation's wall-clock duration into the moving
    /// average (alpha = 0.1). The read-modify-write is not atomic as a
    /// whole; a lost sample under contention is acceptable.
    pub fn observe_response_time(&self, elapsed: Duration) {
        let sample = elapsed.as_micros() as u64;
        let old = self.avg_response_micros.load(Ordering::Relaxed);
        let new = if old == 0 {
            sample
        } else {
            (old * 9 + sample) / 10
        };
        self.avg_response_micros.store(new, Ordering::Relaxed);
    }

    pub fn set_node_counts(&self, active: usize, total: usize) {
        self.active_nodes.store(active, Ordering::Relaxed);
        self.total_nodes.store(total, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn node_failures(&self) -> u64 {
        self.node_failures.load(Ordering::Relaxed)
    }

    pub fn replications(&self) -> u64 {
        self.data_replications.load(Ordering::Relaxed)
    }

    /// Reset every counter to zero. Node gauges are left alone: they track
    /// live membership, not traffic.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.node_failures.store(0, Ordering::Relaxed);
        self.data_replications.store(0, Ordering::Relaxed);
        self.avg_response_micros.store(0, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot, tagged with the cluster's static
    /// configuration values.
    pub fn snapshot(&self, replication_factor: usize, virtual_nodes: usize) -> StatsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        };

        StatsSnapshot {
            total_requests: total,
            cache_hits: hits,
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            hit_rate,
            node_failures: self.node_failures.load(Ordering::Relaxed),
            data_replications: self.data_replications.load(Ordering::Relaxed),
            avg_response_time_ms: self.avg_response_micros.load(Ordering::Relaxed) as f64 / 1000.0,
            active_nodes: self.active_nodes.load(Ordering::Relaxed),
            total_nodes: self.total_nodes.load(Ordering::Relaxed),
            replication_factor,
            virtual_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot(2, 160).hit_rate, 0.0);

        for _ in 0..4 {
            stats.record_request();
        }
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let snapshot = stats.snapshot(2, 160);
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.hit_rate, 75.0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let stats = CacheStats::new();
        stats.record_request();
        stats.record_hit();
        stats.record_replication();
        stats.record_node_failure();
        stats.observe_response_time(Duration::from_millis(5));
        stats.set_node_counts(2, 3);

        stats.reset();
        let snapshot = stats.snapshot(2, 160);
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.data_replications, 0);
        assert_eq!(snapshot.node_failures, 0);
        assert_eq!(snapshot.avg_response_time_ms, 0.0);
        // membership gauges survive a stats reset
        assert_eq!(snapshot.total_nodes, 3);
    }

    #[test]
    fn test_response_time_moving_average() {
        let stats = CacheStats::new();
        stats.observe_response_time(Duration::from_millis(10));
        let first = stats.snapshot(1, 1).avg_response_time_ms;
        assert_eq!(first, 10.0);

        stats.observe_response_time(Duration::from_millis(20));
        let second = stats.snapshot(1, 1).avg_response_time_ms;
        assert!(second > 10.0 && second < 20.0);
    }
}
