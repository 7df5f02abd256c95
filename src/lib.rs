//! market-cache: cache core for the market data platform
//!
//! Two cache surfaces share one backend abstraction:
//!
//! - [`DistributedCacheManager`] shards keys across a cluster of backend
//!   nodes with a consistent hash ring, replicated writes, and health
//!   monitoring with quarantine and recovery.
//! - [`TieredCacheManager`] fronts a single backend with a bounded
//!   process-local tier for low-latency repeated reads.
//!
//! Both are best-effort: backend failures surface as misses or `false`,
//! never as errors past the cache boundary.

pub mod backend;
pub mod cluster;
pub mod config;
pub mod error;
pub mod log;
pub mod stats;
pub mod tiered;

pub use backend::{
    Backend, BackendConnector, MemoryBackend, MemoryConnector, RemoteBackend, RemoteConnector,
};
pub use cluster::{
    CacheNode, ConsistentHashRing, DistributedCacheManager, NodeHealthMonitor, NodeStatus,
};
pub use config::{
    BackendKind, CacheConfig, ClusterConfig, ConsistencyLevel, LocalConfig, LoggingConfig,
    ReadPreference,
};
pub use error::{BackendError, CacheError};
pub use log::init_logging;
pub use stats::{CacheStats, StatsSnapshot};
pub use tiered::{HealthReport, HealthState, TieredCacheManager};
