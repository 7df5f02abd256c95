//! Configuration management for the cache layer
//!
//! This module provides structured configuration management using TOML/YAML
//! files with serde for serialization and deserialization.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the cache layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Distributed cluster configuration
    pub cluster: ClusterConfig,
    /// Process-local cache tier configuration
    pub local: LocalConfig,
    /// Backend connection configuration
    pub backend: BackendConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Distributed cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of distinct nodes each write is copied to
    pub replication_factor: usize,
    /// Virtual nodes per physical node (scaled linearly by node weight)
    pub virtual_nodes: usize,
    /// Health check interval in seconds
    pub health_check_interval: u64,
    /// Consecutive probe failures before a node is quarantined
    pub max_failures: u32,
    /// Delay between recovery attempts for a quarantined node, in seconds
    pub recovery_timeout: u64,
    /// Per-RPC deadline in milliseconds
    pub request_timeout_ms: u64,
    /// Which replica(s) a read consults
    pub read_preference: ReadPreference,
    /// Write success threshold policy
    pub consistency_level: ConsistencyLevel,
}

/// Read preference policy.
///
/// `nearest` is accepted for forward compatibility and currently behaves
/// like `master`: the first ring candidate is the nearest one by hash
/// distance, and no replica latency data exists to rank them otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPreference {
    /// Query only the primary candidate
    Master,
    /// Query the closest candidate (treated as master)
    Nearest,
    /// Query candidates in ring order, first hit wins
    Any,
}

/// Write success threshold policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    /// At least one replica write must succeed
    Eventual,
    /// Every candidate write must succeed
    Strong,
}

/// Process-local cache tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Maximum number of entries in the local tier
    pub local_cache_max_size: usize,
    /// TTL applied when populating the local tier from a backend read,
    /// in seconds (0 = no expiry)
    pub default_ttl_seconds: u64,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Which backend implementation to construct
    pub kind: BackendKind,
    /// Backend host (remote backend only)
    pub host: String,
    /// Backend port (remote backend only)
    pub port: u16,
    /// Per-call deadline in milliseconds
    pub request_timeout_ms: u64,
}

/// Backend implementation selector. Chosen explicitly at construction
/// time; there is no runtime fallback between implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process map with TTL support
    Memory,
    /// Remote key/value store over TCP
    Remote,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Enable console output
    pub console: bool,
    /// Include source file and line number
    pub with_location: bool,
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CacheConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: CacheConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.cluster.replication_factor == 0 {
            errors.push("Replication factor cannot be 0".to_string());
        }
        if self.cluster.virtual_nodes == 0 {
            errors.push("Virtual node count cannot be 0".to_string());
        }
        if self.cluster.max_failures == 0 {
            errors.push("Max failures cannot be 0".to_string());
        }
        if self.cluster.request_timeout_ms == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }
        if self.local.local_cache_max_size == 0 {
            errors.push("Local cache max size cannot be 0".to_string());
        }
        if self.backend.kind == BackendKind::Remote {
            if self.backend.host.is_empty() {
                errors.push("Backend host cannot be empty".to_string());
            }
            if self.backend.port == 0 {
                errors.push("Backend port cannot be 0".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ClusterConfig {
    /// Get duration for the health check interval
    pub fn health_check_duration(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    /// Get duration for the recovery retry delay
    pub fn recovery_duration(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout)
    }

    /// Get duration for the per-RPC deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl BackendConfig {
    /// Get duration for the per-call deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            local: LocalConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            replication_factor: 2,
            virtual_nodes: 160,
            health_check_interval: 30,
            max_failures: 3,
            recovery_timeout: 300,
            request_timeout_ms: 2000,
            read_preference: ReadPreference::Master,
            consistency_level: ConsistencyLevel::Strong,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            local_cache_max_size: 1000,
            default_ttl_seconds: 300,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Remote,
            host: "127.0.0.1".to_string(),
            port: 6379,
            request_timeout_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            with_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.cluster.replication_factor, 2);
        assert_eq!(config.cluster.virtual_nodes, 160);
        assert_eq!(config.cluster.max_failures, 3);
        assert_eq!(config.cluster.read_preference, ReadPreference::Master);
        assert_eq!(config.local.local_cache_max_size, 1000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CacheConfig::default();
        assert!(config.validate().is_ok());

        config.cluster.replication_factor = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.contains(&"Replication factor cannot be 0".to_string()));
    }

    #[test]
    fn test_config_serialization() {
        let config = CacheConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: CacheConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.cluster.replication_factor,
            deserialized.cluster.replication_factor
        );
        assert_eq!(config.backend.port, deserialized.backend.port);
    }

    #[test]
    fn test_read_preference_parsing() {
        let toml_str = r#"
            [cluster]
            replication_factor = 3
            virtual_nodes = 160
            health_check_interval = 30
            max_failures = 3
            recovery_timeout = 300
            request_timeout_ms = 2000
            read_preference = "any"
            consistency_level = "eventual"

            [local]
            local_cache_max_size = 500
            default_ttl_seconds = 60

            [backend]
            kind = "memory"
            host = ""
            port = 0
            request_timeout_ms = 1000

            [logging]
            level = "debug"
            console = true
            with_location = false
        "#;
        let config: CacheConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cluster.read_preference, ReadPreference::Any);
        assert_eq!(config.cluster.consistency_level, ConsistencyLevel::Eventual);
        assert_eq!(config.backend.kind, BackendKind::Memory);
    }

    #[test]
    fn test_duration_conversions() {
        let config = CacheConfig::default();
        assert_eq!(config.cluster.health_check_duration(), Duration::from_secs(30));
        assert_eq!(config.cluster.recovery_duration(), Duration::from_secs(300));
        assert_eq!(config.cluster.request_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");

        let config = CacheConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(loaded.cluster.virtual_nodes, config.cluster.virtual_nodes);
    }
}
