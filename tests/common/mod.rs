//! Shared test doubles: a backend that counts calls and can be switched
//! into a failing state, plus a connector that hands out pre-built
//! backends keyed by address.
#![allow(dead_code)]

use async_trait::async_trait;
use market_cache::backend::{Backend, BackendConnector, MemoryBackend};
use market_cache::error::BackendError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Wraps a `MemoryBackend`, recording per-operation call counts and
/// failing every call while `fail` is set.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    pub fail: AtomicBool,
    pub get_calls: AtomicU64,
    pub set_calls: AtomicU64,
    pub delete_calls: AtomicU64,
    pub ping_calls: AtomicU64,
    pub last_set_ttl: AtomicU64,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn sets(&self) -> u64 {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u64 {
        self.ping_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(BackendError::Unreachable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for CountingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), BackendError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.last_set_ttl.store(ttl_seconds, Ordering::SeqCst);
        self.check()?;
        self.inner.set(key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<u64, BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        self.check()?;
        self.inner.delete_pattern(pattern).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.ping().await
    }

    fn describe(&self) -> String {
        "counting-memory".to_string()
    }
}

/// Connector resolving `host:port` to pre-registered backends.
#[derive(Default)]
pub struct StaticConnector {
    backends: HashMap<String, Arc<CountingBackend>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, host: &str, port: u16, backend: Arc<CountingBackend>) {
        self.backends.insert(format!("{}:{}", host, port), backend);
    }
}

#[async_trait]
impl BackendConnector for StaticConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Backend>, BackendError> {
        let addr = format!("{}:{}", host, port);
        match self.backends.get(&addr) {
            Some(backend) => Ok(backend.clone() as Arc<dyn Backend>),
            None => Err(BackendError::Unreachable(format!("no backend at {}", addr))),
        }
    }
}
