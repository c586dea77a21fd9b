//! In-process rule store.
//!
//! Backs tests and local runs without a Redis instance. Keys are kept in
//! insertion order so scans are reproducible.

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::store::{RuleStore, StoreError, StoreResult};

/// Thread-safe in-memory key-value store.
#[derive(Clone, Default)]
pub struct MemoryRuleStore {
    entries: Arc<RwLock<Vec<(String, String)>>>,
    /// Keys whose `get` fails, simulating a flaky backend.
    failing_keys: Arc<DashSet<String>>,
    fail_scans: Arc<AtomicBool>,
    scan_delay_ms: Arc<AtomicU64>,
    scans: Arc<AtomicUsize>,
}

impl MemoryRuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    /// Remove a key. Returns true if it existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        entries.len() != before
    }

    /// Make every subsequent `get` of `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.insert(key.into());
    }

    /// Make subsequent scans fail (or succeed again).
    pub fn set_scan_failure(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Delay every scan, widening race windows in concurrency tests.
    pub fn set_scan_delay(&self, delay: Duration) {
        self.scan_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of scans served so far, including failed ones.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let delay = self.scan_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected scan failure".to_string()));
        }

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if self.failing_keys.contains(key) {
            return Err(StoreError::Backend(format!("injected failure for {}", key)));
        }
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
    }
}
