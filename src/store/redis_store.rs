//! Redis-backed rule store.
//!
//! # Responsibilities
//! - Connect to Redis through a `ConnectionManager` (auto-reconnect)
//! - List profile keys with cursor-based `SCAN ... MATCH`
//! - Fetch fragments with `GET`
//! - Bound every call with the configured command timeout

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::StoreConfig;
use crate::store::{RuleStore, StoreError, StoreResult};

/// Rule store talking to a Redis server.
#[derive(Clone)]
pub struct RedisRuleStore {
    connection_manager: ConnectionManager,
    command_timeout: Duration,
    scan_count: usize,
}

impl RedisRuleStore {
    /// Connect to the configured Redis server and verify it with `PING`.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| StoreError::Connect(format!("invalid Redis URL: {}", e)))?;

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let connection_manager = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))?
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        let store = Self {
            connection_manager,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            scan_count: config.scan_count,
        };
        store.ping().await?;

        tracing::info!(key_prefix = %config.key_prefix, "Connected to Redis rule store");
        Ok(store)
    }

    /// Round-trip a `PING`.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection_manager.clone();
        self.bounded(async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await
        .map(|_| ())
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        timeout(self.command_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.command_timeout))?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl RuleStore for RedisRuleStore {
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.connection_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let cmd = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .to_owned();
            let (next, batch): (u64, Vec<String>) =
                self.bounded(cmd.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once across iterations.
        let mut seen = std::collections::HashSet::with_capacity(keys.len());
        keys.retain(|k| seen.insert(k.clone()));

        Ok(keys)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection_manager.clone();
        self.bounded(conn.get::<_, Option<String>>(key)).await
    }
}

/// Escape Redis glob metacharacters so a profile id is matched literally.
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
