//! Rule store subsystem.
//!
//! # Data Flow
//! ```text
//! EngineBuilder
//!     → RuleStore::scan_prefix("WAF_RULE:<profile>:")   (key listing)
//!     → RuleStore::get(key)                             (one fetch per key)
//!     → directive fragments handed back to the builder
//! ```
//!
//! # Design Decisions
//! - The store is a capability injected at startup (`Arc<dyn RuleStore>`)
//! - Key order is whatever the backend returns; adapters never sort
//! - Each call is attempted once; timeouts are enforced by the adapter
//! - A missing key is `Ok(None)`, not an error

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryRuleStore;
pub use self::redis_store::RedisRuleStore;

/// Errors raised by a rule store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Initial connection to the backend failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// The backend rejected or failed a command.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend did not answer within the command timeout.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for rule store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value view over stored rule fragments.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List every key starting with `prefix`. Order is backend-defined.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Fetch the value stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
}

/// Key prefix holding every rule fragment of `profile`.
pub fn profile_prefix(key_prefix: &str, profile: &str) -> String {
    format!("{}:{}:", key_prefix, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_prefix() {
        assert_eq!(profile_prefix("WAF_RULE", "acme"), "WAF_RULE:acme:");
        assert_eq!(profile_prefix("RULE", "default"), "RULE:default:");
    }
}
