//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the rule store
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The store is connected before the listener binds (traffic only when ready)

use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ListenerConfig, StoreConfig};
use crate::store::{RedisRuleStore, RuleStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("rule store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Connect to Redis and verify it answers.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn RuleStore>, StartupError> {
    let store = RedisRuleStore::connect(config).await?;
    tracing::info!(key_prefix = %config.key_prefix, "Rule store connected");
    Ok(Arc::new(store))
}

/// Bind the inbound TCP listener.
pub async fn bind_listener(config: &ListenerConfig) -> Result<TcpListener, StartupError> {
    TcpListener::bind(&config.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.bind_address.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
        };
        let listener = bind_listener(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        let config = ListenerConfig {
            bind_address: "not-an-address".into(),
        };
        let err = bind_listener(&config).await.unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }
}
