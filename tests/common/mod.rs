//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use waf_gateway::config::GatewayConfig;
use waf_gateway::lifecycle::Shutdown;
use waf_gateway::store::MemoryRuleStore;
use waf_gateway::HttpServer;

/// A gateway running on an ephemeral port over an in-memory rule store.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: MemoryRuleStore,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    handle: tokio::task::JoinHandle<()>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the server and wait for it to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Config used by every test gateway: `RULE` key prefix, loopback bind.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.store.key_prefix = "RULE".into();
    config
}

/// Start a gateway with `config` over `store`.
pub async fn start_gateway(config: GatewayConfig, store: MemoryRuleStore) -> TestGateway {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, Arc::new(store.clone()));
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        store,
        client,
        shutdown,
        handle,
    }
}
