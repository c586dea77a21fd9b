//! Profile-scoped WAF gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                   WAF GATEWAY                    │
//!                      │                                                  │
//!   POST /pre          │  ┌─────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ───────────────────┼─▶│  http   │──▶│ profile  │──▶│ engine cache │  │
//!                      │  │ server  │   │ resolver │   └──────┬───────┘  │
//!                      │  └────┬────┘   └──────────┘     miss │          │
//!                      │       │                              ▼          │
//!                      │       │        ┌──────────┐   ┌──────────────┐  │
//!                      │       │        │ pipeline │   │   builder    │──┼──▶ Redis
//!                      │       │        └────┬─────┘   │ scan + fetch │  │   WAF_RULE:<p>:*
//!   200 / status+body  │       ▼             │         └──────────────┘  │
//!   ◀──────────────────┼── verdict ◀─────────┘                           │
//!                      │                                                  │
//!   GET /remove/{p}  ──┼─▶ invalidate                                     │
//!                      └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use waf_gateway::config::load_config;
use waf_gateway::lifecycle::{self, Shutdown};
use waf_gateway::observability::{logging, metrics};
use waf_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "waf-gateway")]
#[command(about = "Profile-scoped WAF gateway backed by Redis rule sets", long_about = None)]
struct Cli {
    /// Path to a TOML config file; defaults plus environment when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        key_prefix = %config.store.key_prefix,
        profile_header = %config.waf.profile_header,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = lifecycle::connect_store(&config.store).await?;
    let listener = lifecycle::bind_listener(&config.listener).await?;

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(&config, store);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
