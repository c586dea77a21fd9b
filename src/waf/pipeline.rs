//! Request inspection pipeline.
//!
//! # Stages
//! ```text
//! Open        → engine.new_transaction()
//! Connection  → process_connection(client, port, host, server_port)  ─┐
//! Headers     → add_request_header(..)*, process_request_headers()   ─┤ interrupt?
//! Resolve     → Continue | Interrupt{status, body}                  ◀─┘
//! ```
//!
//! # Design Decisions
//! - First interruption ends the transaction; later stages never run
//! - The profile selector header is stripped before the header stage
//! - Evaluation is synchronous; the transaction never crosses an `.await`,
//!   so an aborted request simply drops it

use axum::http::HeaderMap;

use crate::engine::Engine;
use crate::waf::profile::ProfileResolver;
use crate::waf::types::Verdict;

/// Request data fed to the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct InspectionRequest<'a> {
    /// Client address, possibly taken from a forwarded-IP header (not re-verified).
    pub client_addr: &'a str,
    /// Client port, 0 when the address came from a forwarded-IP header.
    pub client_port: u16,
    /// Destination host.
    pub host: &'a str,
    /// Inbound headers, selector header included.
    pub headers: &'a HeaderMap,
}

/// Stage the transaction stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connection,
    Headers,
    Resolved,
}

/// Runs one transaction per request against a compiled engine.
#[derive(Debug, Clone)]
pub struct Pipeline {
    resolver: ProfileResolver,
    server_port: u16,
}

impl Pipeline {
    pub fn new(resolver: ProfileResolver, server_port: u16) -> Self {
        Self {
            resolver,
            server_port,
        }
    }

    /// Evaluate `request` and return the verdict.
    pub fn run(&self, engine: &Engine, request: &InspectionRequest<'_>) -> Verdict {
        self.run_traced(engine, request).0
    }

    /// Like [`run`](Self::run), also reporting where evaluation stopped.
    pub fn run_traced(&self, engine: &Engine, request: &InspectionRequest<'_>) -> (Verdict, Stage) {
        let mut tx = engine.new_transaction();

        if let Some(it) = tx.process_connection(
            request.client_addr,
            request.client_port,
            request.host,
            self.server_port,
        ) {
            return (it.into(), Stage::Connection);
        }

        for (name, value) in request.headers {
            if self.resolver.is_selector(name) {
                continue;
            }
            tx.add_request_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }

        match tx.process_request_headers() {
            Some(it) => (it.into(), Stage::Headers),
            None => (Verdict::Continue, Stage::Resolved),
        }
    }
}
