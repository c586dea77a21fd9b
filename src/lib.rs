//! Profile-scoped WAF gateway library.
//!
//! Requests carry a profile selector header; each profile owns a rule set
//! stored as key fragments in Redis, compiled lazily into a cached engine.

// Core subsystems
pub mod config;
pub mod engine;
pub mod http;
pub mod store;
pub mod waf;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use waf::{Inspector, ProfileId, Verdict};
