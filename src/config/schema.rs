//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the WAF gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Rule store connection settings.
    pub store: StoreConfig,

    /// Inspection settings.
    pub waf: WafConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Rule store (Redis) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis connection URL (e.g., "redis://:password@host:6379/0").
    pub redis_url: String,

    /// Leading key segment; rules live under `<key_prefix>:<profile>:<name>`.
    pub key_prefix: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Per-command timeout in milliseconds.
    pub command_timeout_ms: u64,

    /// `COUNT` hint passed to each `SCAN` call.
    pub scan_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "WAF_RULE".to_string(),
            connect_timeout_ms: 5000,
            command_timeout_ms: 3000,
            scan_count: 100,
        }
    }
}

/// What a profile with no stored rules does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRulesetPolicy {
    /// Compile the empty rule set; every request continues.
    #[default]
    Allow,
    /// Block every request of the profile.
    Deny,
}

/// Inspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WafConfig {
    /// Header selecting the profile. Never evaluated as request data.
    pub profile_header: String,

    /// Profile used when the selector header is missing or empty.
    pub default_profile: String,

    /// Headers carrying the original client IP, checked in order.
    pub client_ip_headers: Vec<String>,

    /// Destination port reported to the connection phase.
    pub server_port: u16,

    /// Behavior for profiles without rule fragments.
    pub empty_ruleset: EmptyRulesetPolicy,

    /// Status returned when `empty_ruleset = "deny"` blocks a request.
    pub empty_ruleset_status: u16,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            profile_header: "X-WAF-Profile".to_string(),
            default_profile: "default".to_string(),
            client_ip_headers: vec![
                "X-Forwarded-For".to_string(),
                "X-Real-IP".to_string(),
                "X-Client-IP".to_string(),
            ],
            server_port: 443,
            empty_ruleset: EmptyRulesetPolicy::Allow,
            empty_ruleset_status: 403,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time to produce a verdict) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.store.key_prefix, "WAF_RULE");
        assert_eq!(config.waf.profile_header, "X-WAF-Profile");
        assert_eq!(config.waf.empty_ruleset, EmptyRulesetPolicy::Allow);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [store]
            key_prefix = "RULE"

            [waf]
            empty_ruleset = "deny"
            empty_ruleset_status = 451

            [observability]
            log_format = "pretty"
        "#;
        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.store.key_prefix, "RULE");
        assert_eq!(config.store.command_timeout_ms, 3000);
        assert_eq!(config.waf.empty_ruleset, EmptyRulesetPolicy::Deny);
        assert_eq!(config.waf.empty_ruleset_status, 451);
        assert_eq!(config.waf.server_port, 443);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }
}
