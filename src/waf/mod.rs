//! Profile-scoped request inspection.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → profile.rs   (selector header → ProfileId, default when absent)
//!     → cache.rs     (ProfileId → Arc<Engine>; miss → builder.rs)
//!     → builder.rs   (RuleStore scan + get → directive text → compile)
//!     → pipeline.rs  (connection phase → header phase → Verdict)
//!     → Verdict back to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - The Inspector is owned by the composition root and shared via Arc
//! - Store and engine construction are injected, never global
//! - Interruptions are data (Verdict), errors are only store/compile failures

pub mod builder;
pub mod cache;
pub mod pipeline;
pub mod profile;
pub mod types;

use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{StoreConfig, WafConfig};
use crate::observability::metrics;
use crate::store::RuleStore;

pub use self::builder::EngineBuilder;
pub use self::cache::EngineCache;
pub use self::pipeline::{InspectionRequest, Pipeline};
pub use self::profile::ProfileResolver;
pub use self::types::{ProfileId, Verdict, WafError, WafResult};

/// Entry point used by the HTTP layer.
pub struct Inspector {
    cache: EngineCache,
    resolver: ProfileResolver,
    pipeline: Pipeline,
}

impl Inspector {
    pub fn new(store: Arc<dyn RuleStore>, store_config: &StoreConfig, waf_config: &WafConfig) -> Self {
        let resolver = ProfileResolver::new(&waf_config.profile_header, &waf_config.default_profile);
        let builder = EngineBuilder::new(store, store_config, waf_config);
        Self {
            cache: EngineCache::new(builder),
            pipeline: Pipeline::new(resolver.clone(), waf_config.server_port),
            resolver,
        }
    }

    /// Profile selected by the request headers.
    pub fn resolve_profile(&self, headers: &HeaderMap) -> ProfileId {
        self.resolver.resolve(headers)
    }

    /// Evaluate a request against the engine of `profile`.
    pub async fn inspect(
        &self,
        profile: &ProfileId,
        request: InspectionRequest<'_>,
    ) -> WafResult<Verdict> {
        let start = Instant::now();
        let engine = self.cache.get(profile).await?;
        let verdict = self.pipeline.run(&engine, &request);

        if let Verdict::Interrupt { status, rule_id, .. } = &verdict {
            tracing::info!(
                profile = %profile,
                client = %request.client_addr,
                rule_id,
                status,
                "Request interrupted"
            );
        }
        metrics::record_inspection(verdict.label(), start);
        Ok(verdict)
    }

    /// Drop the cached engine of `profile`.
    pub fn invalidate_profile(&self, profile: &ProfileId) -> WafResult<()> {
        self.cache.invalidate(profile)
    }

    pub fn cache(&self) -> &EngineCache {
        &self.cache
    }

    pub fn resolver(&self) -> &ProfileResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRuleStore;
    use axum::http::HeaderValue;

    fn inspector(store: &MemoryRuleStore) -> Inspector {
        let store_config = StoreConfig {
            key_prefix: "RULE".into(),
            ..StoreConfig::default()
        };
        Inspector::new(Arc::new(store.clone()), &store_config, &WafConfig::default())
    }

    fn request<'a>(headers: &'a HeaderMap) -> InspectionRequest<'a> {
        InspectionRequest {
            client_addr: "192.0.2.10",
            client_port: 51000,
            host: "acme.example",
            headers,
        }
    }

    #[tokio::test]
    async fn test_profile_without_rules_continues() {
        let store = MemoryRuleStore::new();
        let inspector = inspector(&store);
        let acme = ProfileId::new("acme").unwrap();

        let headers = HeaderMap::new();
        let verdict = inspector.inspect(&acme, request(&headers)).await.unwrap();
        assert_eq!(verdict, Verdict::Continue);
        assert!(inspector.cache().contains(&acme));
    }

    #[tokio::test]
    async fn test_blocking_rule_interrupts() {
        let store = MemoryRuleStore::new();
        store.insert(
            "RULE:acme:1",
            r#"SecRule REQUEST_HEADERS:X-Attack "@streq 1" "id:1,phase:2,deny,status:403,msg:'blocked'""#,
        );
        let inspector = inspector(&store);

        let mut headers = HeaderMap::new();
        headers.insert("x-waf-profile", HeaderValue::from_static("acme"));
        headers.insert("x-attack", HeaderValue::from_static("1"));
        let profile = inspector.resolve_profile(&headers);
        assert_eq!(profile.as_str(), "acme");

        let verdict = inspector.inspect(&profile, request(&headers)).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Interrupt {
                status: 403,
                body: "blocked".into(),
                rule_id: 1
            }
        );

        // The default profile has no rules.
        let default = inspector.resolve_profile(&HeaderMap::new());
        let verdict = inspector.inspect(&default, request(&headers)).await.unwrap();
        assert_eq!(verdict, Verdict::Continue);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_profile() {
        let inspector = inspector(&MemoryRuleStore::new());
        let acme = ProfileId::new("acme").unwrap();
        assert!(inspector.invalidate_profile(&acme).is_ok());
        assert!(inspector.invalidate_profile(&acme).is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_error() {
        let store = MemoryRuleStore::new();
        store.set_scan_failure(true);
        let inspector = inspector(&store);
        let acme = ProfileId::new("acme").unwrap();

        let headers = HeaderMap::new();
        let err = inspector.inspect(&acme, request(&headers)).await.unwrap_err();
        assert!(matches!(err, WafError::StoreUnavailable { .. }));
    }
}
