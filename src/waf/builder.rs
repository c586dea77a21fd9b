//! Engine construction from stored rule fragments.

use std::sync::Arc;

use crate::config::{EmptyRulesetPolicy, StoreConfig, WafConfig};
use crate::engine::{compile, Engine};
use crate::observability::metrics;
use crate::store::{profile_prefix, RuleStore};
use crate::waf::types::{ProfileId, WafError, WafResult};

/// Fetches a profile's directives from the rule store and compiles them.
#[derive(Clone)]
pub struct EngineBuilder {
    store: Arc<dyn RuleStore>,
    key_prefix: String,
    empty_ruleset: EmptyRulesetPolicy,
    empty_ruleset_status: u16,
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn RuleStore>, store_config: &StoreConfig, waf_config: &WafConfig) -> Self {
        Self {
            store,
            key_prefix: store_config.key_prefix.clone(),
            empty_ruleset: waf_config.empty_ruleset,
            empty_ruleset_status: waf_config.empty_ruleset_status,
        }
    }

    /// Scan, fetch and compile the rule set of `profile`.
    ///
    /// A failed scan aborts the build. A key that cannot be fetched is
    /// skipped and the build continues with the remaining fragments.
    pub async fn build(&self, profile: &ProfileId) -> WafResult<Engine> {
        let prefix = profile_prefix(&self.key_prefix, profile.as_str());

        let keys = match self.store.scan_prefix(&prefix).await {
            Ok(keys) => keys,
            Err(source) => {
                tracing::error!(profile = %profile, error = %source, "Failed to scan rule keys");
                metrics::record_engine_build("store_error");
                return Err(WafError::StoreUnavailable {
                    profile: profile.clone(),
                    source,
                });
            }
        };

        let mut directives = String::new();
        let mut fragments = 0usize;
        for key in &keys {
            match self.store.get(key).await {
                Ok(Some(rules)) => {
                    directives.push_str(&rules);
                    directives.push('\n');
                    fragments += 1;
                }
                Ok(None) => {
                    tracing::warn!(profile = %profile, key = %key, "Rule key vanished before fetch, skipping");
                    metrics::record_partial_fetch();
                }
                Err(e) => {
                    tracing::warn!(profile = %profile, key = %key, error = %e, "Failed to fetch rules, skipping");
                    metrics::record_partial_fetch();
                }
            }
        }

        if fragments == 0 && self.empty_ruleset == EmptyRulesetPolicy::Deny {
            tracing::warn!(profile = %profile, "No rules stored for profile, denying all requests");
            directives = deny_all_directive(self.empty_ruleset_status);
        }

        tracing::debug!(
            profile = %profile,
            keys = keys.len(),
            fragments,
            rules = %directives,
            "Compiling profile rules"
        );

        match compile(&directives) {
            Ok(engine) => {
                metrics::record_engine_build("ok");
                tracing::info!(
                    profile = %profile,
                    rules = engine.rule_count(),
                    mode = %engine.mode(),
                    "Engine built"
                );
                Ok(engine)
            }
            Err(source) => {
                tracing::error!(profile = %profile, error = %source, "Failed to compile rules");
                metrics::record_engine_build("compile_error");
                Err(WafError::CompileFailed {
                    profile: profile.clone(),
                    source,
                })
            }
        }
    }
}

fn deny_all_directive(status: u16) -> String {
    format!(
        "SecAction \"id:1,phase:1,deny,status:{},msg:'no rules configured for profile'\"\n",
        status
    )
}
