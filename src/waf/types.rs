//! Profile, verdict and error definitions.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

use crate::engine::{CompileError, Interruption};
use crate::store::StoreError;

/// Identifier of a tenant rule set. Case-sensitive, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    /// Wrap a raw identifier. Returns `None` for an empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ProfileId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Outcome of inspecting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request may proceed.
    Continue,
    /// The request must be answered with `status` and `body`.
    Interrupt {
        status: u16,
        body: String,
        rule_id: u64,
    },
}

impl Verdict {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Verdict::Interrupt { .. })
    }

    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Continue => "continue",
            Verdict::Interrupt { .. } => "interrupt",
        }
    }
}

impl From<Interruption> for Verdict {
    fn from(it: Interruption) -> Self {
        Verdict::Interrupt {
            status: it.status,
            body: it.data,
            rule_id: it.rule_id,
        }
    }
}

/// Errors that abort an engine build.
///
/// Never cached: the next lookup for the profile retries the build.
#[derive(Debug, Error)]
pub enum WafError {
    /// Listing or reading rule keys failed.
    #[error("rule store unavailable for profile '{profile}': {source}")]
    StoreUnavailable {
        profile: ProfileId,
        #[source]
        source: StoreError,
    },

    /// The concatenated directives did not compile.
    #[error("rules of profile '{profile}' failed to compile: {source}")]
    CompileFailed {
        profile: ProfileId,
        #[source]
        source: CompileError,
    },
}

/// Result type for WAF operations.
pub type WafResult<T> = Result<T, WafError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_id_rejects_empty() {
        assert!(ProfileId::new("").is_none());
        let p = ProfileId::new("Acme").unwrap();
        assert_eq!(p.as_str(), "Acme");
        assert_ne!(Some(p), ProfileId::new("acme"));
    }

    #[test]
    fn test_verdict_from_interruption() {
        let verdict = Verdict::from(Interruption {
            rule_id: 9,
            status: 403,
            data: "nope".into(),
        });
        assert!(verdict.is_interrupt());
        assert_eq!(verdict.label(), "interrupt");
        assert_eq!(
            verdict,
            Verdict::Interrupt {
                status: 403,
                body: "nope".into(),
                rule_id: 9
            }
        );
    }
}
