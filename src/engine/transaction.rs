//! Per-request evaluation state.

use crate::engine::rule::Disruptive;
use crate::engine::{Engine, EngineMode, Phase};

/// Request data gathered by a transaction, read by rule variables.
#[derive(Debug, Clone, Default)]
pub struct TransactionData {
    pub client_addr: String,
    pub client_port: u16,
    pub server_name: String,
    pub server_port: u16,
    pub headers: Vec<(String, String)>,
}

/// Instruction to block the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    /// Rule that triggered the interruption.
    pub rule_id: u64,
    /// HTTP status to answer with.
    pub status: u16,
    /// Response body.
    pub data: String,
}

/// One evaluation run of a request against an [`Engine`].
///
/// Borrowing the engine ties the transaction to exactly one compiled rule set
/// and guarantees it cannot outlive it.
pub struct Transaction<'e> {
    engine: &'e Engine,
    data: TransactionData,
    interruption: Option<Interruption>,
    matched: Vec<u64>,
}

impl<'e> Transaction<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            data: TransactionData::default(),
            interruption: None,
            matched: Vec::new(),
        }
    }

    /// Record connection details and evaluate phase 1.
    pub fn process_connection(
        &mut self,
        client_addr: &str,
        client_port: u16,
        server_host: &str,
        server_port: u16,
    ) -> Option<Interruption> {
        self.data.client_addr = client_addr.to_string();
        self.data.client_port = client_port;
        self.data.server_name = server_host.to_string();
        self.data.server_port = server_port;
        self.evaluate(Phase::Connection)
    }

    /// Append a request header. Header names keep their original case.
    pub fn add_request_header(&mut self, name: &str, value: &str) {
        self.data.headers.push((name.to_string(), value.to_string()));
    }

    /// Evaluate phase 2 against the headers added so far.
    pub fn process_request_headers(&mut self) -> Option<Interruption> {
        self.evaluate(Phase::RequestHeaders)
    }

    /// The interruption raised so far, if any.
    pub fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    /// Ids of every rule that matched, in evaluation order.
    pub fn matched_rules(&self) -> &[u64] {
        &self.matched
    }

    /// Headers the transaction has seen.
    pub fn request_headers(&self) -> &[(String, String)] {
        &self.data.headers
    }

    fn evaluate(&mut self, phase: Phase) -> Option<Interruption> {
        if self.interruption.is_some() {
            return self.interruption.clone();
        }
        if self.engine.mode() == EngineMode::Off {
            return None;
        }

        for rule in self.engine.rules().iter().filter(|r| r.phase == phase) {
            if !rule.matches(&self.data) {
                continue;
            }
            self.matched.push(rule.id);

            if rule.log {
                tracing::info!(
                    rule_id = rule.id,
                    phase = ?phase,
                    msg = rule.msg.as_deref().unwrap_or(""),
                    "Rule matched"
                );
            }

            if rule.disruptive != Disruptive::Deny {
                continue;
            }
            if self.engine.mode() == EngineMode::DetectionOnly {
                tracing::warn!(rule_id = rule.id, "Rule would block (detection only)");
                continue;
            }

            let interruption = Interruption {
                rule_id: rule.id,
                status: rule.status,
                data: rule.msg.clone().unwrap_or_default(),
            };
            self.interruption = Some(interruption.clone());
            return Some(interruption);
        }

        None
    }
}
