//! Rule engine.
//!
//! # Data Flow
//! ```text
//! directive text
//!     → parser.rs (logical lines, quoted arguments)
//!     → compile() (SecRuleEngine / SecRule / SecAction → Rule)
//!     → Engine (immutable, shared via Arc)
//!     → Engine::new_transaction() per request
//!     → transaction.rs (connection phase, header phase → Interruption?)
//! ```
//!
//! # Design Decisions
//! - An engine is never mutated after compilation; transactions only read it
//! - Rules run in directive order, first disruptive match wins
//! - Empty directive text compiles to an engine that matches nothing

pub mod parser;
pub mod rule;
pub mod transaction;

use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use self::parser::logical_lines;
use self::rule::{Actions, Disruptive, Operator, Rule, Variable};

pub use self::transaction::{Interruption, Transaction};

/// Evaluation checkpoint a rule is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Client and destination addresses are known.
    Connection,
    /// All request headers have been added.
    RequestHeaders,
}

/// `SecRuleEngine` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    #[default]
    On,
    DetectionOnly,
    Off,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::On => write!(f, "On"),
            EngineMode::DetectionOnly => write!(f, "DetectionOnly"),
            EngineMode::Off => write!(f, "Off"),
        }
    }
}

/// Why a directive failed to compile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("unknown directive '{0}'")]
    UnknownDirective(String),

    #[error("{0}")]
    MissingArgument(&'static str),

    #[error("unterminated quoted string")]
    UnterminatedQuote,

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown operator '@{0}'")]
    UnknownOperator(String),

    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid {what} value '{value}'")]
    InvalidArgument { what: &'static str, value: String },

    #[error("rule is missing an id action")]
    MissingId,

    #[error("duplicate rule id {0}")]
    DuplicateId(u64),

    #[error("invalid SecRuleEngine mode '{0}'")]
    InvalidEngineMode(String),
}

/// Compile failure with the line it occurred on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct CompileError {
    pub line: usize,
    pub kind: CompileErrorKind,
}

/// A compiled, immutable rule set.
#[derive(Debug, Default)]
pub struct Engine {
    mode: EngineMode,
    rules: Vec<Rule>,
}

impl Engine {
    /// Start a new evaluation bound to this engine.
    pub fn new_transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Compile directive text into an [`Engine`].
pub fn compile(text: &str) -> Result<Engine, CompileError> {
    let lines = logical_lines(text).map_err(|(line, kind)| CompileError { line, kind })?;

    let mut engine = Engine::default();
    let mut ids = HashSet::new();

    for logical in lines {
        let at = |kind| CompileError {
            line: logical.line,
            kind,
        };
        let args = &logical.args;

        let directive = args[0].as_str();
        if directive.eq_ignore_ascii_case("SecRuleEngine") {
            let mode = args
                .get(1)
                .ok_or_else(|| at(CompileErrorKind::MissingArgument("SecRuleEngine needs a mode")))?;
            engine.mode = match mode.to_ascii_lowercase().as_str() {
                "on" => EngineMode::On,
                "off" => EngineMode::Off,
                "detectiononly" => EngineMode::DetectionOnly,
                _ => return Err(at(CompileErrorKind::InvalidEngineMode(mode.clone()))),
            };
        } else if directive.eq_ignore_ascii_case("SecRule") {
            if args.len() < 3 {
                return Err(at(CompileErrorKind::MissingArgument(
                    "SecRule needs variables and an operator",
                )));
            }
            let variables = Variable::parse_list(&args[1]).map_err(at)?;
            let operator = Operator::parse(&args[2]).map_err(at)?;
            let actions = Actions::parse(args.get(3).map(String::as_str).unwrap_or(""))
                .map_err(at)?;
            let rule = build_rule(Some(variables), Some(operator), actions).map_err(at)?;
            if rule.phase == Phase::Connection
                && rule
                    .variables
                    .iter()
                    .any(|v| v.available_from() == Phase::RequestHeaders)
            {
                tracing::warn!(
                    rule_id = rule.id,
                    line = logical.line,
                    "Phase 1 rule inspects request headers, which are empty at that phase"
                );
            }
            if !ids.insert(rule.id) {
                return Err(at(CompileErrorKind::DuplicateId(rule.id)));
            }
            engine.rules.push(rule);
        } else if directive.eq_ignore_ascii_case("SecAction") {
            let raw = args
                .get(1)
                .ok_or_else(|| at(CompileErrorKind::MissingArgument("SecAction needs actions")))?;
            let actions = Actions::parse(raw).map_err(at)?;
            let rule = build_rule(None, None, actions).map_err(at)?;
            if !ids.insert(rule.id) {
                return Err(at(CompileErrorKind::DuplicateId(rule.id)));
            }
            engine.rules.push(rule);
        } else {
            return Err(at(CompileErrorKind::UnknownDirective(directive.to_string())));
        }
    }

    Ok(engine)
}

fn build_rule(
    variables: Option<Vec<Variable>>,
    operator: Option<Operator>,
    actions: Actions,
) -> Result<Rule, CompileErrorKind> {
    let id = actions.id.ok_or(CompileErrorKind::MissingId)?;
    let disruptive = actions.disruptive.unwrap_or(Disruptive::Pass);
    Ok(Rule {
        id,
        phase: actions.phase.unwrap_or(Phase::RequestHeaders),
        variables: variables.unwrap_or_default(),
        operator,
        transformations: actions.transformations,
        disruptive,
        status: actions.status.unwrap_or(403),
        msg: actions.msg,
        log: actions.log.unwrap_or(true),
    })
}
