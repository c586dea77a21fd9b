//! Compiled rule representation and matching.

use regex::Regex;
use std::borrow::Cow;
use std::net::IpAddr;

use crate::engine::transaction::TransactionData;
use crate::engine::{CompileErrorKind, Phase};

/// A request field a rule inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    RemoteAddr,
    RemotePort,
    ServerName,
    ServerPort,
    /// All header values, or only those of the named header.
    RequestHeaders(Option<String>),
    RequestHeadersNames,
}

impl Variable {
    /// Parse a `|`-separated variable list such as `REQUEST_HEADERS:User-Agent|REMOTE_ADDR`.
    pub fn parse_list(raw: &str) -> Result<Vec<Variable>, CompileErrorKind> {
        raw.split('|').map(|v| Self::parse(v.trim())).collect()
    }

    fn parse(raw: &str) -> Result<Variable, CompileErrorKind> {
        let (name, selector) = match raw.split_once(':') {
            Some((n, s)) => (n, Some(s)),
            None => (raw, None),
        };
        let variable = match (name.to_ascii_uppercase().as_str(), selector) {
            ("REMOTE_ADDR", None) => Variable::RemoteAddr,
            ("REMOTE_PORT", None) => Variable::RemotePort,
            ("SERVER_NAME", None) => Variable::ServerName,
            ("SERVER_PORT", None) => Variable::ServerPort,
            ("REQUEST_HEADERS_NAMES", None) => Variable::RequestHeadersNames,
            ("REQUEST_HEADERS", None) => Variable::RequestHeaders(None),
            ("REQUEST_HEADERS", Some(header)) if !header.is_empty() => {
                Variable::RequestHeaders(Some(header.to_ascii_lowercase()))
            }
            _ => return Err(CompileErrorKind::UnknownVariable(raw.to_string())),
        };
        Ok(variable)
    }

    /// Earliest phase at which this variable carries data.
    pub fn available_from(&self) -> Phase {
        match self {
            Variable::RemoteAddr
            | Variable::RemotePort
            | Variable::ServerName
            | Variable::ServerPort => Phase::Connection,
            Variable::RequestHeaders(_) | Variable::RequestHeadersNames => Phase::RequestHeaders,
        }
    }

    fn collect<'a>(&self, data: &'a TransactionData) -> Vec<Cow<'a, str>> {
        match self {
            Variable::RemoteAddr => vec![Cow::Borrowed(data.client_addr.as_str())],
            Variable::RemotePort => vec![Cow::Owned(data.client_port.to_string())],
            Variable::ServerName => vec![Cow::Borrowed(data.server_name.as_str())],
            Variable::ServerPort => vec![Cow::Owned(data.server_port.to_string())],
            Variable::RequestHeaders(None) => data
                .headers
                .iter()
                .map(|(_, v)| Cow::Borrowed(v.as_str()))
                .collect(),
            Variable::RequestHeaders(Some(name)) => data
                .headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| Cow::Borrowed(v.as_str()))
                .collect(),
            Variable::RequestHeadersNames => data
                .headers
                .iter()
                .map(|(k, _)| Cow::Borrowed(k.as_str()))
                .collect(),
        }
    }
}

/// An operator test, optionally negated with `!`.
#[derive(Debug, Clone)]
pub struct Operator {
    kind: OperatorKind,
    negated: bool,
}

#[derive(Debug, Clone)]
enum OperatorKind {
    Rx(Regex),
    StrEq(String),
    Contains(String),
    BeginsWith(String),
    EndsWith(String),
    Pm(Vec<String>),
    IpMatch(Vec<IpRange>),
    Eq(i64),
}

impl Operator {
    /// Parse an operator expression such as `@rx ^curl` or `!@streq 1`.
    /// A bare pattern without `@name` is a regular expression.
    pub fn parse(raw: &str) -> Result<Operator, CompileErrorKind> {
        let (negated, rest) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let (name, arg) = match rest.strip_prefix('@') {
            Some(body) => match body.split_once(char::is_whitespace) {
                Some((name, arg)) => (name, arg.trim_start()),
                None => (body, ""),
            },
            None => ("rx", rest),
        };

        let kind = match name {
            "rx" => OperatorKind::Rx(
                Regex::new(arg).map_err(|e| CompileErrorKind::InvalidRegex(e.to_string()))?,
            ),
            "streq" => OperatorKind::StrEq(arg.to_string()),
            "contains" => OperatorKind::Contains(arg.to_string()),
            "beginsWith" => OperatorKind::BeginsWith(arg.to_string()),
            "endsWith" => OperatorKind::EndsWith(arg.to_string()),
            "pm" => OperatorKind::Pm(
                arg.split_whitespace()
                    .map(|p| p.to_lowercase())
                    .collect(),
            ),
            "ipMatch" => OperatorKind::IpMatch(
                arg.split(',')
                    .map(|r| IpRange::parse(r.trim()))
                    .collect::<Result<_, _>>()?,
            ),
            "eq" => OperatorKind::Eq(arg.trim().parse().map_err(|_| {
                CompileErrorKind::InvalidArgument {
                    what: "@eq",
                    value: arg.to_string(),
                }
            })?),
            other => return Err(CompileErrorKind::UnknownOperator(other.to_string())),
        };

        Ok(Operator { kind, negated })
    }

    fn test(&self, value: &str) -> bool {
        let hit = match &self.kind {
            OperatorKind::Rx(re) => re.is_match(value),
            OperatorKind::StrEq(s) => value == s,
            OperatorKind::Contains(s) => value.contains(s.as_str()),
            OperatorKind::BeginsWith(s) => value.starts_with(s.as_str()),
            OperatorKind::EndsWith(s) => value.ends_with(s.as_str()),
            OperatorKind::Pm(phrases) => {
                let lowered = value.to_lowercase();
                phrases.iter().any(|p| lowered.contains(p.as_str()))
            }
            OperatorKind::IpMatch(ranges) => match value.parse::<IpAddr>() {
                Ok(ip) => ranges.iter().any(|r| r.contains(ip)),
                Err(_) => false,
            },
            OperatorKind::Eq(n) => value.trim().parse::<i64>().map_or(false, |v| v == *n),
        };
        hit != self.negated
    }
}

/// An address block given as `a.b.c.d`, `a.b.c.d/n` or the IPv6 equivalents.
#[derive(Debug, Clone, Copy)]
struct IpRange {
    addr: IpAddr,
    prefix: u8,
}

impl IpRange {
    fn parse(raw: &str) -> Result<IpRange, CompileErrorKind> {
        let invalid = || CompileErrorKind::InvalidArgument {
            what: "@ipMatch",
            value: raw.to_string(),
        };
        let (addr, prefix) = match raw.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (raw, None),
        };
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max).ok_or_else(invalid)?,
            None => max,
        };
        Ok(IpRange { addr, prefix })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

/// Value transformation applied before the operator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    Lowercase,
    Uppercase,
    Trim,
    UrlDecode,
}

impl Transformation {
    fn apply<'a>(&self, value: Cow<'a, str>) -> Cow<'a, str> {
        match self {
            Transformation::Lowercase => Cow::Owned(value.to_lowercase()),
            Transformation::Uppercase => Cow::Owned(value.to_uppercase()),
            Transformation::Trim => match value {
                Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
                Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
            },
            Transformation::UrlDecode => Cow::Owned(url_decode(&value)),
        }
    }
}

fn url_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                out.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// What happens when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disruptive {
    Deny,
    Pass,
}

/// A single compiled `SecRule` or `SecAction`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: u64,
    pub phase: Phase,
    /// Empty for `SecAction`, which always matches.
    pub variables: Vec<Variable>,
    pub operator: Option<Operator>,
    pub transformations: Vec<Transformation>,
    pub disruptive: Disruptive,
    pub status: u16,
    pub msg: Option<String>,
    pub log: bool,
}

impl Rule {
    /// Evaluate the rule against the data collected so far.
    pub fn matches(&self, data: &TransactionData) -> bool {
        let operator = match &self.operator {
            Some(op) => op,
            None => return true,
        };
        self.variables.iter().any(|variable| {
            variable.collect(data).into_iter().any(|value| {
                let value = self
                    .transformations
                    .iter()
                    .fold(value, |v, t| t.apply(v));
                operator.test(&value)
            })
        })
    }
}

/// Parsed action list of a rule, before it is combined with its target.
#[derive(Debug, Default)]
pub struct Actions {
    pub id: Option<u64>,
    pub phase: Option<Phase>,
    pub disruptive: Option<Disruptive>,
    pub status: Option<u16>,
    pub msg: Option<String>,
    pub transformations: Vec<Transformation>,
    pub log: Option<bool>,
}

impl Actions {
    /// Parse `id:1,phase:2,deny,status:403,msg:'blocked'`.
    pub fn parse(raw: &str) -> Result<Actions, CompileErrorKind> {
        let mut actions = Actions::default();
        for item in split_actions(raw)? {
            let (name, value) = match item.split_once(':') {
                Some((n, v)) => (n.trim(), Some(unquote(v.trim()))),
                None => (item.trim(), None),
            };
            let invalid = |what: &'static str, value: &str| CompileErrorKind::InvalidArgument {
                what,
                value: value.to_string(),
            };
            match (name, value) {
                ("id", Some(v)) => {
                    actions.id = Some(v.parse().map_err(|_| invalid("id", v))?);
                }
                ("phase", Some(v)) => {
                    actions.phase = Some(match v {
                        "1" | "connection" => Phase::Connection,
                        "2" | "request_headers" | "request" => Phase::RequestHeaders,
                        _ => return Err(invalid("phase", v)),
                    });
                }
                ("status", Some(v)) => {
                    let status: u16 = v.parse().map_err(|_| invalid("status", v))?;
                    if !(100..=599).contains(&status) {
                        return Err(invalid("status", v));
                    }
                    actions.status = Some(status);
                }
                ("msg", Some(v)) => actions.msg = Some(v.to_string()),
                ("t", Some(v)) => match v {
                    "none" => actions.transformations.clear(),
                    "lowercase" => actions.transformations.push(Transformation::Lowercase),
                    "uppercase" => actions.transformations.push(Transformation::Uppercase),
                    "trim" => actions.transformations.push(Transformation::Trim),
                    "urlDecode" => actions.transformations.push(Transformation::UrlDecode),
                    _ => return Err(invalid("t", v)),
                },
                ("deny", None) | ("block", None) => actions.disruptive = Some(Disruptive::Deny),
                ("pass", None) => actions.disruptive = Some(Disruptive::Pass),
                ("log", None) => actions.log = Some(true),
                ("nolog", None) => actions.log = Some(false),
                ("", None) => {}
                _ => return Err(CompileErrorKind::UnknownAction(item.trim().to_string())),
            }
        }
        Ok(actions)
    }
}

/// Split on commas that are not inside single quotes.
fn split_actions(raw: &str) -> Result<Vec<&str>, CompileErrorKind> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in raw.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                items.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return Err(CompileErrorKind::UnterminatedQuote);
    }
    items.push(&raw[start..]);
    Ok(items)
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with_headers(headers: &[(&str, &str)]) -> TransactionData {
        TransactionData {
            client_addr: "10.1.2.3".into(),
            client_port: 0,
            server_name: "example.com".into(),
            server_port: 443,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_variable_parsing() {
        let vars = Variable::parse_list("REQUEST_HEADERS:X-Attack|REMOTE_ADDR").unwrap();
        assert_eq!(
            vars,
            vec![
                Variable::RequestHeaders(Some("x-attack".into())),
                Variable::RemoteAddr
            ]
        );
        assert!(matches!(
            Variable::parse_list("ARGS"),
            Err(CompileErrorKind::UnknownVariable(_))
        ));
        assert!(Variable::parse_list("REMOTE_ADDR:foo").is_err());
    }

    #[test]
    fn test_operators() {
        assert!(Operator::parse("@streq 1").unwrap().test("1"));
        assert!(!Operator::parse("@streq 1").unwrap().test("10"));
        assert!(Operator::parse("!@streq 1").unwrap().test("10"));
        assert!(Operator::parse("^curl/").unwrap().test("curl/8.0"));
        assert!(Operator::parse("@contains select").unwrap().test("union select"));
        assert!(Operator::parse("@beginsWith /admin").unwrap().test("/admin/x"));
        assert!(Operator::parse("@endsWith .php").unwrap().test("index.php"));
        assert!(Operator::parse("@pm sqlmap nikto").unwrap().test("Nikto/2.1"));
        assert!(Operator::parse("@eq 443").unwrap().test("443"));
        assert!(matches!(
            Operator::parse("@nope x"),
            Err(CompileErrorKind::UnknownOperator(_))
        ));
        assert!(matches!(
            Operator::parse("@rx ("),
            Err(CompileErrorKind::InvalidRegex(_))
        ));
    }

    #[test]
    fn test_ip_match() {
        let op = Operator::parse("@ipMatch 10.0.0.0/8,192.168.1.1,::1").unwrap();
        assert!(op.test("10.255.0.1"));
        assert!(op.test("192.168.1.1"));
        assert!(!op.test("192.168.1.2"));
        assert!(op.test("::1"));
        assert!(!op.test("not-an-ip"));
        assert!(Operator::parse("@ipMatch 10.0.0.0/33").is_err());

        let all = Operator::parse("@ipMatch 0.0.0.0/0").unwrap();
        assert!(all.test("8.8.8.8"));
    }

    #[test]
    fn test_transformations() {
        assert_eq!(url_decode("a%20b+c%zz"), "a b c%zz");
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%+4%-1"), "%+4%-1");
        assert_eq!(url_decode("%3c%3E"), "<>");
        let t = Transformation::Trim.apply(Cow::Borrowed("  x "));
        assert_eq!(t, "x");
    }

    #[test]
    fn test_actions_parsing() {
        let actions =
            Actions::parse("id:10,phase:1,deny,status:451,msg:'blocked, really',t:lowercase")
                .unwrap();
        assert_eq!(actions.id, Some(10));
        assert_eq!(actions.phase, Some(Phase::Connection));
        assert_eq!(actions.disruptive, Some(Disruptive::Deny));
        assert_eq!(actions.status, Some(451));
        assert_eq!(actions.msg.as_deref(), Some("blocked, really"));
        assert_eq!(actions.transformations, vec![Transformation::Lowercase]);

        assert!(matches!(
            Actions::parse("id:1,explode"),
            Err(CompileErrorKind::UnknownAction(_))
        ));
        assert!(Actions::parse("id:1,status:99").is_err());
        assert!(matches!(
            Actions::parse("msg:'open"),
            Err(CompileErrorKind::UnterminatedQuote)
        ));
    }

    #[test]
    fn test_rule_matches_named_header_case_insensitively() {
        let rule = Rule {
            id: 1,
            phase: Phase::RequestHeaders,
            variables: Variable::parse_list("REQUEST_HEADERS:X-Attack").unwrap(),
            operator: Some(Operator::parse("@streq 1").unwrap()),
            transformations: vec![],
            disruptive: Disruptive::Deny,
            status: 403,
            msg: None,
            log: true,
        };
        assert!(rule.matches(&data_with_headers(&[("x-attack", "1")])));
        assert!(!rule.matches(&data_with_headers(&[("x-attack", "0")])));
        assert!(!rule.matches(&data_with_headers(&[])));
    }
}
