//! Signal parsers.
//!
//! Every parser shares one contract: a cheap `can_parse` gate and a `parse`
//! that returns a draft [`Signal`] or nothing. Specialized parsers are
//! table-driven ([`RuleParser`] interpreting a per-source [`ParserRules`]
//! table); the [`GenericParser`] is the looser source-agnostic fallback. The
//! dispatcher tries them in priority order and the first structurally valid
//! draft wins.

pub mod extract;
pub mod generic;
pub mod rules;

pub use extract::RuleParser;
pub use generic::{GenericParser, GENERIC_PARSER_ID};
pub use rules::ParserRules;

use crate::domain::error::SigtraderError;
use crate::domain::signal::Signal;
use crate::domain::validator::ValidationPolicy;

/// The parser variants behind one dispatch surface.
pub enum SignalParser {
    Rules(RuleParser),
    Generic(GenericParser),
}

impl SignalParser {
    pub fn id(&self) -> &'static str {
        match self {
            SignalParser::Rules(p) => p.id(),
            SignalParser::Generic(_) => GENERIC_PARSER_ID,
        }
    }

    /// Dispatch order; lower goes first. The generic fallback always sorts
    /// last.
    pub fn priority(&self) -> u8 {
        match self {
            SignalParser::Rules(p) => p.priority(),
            SignalParser::Generic(_) => u8::MAX,
        }
    }

    pub fn policy(&self) -> ValidationPolicy {
        match self {
            SignalParser::Rules(p) => p.policy(),
            SignalParser::Generic(p) => p.policy(),
        }
    }

    /// Cheap, side-effect-free check whether this parser recognizes the
    /// text's format.
    pub fn can_parse(&self, text: &str) -> bool {
        match self {
            SignalParser::Rules(p) => p.can_parse(text),
            SignalParser::Generic(p) => p.can_parse(text),
        }
    }

    /// Extract a draft signal. Internal extraction failures never escape:
    /// a field that cannot be read is simply absent, and a missing symbol or
    /// direction yields `None`.
    pub fn parse(&self, text: &str, trader: &str) -> Option<Signal> {
        match self {
            SignalParser::Rules(p) => p.parse(text, trader),
            SignalParser::Generic(p) => p.parse(text, trader),
        }
    }
}

/// Identifiers of the specialized rule parsers, in priority order.
pub const BUILTIN_PARSER_IDS: &[&str] = &[
    "trade-format-a",
    "trade-format-b",
    "zone-caller",
    "compact-caller",
];

/// Build the production parser set, priority-sorted, generic fallback last.
pub fn builtin_parsers() -> Result<Vec<SignalParser>, SigtraderError> {
    let mut parsers = vec![
        SignalParser::Rules(RuleParser::new(rules::trade_format_a())?),
        SignalParser::Rules(RuleParser::new(rules::trade_format_b())?),
        SignalParser::Rules(RuleParser::new(rules::zone_caller())?),
        SignalParser::Rules(RuleParser::new(rules::compact_caller())?),
    ];
    parsers.sort_by_key(|p| p.priority());
    parsers.push(SignalParser::Generic(GenericParser::new(
        ValidationPolicy::Strict,
    )?));
    Ok(parsers)
}

/// Parse one price token: `45000`, `45,000`, `$1.25`, `46k`, `1.2m`.
pub(crate) fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .trim_start_matches('$')
        .replace([',', '_'], "")
        .trim()
        .to_ascii_lowercase();

    let (digits, multiplier) = if let Some(stripped) = cleaned.strip_suffix('k') {
        (stripped.trim_end(), 1_000.0)
    } else if let Some(stripped) = cleaned.strip_suffix('m') {
        (stripped.trim_end(), 1_000_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };

    let value: f64 = digits.trim().parse().ok()?;
    let value = value * multiplier;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Parse a separated run of price tokens (`"46k / 47k, 48000"`), keeping the
/// caller's order and dropping duplicates and junk tokens.
pub(crate) fn parse_price_list(raw: &str) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::new();
    for token in raw.split(|c: char| {
        c.is_whitespace() || matches!(c, ',' | '/' | '|' | '&' | '-' | '–' | '—')
    }) {
        if token.is_empty() || !token.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Some(price) = parse_price(token) {
            if !out.iter().any(|p| (p - price).abs() < f64::EPSILON) {
                out.push(price);
            }
        }
    }
    out
}
