//! Table-driven signal extraction.
//!
//! [`RuleParser`] interprets one [`ParserRules`] table. All regexes are
//! compiled up front so `parse` itself cannot fail: a pattern that does not
//! match leaves its field absent, and only a missing symbol or direction
//! makes the whole parse return `None`.

use regex::{Regex, RegexBuilder};

use crate::domain::error::SigtraderError;
use crate::domain::parser::rules::ParserRules;
use crate::domain::parser::{parse_price, parse_price_list};
use crate::domain::signal::{normalize_symbol, Entry, ParseMethod, Side, Signal};
use crate::domain::validator::{score, ValidationPolicy};

/// Raw captures that are never a symbol even when a pattern grabs them.
const SYMBOL_STOPWORDS: &[&str] = &[
    "long", "short", "buy", "sell", "entry", "target", "targets", "stop", "stoploss", "lev",
    "leverage", "here", "zone",
];

/// Longest reason text carried on a signal.
const MAX_REASON_CHARS: usize = 200;

pub struct RuleParser {
    rules: ParserRules,
    gates: Vec<Regex>,
    symbols: Vec<Regex>,
    long_words: Regex,
    short_words: Regex,
    zones: Vec<Regex>,
    entries: Vec<Regex>,
    target_levels: Vec<Regex>,
    target_lists: Vec<Regex>,
    stops: Vec<Regex>,
    leverages: Vec<Regex>,
    reasons: Vec<Regex>,
}

fn compile(pattern: &str) -> Result<Regex, SigtraderError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SigtraderError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, SigtraderError> {
    patterns.iter().map(|p| compile(p)).collect()
}

fn compile_words(words: &[&str]) -> Result<Regex, SigtraderError> {
    compile(&format!(r"\b(?:{})\b", words.join("|")))
}

impl RuleParser {
    pub fn new(rules: ParserRules) -> Result<Self, SigtraderError> {
        Ok(RuleParser {
            gates: compile_all(&rules.gates)?,
            symbols: compile_all(&rules.symbols)?,
            long_words: compile_words(&rules.long_words)?,
            short_words: compile_words(&rules.short_words)?,
            zones: compile_all(&rules.zones)?,
            entries: compile_all(&rules.entries)?,
            target_levels: compile_all(&rules.target_levels)?,
            target_lists: compile_all(&rules.target_lists)?,
            stops: compile_all(&rules.stops)?,
            leverages: compile_all(&rules.leverages)?,
            reasons: compile_all(&rules.reasons)?,
            rules,
        })
    }

    pub fn id(&self) -> &'static str {
        self.rules.id
    }

    pub fn priority(&self) -> u8 {
        self.rules.priority
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.rules.policy
    }

    pub fn can_parse(&self, text: &str) -> bool {
        self.gates.iter().any(|g| g.is_match(text))
    }

    pub fn parse(&self, text: &str, trader: &str) -> Option<Signal> {
        let symbol = self.extract_symbol(text)?;
        let side = self.extract_side(text)?;

        let mut signal = Signal::draft(symbol, side, trader, ParseMethod::Rule, self.rules.id);
        signal.entry = self.extract_entry(text);
        signal.targets = self.extract_targets(text);
        signal.stop = self.extract_stop(text);
        signal.leverage = self.extract_leverage(text);
        signal.reason = self.extract_reason(text);
        signal.confidence = score(&signal, &self.rules.weights);
        Some(signal)
    }

    fn extract_symbol(&self, text: &str) -> Option<String> {
        for pattern in &self.symbols {
            for caps in pattern.captures_iter(text) {
                let Some(raw) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                if SYMBOL_STOPWORDS.contains(&raw.to_lowercase().as_str()) {
                    continue;
                }
                if let Some(symbol) = normalize_symbol(raw) {
                    return Some(symbol);
                }
            }
        }
        None
    }

    fn extract_side(&self, text: &str) -> Option<Side> {
        let long_at = self.long_words.find(text).map(|m| m.start());
        let short_at = self.short_words.find(text).map(|m| m.start());
        match (long_at, short_at) {
            (Some(l), Some(s)) if l <= s => Some(Side::Long),
            (Some(_), Some(_)) => Some(Side::Short),
            (Some(_), None) => Some(Side::Long),
            (None, Some(_)) => Some(Side::Short),
            (None, None) => None,
        }
    }

    fn extract_entry(&self, text: &str) -> Option<Entry> {
        for pattern in &self.zones {
            if let Some(caps) = pattern.captures(text) {
                let low = caps.get(1).and_then(|m| parse_price(m.as_str()));
                let high = caps.get(2).and_then(|m| parse_price(m.as_str()));
                if let (Some(low), Some(high)) = (low, high) {
                    return Some(Entry::zone(low, high));
                }
            }
        }
        for pattern in &self.entries {
            if let Some(caps) = pattern.captures(text) {
                if let Some(price) = caps.get(1).and_then(|m| parse_price(m.as_str())) {
                    return Some(Entry::Single(price));
                }
            }
        }
        None
    }

    fn extract_targets(&self, text: &str) -> Vec<f64> {
        for pattern in &self.target_levels {
            let mut targets = Vec::new();
            for caps in pattern.captures_iter(text) {
                if let Some(price) = caps.get(1).and_then(|m| parse_price(m.as_str())) {
                    if !targets.iter().any(|t: &f64| (t - price).abs() < f64::EPSILON) {
                        targets.push(price);
                    }
                }
            }
            if !targets.is_empty() {
                return targets;
            }
        }
        for pattern in &self.target_lists {
            if let Some(caps) = pattern.captures(text) {
                if let Some(list) = caps.get(1) {
                    let targets = parse_price_list(list.as_str());
                    if !targets.is_empty() {
                        return targets;
                    }
                }
            }
        }
        Vec::new()
    }

    fn extract_stop(&self, text: &str) -> Option<f64> {
        for pattern in &self.stops {
            if let Some(caps) = pattern.captures(text) {
                if let Some(price) = caps.get(1).and_then(|m| parse_price(m.as_str())) {
                    return Some(price);
                }
            }
        }
        None
    }

    fn extract_leverage(&self, text: &str) -> Option<u32> {
        for pattern in &self.leverages {
            if let Some(caps) = pattern.captures(text) {
                if let Some(lev) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                    if lev > 0 {
                        return Some(lev);
                    }
                }
            }
        }
        None
    }

    fn extract_reason(&self, text: &str) -> Option<String> {
        for pattern in &self.reasons {
            if let Some(caps) = pattern.captures(text) {
                if let Some(m) = caps.get(1) {
                    let reason: String = m.as_str().trim().chars().take(MAX_REASON_CHARS).collect();
                    if !reason.is_empty() {
                        return Some(reason);
                    }
                }
            }
        }
        None
    }
}
