//! Canonical trading signal.
//!
//! Every parser, whatever its source format, produces this shape. The
//! dispatcher enriches it with a fingerprint and validation outcome before it
//! is persisted and (if valid) handed read-only to the simulation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short. Multiplies into PnL.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// Map a provider alias onto a side. Used when normalizing AI output.
    pub fn from_alias(raw: &str) -> Option<Side> {
        match raw.trim().to_lowercase().as_str() {
            "long" | "buy" | "bull" | "bullish" => Some(Side::Long),
            "short" | "sell" | "bear" | "bearish" => Some(Side::Short),
            _ => None,
        }
    }
}

/// Entry specification: a single price or a fill zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    Single(f64),
    Zone { low: f64, high: f64 },
}

impl Entry {
    /// Build a zone, swapping bounds if they arrive reversed. Equal bounds
    /// collapse to a single price.
    pub fn zone(a: f64, b: f64) -> Entry {
        if (a - b).abs() < f64::EPSILON {
            Entry::Single(a)
        } else if a < b {
            Entry::Zone { low: a, high: b }
        } else {
            Entry::Zone { low: b, high: a }
        }
    }

    pub fn average(&self) -> f64 {
        match self {
            Entry::Single(p) => *p,
            Entry::Zone { low, high } => (low + high) / 2.0,
        }
    }

    pub fn low(&self) -> f64 {
        match self {
            Entry::Single(p) => *p,
            Entry::Zone { low, .. } => *low,
        }
    }

    pub fn high(&self) -> f64 {
        match self {
            Entry::Single(p) => *p,
            Entry::Zone { high, .. } => *high,
        }
    }
}

/// How the signal was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMethod {
    /// A specialized rule parser matched the source format.
    Rule,
    /// The generic source-agnostic parser caught it.
    Fallback,
    /// The external AI parsing service extracted it.
    Ai,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Rule => "rule",
            ParseMethod::Fallback => "fallback",
            ParseMethod::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Normalized BASEQUOTE symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    pub side: Side,
    pub entry: Option<Entry>,
    /// Take-profit targets in the order the caller listed them.
    pub targets: Vec<f64>,
    pub stop: Option<f64>,
    pub leverage: Option<u32>,
    /// Free-text rationale, when the caller gave one.
    pub reason: Option<String>,
    /// 0-100. Field-weight score for rule/fallback parses, provider-supplied
    /// for AI parses.
    pub confidence: u8,
    pub method: ParseMethod,
    /// Identifier of the parser that produced the signal.
    pub parser_id: String,
    pub trader: String,
    pub source: Option<String>,
    /// Dedup hash over (trader, normalized text). Filled in by the dispatcher.
    pub fingerprint: String,
    pub received_at: DateTime<Utc>,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Signal {
    /// A draft as produced by a parser: structural fields only, not yet
    /// fingerprinted, validated, or scored.
    pub fn draft(symbol: String, side: Side, trader: &str, method: ParseMethod, parser_id: &str) -> Signal {
        Signal {
            symbol,
            side,
            entry: None,
            targets: Vec::new(),
            stop: None,
            leverage: None,
            reason: None,
            confidence: 0,
            method,
            parser_id: parser_id.to_string(),
            trader: trader.to_string(),
            source: None,
            fingerprint: String::new(),
            received_at: Utc::now(),
            is_valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Mean entry price, if an entry was extracted.
    pub fn entry_average(&self) -> Option<f64> {
        self.entry.map(|e| e.average())
    }
}

/// Quote assets recognized when normalizing symbols.
const QUOTE_ASSETS: &[&str] = &["USDT", "USDC", "BUSD", "USD", "BTC", "ETH"];

/// True when a symbol is already in canonical BASEQUOTE form.
pub fn is_normalized_symbol(symbol: &str) -> bool {
    symbol.len() >= 4
        && symbol.len() <= 20
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && symbol
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
        && QUOTE_ASSETS
            .iter()
            .any(|q| symbol.len() > q.len() && symbol.ends_with(q))
}

/// Normalize a raw symbol mention into BASEQUOTE form.
///
/// Strips separators and markers (`$SOL`, `BTC/USDT`, `eth-usd`), uppercases,
/// and appends `USDT` when no recognized quote asset is present. Returns
/// `None` for tokens that cannot be a symbol.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();

    if cleaned.len() < 2 || cleaned.len() > 20 {
        return None;
    }
    if !cleaned.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    // Perpetual suffixes name the same instrument.
    let cleaned = cleaned.strip_suffix("PERP").unwrap_or(&cleaned).to_string();
    if cleaned.len() < 2 {
        return None;
    }

    for quote in QUOTE_ASSETS {
        if cleaned.len() > quote.len() && cleaned.ends_with(quote) {
            return Some(cleaned);
        }
    }
    Some(format!("{cleaned}USDT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_sign_and_alias() {
        assert_eq!(Side::Long.sign(), 1.0);
        assert_eq!(Side::Short.sign(), -1.0);
        assert_eq!(Side::from_alias("BUY"), Some(Side::Long));
        assert_eq!(Side::from_alias("bearish"), Some(Side::Short));
        assert_eq!(Side::from_alias("hold"), None);
    }

    #[test]
    fn zone_orders_bounds() {
        assert_eq!(Entry::zone(102.0, 100.0), Entry::Zone { low: 100.0, high: 102.0 });
        assert_eq!(Entry::zone(100.0, 100.0), Entry::Single(100.0));
    }

    #[test]
    fn entry_average() {
        assert_eq!(Entry::Single(45_000.0).average(), 45_000.0);
        assert_eq!(Entry::zone(100.0, 102.0).average(), 101.0);
    }

    #[test]
    fn normalize_plain_base() {
        assert_eq!(normalize_symbol("BTC"), Some("BTCUSDT".into()));
        assert_eq!(normalize_symbol("sol"), Some("SOLUSDT".into()));
    }

    #[test]
    fn normalize_keeps_existing_quote() {
        assert_eq!(normalize_symbol("BTCUSDT"), Some("BTCUSDT".into()));
        assert_eq!(normalize_symbol("ethusd"), Some("ETHUSD".into()));
        assert_eq!(normalize_symbol("SOLUSDC"), Some("SOLUSDC".into()));
    }

    #[test]
    fn normalize_strips_separators_and_markers() {
        assert_eq!(normalize_symbol("BTC/USDT"), Some("BTCUSDT".into()));
        assert_eq!(normalize_symbol("$SOL"), Some("SOLUSDT".into()));
        assert_eq!(normalize_symbol("eth-usd"), Some("ETHUSD".into()));
        assert_eq!(normalize_symbol("BTC_USDT"), Some("BTCUSDT".into()));
    }

    #[test]
    fn normalize_strips_perp_suffix() {
        assert_eq!(normalize_symbol("BTCPERP"), Some("BTCUSDT".into()));
    }

    #[test]
    fn normalized_symbol_check() {
        assert!(is_normalized_symbol("BTCUSDT"));
        assert!(is_normalized_symbol("PEPEUSDT"));
        assert!(!is_normalized_symbol("BTC/USDT"));
        assert!(!is_normalized_symbol("btcusdt"));
        assert!(!is_normalized_symbol("USDT"));
        assert!(!is_normalized_symbol(""));
    }

    #[test]
    fn normalize_rejects_junk() {
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("7"), None);
        assert_eq!(normalize_symbol("123"), None);
        assert_eq!(normalize_symbol("X"), None);
        assert_eq!(normalize_symbol("AVERYLONGSYMBOLNAMETHATISNOTREAL"), None);
    }

    #[test]
    fn draft_has_no_validation_state() {
        let s = Signal::draft("BTCUSDT".into(), Side::Long, "whale-01", ParseMethod::Rule, "trade-format-a");
        assert!(!s.is_valid);
        assert!(s.errors.is_empty());
        assert_eq!(s.confidence, 0);
        assert!(s.fingerprint.is_empty());
        assert_eq!(s.entry_average(), None);
    }
}
