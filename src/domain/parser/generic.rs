//! Generic fallback parser.
//!
//! Source-agnostic and deliberately looser than the specialized tables: broad
//! direction vocabulary, every symbol form we know, and label sets that cover
//! the common ways callers write entries, targets, and stops. It runs last,
//! only for text no specialized parser claimed, so recall matters more than
//! precision here; the validator still gets the final word.

use regex::{Regex, RegexBuilder};

use crate::domain::error::SigtraderError;
use crate::domain::parser::{parse_price, parse_price_list};
use crate::domain::signal::{normalize_symbol, Entry, ParseMethod, Side, Signal};
use crate::domain::validator::{score, ConfidenceWeights, ValidationPolicy};

pub const GENERIC_PARSER_ID: &str = "generic";

const SYMBOL_PATTERNS: &[&str] = &[
    r"\b([A-Z0-9]{2,12}(?:USDT|USDC|BUSD|USD|PERP))\b",
    r"[#$]\s?([A-Za-z0-9]{2,12})\b",
    r"\b([A-Za-z0-9]{2,12})\s*/\s*(?:USDT|USDC|USD)\b",
    r"\b(BTC|ETH|SOL|BNB|XRP|ADA|DOGE|AVAX|LINK|DOT|MATIC|LTC|ATOM|NEAR|APT|ARB|OP|SUI|INJ|TIA|PEPE|SHIB|WIF|FET|TON)\b",
];

const LONG_WORDS: &str = r"\b(?:long|longing|buy|buying|accumulate|accumulating|bid|bullish)\b";
const SHORT_WORDS: &str = r"\b(?:short|shorting|sell|selling|fade|fading|bearish)\b";

const NUM: &str = r"([0-9][0-9,_]*(?:\.[0-9]+)?\s*[km]?)";
const NUM_NC: &str = r"(?:[0-9][0-9,_]*(?:\.[0-9]+)?\s*[km]?)";

const SYMBOL_STOPWORDS: &[&str] = &["long", "short", "buy", "sell", "entry", "target"];

pub struct GenericParser {
    policy: ValidationPolicy,
    weights: ConfidenceWeights,
    symbols: Vec<Regex>,
    long_words: Regex,
    short_words: Regex,
    zone: Regex,
    entry_labeled: Regex,
    entry_after_direction: Regex,
    target_list: Regex,
    stop: Regex,
    leverage: Regex,
    reason: Regex,
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

impl GenericParser {
    pub fn new(policy: ValidationPolicy) -> Result<Self, SigtraderError> {
        Ok(GenericParser {
            policy,
            weights: ConfidenceWeights::default(),
            symbols: SYMBOL_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
            long_words: compile(LONG_WORDS)?,
            short_words: compile(SHORT_WORDS)?,
            zone: compile(&format!(
                r"\b(?:entry|buy(?:ing)?\s+zone|zone|between|at)\b[^\d\n]{{0,16}}\$?{NUM}\s*[-–—]\s*\$?{NUM}"
            ))?,
            entry_labeled: compile(&format!(
                r"(?:\b(?:entry|enter|buy(?:ing)?|around|at)\b|@)\s*:?\s*\$?{NUM}"
            ))?,
            entry_after_direction: compile(&format!(
                r"\b(?:long|short|buy|sell)\b[^\d\n]{{0,20}}\$?{NUM}"
            ))?,
            target_list: compile(&format!(
                r"\b(?:targets?|tps?\s*\d?|take\s*profits?|t)\s*[:@]?\s*((?:\$?{NUM_NC}[\s,/|&-]*)+)"
            ))?,
            stop: compile(&format!(
                r"\b(?:sl|stop\s*loss|stoploss|stop|invalidation)\b\s*[:@]?\s*[^\d\n]{{0,8}}\$?{NUM}"
            ))?,
            leverage: compile(r"\b(?:x\s*([0-9]{1,3})|([0-9]{1,3})\s*x|lev(?:erage)?\s*[:@]?\s*([0-9]{1,3}))\b")?,
            reason: compile(r"\b(?:because|reason\s*[:\-]|setup\s*[:\-])\s*([^\n.]+)")?,
        })
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// The fallback gate only asks whether the text mentions an instrument
    /// and a direction at all.
    pub fn can_parse(&self, text: &str) -> bool {
        self.find_symbol(text).is_some() && self.find_side(text).is_some()
    }

    pub fn parse(&self, text: &str, trader: &str) -> Option<Signal> {
        let symbol = self.find_symbol(text)?;
        let side = self.find_side(text)?;

        let mut signal =
            Signal::draft(symbol, side, trader, ParseMethod::Fallback, GENERIC_PARSER_ID);

        if let Some(caps) = self.zone.captures(text) {
            let low = caps.get(1).and_then(|m| parse_price(m.as_str()));
            let high = caps.get(2).and_then(|m| parse_price(m.as_str()));
            if let (Some(low), Some(high)) = (low, high) {
                signal.entry = Some(Entry::zone(low, high));
            }
        }
        if signal.entry.is_none() {
            signal.entry = self
                .entry_labeled
                .captures(text)
                .or_else(|| self.entry_after_direction.captures(text))
                .and_then(|caps| caps.get(1).and_then(|m| parse_price(m.as_str())))
                .map(Entry::Single);
        }

        if let Some(caps) = self.target_list.captures(text) {
            if let Some(list) = caps.get(1) {
                signal.targets = parse_price_list(list.as_str());
            }
        }

        signal.stop = self
            .stop
            .captures(text)
            .and_then(|caps| caps.get(1).and_then(|m| parse_price(m.as_str())));

        signal.leverage = self.leverage.captures(text).and_then(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|l| *l > 0)
        });

        signal.reason = self.reason.captures(text).and_then(|caps| {
            caps.get(1).map(|m| {
                m.as_str().trim().chars().take(200).collect::<String>()
            })
        });

        signal.confidence = score(&signal, &self.weights);
        Some(signal)
    }

    fn find_symbol(&self, text: &str) -> Option<String> {
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

    fn find_side(&self, text: &str) -> Option<Side> {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> GenericParser {
        GenericParser::new(ValidationPolicy::Strict).unwrap()
    }

    #[test]
    fn loose_text_parses() {
        let text = "thinking BTC long here, entry around 45000, stop 44000, targets: 46k 47k";
        assert!(parser().can_parse(text));
        let signal = parser().parse(text, "random-guy").unwrap();
        assert_eq!(signal.symbol, "BTCUSDT");
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.entry, Some(Entry::Single(45_000.0)));
        assert_eq!(signal.stop, Some(44_000.0));
        assert_eq!(signal.targets, vec![46_000.0, 47_000.0]);
        assert_eq!(signal.method, ParseMethod::Fallback);
        assert_eq!(signal.parser_id, GENERIC_PARSER_ID);
    }

    #[test]
    fn bearish_vocabulary_maps_to_short() {
        let text = "bearish on ETHUSDT, entry 2500, invalidation 2600";
        let signal = parser().parse(text, "t").unwrap();
        assert_eq!(signal.side, Side::Short);
        assert_eq!(signal.stop, Some(2_600.0));
    }

    #[test]
    fn number_right_after_direction_is_the_entry() {
        let text = "$SOL long 98, target 110";
        let signal = parser().parse(text, "t").unwrap();
        assert_eq!(signal.entry, Some(Entry::Single(98.0)));
        assert_eq!(signal.targets, vec![110.0]);
    }

    #[test]
    fn chatter_without_direction_is_rejected() {
        assert!(!parser().can_parse("BTCUSDT looking wild today"));
        assert!(parser().parse("BTCUSDT looking wild today", "t").is_none());
    }

    #[test]
    fn chatter_without_symbol_is_rejected() {
        assert!(!parser().can_parse("feeling bullish today, buying the dip"));
    }

    #[test]
    fn leverage_alternatives() {
        let a = parser().parse("BTC long x20 entry 45000", "t").unwrap();
        assert_eq!(a.leverage, Some(20));
        let b = parser().parse("BTC long 20x entry 45000", "t").unwrap();
        assert_eq!(b.leverage, Some(20));
        let c = parser().parse("BTC long leverage: 20 entry 45000", "t").unwrap();
        assert_eq!(c.leverage, Some(20));
    }
}
