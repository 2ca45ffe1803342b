//! Per-source extraction rule tables.
//!
//! Pure data: each specialized parser is a [`ParserRules`] value listing the
//! regex patterns and keyword sets tuned to one source's formatting
//! conventions, plus its confidence weights and validation policy. Control
//! flow lives in [`super::extract`]; keeping the tables as data means each
//! source's rule set can be unit-tested on its own.

use crate::domain::validator::{ConfidenceWeights, ValidationPolicy};

/// Rule set for one specialized parser.
///
/// Pattern groups, by extraction role:
/// - `gates`: any match means "this looks like my format" (`can_parse`).
/// - `symbols`: capture group 1 is a raw symbol mention.
/// - `zones`: capture groups 1 and 2 are entry-zone bounds; tried before
///   `entries`.
/// - `entries`: capture group 1 is a single entry price.
/// - `target_levels`: capture group 1 is one target; every match is taken.
/// - `target_lists`: capture group 1 is a separated run of targets.
/// - `stops`, `leverages`, `reasons`: capture group 1.
#[derive(Debug, Clone)]
pub struct ParserRules {
    pub id: &'static str,
    pub priority: u8,
    pub policy: ValidationPolicy,
    pub gates: Vec<String>,
    pub symbols: Vec<String>,
    pub long_words: Vec<&'static str>,
    pub short_words: Vec<&'static str>,
    pub zones: Vec<String>,
    pub entries: Vec<String>,
    pub target_levels: Vec<String>,
    pub target_lists: Vec<String>,
    pub stops: Vec<String>,
    pub leverages: Vec<String>,
    pub reasons: Vec<String>,
    pub weights: ConfidenceWeights,
}

/// Price token with a capture group.
fn num() -> &'static str {
    r"([0-9][0-9,_]*(?:\.[0-9]+)?\s*[km]?)"
}

/// Price token without a capture group, for list captures.
fn num_nc() -> &'static str {
    r"(?:[0-9][0-9,_]*(?:\.[0-9]+)?\s*[km]?)"
}

/// Symbol patterns common to most sources: explicit quote suffix, `$`/`#`
/// markers, and `BASE/QUOTE` pairs.
fn common_symbols() -> Vec<String> {
    vec![
        r"\b([A-Z0-9]{2,12}(?:USDT|USDC|BUSD|USD|PERP))\b".to_string(),
        r"[#$]\s?([A-Za-z0-9]{2,12})\b".to_string(),
        r"\b([A-Za-z0-9]{2,12})\s*/\s*(?:USDT|USDC|USD)\b".to_string(),
    ]
}

/// Bare base-asset mentions for prose-style sources that rarely write the
/// quote asset.
fn known_bases() -> String {
    r"\b(BTC|ETH|SOL|BNB|XRP|ADA|DOGE|AVAX|LINK|DOT|MATIC|LTC|ATOM|NEAR|APT|ARB|OP|SUI|INJ|TIA|PEPE|SHIB|WIF|FET|TON)\b"
        .to_string()
}

/// Labeled call sheets: `BTCUSDT LONG Entry: 45000 TP1: 47000 SL: 44000`.
pub fn trade_format_a() -> ParserRules {
    let n = num();
    let n_nc = num_nc();
    ParserRules {
        id: "trade-format-a",
        priority: 1,
        policy: ValidationPolicy::Strict,
        gates: vec![
            r"\bentry\s*(?:zone|price)?\s*[:@]".to_string(),
            r"\btp\s*\d\s*[:@]".to_string(),
        ],
        symbols: common_symbols(),
        long_words: vec!["long", "buy"],
        short_words: vec!["short", "sell"],
        zones: vec![format!(
            r"\bentry\s*(?:zone|price)?\s*[:@]\s*\$?{n}\s*[-–—/]\s*\$?{n}"
        )],
        entries: vec![format!(r"\bentry\s*(?:zone|price)?\s*[:@]\s*\$?{n}")],
        target_levels: vec![format!(r"\btp\s*\d\s*[:@]\s*\$?{n}")],
        target_lists: vec![format!(
            r"\b(?:targets?|take\s*profits?)\s*[:@]?\s*((?:\$?{n_nc}[\s,/|&-]*)+)"
        )],
        stops: vec![format!(
            r"\b(?:sl|stop\s*loss|stoploss|stop)\s*[:@]?\s*\$?{n}"
        )],
        leverages: vec![
            format!(r"\b(?:lev|leverage)\s*[:@]?\s*x?\s*([0-9]{{1,3}})"),
            r"\bx\s*([0-9]{1,3})\b".to_string(),
            r"\b([0-9]{1,3})\s*x\b".to_string(),
        ],
        reasons: vec![r"\b(?:reason|why|note)\s*[:\-]\s*([^\n]+)".to_string()],
        weights: ConfidenceWeights {
            symbol: 25,
            direction: 20,
            entry: 20,
            zone: 25,
            targets: 15,
            stop: 10,
            leverage_bonus: 5,
            reason_bonus: 3,
            many_targets_bonus: 5,
        },
    }
}

/// Decorated channel posts: `🚀 #ETH/USDT | Direction: SHORT | Entry
/// 2400-2450 | Targets: 2300, 2200 | Stoploss 2520`.
pub fn trade_format_b() -> ParserRules {
    let n = num();
    let n_nc = num_nc();
    ParserRules {
        id: "trade-format-b",
        priority: 2,
        policy: ValidationPolicy::Strict,
        gates: vec![
            r"direction\s*[:：]".to_string(),
            r"\|\s*(?:entry|targets?|direction|stoploss)".to_string(),
        ],
        symbols: {
            let mut patterns = common_symbols();
            patterns.push(r"#\s?([A-Za-z0-9]{2,12})\s*/".to_string());
            patterns
        },
        long_words: vec!["long", "buy"],
        short_words: vec!["short", "sell"],
        zones: vec![format!(
            r"\bentry\s*(?:zone)?\s*[:：]?\s*\$?{n}\s*[-–—]\s*\$?{n}"
        )],
        entries: vec![format!(r"\bentry\s*(?:zone)?\s*[:：]?\s*\$?{n}")],
        target_levels: vec![format!(r"\b(?:tp|target)\s*\d\s*[:：]\s*\$?{n}")],
        target_lists: vec![format!(
            r"\btargets?\s*[:：]?\s*((?:\$?{n_nc}[\s,/|&-]*)+)"
        )],
        stops: vec![format!(
            r"\b(?:stop\s*loss|stoploss|sl|stop)\s*[:：]?\s*\$?{n}"
        )],
        leverages: vec![
            format!(r"\b(?:lev|leverage)\s*[:：]?\s*x?\s*([0-9]{{1,3}})"),
            r"\bx\s*([0-9]{1,3})\b".to_string(),
        ],
        reasons: Vec::new(),
        weights: ConfidenceWeights {
            symbol: 30,
            direction: 15,
            entry: 20,
            zone: 22,
            targets: 18,
            stop: 12,
            leverage_bonus: 4,
            reason_bonus: 3,
            many_targets_bonus: 4,
        },
    }
}

/// Prose zone entries: `Accumulating SOL here 95-98, invalidation 89,
/// targets 110 120 135`.
pub fn zone_caller() -> ParserRules {
    let n = num();
    let n_nc = num_nc();
    ParserRules {
        id: "zone-caller",
        priority: 3,
        policy: ValidationPolicy::Strict,
        gates: vec![
            format!(
                r"\b(?:buy(?:ing)?|accumulat\w+|long(?:ing)?|short(?:ing)?|sell(?:ing)?)\b[^\n]{{0,40}}\d"
            ),
            r"\binvalidation\b".to_string(),
        ],
        symbols: {
            let mut patterns = common_symbols();
            patterns.push(known_bases());
            patterns
        },
        long_words: vec!["buy", "buying", "accumulate", "accumulating", "long", "longing", "bid"],
        short_words: vec!["short", "shorting", "sell", "selling", "fade", "fading"],
        zones: vec![
            format!(
                r"\b(?:buy(?:ing)?|accumulat\w+|long(?:ing)?|short(?:ing)?|sell(?:ing)?|entry)\b[^\d\n]{{0,24}}\$?{n}\s*[-–—]\s*\$?{n}"
            ),
            format!(r"\$?{n}\s*[-–—]\s*\$?{n}\s*(?:zone|area|region)"),
            format!(r"\$?{n}\s*[-–—]\s*\$?{n}"),
        ],
        entries: vec![format!(r"\b(?:around|here at|at|entry)\s*\$?{n}")],
        target_levels: vec![format!(r"\btp\s*\d?\s*[:@]\s*\$?{n}")],
        target_lists: vec![format!(
            r"\btargets?\s*[:：]?\s*((?:\$?{n_nc}[\s,/|&-]*(?:and\s+)?)+)"
        )],
        stops: vec![format!(
            r"\b(?:invalidation|invalid(?:\s+below|\s+above)?|stop(?:\s*loss)?|sl)\b[^\d\n]{{0,12}}\$?{n}"
        )],
        leverages: vec![
            r"\bx\s*([0-9]{1,3})\b".to_string(),
            r"\b([0-9]{1,3})\s*x\b".to_string(),
        ],
        reasons: vec![r"\b(?:because|reason\s*[:\-])\s*([^\n.]+)".to_string()],
        weights: ConfidenceWeights {
            symbol: 20,
            direction: 15,
            entry: 22,
            zone: 25,
            targets: 18,
            stop: 15,
            leverage_bonus: 3,
            reason_bonus: 5,
            many_targets_bonus: 5,
        },
    }
}

/// Shorthand one-liners: `long btc x10 e:45000 t:46000/47000 sl:44000`.
pub fn compact_caller() -> ParserRules {
    let n = num();
    let n_nc = num_nc();
    ParserRules {
        id: "compact-caller",
        priority: 4,
        policy: ValidationPolicy::Strict,
        gates: vec![
            format!(r"(?m)^\s*(?:long|short)\b[^\n]{{0,80}}\be\s*:"),
            r"\be\s*:\s*\$?\d".to_string(),
        ],
        symbols: {
            let mut patterns = common_symbols();
            patterns.push(known_bases());
            patterns
        },
        long_words: vec!["long", "buy"],
        short_words: vec!["short", "sell"],
        zones: vec![format!(r"\be(?:ntry)?\s*:\s*\$?{n}\s*[-–—/]\s*\$?{n}")],
        entries: vec![format!(r"\be(?:ntry)?\s*:\s*\$?{n}")],
        target_levels: Vec::new(),
        target_lists: vec![format!(
            r"\bt(?:ps?|argets?)?\s*:\s*((?:\$?{n_nc}[\s,/|-]*)+)"
        )],
        stops: vec![format!(r"\bs(?:l|top)?\s*:\s*\$?{n}")],
        leverages: vec![
            r"\bx\s*([0-9]{1,3})\b".to_string(),
            format!(r"\b(?:lev|leverage)\s*:?\s*([0-9]{{1,3}})"),
        ],
        reasons: Vec::new(),
        weights: ConfidenceWeights {
            symbol: 22,
            direction: 18,
            entry: 20,
            zone: 23,
            targets: 16,
            stop: 12,
            leverage_bonus: 6,
            reason_bonus: 2,
            many_targets_bonus: 4,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_declares_mandatory_pattern_groups() {
        for rules in [trade_format_a(), trade_format_b(), zone_caller(), compact_caller()] {
            assert!(!rules.gates.is_empty(), "{} has no gates", rules.id);
            assert!(!rules.symbols.is_empty(), "{} has no symbol patterns", rules.id);
            assert!(!rules.long_words.is_empty(), "{}", rules.id);
            assert!(!rules.short_words.is_empty(), "{}", rules.id);
            assert!(
                !rules.entries.is_empty() || !rules.zones.is_empty(),
                "{} cannot extract an entry",
                rules.id
            );
        }
    }

    #[test]
    fn priorities_are_distinct() {
        let priorities = [
            trade_format_a().priority,
            trade_format_b().priority,
            zone_caller().priority,
            compact_caller().priority,
        ];
        let mut deduped = priorities.to_vec();
        deduped.dedup();
        assert_eq!(deduped.len(), priorities.len());
    }

    #[test]
    fn builtin_tables_are_strict() {
        for rules in [trade_format_a(), trade_format_b(), zone_caller(), compact_caller()] {
            assert_eq!(rules.policy, ValidationPolicy::Strict, "{}", rules.id);
        }
    }
}
