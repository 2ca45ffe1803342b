//! Signal validation and confidence scoring.
//!
//! Validation enforces the structural invariants every downstream consumer
//! relies on: a normalized symbol, positive prices, and directional ordering
//! (long targets above the entry average with the stop below it, mirrored for
//! shorts). Whether an ordering violation rejects the signal or merely warns
//! is the parser's declared policy, not a global switch.

use serde::Serialize;

use crate::domain::signal::{is_normalized_symbol, Entry, Side, Signal};

/// How strictly ordering violations are treated for signals from a given
/// parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Ordering violations invalidate the signal.
    Strict,
    /// Ordering violations are recorded as warnings only.
    Permissive,
}

/// Per-field confidence weights. Each parser carries its own table, tuned to
/// how much a recovered field says about that source's reliability.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceWeights {
    pub symbol: u8,
    pub direction: u8,
    pub entry: u8,
    /// Weight for a zone entry; usually a little above `entry` because a
    /// caller who states a range has said more.
    pub zone: u8,
    pub targets: u8,
    pub stop: u8,
    pub leverage_bonus: u8,
    pub reason_bonus: u8,
    pub many_targets_bonus: u8,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        ConfidenceWeights {
            symbol: 20,
            direction: 15,
            entry: 20,
            zone: 25,
            targets: 20,
            stop: 15,
            leverage_bonus: 5,
            reason_bonus: 5,
            many_targets_bonus: 5,
        }
    }
}

/// Number of targets at which the `many_targets_bonus` applies.
pub const MANY_TARGETS: usize = 4;

/// Sum the weights of the fields present on the signal, capped at 100.
///
/// Adding an optional field can never lower the score. AI-parsed signals do
/// not go through this: the provider's own confidence is taken verbatim.
pub fn score(signal: &Signal, weights: &ConfidenceWeights) -> u8 {
    let mut total: u32 = 0;
    total += weights.symbol as u32;
    total += weights.direction as u32;
    match signal.entry {
        Some(Entry::Single(_)) => total += weights.entry as u32,
        Some(Entry::Zone { .. }) => total += weights.zone as u32,
        None => {}
    }
    if !signal.targets.is_empty() {
        total += weights.targets as u32;
    }
    if signal.stop.is_some() {
        total += weights.stop as u32;
    }
    if signal.leverage.is_some() {
        total += weights.leverage_bonus as u32;
    }
    if signal.reason.is_some() {
        total += weights.reason_bonus as u32;
    }
    if signal.targets.len() >= MANY_TARGETS {
        total += weights.many_targets_bonus as u32;
    }
    total.min(100) as u8
}

/// Validation outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check structural and directional invariants.
pub fn validate(signal: &Signal, policy: ValidationPolicy) -> Validation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !is_normalized_symbol(&signal.symbol) {
        errors.push(format!("symbol `{}` is missing or not normalized", signal.symbol));
    }

    if let Some(entry) = signal.entry {
        if entry.low() <= 0.0 {
            errors.push("entry price must be positive".to_string());
        }
        if entry.low() > entry.high() {
            errors.push("entry zone bounds are reversed".to_string());
        }
    }

    for (i, target) in signal.targets.iter().enumerate() {
        if *target <= 0.0 {
            errors.push(format!("target {} must be positive", i + 1));
        }
    }

    if let Some(stop) = signal.stop {
        if stop <= 0.0 {
            errors.push("stop price must be positive".to_string());
        }
    }

    if let Some(leverage) = signal.leverage {
        if leverage == 0 || leverage > 125 {
            warnings.push(format!("leverage {leverage}x is out of the usual range"));
        }
    }

    let mut ordering = Vec::new();
    if let Some(avg) = signal.entry_average() {
        if avg > 0.0 {
            match signal.side {
                Side::Long => {
                    for (i, target) in signal.targets.iter().enumerate() {
                        if *target <= avg {
                            ordering.push(format!(
                                "target {} ({target}) is not above the entry average ({avg})",
                                i + 1
                            ));
                        }
                    }
                    if let Some(stop) = signal.stop {
                        if stop >= avg {
                            ordering.push(format!(
                                "stop ({stop}) is not below the entry average ({avg})"
                            ));
                        }
                    }
                }
                Side::Short => {
                    for (i, target) in signal.targets.iter().enumerate() {
                        if *target >= avg {
                            ordering.push(format!(
                                "target {} ({target}) is not below the entry average ({avg})",
                                i + 1
                            ));
                        }
                    }
                    if let Some(stop) = signal.stop {
                        if stop <= avg {
                            ordering.push(format!(
                                "stop ({stop}) is not above the entry average ({avg})"
                            ));
                        }
                    }
                }
            }
        }
    }

    match policy {
        ValidationPolicy::Strict => errors.extend(ordering),
        ValidationPolicy::Permissive => warnings.extend(ordering),
    }

    Validation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Copy a validation outcome onto a parsed draft. The confidence is left
/// untouched: rule and fallback drafts keep the score their parser computed,
/// AI drafts keep the provider-supplied value.
pub fn finalize(signal: &mut Signal, validation: Validation) {
    signal.is_valid = validation.is_valid;
    signal.errors = validation.errors;
    signal.warnings = validation.warnings;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{Entry, ParseMethod, Side, Signal};
    use proptest::prelude::*;

    fn sample_long() -> Signal {
        let mut s = Signal::draft(
            "BTCUSDT".into(),
            Side::Long,
            "whale-01",
            ParseMethod::Rule,
            "trade-format-a",
        );
        s.entry = Some(Entry::Single(45_000.0));
        s.targets = vec![47_000.0];
        s.stop = Some(44_000.0);
        s
    }

    fn sample_short() -> Signal {
        let mut s = Signal::draft(
            "ETHUSDT".into(),
            Side::Short,
            "whale-02",
            ParseMethod::Rule,
            "trade-format-b",
        );
        s.entry = Some(Entry::zone(2_400.0, 2_450.0));
        s.targets = vec![2_300.0, 2_200.0];
        s.stop = Some(2_520.0);
        s
    }

    #[test]
    fn valid_long_passes_strict() {
        let v = validate(&sample_long(), ValidationPolicy::Strict);
        assert!(v.is_valid, "errors: {:?}", v.errors);
        assert!(v.errors.is_empty());
    }

    #[test]
    fn valid_short_passes_strict() {
        let v = validate(&sample_short(), ValidationPolicy::Strict);
        assert!(v.is_valid, "errors: {:?}", v.errors);
    }

    #[test]
    fn long_target_below_entry_rejects_under_strict() {
        let mut s = sample_long();
        s.targets = vec![44_500.0];
        let v = validate(&s, ValidationPolicy::Strict);
        assert!(!v.is_valid);
        assert!(v.errors.iter().any(|e| e.contains("not above")));
    }

    #[test]
    fn long_target_below_entry_warns_under_permissive() {
        let mut s = sample_long();
        s.targets = vec![44_500.0];
        let v = validate(&s, ValidationPolicy::Permissive);
        assert!(v.is_valid);
        assert!(v.warnings.iter().any(|w| w.contains("not above")));
    }

    #[test]
    fn long_stop_above_entry_rejects_under_strict() {
        let mut s = sample_long();
        s.stop = Some(45_500.0);
        let v = validate(&s, ValidationPolicy::Strict);
        assert!(!v.is_valid);
        assert!(v.errors.iter().any(|e| e.contains("not below")));
    }

    #[test]
    fn short_ordering_mirrors_long() {
        let mut s = sample_short();
        s.targets = vec![2_500.0];
        s.stop = Some(2_300.0);
        let v = validate(&s, ValidationPolicy::Strict);
        assert!(!v.is_valid);
        assert_eq!(v.errors.len(), 2);
    }

    #[test]
    fn unnormalized_symbol_rejects() {
        let mut s = sample_long();
        s.symbol = "BTC/USDT".into();
        let v = validate(&s, ValidationPolicy::Strict);
        assert!(!v.is_valid);
    }

    #[test]
    fn extreme_leverage_only_warns() {
        let mut s = sample_long();
        s.leverage = Some(500);
        let v = validate(&s, ValidationPolicy::Strict);
        assert!(v.is_valid);
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn score_counts_present_fields() {
        let weights = ConfidenceWeights::default();
        let mut s = sample_long();
        // symbol 20 + direction 15 + entry 20 + targets 20 + stop 15
        assert_eq!(score(&s, &weights), 90);
        s.leverage = Some(10);
        assert_eq!(score(&s, &weights), 95);
        s.reason = Some("breakout retest".into());
        assert_eq!(score(&s, &weights), 100);
    }

    #[test]
    fn score_is_capped_at_100() {
        let weights = ConfidenceWeights::default();
        let mut s = sample_short();
        s.targets = vec![2_300.0, 2_250.0, 2_200.0, 2_150.0];
        s.leverage = Some(5);
        s.reason = Some("CPI fade".into());
        assert_eq!(score(&s, &weights), 100);
    }

    #[test]
    fn score_grows_monotonically_with_optional_fields() {
        let weights = ConfidenceWeights::default();
        let mut s = Signal::draft(
            "SOLUSDT".into(),
            Side::Long,
            "caller",
            ParseMethod::Fallback,
            "generic",
        );
        let bare = score(&s, &weights);
        s.entry = Some(Entry::Single(100.0));
        let with_entry = score(&s, &weights);
        s.targets = vec![110.0, 120.0, 130.0, 140.0];
        let with_targets = score(&s, &weights);
        s.stop = Some(90.0);
        let with_stop = score(&s, &weights);
        s.leverage = Some(3);
        s.reason = Some("range break".into());
        let with_bonuses = score(&s, &weights);
        assert!(bare < with_entry);
        assert!(with_entry < with_targets);
        assert!(with_targets < with_stop);
        assert!(with_stop <= with_bonuses);
    }

    proptest! {
        #[test]
        fn score_never_exceeds_100(
            has_entry in any::<bool>(),
            zone in any::<bool>(),
            n_targets in 0usize..6,
            has_stop in any::<bool>(),
            has_lev in any::<bool>(),
            has_reason in any::<bool>(),
        ) {
            let mut s = Signal::draft(
                "BTCUSDT".into(),
                Side::Long,
                "t",
                ParseMethod::Rule,
                "trade-format-a",
            );
            if has_entry {
                s.entry = Some(if zone { Entry::zone(99.0, 101.0) } else { Entry::Single(100.0) });
            }
            s.targets = (0..n_targets).map(|i| 110.0 + i as f64).collect();
            if has_stop { s.stop = Some(90.0); }
            if has_lev { s.leverage = Some(10); }
            if has_reason { s.reason = Some("r".into()); }
            prop_assert!(score(&s, &ConfidenceWeights::default()) <= 100);
        }
    }
}
