//! Dispatcher counters.
//!
//! Running totals plus a bounded rolling window of recent confidence values.
//! The window is a ring of the last 100 parsed signals, so both the append
//! and the average stay O(1) in the number of messages ever processed.

use serde::Serialize;
use std::collections::VecDeque;

use crate::domain::signal::ParseMethod;

/// How many recent confidence values feed the rolling average.
pub const CONFIDENCE_WINDOW: usize = 100;

#[derive(Debug, Default)]
pub struct DispatchStats {
    processed: u64,
    parsed_rule: u64,
    parsed_fallback: u64,
    parsed_ai: u64,
    valid: u64,
    failed: u64,
    duplicates: u64,
    recent_confidence: VecDeque<u8>,
}

/// Point-in-time copy of the counters, shaped for display and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub parsed_rule: u64,
    pub parsed_fallback: u64,
    pub parsed_ai: u64,
    pub valid: u64,
    pub failed: u64,
    pub duplicates: u64,
    /// Parsed (by any method) over processed, excluding duplicates.
    pub success_rate: f64,
    /// Mean confidence over the last [`CONFIDENCE_WINDOW`] parsed signals.
    pub rolling_confidence: f64,
}

impl DispatchStats {
    pub fn new() -> Self {
        DispatchStats::default()
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_parsed(&mut self, method: ParseMethod, confidence: u8, is_valid: bool) {
        match method {
            ParseMethod::Rule => self.parsed_rule += 1,
            ParseMethod::Fallback => self.parsed_fallback += 1,
            ParseMethod::Ai => self.parsed_ai += 1,
        }
        if is_valid {
            self.valid += 1;
        }
        if self.recent_confidence.len() == CONFIDENCE_WINDOW {
            self.recent_confidence.pop_front();
        }
        self.recent_confidence.push_back(confidence);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let parsed = self.parsed_rule + self.parsed_fallback + self.parsed_ai;
        let attempts = self.processed.saturating_sub(self.duplicates);
        let success_rate = if attempts == 0 {
            0.0
        } else {
            parsed as f64 / attempts as f64
        };
        let rolling_confidence = if self.recent_confidence.is_empty() {
            0.0
        } else {
            self.recent_confidence.iter().map(|c| *c as f64).sum::<f64>()
                / self.recent_confidence.len() as f64
        };
        StatsSnapshot {
            processed: self.processed,
            parsed_rule: self.parsed_rule,
            parsed_fallback: self.parsed_fallback,
            parsed_ai: self.parsed_ai,
            valid: self.valid,
            failed: self.failed,
            duplicates: self.duplicates,
            success_rate,
            rolling_confidence,
        }
    }
}
