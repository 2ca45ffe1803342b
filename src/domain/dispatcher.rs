//! Parser dispatch.
//!
//! Routes each inbound message through: fingerprint dedup, an ordered run of
//! deterministic parsers (source hint first, then priority order, generic
//! fallback last), and finally the external AI parser. The first parser whose
//! `can_parse` accepts and whose `parse` returns a draft wins — dispatch is
//! first-match, not best-match, so an earlier parser is never outvoted by a
//! later one.
//!
//! `route` takes `&mut self`: the fingerprint check-and-record and the
//! rolling-stats update form a single-writer critical section by
//! construction.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::detector::StyleDetector;
use crate::domain::error::SigtraderError;
use crate::domain::fingerprint::{fingerprint, DedupWindow};
use crate::domain::message::RawMessage;
use crate::domain::parser::{builtin_parsers, SignalParser, GENERIC_PARSER_ID};
use crate::domain::signal::{normalize_symbol, Entry, ParseMethod, Side, Signal};
use crate::domain::stats::{DispatchStats, StatsSnapshot};
use crate::domain::validator::{finalize, validate, ValidationPolicy};
use crate::ports::ai_port::{AiParseOutcome, AiParserPort};
use crate::ports::store_port::StorePort;

/// Confidence assigned to an AI parse when the provider does not report one.
const AI_DEFAULT_CONFIDENCE: u8 = 60;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub dedup_window_minutes: i64,
    pub dedup_capacity: usize,
    pub ai_timeout_secs: u64,
    /// Ask the style detector for a parser hint when the caller gave none.
    pub detector_hints: bool,
    /// Specialized parsers to enable; empty means all. The generic fallback
    /// is always active.
    pub enabled_parsers: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            dedup_window_minutes: 120,
            dedup_capacity: 4096,
            ai_timeout_secs: 15,
            detector_hints: true,
            enabled_parsers: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::minutes(self.dedup_window_minutes)
    }
}

pub struct SignalDispatcher {
    config: DispatcherConfig,
    parsers: Vec<SignalParser>,
    detector: StyleDetector,
    dedup: DedupWindow,
    stats: DispatchStats,
    store: Arc<dyn StorePort>,
    ai: Option<Arc<dyn AiParserPort>>,
}

impl SignalDispatcher {
    /// Build a dispatcher with the production parser set and reseed the dedup
    /// window from recently stored fingerprints.
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn StorePort>,
        ai: Option<Arc<dyn AiParserPort>>,
    ) -> Result<Self, SigtraderError> {
        let mut parsers = builtin_parsers()?;
        if !config.enabled_parsers.is_empty() {
            parsers.retain(|p| {
                p.id() == GENERIC_PARSER_ID
                    || config.enabled_parsers.iter().any(|id| id == p.id())
            });
        }
        Self::with_parsers(config, parsers, store, ai)
    }

    pub fn with_parsers(
        config: DispatcherConfig,
        parsers: Vec<SignalParser>,
        store: Arc<dyn StorePort>,
        ai: Option<Arc<dyn AiParserPort>>,
    ) -> Result<Self, SigtraderError> {
        let mut dedup = DedupWindow::new(config.dedup_window(), config.dedup_capacity);
        let since = Utc::now() - config.dedup_window();
        match store.recent_fingerprints(since) {
            Ok(recent) => {
                for (fp, seen_at) in recent {
                    dedup.seed(&fp, seen_at);
                }
            }
            Err(e) => warn!(error = %e, "could not reseed dedup window"),
        }

        Ok(SignalDispatcher {
            config,
            parsers,
            detector: StyleDetector::new()?,
            dedup,
            stats: DispatchStats::new(),
            store,
            ai,
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Record and route one inbound message.
    pub async fn ingest(&mut self, message: &RawMessage) -> Option<Signal> {
        if let Err(e) = self.store.record_message(message) {
            warn!(error = %e, "message write failed");
        }
        self.route(&message.text, &message.trader, message.source.as_deref())
            .await
    }

    /// Convert raw text into a validated signal, or `None` for duplicates and
    /// unparseable text. Never fails on a per-message basis.
    pub async fn route(
        &mut self,
        text: &str,
        trader: &str,
        source_hint: Option<&str>,
    ) -> Option<Signal> {
        self.stats.record_processed();
        let now = Utc::now();

        let fp = fingerprint(trader, text);
        if !self.dedup.observe(&fp, now) {
            debug!(trader, "duplicate message dropped");
            self.stats.record_duplicate();
            return None;
        }
        if let Err(e) = self.store.record_fingerprint(&fp, trader, now) {
            warn!(error = %e, "fingerprint write failed");
        }

        let hint = match source_hint {
            Some(h) => Some(h.to_string()),
            None if self.config.detector_hints => {
                let m = self.detector.detect(text);
                m.style.parser_hint().map(|h| {
                    debug!(style = ?m.style, confidence = m.confidence, "detector hint");
                    h.to_string()
                })
            }
            None => None,
        };

        let mut outcome = None;
        for idx in self.candidate_order(hint.as_deref()) {
            let parser = &self.parsers[idx];
            if !parser.can_parse(text) {
                continue;
            }
            if let Some(draft) = parser.parse(text, trader) {
                outcome = Some((draft, parser.policy()));
                break;
            }
        }

        if outcome.is_none() {
            if let Some(draft) = self.try_ai(text, trader).await {
                outcome = Some((draft, ValidationPolicy::Strict));
            }
        }

        let Some((mut signal, policy)) = outcome else {
            self.stats.record_failed();
            if let Err(e) = self.store.record_failure(trader, text, now) {
                warn!(error = %e, "failure record write failed");
            }
            debug!(trader, "no parser produced a signal");
            return None;
        };

        signal.fingerprint = fp;
        signal.source = source_hint.map(|s| s.to_string());
        let verdict = validate(&signal, policy);
        finalize(&mut signal, verdict);
        self.stats
            .record_parsed(signal.method, signal.confidence, signal.is_valid);
        if let Err(e) = self.store.record_signal(&signal) {
            warn!(error = %e, "signal write failed");
        }
        info!(
            symbol = %signal.symbol,
            side = signal.side.as_str(),
            parser = %signal.parser_id,
            confidence = signal.confidence,
            valid = signal.is_valid,
            "signal routed"
        );
        Some(signal)
    }

    /// Candidate indices: the hinted parser first, then priority order, with
    /// the generic fallback last. The parser list is already sorted that way,
    /// so this only has to pull the hint forward.
    fn candidate_order(&self, hint: Option<&str>) -> Vec<usize> {
        let mut order: Vec<usize> = Vec::with_capacity(self.parsers.len());
        if let Some(hint) = hint {
            if let Some(idx) = self.parsers.iter().position(|p| p.id() == hint) {
                order.push(idx);
            }
        }
        for idx in 0..self.parsers.len() {
            if !order.contains(&idx) {
                order.push(idx);
            }
        }
        order
    }

    /// Escalate to the AI parsing service, bounded by the configured timeout.
    /// Any failure or refusal is a parse miss, never an error.
    async fn try_ai(&self, text: &str, trader: &str) -> Option<Signal> {
        let ai = self.ai.as_ref()?;
        let timeout = std::time::Duration::from_secs(self.config.ai_timeout_secs.max(1));

        let outcome = match tokio::time::timeout(timeout, ai.parse_freeform(text)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(error = %e, "ai parse failed");
                return None;
            }
            Err(_) => {
                warn!(timeout_s = self.config.ai_timeout_secs, "ai parse timed out");
                return None;
            }
        };

        normalize_ai_outcome(outcome, trader)
    }
}

/// Turn a provider result into a canonical draft, normalizing side synonyms
/// and symbol suffixing. The answer is accepted only when the provider says
/// it is a signal and supplies symbol + side + (entry or targets).
pub fn normalize_ai_outcome(outcome: AiParseOutcome, trader: &str) -> Option<Signal> {
    if !outcome.is_signal {
        return None;
    }
    let symbol = outcome.symbol.as_deref().and_then(normalize_symbol)?;
    let side = outcome.side.as_deref().and_then(Side::from_alias)?;

    let entry = match (outcome.entry_low, outcome.entry_high) {
        (Some(low), Some(high)) => Some(Entry::zone(low, high)),
        (Some(price), None) | (None, Some(price)) => Some(Entry::Single(price)),
        (None, None) => None,
    };
    let targets: Vec<f64> = outcome.targets.into_iter().filter(|t| *t > 0.0).collect();
    if entry.is_none() && targets.is_empty() {
        return None;
    }

    let mut signal = Signal::draft(symbol, side, trader, ParseMethod::Ai, "ai");
    signal.entry = entry.filter(|e| e.low() > 0.0);
    signal.targets = targets;
    signal.stop = outcome.stop.filter(|s| *s > 0.0);
    signal.leverage = outcome.leverage.filter(|l| *l > 0);
    signal.reason = outcome.reason.filter(|r| !r.trim().is_empty());
    signal.confidence = outcome.confidence.unwrap_or(AI_DEFAULT_CONFIDENCE).min(100);
    Some(signal)
}
