//! Persistence port trait.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::error::SigtraderError;
use crate::domain::events::PositionEvent;
use crate::domain::message::RawMessage;
use crate::domain::position::Position;
use crate::domain::signal::Signal;

/// Aggregate counts for the `stats` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSummary {
    pub messages: u64,
    pub signals: u64,
    pub signals_valid: u64,
    pub signals_by_rule: u64,
    pub signals_by_fallback: u64,
    pub signals_by_ai: u64,
    pub parse_failures: u64,
    pub position_events: u64,
    /// (status, count) pairs, alphabetical by status.
    pub positions_by_status: Vec<(String, u64)>,
}

/// Port for the append-only store.
///
/// Messages, signals, failures, fingerprints, and events are append-only;
/// positions are upserted by id. Writes are at-least-once: the callers log
/// failures and keep their in-memory state.
pub trait StorePort: Send + Sync {
    fn record_message(&self, message: &RawMessage) -> Result<(), SigtraderError>;

    /// Signals are persisted valid or not; invalid ones are the audit trail.
    fn record_signal(&self, signal: &Signal) -> Result<(), SigtraderError>;

    fn record_failure(
        &self,
        trader: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SigtraderError>;

    fn record_fingerprint(
        &self,
        fingerprint: &str,
        trader: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), SigtraderError>;

    /// Fingerprints first seen at or after `since`, for reseeding the dedup
    /// window on startup.
    fn recent_fingerprints(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>, SigtraderError>;

    fn upsert_position(&self, position: &Position) -> Result<(), SigtraderError>;

    fn record_event(&self, event: &PositionEvent) -> Result<(), SigtraderError>;

    /// Positions whose status is not terminal, for reloading the engine's
    /// active set on startup.
    fn active_positions(&self) -> Result<Vec<Position>, SigtraderError>;

    fn summary(&self) -> Result<StoreSummary, SigtraderError>;
}
