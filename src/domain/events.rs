//! Position audit events.
//!
//! Write-once records emitted by the simulation engine, exactly one per state
//! transition. Per-tick price updates are carried on the position row itself,
//! not as events, so the audit trail stays proportional to lifecycle changes
//! rather than to feed traffic.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionEventKind {
    Created,
    /// Price touched the tolerance band around the entry zone; half the
    /// position filled.
    PartialEntry,
    EntryFilled,
    /// `level` is 1-based (TP1..TP3).
    TakeProfit { level: u8 },
    StopLoss,
    Expired,
    Closed,
}

impl PositionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionEventKind::Created => "created",
            PositionEventKind::PartialEntry => "partial_entry",
            PositionEventKind::EntryFilled => "entry_filled",
            PositionEventKind::TakeProfit { level: 1 } => "tp1",
            PositionEventKind::TakeProfit { level: 2 } => "tp2",
            PositionEventKind::TakeProfit { .. } => "tp3",
            PositionEventKind::StopLoss => "stop_loss",
            PositionEventKind::Expired => "expired",
            PositionEventKind::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionEvent {
    pub position_id: String,
    pub kind: PositionEventKind,
    /// Price at the transition; zero for time-driven transitions with no
    /// tick, e.g. expiry between fills.
    pub price: f64,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl PositionEvent {
    pub fn new(
        position_id: &str,
        kind: PositionEventKind,
        price: f64,
        detail: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        PositionEvent {
            position_id: position_id.to_string(),
            kind,
            price,
            detail: detail.into(),
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(PositionEventKind::Created.as_str(), "created");
        assert_eq!(PositionEventKind::TakeProfit { level: 1 }.as_str(), "tp1");
        assert_eq!(PositionEventKind::TakeProfit { level: 3 }.as_str(), "tp3");
        assert_eq!(PositionEventKind::StopLoss.as_str(), "stop_loss");
    }
}
