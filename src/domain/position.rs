//! Virtual position state.
//!
//! A position is opened from a validated signal and driven through its
//! lifecycle by the simulation engine, which owns it exclusively. Percentages
//! are tracked against the original notional: `filled_pct` is how much of the
//! entry has executed, `remaining_pct` how much of the filled position is
//! still open after take-profit slices.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::error::SigtraderError;
use crate::domain::signal::{Side, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionStatus {
    Pending,
    PartialFill,
    Filled,
    Tp1Hit,
    Tp2Hit,
    Tp3Hit,
    SlHit,
    Closed,
    Expired,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Pending => "PENDING",
            PositionStatus::PartialFill => "PARTIAL_FILL",
            PositionStatus::Filled => "FILLED",
            PositionStatus::Tp1Hit => "TP1_HIT",
            PositionStatus::Tp2Hit => "TP2_HIT",
            PositionStatus::Tp3Hit => "TP3_HIT",
            PositionStatus::SlHit => "SL_HIT",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(raw: &str) -> Option<PositionStatus> {
        match raw {
            "PENDING" => Some(PositionStatus::Pending),
            "PARTIAL_FILL" => Some(PositionStatus::PartialFill),
            "FILLED" => Some(PositionStatus::Filled),
            "TP1_HIT" => Some(PositionStatus::Tp1Hit),
            "TP2_HIT" => Some(PositionStatus::Tp2Hit),
            "TP3_HIT" => Some(PositionStatus::Tp3Hit),
            "SL_HIT" => Some(PositionStatus::SlHit),
            "CLOSED" => Some(PositionStatus::Closed),
            "EXPIRED" => Some(PositionStatus::Expired),
            _ => None,
        }
    }

    /// Terminal statuses leave the engine's active set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Expired)
    }

    /// Take-profit levels already consumed in this status.
    pub fn tp_hits(&self) -> usize {
        match self {
            PositionStatus::Tp1Hit => 1,
            PositionStatus::Tp2Hit => 2,
            PositionStatus::Tp3Hit => 3,
            _ => 0,
        }
    }
}

/// Where a price sits relative to the entry zone and its tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTouch {
    /// Inside the strict zone: fill everything outstanding.
    Inside,
    /// Within the tolerance band around the zone: fill half.
    Band,
    Outside,
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    /// Original notional in quote currency.
    pub size_usd: f64,
    pub leverage: u32,
    pub margin_usd: f64,
    /// Entry zone; equal bounds for a single-price entry.
    pub entry_low: f64,
    pub entry_high: f64,
    /// Up to three take-profit prices, in caller order.
    pub targets: Vec<f64>,
    pub stop: Option<f64>,
    /// Size-weighted average of entry fills; zero until the first fill.
    pub avg_entry_price: f64,
    pub current_price: f64,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub filled_pct: f64,
    pub remaining_pct: f64,
    pub status: PositionStatus,
    pub signal_time: DateTime<Utc>,
    pub entry_deadline: DateTime<Utc>,
    pub first_fill_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Open a virtual position from a validated signal.
    ///
    /// Requires a valid signal with an entry; targets beyond the third are
    /// dropped. The signal's leverage hint wins over the caller's default.
    pub fn open(
        signal: &Signal,
        size_usd: f64,
        default_leverage: u32,
        now: DateTime<Utc>,
        entry_timeout: Duration,
    ) -> Result<Position, SigtraderError> {
        if !signal.is_valid {
            return Err(SigtraderError::UnusableSignal {
                reason: format!("signal is invalid: {}", signal.errors.join("; ")),
            });
        }
        let entry = signal.entry.ok_or_else(|| SigtraderError::UnusableSignal {
            reason: "signal has no entry price".to_string(),
        })?;
        if size_usd <= 0.0 {
            return Err(SigtraderError::UnusableSignal {
                reason: format!("position size {size_usd} must be positive"),
            });
        }
        let leverage = signal.leverage.unwrap_or(default_leverage).max(1);

        Ok(Position {
            id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            size_usd,
            leverage,
            margin_usd: size_usd / leverage as f64,
            entry_low: entry.low(),
            entry_high: entry.high(),
            targets: signal.targets.iter().take(3).copied().collect(),
            stop: signal.stop,
            avg_entry_price: 0.0,
            current_price: 0.0,
            pnl_pct: 0.0,
            pnl_usd: 0.0,
            filled_pct: 0.0,
            remaining_pct: 100.0,
            status: PositionStatus::Pending,
            signal_time: signal.received_at,
            entry_deadline: now + entry_timeout,
            first_fill_at: None,
            last_update: now,
            closed_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Notional still exposed to the market.
    pub fn remaining_notional(&self) -> f64 {
        self.size_usd * (self.filled_pct / 100.0) * (self.remaining_pct / 100.0)
    }

    /// Classify a price against the entry zone.
    ///
    /// For a single-price entry the tolerance band is the zone: any touch
    /// within it fills in full.
    pub fn entry_touch(&self, price: f64, tolerance_pct: f64) -> EntryTouch {
        let tol = tolerance_pct / 100.0;
        let band_low = self.entry_low * (1.0 - tol);
        let band_high = self.entry_high * (1.0 + tol);

        if self.entry_low == self.entry_high {
            return if price >= band_low && price <= band_high {
                EntryTouch::Inside
            } else {
                EntryTouch::Outside
            };
        }
        if price >= self.entry_low && price <= self.entry_high {
            EntryTouch::Inside
        } else if price >= band_low && price <= band_high {
            EntryTouch::Band
        } else {
            EntryTouch::Outside
        }
    }

    /// Record an entry fill for `pct` percent of the original size at
    /// `price`, updating the size-weighted average entry.
    pub fn record_fill(&mut self, price: f64, pct: f64, now: DateTime<Utc>) {
        let pct = pct.clamp(0.0, 100.0 - self.filled_pct);
        if pct <= 0.0 {
            return;
        }
        let prev = self.filled_pct;
        self.avg_entry_price = if prev <= 0.0 {
            price
        } else {
            (self.avg_entry_price * prev + price * pct) / (prev + pct)
        };
        self.filled_pct = prev + pct;
        if self.first_fill_at.is_none() {
            self.first_fill_at = Some(now);
        }
        self.status = if self.filled_pct >= 100.0 {
            PositionStatus::Filled
        } else {
            PositionStatus::PartialFill
        };
    }

    /// Close `pct` percent of the original size at `price`. Returns the
    /// realized fraction actually closed.
    pub fn close_fraction(&mut self, pct: f64, price: f64) -> f64 {
        let closed = pct.clamp(0.0, self.remaining_pct);
        self.remaining_pct -= closed;
        self.current_price = price;
        closed
    }

    /// Recompute running PnL from the current price.
    ///
    /// `pct = ((price - entry) / entry) * side * leverage`, in percent;
    /// `usd` applies it to the remaining notional.
    pub fn refresh_pnl(&mut self) {
        if self.avg_entry_price <= 0.0 || self.current_price <= 0.0 {
            return;
        }
        self.pnl_pct = (self.current_price - self.avg_entry_price) / self.avg_entry_price
            * self.side.sign()
            * self.leverage as f64
            * 100.0;
        self.pnl_usd = self.remaining_notional() * self.pnl_pct / 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{Entry, ParseMethod};
    use approx::assert_relative_eq;

    fn sample_signal() -> Signal {
        let mut s = Signal::draft(
            "BTCUSDT".into(),
            Side::Long,
            "whale-01",
            ParseMethod::Rule,
            "trade-format-a",
        );
        s.entry = Some(Entry::zone(100.0, 102.0));
        s.targets = vec![110.0, 120.0, 130.0];
        s.stop = Some(90.0);
        s.is_valid = true;
        s
    }

    fn sample_position() -> Position {
        Position::open(&sample_signal(), 1_000.0, 2, Utc::now(), Duration::hours(48)).unwrap()
    }

    #[test]
    fn open_from_valid_signal() {
        let p = sample_position();
        assert_eq!(p.status, PositionStatus::Pending);
        assert_eq!(p.entry_low, 100.0);
        assert_eq!(p.entry_high, 102.0);
        assert_eq!(p.targets, vec![110.0, 120.0, 130.0]);
        assert_eq!(p.leverage, 2);
        assert_relative_eq!(p.margin_usd, 500.0);
        assert_relative_eq!(p.remaining_pct, 100.0);
        assert_relative_eq!(p.filled_pct, 0.0);
    }

    #[test]
    fn open_rejects_invalid_signal() {
        let mut s = sample_signal();
        s.is_valid = false;
        let err = Position::open(&s, 1_000.0, 2, Utc::now(), Duration::hours(48));
        assert!(matches!(err, Err(SigtraderError::UnusableSignal { .. })));
    }

    #[test]
    fn open_rejects_signal_without_entry() {
        let mut s = sample_signal();
        s.entry = None;
        let err = Position::open(&s, 1_000.0, 2, Utc::now(), Duration::hours(48));
        assert!(matches!(err, Err(SigtraderError::UnusableSignal { .. })));
    }

    #[test]
    fn signal_leverage_overrides_default() {
        let mut s = sample_signal();
        s.leverage = Some(10);
        let p = Position::open(&s, 1_000.0, 2, Utc::now(), Duration::hours(48)).unwrap();
        assert_eq!(p.leverage, 10);
        assert_relative_eq!(p.margin_usd, 100.0);
    }

    #[test]
    fn only_first_three_targets_are_kept() {
        let mut s = sample_signal();
        s.targets = vec![110.0, 120.0, 130.0, 140.0, 150.0];
        let p = Position::open(&s, 1_000.0, 2, Utc::now(), Duration::hours(48)).unwrap();
        assert_eq!(p.targets, vec![110.0, 120.0, 130.0]);
    }

    #[test]
    fn entry_touch_zone() {
        let p = sample_position();
        assert_eq!(p.entry_touch(101.0, 0.5), EntryTouch::Inside);
        assert_eq!(p.entry_touch(100.0, 0.5), EntryTouch::Inside);
        assert_eq!(p.entry_touch(99.6, 0.5), EntryTouch::Band);
        assert_eq!(p.entry_touch(102.4, 0.5), EntryTouch::Band);
        assert_eq!(p.entry_touch(98.0, 0.5), EntryTouch::Outside);
        assert_eq!(p.entry_touch(105.0, 0.5), EntryTouch::Outside);
    }

    #[test]
    fn entry_touch_single_price() {
        let mut s = sample_signal();
        s.entry = Some(Entry::Single(100.0));
        let p = Position::open(&s, 1_000.0, 2, Utc::now(), Duration::hours(48)).unwrap();
        assert_eq!(p.entry_touch(100.3, 0.5), EntryTouch::Inside);
        assert_eq!(p.entry_touch(99.6, 0.5), EntryTouch::Inside);
        assert_eq!(p.entry_touch(101.0, 0.5), EntryTouch::Outside);
    }

    #[test]
    fn fills_accumulate_weighted_average() {
        let mut p = sample_position();
        p.record_fill(100.0, 50.0, Utc::now());
        assert_eq!(p.status, PositionStatus::PartialFill);
        assert_relative_eq!(p.avg_entry_price, 100.0);
        p.record_fill(102.0, 50.0, Utc::now());
        assert_eq!(p.status, PositionStatus::Filled);
        assert_relative_eq!(p.avg_entry_price, 101.0);
        assert_relative_eq!(p.filled_pct, 100.0);
        assert!(p.first_fill_at.is_some());
    }

    #[test]
    fn overfill_is_clamped() {
        let mut p = sample_position();
        p.record_fill(100.0, 80.0, Utc::now());
        p.record_fill(101.0, 80.0, Utc::now());
        assert_relative_eq!(p.filled_pct, 100.0);
    }

    #[test]
    fn pnl_long_with_leverage() {
        let mut p = sample_position();
        p.record_fill(100.0, 100.0, Utc::now());
        p.current_price = 105.0;
        p.refresh_pnl();
        // 5% move, 2x leverage.
        assert_relative_eq!(p.pnl_pct, 10.0);
        assert_relative_eq!(p.pnl_usd, 100.0);
    }

    #[test]
    fn pnl_short_mirrors_long() {
        let mut s = sample_signal();
        s.side = Side::Short;
        s.targets = vec![90.0];
        s.stop = Some(110.0);
        let mut p = Position::open(&s, 1_000.0, 2, Utc::now(), Duration::hours(48)).unwrap();
        p.record_fill(100.0, 100.0, Utc::now());
        p.current_price = 95.0;
        p.refresh_pnl();
        assert_relative_eq!(p.pnl_pct, 10.0);
    }

    #[test]
    fn closing_reduces_remaining_and_pnl_base() {
        let mut p = sample_position();
        p.record_fill(100.0, 100.0, Utc::now());
        let closed = p.close_fraction(50.0, 110.0);
        assert_relative_eq!(closed, 50.0);
        assert_relative_eq!(p.remaining_pct, 50.0);
        assert_relative_eq!(p.remaining_notional(), 500.0);
        p.refresh_pnl();
        // 10% move, 2x leverage on half the notional.
        assert_relative_eq!(p.pnl_pct, 20.0);
        assert_relative_eq!(p.pnl_usd, 100.0);
    }
}
