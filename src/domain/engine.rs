//! Virtual trade simulation engine.
//!
//! One long-lived task owns every open position and drives them through the
//! entry / take-profit / stop-loss state machine against a polled price feed.
//! Because the engine is the only writer, position mutation needs no locking.
//! The pure transition logic lives in [`step_position`] so the state machine
//! is testable without a feed or a store.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::error::SigtraderError;
use crate::domain::events::{PositionEvent, PositionEventKind};
use crate::domain::position::{EntryTouch, Position, PositionStatus};
use crate::domain::signal::{Side, Signal};
use crate::ports::price_port::PriceFeedPort;
use crate::ports::store_port::StorePort;

/// Fraction of the original notional each take-profit level closes.
pub const TP_LADDER: [f64; 3] = [50.0, 30.0, 20.0];

/// Fraction filled when price only touches the tolerance band of a zone.
const BAND_FILL_PCT: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    /// Tolerance around the entry zone, in percent.
    pub entry_tolerance_pct: f64,
    /// How long a pending entry stays live before it expires.
    pub entry_timeout_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            poll_interval_secs: 5,
            entry_tolerance_pct: 0.5,
            entry_timeout_hours: 48,
        }
    }
}

impl EngineConfig {
    pub fn entry_timeout(&self) -> Duration {
        Duration::hours(self.entry_timeout_hours)
    }
}

/// Apply one price observation to one position.
///
/// Transition order per tick: expiry for never-filled entries, then entry
/// fills, then stop-loss, then take-profits. A partially filled position
/// honors its stop and targets on the filled portion; the outstanding entry
/// is abandoned once an exit fires. A gap through several targets triggers
/// them in order within the tick. Exactly one event is emitted per
/// transition.
pub fn step_position(
    position: &mut Position,
    price: f64,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<PositionEvent> {
    let mut events = Vec::new();
    if position.is_terminal() {
        return events;
    }

    position.current_price = price;
    position.last_update = now;

    match position.status {
        PositionStatus::Pending => {
            if now >= position.entry_deadline {
                position.status = PositionStatus::Expired;
                position.closed_at = Some(now);
                events.push(PositionEvent::new(
                    &position.id,
                    PositionEventKind::Expired,
                    price,
                    "entry zone not reached before deadline",
                    now,
                ));
                return events;
            }

            match position.entry_touch(price, config.entry_tolerance_pct) {
                EntryTouch::Inside => {
                    position.record_fill(price, 100.0, now);
                    events.push(PositionEvent::new(
                        &position.id,
                        PositionEventKind::EntryFilled,
                        price,
                        format!("filled to 100% at {price}"),
                        now,
                    ));
                }
                EntryTouch::Band => {
                    position.record_fill(price, BAND_FILL_PCT, now);
                    events.push(PositionEvent::new(
                        &position.id,
                        PositionEventKind::PartialEntry,
                        price,
                        format!("tolerance band touch, filled {BAND_FILL_PCT}%"),
                        now,
                    ));
                }
                EntryTouch::Outside => {}
            }
            position.refresh_pnl();
            events
        }
        PositionStatus::PartialFill => {
            if position.entry_touch(price, config.entry_tolerance_pct) == EntryTouch::Inside {
                let outstanding = 100.0 - position.filled_pct;
                position.record_fill(price, outstanding, now);
                events.push(PositionEvent::new(
                    &position.id,
                    PositionEventKind::EntryFilled,
                    price,
                    format!("filled to 100% at {price}"),
                    now,
                ));
            } else {
                check_exits(position, price, now, &mut events);
            }
            position.refresh_pnl();
            events
        }
        PositionStatus::Filled
        | PositionStatus::Tp1Hit
        | PositionStatus::Tp2Hit
        | PositionStatus::Tp3Hit => {
            check_exits(position, price, now, &mut events);
            position.refresh_pnl();
            events
        }
        PositionStatus::SlHit | PositionStatus::Closed | PositionStatus::Expired => events,
    }
}

/// Stop-loss first, then the take-profit ladder. The stop short-circuits the
/// tick so a single wild print cannot both stop out and take profit.
fn check_exits(
    position: &mut Position,
    price: f64,
    now: DateTime<Utc>,
    events: &mut Vec<PositionEvent>,
) {
    if let Some(stop) = position.stop {
        if stop_crossed(position.side, price, stop) {
            let closed = position.close_fraction(position.remaining_pct, price);
            position.status = PositionStatus::SlHit;
            events.push(PositionEvent::new(
                &position.id,
                PositionEventKind::StopLoss,
                price,
                format!("stop {stop} crossed, closed remaining {closed}%"),
                now,
            ));
            position.status = PositionStatus::Closed;
            position.closed_at = Some(now);
            events.push(PositionEvent::new(
                &position.id,
                PositionEventKind::Closed,
                price,
                "closed by stop-loss",
                now,
            ));
            return;
        }
    }

    let mut level = position.status.tp_hits();
    while level < position.targets.len() {
        let target = position.targets[level];
        if !target_crossed(position.side, price, target) {
            break;
        }
        // The last listed target always closes what is left.
        let slice = if level + 1 == position.targets.len() {
            position.remaining_pct
        } else {
            TP_LADDER[level].min(position.remaining_pct)
        };
        let closed = position.close_fraction(slice, price);
        position.status = match level {
            0 => PositionStatus::Tp1Hit,
            1 => PositionStatus::Tp2Hit,
            _ => PositionStatus::Tp3Hit,
        };
        events.push(PositionEvent::new(
            &position.id,
            PositionEventKind::TakeProfit {
                level: (level + 1) as u8,
            },
            price,
            format!("target {target} crossed, closed {closed}%"),
            now,
        ));
        level += 1;
    }

    if position.remaining_pct <= f64::EPSILON && !position.is_terminal() {
        position.status = PositionStatus::Closed;
        position.closed_at = Some(now);
        events.push(PositionEvent::new(
            &position.id,
            PositionEventKind::Closed,
            price,
            "all targets done",
            now,
        ));
    }
}

fn stop_crossed(side: Side, price: f64, stop: f64) -> bool {
    match side {
        Side::Long => price <= stop,
        Side::Short => price >= stop,
    }
}

fn target_crossed(side: Side, price: f64, target: f64) -> bool {
    match side {
        Side::Long => price >= target,
        Side::Short => price <= target,
    }
}

pub struct TradeEngine {
    config: EngineConfig,
    feed: Arc<dyn PriceFeedPort>,
    store: Arc<dyn StorePort>,
    positions: HashMap<String, Position>,
}

impl TradeEngine {
    pub fn new(
        config: EngineConfig,
        feed: Arc<dyn PriceFeedPort>,
        store: Arc<dyn StorePort>,
    ) -> Self {
        TradeEngine {
            config,
            feed,
            store,
            positions: HashMap::new(),
        }
    }

    /// Reload non-terminal positions from the store. Returns how many were
    /// picked up.
    pub fn load_active(&mut self) -> Result<usize, SigtraderError> {
        let active = self.store.active_positions()?;
        let count = active.len();
        for position in active {
            self.positions.insert(position.id.clone(), position);
        }
        if count > 0 {
            info!(count, "reloaded active positions");
        }
        Ok(count)
    }

    /// Open a virtual position from a validated signal. Returns `None` when
    /// the signal cannot back a position (invalid, no entry); store failures
    /// are logged but do not undo the in-memory open.
    pub fn open_position(
        &mut self,
        signal: &Signal,
        size_usd: f64,
        default_leverage: u32,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let position = match Position::open(
            signal,
            size_usd,
            default_leverage,
            now,
            self.config.entry_timeout(),
        ) {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "signal cannot open a position");
                return None;
            }
        };

        let id = position.id.clone();
        let event = PositionEvent::new(
            &id,
            PositionEventKind::Created,
            0.0,
            format!(
                "{} {} {}usd {}x entry {}-{}",
                position.side.as_str(),
                position.symbol,
                position.size_usd,
                position.leverage,
                position.entry_low,
                position.entry_high
            ),
            now,
        );
        self.persist(&position, &[event]);
        info!(id = %id, symbol = %position.symbol, side = position.side.as_str(), "position opened");
        self.positions.insert(id.clone(), position);
        Some(id)
    }

    pub fn active_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    /// One monitoring pass: batch-fetch prices for all open symbols, step
    /// every position, persist transitions, drop terminal positions from the
    /// active set.
    pub async fn poll_once(&mut self, now: DateTime<Utc>) {
        if self.positions.is_empty() {
            return;
        }

        let symbols: Vec<String> = self
            .positions
            .values()
            .map(|p| p.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let quotes = match self.feed.prices(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "price poll failed, skipping tick");
                return;
            }
        };

        let mut finished = Vec::new();
        for (id, position) in self.positions.iter_mut() {
            let Some(quote) = quotes.get(&position.symbol) else {
                debug!(symbol = %position.symbol, "no quote this tick, position skipped");
                continue;
            };

            let events = step_position(position, quote.price, now, &self.config);
            if events.is_empty() {
                continue;
            }
            for event in &events {
                info!(
                    id = %id,
                    kind = event.kind.as_str(),
                    price = event.price,
                    "position transition"
                );
            }
            persist_with(&*self.store, position, &events);
            if position.is_terminal() {
                finished.push(id.clone());
            }
        }

        for id in finished {
            self.positions.remove(&id);
        }
    }

    /// Monitoring loop. Suspends on the poll interval; a cancellation
    /// finishes the in-flight pass before returning, so computed events are
    /// never dropped.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.poll_interval_secs.max(1));
        info!(
            interval_s = self.config.poll_interval_secs,
            "simulation engine started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("simulation engine stopping");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    self.poll_once(Utc::now()).await;
                }
            }
        }
    }

    fn persist(&self, position: &Position, events: &[PositionEvent]) {
        persist_with(&*self.store, position, events);
    }
}

/// Upsert the position and append its events. At-least-once: failures are
/// logged and in-memory state stands.
fn persist_with(store: &dyn StorePort, position: &Position, events: &[PositionEvent]) {
    if let Err(e) = store.upsert_position(position) {
        warn!(id = %position.id, error = %e, "position upsert failed");
    }
    for event in events {
        if let Err(e) = store.record_event(event) {
            warn!(id = %position.id, error = %e, "event write failed");
        }
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
        s.targets = vec![110.0, 120.0];
        s.stop = Some(90.0);
        s.is_valid = true;
        s
    }

    fn sample_position() -> Position {
        Position::open(&sample_signal(), 1_000.0, 1, Utc::now(), Duration::hours(48)).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn kinds(events: &[PositionEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind.as_str()).collect()
    }

    #[test]
    fn lifecycle_pending_filled_tp1_sl_closed() {
        // The canonical sequence: fill inside the zone, take TP1, stop out.
        let mut p = sample_position();
        let now = Utc::now();

        let e1 = step_position(&mut p, 101.0, now, &config());
        assert_eq!(kinds(&e1), vec!["entry_filled"]);
        assert_eq!(p.status, PositionStatus::Filled);
        assert_relative_eq!(p.avg_entry_price, 101.0);

        let e2 = step_position(&mut p, 111.0, now, &config());
        assert_eq!(kinds(&e2), vec!["tp1"]);
        assert_eq!(p.status, PositionStatus::Tp1Hit);
        assert_relative_eq!(p.remaining_pct, 50.0);

        let e3 = step_position(&mut p, 89.0, now, &config());
        assert_eq!(kinds(&e3), vec!["stop_loss", "closed"]);
        assert_eq!(p.status, PositionStatus::Closed);
        assert_relative_eq!(p.remaining_pct, 0.0);
        assert!(p.closed_at.is_some());
    }

    #[test]
    fn stop_is_checked_before_targets() {
        // A print that crosses both the stop and a target must stop out.
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 101.0, now, &config());
        p.stop = Some(115.0);
        let events = step_position(&mut p, 112.0, now, &config());
        assert_eq!(kinds(&events), vec!["stop_loss", "closed"]);
        assert_eq!(p.status, PositionStatus::Closed);
    }

    #[test]
    fn gap_through_two_targets_triggers_both_in_order() {
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 101.0, now, &config());
        let events = step_position(&mut p, 125.0, now, &config());
        assert_eq!(kinds(&events), vec!["tp1", "tp2", "closed"]);
        assert_eq!(p.status, PositionStatus::Closed);
        assert_relative_eq!(p.remaining_pct, 0.0);
    }

    #[test]
    fn last_target_closes_everything() {
        // Two listed targets: TP1 takes 50, TP2 takes the remaining 50.
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 101.0, now, &config());
        step_position(&mut p, 111.0, now, &config());
        assert_relative_eq!(p.remaining_pct, 50.0);
        let events = step_position(&mut p, 121.0, now, &config());
        assert_eq!(kinds(&events), vec!["tp2", "closed"]);
        assert_relative_eq!(p.remaining_pct, 0.0);
    }

    #[test]
    fn three_targets_follow_the_ladder() {
        let mut signal = sample_signal();
        signal.targets = vec![110.0, 120.0, 130.0];
        let mut p =
            Position::open(&signal, 1_000.0, 1, Utc::now(), Duration::hours(48)).unwrap();
        let now = Utc::now();
        step_position(&mut p, 101.0, now, &config());
        step_position(&mut p, 110.5, now, &config());
        assert_relative_eq!(p.remaining_pct, 50.0);
        step_position(&mut p, 120.5, now, &config());
        assert_relative_eq!(p.remaining_pct, 20.0);
        let events = step_position(&mut p, 130.5, now, &config());
        assert_eq!(kinds(&events), vec!["tp3", "closed"]);
        assert_relative_eq!(p.remaining_pct, 0.0);
    }

    #[test]
    fn band_touch_fills_half_then_inside_completes() {
        let mut p = sample_position();
        let now = Utc::now();

        let e1 = step_position(&mut p, 99.6, now, &config());
        assert_eq!(kinds(&e1), vec!["partial_entry"]);
        assert_eq!(p.status, PositionStatus::PartialFill);
        assert_relative_eq!(p.filled_pct, 50.0);

        let e2 = step_position(&mut p, 100.5, now, &config());
        assert_eq!(kinds(&e2), vec!["entry_filled"]);
        assert_eq!(p.status, PositionStatus::Filled);
        assert_relative_eq!(p.filled_pct, 100.0);
        // Weighted average of the two fills.
        assert_relative_eq!(p.avg_entry_price, (99.6 + 100.5) / 2.0);
    }

    #[test]
    fn pending_entry_expires_after_deadline() {
        let mut p = sample_position();
        let later = p.entry_deadline + Duration::minutes(1);
        let events = step_position(&mut p, 150.0, later, &config());
        assert_eq!(kinds(&events), vec!["expired"]);
        assert_eq!(p.status, PositionStatus::Expired);
        assert!(p.is_terminal());
    }

    #[test]
    fn partially_filled_position_does_not_expire() {
        let mut p = sample_position();
        step_position(&mut p, 99.6, Utc::now(), &config());
        assert_eq!(p.status, PositionStatus::PartialFill);
        let later = p.entry_deadline + Duration::minutes(1);
        let events = step_position(&mut p, 105.0, later, &config());
        assert!(events.is_empty());
        assert_eq!(p.status, PositionStatus::PartialFill);
    }

    #[test]
    fn partial_fill_takes_profit_on_the_filled_half() {
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 99.6, now, &config());
        assert_relative_eq!(p.filled_pct, 50.0);

        let events = step_position(&mut p, 111.0, now, &config());
        assert_eq!(kinds(&events), vec!["tp1"]);
        assert_eq!(p.status, PositionStatus::Tp1Hit);
        assert_relative_eq!(p.filled_pct, 50.0);
        assert_relative_eq!(p.remaining_pct, 50.0);
    }

    #[test]
    fn partial_fill_stops_out() {
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 99.6, now, &config());

        let events = step_position(&mut p, 89.0, now, &config());
        assert_eq!(kinds(&events), vec!["stop_loss", "closed"]);
        assert_eq!(p.status, PositionStatus::Closed);
        assert_relative_eq!(p.remaining_pct, 0.0);
    }

    #[test]
    fn short_lifecycle_mirrors_long() {
        let mut signal = sample_signal();
        signal.side = Side::Short;
        signal.entry = Some(Entry::Single(100.0));
        signal.targets = vec![90.0, 80.0];
        signal.stop = Some(110.0);
        let mut p =
            Position::open(&signal, 1_000.0, 1, Utc::now(), Duration::hours(48)).unwrap();
        let now = Utc::now();

        step_position(&mut p, 100.2, now, &config());
        assert_eq!(p.status, PositionStatus::Filled);

        step_position(&mut p, 89.0, now, &config());
        assert_eq!(p.status, PositionStatus::Tp1Hit);
        assert!(p.pnl_pct > 0.0);

        let events = step_position(&mut p, 111.0, now, &config());
        assert_eq!(kinds(&events), vec!["stop_loss", "closed"]);
    }

    #[test]
    fn terminal_position_ignores_ticks() {
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 101.0, now, &config());
        step_position(&mut p, 89.0, now, &config());
        assert_eq!(p.status, PositionStatus::Closed);
        let events = step_position(&mut p, 200.0, now, &config());
        assert!(events.is_empty());
    }

    #[test]
    fn no_transition_tick_updates_pnl_only() {
        let mut p = sample_position();
        let now = Utc::now();
        step_position(&mut p, 101.0, now, &config());
        let events = step_position(&mut p, 105.0, now, &config());
        assert!(events.is_empty());
        assert_relative_eq!(p.current_price, 105.0);
        assert!(p.pnl_pct > 0.0);
    }
}
