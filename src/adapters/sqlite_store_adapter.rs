//! SQLite store adapter.
//!
//! Append-only tables for messages, signals, parse failures, fingerprints,
//! and position events; positions are upserted by id. Targets on a position
//! map onto the three take-profit columns; a signal's full target list is
//! kept as JSON since it is audit data, not query data.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::domain::error::SigtraderError;
use crate::domain::events::PositionEvent;
use crate::domain::message::RawMessage;
use crate::domain::position::{Position, PositionStatus};
use crate::domain::signal::{Side, Signal};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{StorePort, StoreSummary};

pub struct SqliteStoreAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStoreAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SigtraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| SigtraderError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SigtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| SigtraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT,
                trader TEXT NOT NULL,
                text TEXT NOT NULL,
                message_id TEXT,
                received_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL,
                trader TEXT NOT NULL,
                source TEXT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_low REAL,
                entry_high REAL,
                targets TEXT NOT NULL,
                stop REAL,
                leverage INTEGER,
                reason TEXT,
                confidence INTEGER NOT NULL,
                method TEXT NOT NULL,
                parser_id TEXT NOT NULL,
                is_valid INTEGER NOT NULL,
                errors TEXT NOT NULL,
                warnings TEXT NOT NULL,
                received_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_trader ON signals(trader);
            CREATE TABLE IF NOT EXISTS parse_failures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trader TEXT NOT NULL,
                text TEXT NOT NULL,
                at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS fingerprints (
                fingerprint TEXT PRIMARY KEY,
                trader TEXT NOT NULL,
                seen_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fingerprints_seen_at ON fingerprints(seen_at);
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                size_usd REAL NOT NULL,
                leverage INTEGER NOT NULL,
                margin_usd REAL NOT NULL,
                entry_low REAL NOT NULL,
                entry_high REAL NOT NULL,
                tp1 REAL,
                tp2 REAL,
                tp3 REAL,
                stop REAL,
                avg_entry_price REAL NOT NULL,
                current_price REAL NOT NULL,
                pnl_pct REAL NOT NULL,
                pnl_usd REAL NOT NULL,
                filled_pct REAL NOT NULL,
                remaining_pct REAL NOT NULL,
                status TEXT NOT NULL,
                signal_time TEXT NOT NULL,
                entry_deadline TEXT NOT NULL,
                first_fill_at TEXT,
                last_update TEXT NOT NULL,
                closed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status);
            CREATE TABLE IF NOT EXISTS position_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                price REAL NOT NULL,
                detail TEXT NOT NULL,
                at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_position_events_position ON position_events(position_id);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn conn(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, SigtraderError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| SigtraderError::Database {
                reason: e.to_string(),
            })
    }
}

fn query_err(e: rusqlite::Error) -> SigtraderError {
    SigtraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn ts_opt(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(ts)
}

fn parse_ts(raw: &str, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_side(raw: &str, idx: usize) -> Result<Side, rusqlite::Error> {
    match raw {
        "LONG" => Ok(Side::Long),
        "SHORT" => Ok(Side::Short),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown side `{other}`").into(),
        )),
    }
}

impl StorePort for SqliteStoreAdapter {
    fn record_message(&self, message: &RawMessage) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (source, trader, text, message_id, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.source,
                message.trader,
                message.text,
                message.message_id,
                ts(message.received_at)
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn record_signal(&self, signal: &Signal) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        let targets = serde_json::to_string(&signal.targets).unwrap_or_else(|_| "[]".into());
        let errors = serde_json::to_string(&signal.errors).unwrap_or_else(|_| "[]".into());
        let warnings = serde_json::to_string(&signal.warnings).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "INSERT INTO signals (fingerprint, trader, source, symbol, side, entry_low,
                entry_high, targets, stop, leverage, reason, confidence, method, parser_id,
                is_valid, errors, warnings, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                signal.fingerprint,
                signal.trader,
                signal.source,
                signal.symbol,
                signal.side.as_str(),
                signal.entry.map(|e| e.low()),
                signal.entry.map(|e| e.high()),
                targets,
                signal.stop,
                signal.leverage,
                signal.reason,
                signal.confidence,
                signal.method.as_str(),
                signal.parser_id,
                signal.is_valid,
                errors,
                warnings,
                ts(signal.received_at)
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn record_failure(
        &self,
        trader: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO parse_failures (trader, text, at) VALUES (?1, ?2, ?3)",
            params![trader, text, ts(at)],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn record_fingerprint(
        &self,
        fingerprint: &str,
        trader: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO fingerprints (fingerprint, trader, seen_at)
             VALUES (?1, ?2, ?3)",
            params![fingerprint, trader, ts(seen_at)],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn recent_fingerprints(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT fingerprint, seen_at FROM fingerprints WHERE seen_at >= ?1")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![ts(since)], |row| {
                let fp: String = row.get(0)?;
                let seen_raw: String = row.get(1)?;
                Ok((fp, parse_ts(&seen_raw, 1)?))
            })
            .map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(query_err)?);
        }
        Ok(out)
    }

    fn upsert_position(&self, position: &Position) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO positions (id, symbol, side, size_usd, leverage,
                margin_usd, entry_low, entry_high, tp1, tp2, tp3, stop, avg_entry_price,
                current_price, pnl_pct, pnl_usd, filled_pct, remaining_pct, status,
                signal_time, entry_deadline, first_fill_at, last_update, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            params![
                position.id,
                position.symbol,
                position.side.as_str(),
                position.size_usd,
                position.leverage,
                position.margin_usd,
                position.entry_low,
                position.entry_high,
                position.targets.first().copied(),
                position.targets.get(1).copied(),
                position.targets.get(2).copied(),
                position.stop,
                position.avg_entry_price,
                position.current_price,
                position.pnl_pct,
                position.pnl_usd,
                position.filled_pct,
                position.remaining_pct,
                position.status.as_str(),
                ts(position.signal_time),
                ts(position.entry_deadline),
                ts_opt(position.first_fill_at),
                ts(position.last_update),
                ts_opt(position.closed_at)
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn record_event(&self, event: &PositionEvent) -> Result<(), SigtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO position_events (position_id, kind, price, detail, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.position_id,
                event.kind.as_str(),
                event.price,
                event.detail,
                ts(event.at)
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn active_positions(&self) -> Result<Vec<Position>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, symbol, side, size_usd, leverage, margin_usd, entry_low,
                    entry_high, tp1, tp2, tp3, stop, avg_entry_price, current_price,
                    pnl_pct, pnl_usd, filled_pct, remaining_pct, status, signal_time,
                    entry_deadline, first_fill_at, last_update, closed_at
                 FROM positions WHERE status NOT IN ('CLOSED', 'EXPIRED')",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let side_raw: String = row.get(2)?;
                let status_raw: String = row.get(18)?;
                let status = PositionStatus::from_str(&status_raw).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        18,
                        rusqlite::types::Type::Text,
                        format!("unknown status `{status_raw}`").into(),
                    )
                })?;
                let signal_time: String = row.get(19)?;
                let entry_deadline: String = row.get(20)?;
                let first_fill_at: Option<String> = row.get(21)?;
                let last_update: String = row.get(22)?;
                let closed_at: Option<String> = row.get(23)?;

                let targets: Vec<f64> = [
                    row.get::<_, Option<f64>>(8)?,
                    row.get::<_, Option<f64>>(9)?,
                    row.get::<_, Option<f64>>(10)?,
                ]
                .into_iter()
                .flatten()
                .collect();

                Ok(Position {
                    id: row.get(0)?,
                    symbol: row.get(1)?,
                    side: parse_side(&side_raw, 2)?,
                    size_usd: row.get(3)?,
                    leverage: row.get(4)?,
                    margin_usd: row.get(5)?,
                    entry_low: row.get(6)?,
                    entry_high: row.get(7)?,
                    targets,
                    stop: row.get(11)?,
                    avg_entry_price: row.get(12)?,
                    current_price: row.get(13)?,
                    pnl_pct: row.get(14)?,
                    pnl_usd: row.get(15)?,
                    filled_pct: row.get(16)?,
                    remaining_pct: row.get(17)?,
                    status,
                    signal_time: parse_ts(&signal_time, 19)?,
                    entry_deadline: parse_ts(&entry_deadline, 20)?,
                    first_fill_at: match first_fill_at {
                        Some(raw) => Some(parse_ts(&raw, 21)?),
                        None => None,
                    },
                    last_update: parse_ts(&last_update, 22)?,
                    closed_at: match closed_at {
                        Some(raw) => Some(parse_ts(&raw, 23)?),
                        None => None,
                    },
                })
            })
            .map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(query_err)?);
        }
        Ok(out)
    }

    fn summary(&self) -> Result<StoreSummary, SigtraderError> {
        let conn = self.conn()?;

        let count = |sql: &str| -> Result<u64, SigtraderError> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|v| v as u64)
                .map_err(query_err)
        };

        let mut summary = StoreSummary {
            messages: count("SELECT COUNT(*) FROM messages")?,
            signals: count("SELECT COUNT(*) FROM signals")?,
            signals_valid: count("SELECT COUNT(*) FROM signals WHERE is_valid = 1")?,
            signals_by_rule: count("SELECT COUNT(*) FROM signals WHERE method = 'rule'")?,
            signals_by_fallback: count("SELECT COUNT(*) FROM signals WHERE method = 'fallback'")?,
            signals_by_ai: count("SELECT COUNT(*) FROM signals WHERE method = 'ai'")?,
            parse_failures: count("SELECT COUNT(*) FROM parse_failures")?,
            position_events: count("SELECT COUNT(*) FROM position_events")?,
            positions_by_status: Vec::new(),
        };

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM positions GROUP BY status ORDER BY status")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(query_err)?;
        for row in rows {
            summary.positions_by_status.push(row.map_err(query_err)?);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{Entry, ParseMethod};
    use chrono::Duration;

    fn store() -> SqliteStoreAdapter {
        let store = SqliteStoreAdapter::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
    }

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
        s.fingerprint = "fp-1".into();
        s.is_valid = true;
        s.confidence = 90;
        s
    }

    fn sample_position() -> Position {
        Position::open(&sample_signal(), 1_000.0, 2, Utc::now(), Duration::hours(48)).unwrap()
    }

    #[test]
    fn schema_initializes_twice() {
        let store = store();
        store.initialize_schema().unwrap();
    }

    #[test]
    fn messages_and_signals_are_counted() {
        let store = store();
        store
            .record_message(&RawMessage::new("whale-01", "BTCUSDT LONG Entry: 45000"))
            .unwrap();
        store.record_signal(&sample_signal()).unwrap();
        store.record_failure("whale-02", "gm", Utc::now()).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.messages, 1);
        assert_eq!(summary.signals, 1);
        assert_eq!(summary.signals_valid, 1);
        assert_eq!(summary.signals_by_rule, 1);
        assert_eq!(summary.parse_failures, 1);
    }

    #[test]
    fn fingerprints_round_trip_within_window() {
        let store = store();
        let now = Utc::now();
        store.record_fingerprint("fp-old", "t", now - Duration::hours(3)).unwrap();
        store.record_fingerprint("fp-new", "t", now).unwrap();

        let recent = store.recent_fingerprints(now - Duration::hours(2)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].0, "fp-new");
    }

    #[test]
    fn positions_round_trip() {
        let store = store();
        let position = sample_position();
        store.upsert_position(&position).unwrap();

        let active = store.active_positions().unwrap();
        assert_eq!(active.len(), 1);
        let loaded = &active[0];
        assert_eq!(loaded.id, position.id);
        assert_eq!(loaded.symbol, "BTCUSDT");
        assert_eq!(loaded.side, Side::Long);
        assert_eq!(loaded.targets, vec![110.0, 120.0]);
        assert_eq!(loaded.status, PositionStatus::Pending);
        assert_eq!(loaded.stop, Some(90.0));
    }

    #[test]
    fn terminal_positions_are_not_active() {
        let store = store();
        let mut position = sample_position();
        position.status = PositionStatus::Closed;
        store.upsert_position(&position).unwrap();
        assert!(store.active_positions().unwrap().is_empty());

        let summary = store.summary().unwrap();
        assert_eq!(summary.positions_by_status, vec![("CLOSED".to_string(), 1)]);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let store = store();
        let mut position = sample_position();
        store.upsert_position(&position).unwrap();
        position.status = PositionStatus::Filled;
        position.filled_pct = 100.0;
        store.upsert_position(&position).unwrap();

        let active = store.active_positions().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, PositionStatus::Filled);
    }

    #[test]
    fn events_append() {
        use crate::domain::events::{PositionEvent, PositionEventKind};
        let store = store();
        let event = PositionEvent::new("p-1", PositionEventKind::Created, 0.0, "", Utc::now());
        store.record_event(&event).unwrap();
        store.record_event(&event).unwrap();
        assert_eq!(store.summary().unwrap().position_events, 2);
    }
}
