//! CSV price replay adapter.
//!
//! Loads recorded price ticks for the `replay` command, which drives the
//! simulation state machine deterministically without a live feed. Expected
//! columns: `price`, optional `symbol`, optional RFC3339 `at`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::domain::error::SigtraderError;

#[derive(Debug, Clone)]
pub struct ReplayTick {
    pub price: f64,
    pub symbol: Option<String>,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ReplayRow {
    price: f64,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    at: Option<String>,
}

pub fn load_ticks(path: &Path) -> Result<Vec<ReplayTick>, SigtraderError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| SigtraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut ticks = Vec::new();
    for (line, row) in reader.deserialize::<ReplayRow>().enumerate() {
        let row = row.map_err(|e| SigtraderError::ConfigParse {
            file: path.display().to_string(),
            reason: format!("row {}: {e}", line + 2),
        })?;
        if !row.price.is_finite() || row.price <= 0.0 {
            return Err(SigtraderError::ConfigParse {
                file: path.display().to_string(),
                reason: format!("row {}: price must be positive", line + 2),
            });
        }
        let at = match row.at.as_deref() {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| SigtraderError::ConfigParse {
                        file: path.display().to_string(),
                        reason: format!("row {}: bad timestamp: {e}", line + 2),
                    })?,
            ),
            None => None,
        };
        ticks.push(ReplayTick {
            price: row.price,
            symbol: row.symbol,
            at,
        });
    }
    Ok(ticks)
}
