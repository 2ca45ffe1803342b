#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use sigtrader::adapters::sqlite_store_adapter::SqliteStoreAdapter;
use sigtrader::domain::error::SigtraderError;
use sigtrader::ports::ai_port::{AiParseOutcome, AiParserPort};
use sigtrader::ports::price_port::{PriceFeedPort, PriceQuote};

/// Fresh in-memory store with the schema applied.
pub fn make_store() -> Arc<SqliteStoreAdapter> {
    let store = SqliteStoreAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    Arc::new(store)
}

/// Price feed that replays a script: each `prices` call consumes one step.
/// A symbol absent from a step is a feed miss for that tick; an exhausted
/// script repeats its last step.
pub struct ScriptedFeed {
    steps: Mutex<VecDeque<HashMap<String, f64>>>,
    last: Mutex<HashMap<String, f64>>,
}

impl ScriptedFeed {
    pub fn new(steps: Vec<HashMap<String, f64>>) -> Self {
        ScriptedFeed {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn single_symbol(symbol: &str, prices: &[f64]) -> Self {
        Self::new(
            prices
                .iter()
                .map(|p| HashMap::from([(symbol.to_string(), *p)]))
                .collect(),
        )
    }

    fn next_step(&self) -> HashMap<String, f64> {
        let mut steps = self.steps.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = steps.pop_front() {
            *last = step.clone();
            step
        } else {
            last.clone()
        }
    }
}

#[async_trait]
impl PriceFeedPort for ScriptedFeed {
    async fn price(&self, symbol: &str) -> Result<PriceQuote, SigtraderError> {
        let step = self.next_step();
        step.get(symbol)
            .map(|price| PriceQuote {
                symbol: symbol.to_string(),
                price: *price,
                at: Utc::now(),
                source: "scripted".to_string(),
            })
            .ok_or_else(|| SigtraderError::PriceUnavailable {
                symbol: symbol.to_string(),
            })
    }

    async fn prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, SigtraderError> {
        let step = self.next_step();
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                step.get(symbol).map(|price| {
                    (
                        symbol.clone(),
                        PriceQuote {
                            symbol: symbol.clone(),
                            price: *price,
                            at: Utc::now(),
                            source: "scripted".to_string(),
                        },
                    )
                })
            })
            .collect())
    }
}

/// AI parser returning a canned outcome, optionally after a delay (for
/// timeout tests under a paused clock).
pub struct CannedAi {
    pub outcome: AiParseOutcome,
    pub delay: Option<std::time::Duration>,
    pub calls: Mutex<u32>,
}

impl CannedAi {
    pub fn new(outcome: AiParseOutcome) -> Self {
        CannedAi {
            outcome,
            delay: None,
            calls: Mutex::new(0),
        }
    }

    pub fn slow(outcome: AiParseOutcome, delay: std::time::Duration) -> Self {
        CannedAi {
            outcome,
            delay: Some(delay),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AiParserPort for CannedAi {
    async fn parse_freeform(&self, _text: &str) -> Result<AiParseOutcome, SigtraderError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.outcome.clone())
    }
}

/// An AI collaborator that always fails, for degraded-path tests.
pub struct BrokenAi;

#[async_trait]
impl AiParserPort for BrokenAi {
    async fn parse_freeform(&self, _text: &str) -> Result<AiParseOutcome, SigtraderError> {
        Err(SigtraderError::AiService {
            reason: "provider unreachable".to_string(),
        })
    }
}
