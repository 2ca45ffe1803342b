//! Binance-style REST price feed adapter.
//!
//! Uses the public ticker endpoint, no authentication. The batched call asks
//! for all symbols in one request; because the exchange rejects the whole
//! batch when any symbol is unknown, a failed batch falls back to per-symbol
//! requests so one bad symbol cannot starve the rest of the loop.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::domain::error::SigtraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::{PriceFeedPort, PriceQuote};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const FEED_NAME: &str = "binance";

pub struct BinancePriceAdapter {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

impl BinancePriceAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let base_url = config
            .get_string("pricefeed", "base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn new(base_url: String) -> Result<Self, SigtraderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| SigtraderError::PriceFeed {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn quote_from(&self, ticker: TickerPrice) -> Option<PriceQuote> {
        let price: f64 = ticker.price.parse().ok()?;
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        Some(PriceQuote {
            symbol: ticker.symbol,
            price,
            at: Utc::now(),
            source: FEED_NAME.to_string(),
        })
    }
}

#[async_trait]
impl PriceFeedPort for BinancePriceAdapter {
    async fn price(&self, symbol: &str) -> Result<PriceQuote, SigtraderError> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| SigtraderError::PriceFeed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SigtraderError::PriceUnavailable {
                symbol: symbol.to_string(),
            });
        }

        let ticker: TickerPrice =
            response
                .json()
                .await
                .map_err(|e| SigtraderError::PriceFeed {
                    reason: e.to_string(),
                })?;

        self.quote_from(ticker)
            .ok_or_else(|| SigtraderError::PriceUnavailable {
                symbol: symbol.to_string(),
            })
    }

    async fn prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, SigtraderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let symbols_param = serde_json::to_string(symbols).unwrap_or_else(|_| "[]".into());
        let batch = self
            .client
            .get(&url)
            .query(&[("symbols", symbols_param.as_str())])
            .send()
            .await;

        match batch {
            Ok(response) if response.status().is_success() => {
                let tickers: Vec<TickerPrice> =
                    response
                        .json()
                        .await
                        .map_err(|e| SigtraderError::PriceFeed {
                            reason: e.to_string(),
                        })?;
                let mut quotes = HashMap::new();
                for ticker in tickers {
                    if let Some(quote) = self.quote_from(ticker) {
                        quotes.insert(quote.symbol.clone(), quote);
                    }
                }
                Ok(quotes)
            }
            Ok(response) => {
                debug!(status = %response.status(), "batch ticker rejected, retrying per symbol");
                self.prices_one_by_one(symbols).await
            }
            Err(e) => {
                debug!(error = %e, "batch ticker failed, retrying per symbol");
                self.prices_one_by_one(symbols).await
            }
        }
    }
}

impl BinancePriceAdapter {
    /// Per-symbol fallback: a symbol the feed cannot quote is skipped with a
    /// warning, never an error for the batch.
    async fn prices_one_by_one(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, SigtraderError> {
        let mut quotes = HashMap::new();
        for symbol in symbols {
            match self.price(symbol).await {
                Ok(quote) => {
                    quotes.insert(symbol.clone(), quote);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "symbol unavailable this tick");
                }
            }
        }
        Ok(quotes)
    }
}
