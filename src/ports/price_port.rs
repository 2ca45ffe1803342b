//! Price feed port trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::error::SigtraderError;

/// One quoted price with provenance.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub at: DateTime<Utc>,
    /// Which feed produced the quote, e.g. `binance`.
    pub source: String,
}

/// Port for the live price feed.
///
/// `prices` is the batched form the monitoring loop uses; a symbol the feed
/// cannot quote is simply absent from the result, it does not fail the batch.
#[async_trait]
pub trait PriceFeedPort: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<PriceQuote, SigtraderError>;

    async fn prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, SigtraderError>;
}
