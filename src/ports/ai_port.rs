//! AI parsing service port trait.

use async_trait::async_trait;

use crate::domain::error::SigtraderError;

/// Raw result from the external language-model parser, before the dispatcher
/// normalizes provider aliases into canonical form.
#[derive(Debug, Clone, Default)]
pub struct AiParseOutcome {
    /// The provider's own judgement whether the text is a trading signal at
    /// all. Nothing else is trusted when this is false.
    pub is_signal: bool,
    pub symbol: Option<String>,
    /// Side as the provider wrote it (`LONG`, `buy`, `bearish`, ...).
    pub side: Option<String>,
    pub entry_low: Option<f64>,
    pub entry_high: Option<f64>,
    pub targets: Vec<f64>,
    pub stop: Option<f64>,
    pub leverage: Option<u32>,
    /// Provider-reported confidence, 0-100.
    pub confidence: Option<u8>,
    pub reason: Option<String>,
}

/// Port for the opaque freeform-parsing service. At most one call is made per
/// dispatch attempt, and the dispatcher bounds it with a timeout.
#[async_trait]
pub trait AiParserPort: Send + Sync {
    async fn parse_freeform(&self, text: &str) -> Result<AiParseOutcome, SigtraderError>;
}
