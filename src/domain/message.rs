//! Inbound message representation.
//!
//! A `RawMessage` is what a message source yields: free-form text plus routing
//! metadata. Sources deliver at-least-once, so the same text may arrive more
//! than once; the dispatcher deduplicates by fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Identifier of the channel or feed the message came from. Doubles as a
    /// parser hint when it names a known format.
    #[serde(default)]
    pub source: Option<String>,
    /// Attribution for the trader who posted the call.
    pub trader: String,
    pub text: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(trader: &str, text: &str) -> Self {
        RawMessage {
            source: None,
            trader: trader.to_string(),
            text: text.to_string(),
            message_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_minimal_fields() {
        let msg: RawMessage =
            serde_json::from_str(r#"{"trader": "whale-01", "text": "BTC long"}"#).unwrap();
        assert_eq!(msg.trader, "whale-01");
        assert_eq!(msg.text, "BTC long");
        assert!(msg.source.is_none());
        assert!(msg.message_id.is_none());
    }

    #[test]
    fn deserializes_with_all_fields() {
        let msg: RawMessage = serde_json::from_str(
            r#"{
                "source": "trade-format-a",
                "trader": "whale-01",
                "text": "BTCUSDT LONG Entry: 45000",
                "message_id": "m-17",
                "received_at": "2024-06-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(msg.source.as_deref(), Some("trade-format-a"));
        assert_eq!(msg.message_id.as_deref(), Some("m-17"));
        assert_eq!(msg.received_at.to_rfc3339(), "2024-06-01T12:00:00+00:00");
    }

    #[test]
    fn builder_sets_source() {
        let msg = RawMessage::new("caller", "text").with_source("zone-caller");
        assert_eq!(msg.source.as_deref(), Some("zone-caller"));
    }
}
