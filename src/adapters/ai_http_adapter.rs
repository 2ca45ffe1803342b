//! AI parsing service adapter.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint and asks for a
//! strict-JSON extraction of the trading call. The response-to-outcome
//! mapping is lenient about the shapes providers actually return (numbers as
//! strings, a single `entry` instead of a zone, code fences around the JSON)
//! and is a pure function so it can be tested without a network.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::error::SigtraderError;
use crate::ports::ai_port::{AiParseOutcome, AiParserPort};
use crate::ports::config_port::ConfigPort;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

const SYSTEM_PROMPT: &str = "You extract cryptocurrency trading signals from chat messages. \
Reply with a single JSON object and nothing else, using exactly these keys: \
is_signal (bool), symbol (string or null), side (\"LONG\"/\"SHORT\" or null), \
entry_low (number or null), entry_high (number or null), targets (array of numbers), \
stop (number or null), leverage (integer or null), confidence (integer 0-100), \
reason (string or null). If the message is not a trading signal, set is_signal to false.";

pub struct AiHttpAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl AiHttpAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let base_url = config
            .get_string("ai", "base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = config
            .get_string("ai", "model")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key_env = config
            .get_string("ai", "api_key_env")
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = std::env::var(&api_key_env).ok().filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SigtraderError::AiService {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl AiParserPort for AiHttpAdapter {
    async fn parse_freeform(&self, text: &str) -> Result<AiParseOutcome, SigtraderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text},
            ],
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| SigtraderError::AiService {
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(SigtraderError::AiService {
                reason: format!("provider returned {}", response.status()),
            });
        }

        let payload: Value = response.json().await.map_err(|e| SigtraderError::AiService {
            reason: e.to_string(),
        })?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SigtraderError::AiService {
                reason: "response has no message content".to_string(),
            })?;

        parse_content(content)
    }
}

/// Map the model's JSON reply onto an [`AiParseOutcome`].
pub fn parse_content(content: &str) -> Result<AiParseOutcome, SigtraderError> {
    let stripped = strip_code_fence(content);
    let value: Value =
        serde_json::from_str(stripped).map_err(|e| SigtraderError::AiService {
            reason: format!("unparseable reply: {e}"),
        })?;

    let entry_low = number(&value["entry_low"]).or_else(|| number(&value["entry"]));
    let entry_high = number(&value["entry_high"]);

    Ok(AiParseOutcome {
        is_signal: value["is_signal"].as_bool().unwrap_or(false),
        symbol: string(&value["symbol"]),
        side: string(&value["side"]).or_else(|| string(&value["direction"])),
        entry_low,
        entry_high,
        targets: value["targets"]
            .as_array()
            .map(|items| items.iter().filter_map(number).collect())
            .unwrap_or_default(),
        stop: number(&value["stop"]).or_else(|| number(&value["stop_loss"])),
        leverage: number(&value["leverage"]).map(|l| l as u32),
        confidence: number(&value["confidence"]).map(|c| c.clamp(0.0, 100.0) as u8),
        reason: string(&value["reason"]),
    })
}

/// Providers wrap JSON in markdown fences more often than not.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Accept numbers whether the provider wrote `45000` or `"45000"`.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
