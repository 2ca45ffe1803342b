//! JSONL message source adapter.
//!
//! Reads one JSON-encoded [`RawMessage`] per line from a file or stdin.
//! Malformed lines are logged and skipped; delivery stays at-least-once
//! because nothing stops the same file being replayed.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::warn;

use crate::domain::error::SigtraderError;
use crate::domain::message::RawMessage;
use crate::ports::message_port::MessageSourcePort;

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

pub struct JsonlSourceAdapter {
    lines: Lines<BoxedReader>,
}

impl JsonlSourceAdapter {
    pub async fn from_file(path: &std::path::Path) -> Result<Self, SigtraderError> {
        let file = tokio::fs::File::open(path).await?;
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(file);
        Ok(Self {
            lines: BufReader::new(reader).lines(),
        })
    }

    pub fn from_stdin() -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(tokio::io::stdin());
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl MessageSourcePort for JsonlSourceAdapter {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, SigtraderError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawMessage>(trimmed) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    warn!(error = %e, "skipping malformed message line");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn source_from(content: &str) -> JsonlSourceAdapter {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        JsonlSourceAdapter::from_file(file.path()).await.unwrap()
    }

    #[tokio::test]
    async fn reads_messages_in_order() {
        let content = concat!(
            r#"{"trader": "a", "text": "BTC long entry 45000"}"#,
            "\n",
            r#"{"trader": "b", "text": "ETH short", "source": "zone-caller"}"#,
            "\n"
        );
        let mut source = source_from(content).await;
        let first = source.next_message().await.unwrap().unwrap();
        assert_eq!(first.trader, "a");
        let second = source.next_message().await.unwrap().unwrap();
        assert_eq!(second.source.as_deref(), Some("zone-caller"));
        assert!(source.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_and_blank_lines_are_skipped() {
        let content = concat!(
            "\n",
            "not json at all\n",
            r#"{"trader": "a", "text": "hello"}"#,
            "\n"
        );
        let mut source = source_from(content).await;
        let message = source.next_message().await.unwrap().unwrap();
        assert_eq!(message.text, "hello");
        assert!(source.next_message().await.unwrap().is_none());
    }
}
