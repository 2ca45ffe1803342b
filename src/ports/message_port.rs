//! Message source port trait.

use async_trait::async_trait;

use crate::domain::error::SigtraderError;
use crate::domain::message::RawMessage;

/// Port for whatever delivers inbound trading-call text.
///
/// Delivery is at-least-once and may include duplicates; the dispatcher's
/// fingerprint window handles those. `Ok(None)` means the source is
/// exhausted.
#[async_trait]
pub trait MessageSourcePort: Send {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, SigtraderError>;
}
