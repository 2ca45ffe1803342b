//! Domain error types.

/// Top-level error type for sigtrader.
///
/// Parse misses and duplicate messages are not errors (the dispatcher returns
/// `None` and counts them); this enum covers configuration, collaborator, and
/// construction failures.
#[derive(Debug, thiserror::Error)]
pub enum SigtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("price feed error: {reason}")]
    PriceFeed { reason: String },

    #[error("price unavailable for {symbol}")]
    PriceUnavailable { symbol: String },

    #[error("ai parsing service error: {reason}")]
    AiService { reason: String },

    #[error("invalid extraction pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("signal cannot open a position: {reason}")]
    UnusableSignal { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SigtraderError> for std::process::ExitCode {
    fn from(err: &SigtraderError) -> Self {
        let code: u8 = match err {
            SigtraderError::Io(_) => 1,
            SigtraderError::ConfigParse { .. }
            | SigtraderError::ConfigMissing { .. }
            | SigtraderError::ConfigInvalid { .. } => 2,
            SigtraderError::Database { .. } | SigtraderError::DatabaseQuery { .. } => 3,
            SigtraderError::Pattern { .. } | SigtraderError::UnusableSignal { .. } => 4,
            SigtraderError::PriceFeed { .. }
            | SigtraderError::PriceUnavailable { .. }
            | SigtraderError::AiService { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
