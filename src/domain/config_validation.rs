//! Configuration building and validation.
//!
//! Every config value is checked before the pipeline starts; a bad value
//! aborts startup with a targeted error instead of surfacing later inside the
//! monitoring loop.

use crate::domain::dispatcher::DispatcherConfig;
use crate::domain::engine::EngineConfig;
use crate::domain::error::SigtraderError;
use crate::domain::parser::BUILTIN_PARSER_IDS;
use crate::ports::config_port::ConfigPort;

/// Per-position sizing used when opening positions from routed signals.
#[derive(Debug, Clone)]
pub struct TradeDefaults {
    pub size_usd: f64,
    pub leverage: u32,
}

impl Default for TradeDefaults {
    fn default() -> Self {
        TradeDefaults {
            size_usd: 1_000.0,
            leverage: 1,
        }
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> SigtraderError {
    SigtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, SigtraderError> {
    let defaults = EngineConfig::default();

    let poll_interval_secs = config.get_int(
        "engine",
        "poll_interval_secs",
        defaults.poll_interval_secs as i64,
    );
    if !(1..=3600).contains(&poll_interval_secs) {
        return Err(invalid(
            "engine",
            "poll_interval_secs",
            "must be between 1 and 3600",
        ));
    }

    let entry_tolerance_pct = config.get_double(
        "engine",
        "entry_tolerance_pct",
        defaults.entry_tolerance_pct,
    );
    if !(0.0..=5.0).contains(&entry_tolerance_pct) {
        return Err(invalid(
            "engine",
            "entry_tolerance_pct",
            "must be between 0 and 5",
        ));
    }

    let entry_timeout_hours = config.get_int(
        "engine",
        "entry_timeout_hours",
        defaults.entry_timeout_hours,
    );
    if !(1..=720).contains(&entry_timeout_hours) {
        return Err(invalid(
            "engine",
            "entry_timeout_hours",
            "must be between 1 and 720",
        ));
    }

    Ok(EngineConfig {
        poll_interval_secs: poll_interval_secs as u64,
        entry_tolerance_pct,
        entry_timeout_hours,
    })
}

pub fn build_dispatcher_config(
    config: &dyn ConfigPort,
) -> Result<DispatcherConfig, SigtraderError> {
    let defaults = DispatcherConfig::default();

    let dedup_window_minutes = config.get_int(
        "dispatcher",
        "dedup_window_minutes",
        defaults.dedup_window_minutes,
    );
    if !(1..=10_080).contains(&dedup_window_minutes) {
        return Err(invalid(
            "dispatcher",
            "dedup_window_minutes",
            "must be between 1 and 10080",
        ));
    }

    let dedup_capacity = config.get_int(
        "dispatcher",
        "dedup_capacity",
        defaults.dedup_capacity as i64,
    );
    if !(16..=1_000_000).contains(&dedup_capacity) {
        return Err(invalid(
            "dispatcher",
            "dedup_capacity",
            "must be between 16 and 1000000",
        ));
    }

    let ai_timeout_secs = config.get_int(
        "dispatcher",
        "ai_timeout_secs",
        defaults.ai_timeout_secs as i64,
    );
    if !(1..=120).contains(&ai_timeout_secs) {
        return Err(invalid(
            "dispatcher",
            "ai_timeout_secs",
            "must be between 1 and 120",
        ));
    }

    let enabled_parsers = config.get_list("dispatcher", "parsers");
    for id in &enabled_parsers {
        if !BUILTIN_PARSER_IDS.contains(&id.as_str()) {
            return Err(invalid(
                "dispatcher",
                "parsers",
                &format!("unknown parser `{id}`"),
            ));
        }
    }

    Ok(DispatcherConfig {
        dedup_window_minutes,
        dedup_capacity: dedup_capacity as usize,
        ai_timeout_secs: ai_timeout_secs as u64,
        detector_hints: config.get_bool("dispatcher", "detector_hints", defaults.detector_hints),
        enabled_parsers,
    })
}

pub fn build_trade_defaults(config: &dyn ConfigPort) -> Result<TradeDefaults, SigtraderError> {
    let defaults = TradeDefaults::default();

    let size_usd = config.get_double("engine", "default_size_usd", defaults.size_usd);
    if size_usd <= 0.0 {
        return Err(invalid("engine", "default_size_usd", "must be positive"));
    }

    let leverage = config.get_int("engine", "default_leverage", defaults.leverage as i64);
    if !(1..=125).contains(&leverage) {
        return Err(invalid(
            "engine",
            "default_leverage",
            "must be between 1 and 125",
        ));
    }

    Ok(TradeDefaults {
        size_usd,
        leverage: leverage as u32,
    })
}

/// Validate everything the `run` command needs before any collaborator is
/// constructed.
pub fn validate_pipeline_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    build_engine_config(config)?;
    build_dispatcher_config(config)?;
    build_trade_defaults(config)?;

    if config.get_string("sqlite", "path").is_none() {
        return Err(SigtraderError::ConfigMissing {
            section: "sqlite".to_string(),
            key: "path".to_string(),
        });
    }

    let pool_size = config.get_int("sqlite", "pool_size", 4);
    if !(1..=64).contains(&pool_size) {
        return Err(invalid("sqlite", "pool_size", "must be between 1 and 64"));
    }

    if config.get_bool("ai", "enabled", false) && config.get_string("ai", "model").is_none() {
        return Err(SigtraderError::ConfigMissing {
            section: "ai".to_string(),
            key: "model".to_string(),
        });
    }

    Ok(())
}
