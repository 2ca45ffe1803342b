//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::ai_http_adapter::AiHttpAdapter;
use crate::adapters::binance_price_adapter::BinancePriceAdapter;
use crate::adapters::csv_replay_adapter::{load_ticks, ReplayTick};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::jsonl_source_adapter::JsonlSourceAdapter;
use crate::adapters::sqlite_store_adapter::SqliteStoreAdapter;
use crate::domain::config_validation::{
    build_dispatcher_config, build_engine_config, build_trade_defaults, validate_pipeline_config,
    TradeDefaults,
};
use crate::domain::dispatcher::{DispatcherConfig, SignalDispatcher};
use crate::domain::engine::{step_position, EngineConfig, TradeEngine};
use crate::domain::error::SigtraderError;
use crate::domain::position::Position;
use crate::ports::ai_port::AiParserPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::message_port::MessageSourcePort;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(
    name = "sigtrader",
    about = "Trading-signal parser and virtual trade simulator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse one message and print the extracted signal as JSON
    Parse {
        /// Message text
        #[arg(short, long)]
        text: Option<String>,
        /// File containing the message text
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "cli")]
        trader: String,
        /// Parser hint, e.g. trade-format-a
        #[arg(long)]
        hint: Option<String>,
    },
    /// Run the full pipeline: message source, dispatcher, simulation engine
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// JSONL message file; stdin when omitted
        #[arg(short, long)]
        messages: Option<PathBuf>,
    },
    /// Parse one signal and replay recorded prices against it
    Replay {
        /// Signal text
        #[arg(short, long)]
        text: Option<String>,
        /// File containing the signal text
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// CSV of price ticks (columns: price[,symbol][,at])
        #[arg(short, long)]
        prices: PathBuf,
        #[arg(long, default_value = "cli")]
        trader: String,
        #[arg(long)]
        hint: Option<String>,
        #[arg(long, default_value_t = 1_000.0)]
        size_usd: f64,
        #[arg(long, default_value_t = 1)]
        leverage: u32,
    },
    /// Print store summary counts
    Stats {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    match cli.command {
        Command::Parse {
            text,
            file,
            trader,
            hint,
        } => run_parse(text, file.as_ref(), &trader, hint.as_deref()),
        Command::Run { config, messages } => run_pipeline_command(&config, messages.as_ref()),
        Command::Replay {
            text,
            file,
            prices,
            trader,
            hint,
            size_usd,
            leverage,
        } => run_replay(
            text,
            file.as_ref(),
            &prices,
            &trader,
            hint.as_deref(),
            size_usd,
            leverage,
        ),
        Command::Stats { config } => run_stats(&config),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SigtraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn build_runtime() -> Result<tokio::runtime::Runtime, ExitCode> {
    tokio::runtime::Runtime::new().map_err(|e| {
        eprintln!("error: failed to start async runtime: {e}");
        ExitCode::from(1)
    })
}

fn message_text(text: Option<String>, file: Option<&PathBuf>) -> Result<String, ExitCode> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => fs::read_to_string(path).map_err(|e| {
            eprintln!("error: cannot read {}: {e}", path.display());
            ExitCode::from(1)
        }),
        (None, None) => {
            eprintln!("error: provide --text or --file");
            Err(ExitCode::from(2))
        }
    }
}

fn run_parse(
    text: Option<String>,
    file: Option<&PathBuf>,
    trader: &str,
    hint: Option<&str>,
) -> ExitCode {
    let text = match message_text(text, file) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let runtime = match build_runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    let result = runtime.block_on(async {
        let store = Arc::new(in_memory_store()?);
        let mut dispatcher =
            SignalDispatcher::new(DispatcherConfig::default(), store, None)?;
        Ok::<_, SigtraderError>(dispatcher.route(&text, trader, hint).await)
    });

    match result {
        Ok(Some(signal)) => {
            match serde_json::to_string_pretty(&signal) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(1);
                }
            }
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("no signal extracted");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_pipeline_command(config_path: &PathBuf, messages: Option<&PathBuf>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_pipeline_config(&config) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let engine_config = match build_engine_config(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let dispatcher_config = match build_dispatcher_config(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let defaults = match build_trade_defaults(&config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Collaborator-unavailable-at-startup aborts; everything after startup
    // degrades per message or per tick instead.
    let store = match SqliteStoreAdapter::from_config(&config)
        .and_then(|s| s.initialize_schema().map(|_| s))
    {
        Ok(s) => Arc::new(s) as Arc<dyn StorePort>,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let feed = match BinancePriceAdapter::from_config(&config) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let ai: Option<Arc<dyn AiParserPort>> = if config.get_bool("ai", "enabled", false) {
        match AiHttpAdapter::from_config(&config) {
            Ok(a) => Some(Arc::new(a)),
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    } else {
        None
    };

    let runtime = match build_runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    let messages = messages.cloned();
    let result = runtime.block_on(async move {
        let source: Box<dyn MessageSourcePort> = match messages {
            Some(path) => Box::new(JsonlSourceAdapter::from_file(&path).await?),
            None => Box::new(JsonlSourceAdapter::from_stdin()),
        };
        run_pipeline(engine_config, dispatcher_config, defaults, store, feed, ai, source).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// The single task that owns both the dispatcher and the engine: message
/// ingestion and position monitoring interleave here, so neither needs a
/// lock.
async fn run_pipeline(
    engine_config: EngineConfig,
    dispatcher_config: DispatcherConfig,
    defaults: TradeDefaults,
    store: Arc<dyn StorePort>,
    feed: Arc<BinancePriceAdapter>,
    ai: Option<Arc<dyn AiParserPort>>,
    mut source: Box<dyn MessageSourcePort>,
) -> Result<(), SigtraderError> {
    let mut dispatcher = SignalDispatcher::new(dispatcher_config, store.clone(), ai)?;
    let mut engine = TradeEngine::new(engine_config.clone(), feed, store);
    engine.load_active()?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        engine_config.poll_interval_secs.max(1),
    ));
    let mut source_done = false;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("pipeline stopping");
                break;
            }
            _ = interval.tick() => {
                engine.poll_once(Utc::now()).await;
                if source_done && engine.active_count() == 0 {
                    info!("message source exhausted and no active positions, exiting");
                    break;
                }
            }
            message = source.next_message(), if !source_done => {
                match message {
                    Ok(Some(message)) => {
                        if let Some(signal) = dispatcher.ingest(&message).await {
                            if signal.is_valid {
                                engine.open_position(
                                    &signal,
                                    defaults.size_usd,
                                    defaults.leverage,
                                    Utc::now(),
                                );
                            } else {
                                debug!(symbol = %signal.symbol, "invalid signal kept for audit only");
                            }
                        }
                    }
                    Ok(None) => {
                        source_done = true;
                        info!("message source exhausted");
                    }
                    Err(e) => {
                        warn!(error = %e, "message source failed");
                        source_done = true;
                    }
                }
            }
        }
    }

    let stats = dispatcher.stats();
    info!(
        processed = stats.processed,
        valid = stats.valid,
        failed = stats.failed,
        duplicates = stats.duplicates,
        success_rate = stats.success_rate,
        "dispatcher totals"
    );
    Ok(())
}

fn run_replay(
    text: Option<String>,
    file: Option<&PathBuf>,
    prices: &PathBuf,
    trader: &str,
    hint: Option<&str>,
    size_usd: f64,
    leverage: u32,
) -> ExitCode {
    let text = match message_text(text, file) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let ticks = match load_ticks(prices) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let runtime = match build_runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    let result = runtime.block_on(async {
        let store = Arc::new(in_memory_store()?);
        let mut dispatcher =
            SignalDispatcher::new(DispatcherConfig::default(), store, None)?;
        let signal = dispatcher.route(&text, trader, hint).await.ok_or_else(|| {
            SigtraderError::UnusableSignal {
                reason: "no signal extracted from the text".to_string(),
            }
        })?;
        if !signal.is_valid {
            return Err(SigtraderError::UnusableSignal {
                reason: format!("signal is invalid: {}", signal.errors.join("; ")),
            });
        }
        replay_signal(&signal, &ticks, size_usd, leverage)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Drive one position through recorded ticks and print the event trail.
fn replay_signal(
    signal: &crate::domain::signal::Signal,
    ticks: &[ReplayTick],
    size_usd: f64,
    leverage: u32,
) -> Result<(), SigtraderError> {
    let config = EngineConfig::default();
    let start = Utc::now();
    let mut position = Position::open(signal, size_usd, leverage, start, config.entry_timeout())?;

    println!(
        "replaying {} ticks against {} {} (entry {}-{})",
        ticks.len(),
        position.side.as_str(),
        position.symbol,
        position.entry_low,
        position.entry_high
    );

    for (i, tick) in ticks.iter().enumerate() {
        if let Some(symbol) = &tick.symbol {
            if symbol != &position.symbol {
                continue;
            }
        }
        let now = tick
            .at
            .unwrap_or_else(|| start + chrono::Duration::seconds(i as i64 + 1));
        for event in step_position(&mut position, tick.price, now, &config) {
            println!(
                "{}  {:>13}  price {:<12}  {}",
                event.at.format("%Y-%m-%d %H:%M:%S"),
                event.kind.as_str(),
                event.price,
                event.detail
            );
        }
        if position.is_terminal() {
            break;
        }
    }

    match serde_json::to_string_pretty(&position) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: {e}"),
    }
    Ok(())
}

fn run_stats(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = match SqliteStoreAdapter::from_config(&config)
        .and_then(|s| s.initialize_schema().map(|_| s))
    {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    match store.summary() {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(1)
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn in_memory_store() -> Result<SqliteStoreAdapter, SigtraderError> {
    let store = SqliteStoreAdapter::in_memory()?;
    store.initialize_schema()?;
    Ok(store)
}
