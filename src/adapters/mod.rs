//! Concrete adapter implementations for ports.

pub mod ai_http_adapter;
pub mod binance_price_adapter;
pub mod csv_replay_adapter;
pub mod file_config_adapter;
pub mod jsonl_source_adapter;
pub mod sqlite_store_adapter;
