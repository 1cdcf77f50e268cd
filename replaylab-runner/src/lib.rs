//! ReplayLab Runner — configured runs on top of `replaylab-core`.
//!
//! This crate provides:
//! - TOML run configuration (data source, engine settings, limit simulation, output)
//! - Bar loading from CSV/Parquet through the core ingestion layer
//! - Replay and limit-simulation orchestration
//! - CSV/JSON export of position history, order history and simulation rows
//! - Tracing subscriber setup

pub mod config;
pub mod data_loader;
pub mod export;
pub mod logging;
pub mod runner;

pub use config::{ConfigError, DataConfig, ExportFormat, OutputConfig, RunConfig};
pub use data_loader::{load_bars, LoadError};
pub use export::{
    export_json, export_orders_csv, export_positions_csv, export_sim_rows_csv, save_replay,
    save_sim_rows,
};
pub use logging::init_tracing;
pub use runner::{
    run_and_export, run_limit_sim, run_limit_sim_on, run_replay, run_replay_on, RunError,
    RunSummary,
};
