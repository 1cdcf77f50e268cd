//! Run orchestration: load bars once, then replay a strategy and/or run the
//! vectorized limit simulation.

use std::path::PathBuf;

use replaylab_core::engine::EngineError;
use replaylab_core::data::BarFrame;
use replaylab_core::vectorized::{LimitSimConfig, SimError, SimRow};
use replaylab_core::{BackTester, BarSeries, EngineConfig};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::data_loader::{load_bars, LoadError};
use crate::export::{save_replay, save_sim_rows};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("simulation error: {0}")]
    Sim(#[from] SimError),

    #[error(transparent)]
    Export(#[from] anyhow::Error),
}

/// Replay `strategy` over `bars` until the driver finishes.
pub fn run_replay_on<F>(
    bars: BarSeries,
    engine: EngineConfig,
    strategy: F,
) -> Result<BackTester, RunError>
where
    F: FnMut(&mut BackTester, usize) -> Result<(), EngineError>,
{
    let mut bt = BackTester::new(bars, engine);
    bt.run(strategy)?;
    info!(
        orders = bt.order_history().len(),
        cum_gain = bt.cum_gain(),
        "replay complete"
    );
    Ok(bt)
}

/// Load the configured bars and replay `strategy` over them.
pub fn run_replay<F>(config: &RunConfig, strategy: F) -> Result<BackTester, RunError>
where
    F: FnMut(&mut BackTester, usize) -> Result<(), EngineError>,
{
    let frame = load_bars(&config.data, None)?;
    run_replay_on(frame.bars, config.engine, strategy)
}

/// Run the configured limit simulation. `None` when the config has no
/// `[limit_sim]` section.
pub fn run_limit_sim(config: &RunConfig) -> Result<Option<Vec<SimRow>>, RunError> {
    let Some(sim_config) = &config.limit_sim else {
        return Ok(None);
    };
    let frame = load_bars(&config.data, sim_config.entry_filter_column.as_deref())?;
    run_limit_sim_on(sim_config, &frame).map(Some)
}

/// Run the limit simulation over already loaded bars. The frame's entry
/// mask, if any, is used as the entry filter.
pub fn run_limit_sim_on(
    sim_config: &LimitSimConfig,
    frame: &BarFrame,
) -> Result<Vec<SimRow>, RunError> {
    let rows = sim_config
        .to_simulation(frame.entry_filter.clone())
        .run(&frame.bars)?;

    let wins = rows.iter().filter(|r| r.is_win == Some(true)).count();
    info!(side = %sim_config.side, rows = rows.len(), wins, "limit simulation complete");
    Ok(rows)
}

/// What a full run wrote.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sim_rows: Option<usize>,
    pub cum_gain: Option<f64>,
    pub artifacts: Vec<PathBuf>,
}

/// Run everything the config asks for and export the results to
/// `config.output`. The replay runs only when a strategy is supplied.
pub fn run_and_export<F>(config: &RunConfig, strategy: Option<F>) -> Result<RunSummary, RunError>
where
    F: FnMut(&mut BackTester, usize) -> Result<(), EngineError>,
{
    let mut summary = RunSummary::default();
    if strategy.is_none() && config.limit_sim.is_none() {
        warn!("nothing to run: no strategy supplied and no [limit_sim] section");
        return Ok(summary);
    }

    let filter_column = config
        .limit_sim
        .as_ref()
        .and_then(|c| c.entry_filter_column.as_deref());
    let frame = load_bars(&config.data, filter_column)?;

    if let Some(sim_config) = &config.limit_sim {
        let rows = run_limit_sim_on(sim_config, &frame)?;
        summary.sim_rows = Some(rows.len());
        summary.artifacts.push(save_sim_rows(&rows, &config.output)?);
    }

    if let Some(strategy) = strategy {
        let bt = run_replay_on(frame.bars, config.engine, strategy)?;
        summary.cum_gain = Some(bt.cum_gain());
        summary.artifacts.extend(save_replay(&bt, &config.output)?);
    }

    Ok(summary)
}
