//! High-throughput limit-order simulation over a whole bar series.

pub mod limit_sim;

pub use limit_sim::{
    LimitSimConfig, LimitSimulation, Outcome, PriceSource, SimError, SimRow, Timeout,
    TimeoutUnit, DEFAULT_LOSS_CUT_SLIPPAGE,
};
