//! ReplayLab Core — bar-replay backtesting engine.
//!
//! This crate contains:
//! - Domain types (bars, orders, positions, ids)
//! - Order state machine with loss-cut, repricing and forced market entry
//! - Book of live orders and positions with per-bar pruning
//! - Bar-replay driver that suspends once per bar for strategy commands
//! - Vectorized limit-order simulation over a whole series
//! - polars ingestion of CSV/Parquet/DataFrame input

pub mod data;
pub mod domain;
pub mod engine;
pub mod vectorized;

pub use domain::{
    Bar, BarRef, BarSeries, ExecutionType, Order, OrderId, OrderStatus, Position, PositionId,
    PriceField, Repricer, MarketEntryFn, Side,
};
pub use engine::{
    BackTester, EngineConfig, EngineError, EntryRequest, ExitRequest, OrderQuery, PositionQuery,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: domain and engine types are Send + Sync, so a
    /// replay can be moved to or shared with worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::BarSeries>();
        require_sync::<domain::BarSeries>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Repricer>();
        require_sync::<domain::Repricer>();
        require_send::<domain::MarketEntryFn>();
        require_sync::<domain::MarketEntryFn>();
        require_send::<domain::PositionRecord>();
        require_sync::<domain::PositionRecord>();

        // ID types
        require_send::<domain::OrderId>();
        require_sync::<domain::OrderId>();
        require_send::<domain::PositionId>();
        require_sync::<domain::PositionId>();

        // Engine types
        require_send::<engine::Book>();
        require_sync::<engine::Book>();
        require_send::<engine::BackTester>();
        require_sync::<engine::BackTester>();
        require_send::<engine::EngineError>();
        require_sync::<engine::EngineError>();

        // Vectorized loop
        require_send::<vectorized::SimRow>();
        require_sync::<vectorized::SimRow>();
        require_send::<vectorized::LimitSimulation>();
        require_sync::<vectorized::LimitSimulation>();
    }
}
