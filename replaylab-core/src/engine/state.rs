//! Engine configuration and replay phase.

use crate::domain::PriceField;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a single replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Emit per-step transition logs at debug level.
    pub debug: bool,
    /// Default bar field for MARKET executions when a request does not set one.
    pub market_price: PriceField,
    /// Default for closing orders: archive a snapshot every time a reprice
    /// supersedes the previous price.
    pub keep_expired_orders: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            market_price: PriceField::Open,
            keep_expired_orders: false,
        }
    }
}

impl EngineConfig {
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_market_price(mut self, field: PriceField) -> Self {
        self.market_price = field;
        self
    }

    pub fn with_keep_expired_orders(mut self, keep: bool) -> Self {
        self.keep_expired_orders = keep;
        self
    }
}

/// Driver phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    NotStarted,
    Running,
    Finalizing,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::NotStarted => "NOT_STARTED",
            RunPhase::Running => "RUNNING",
            RunPhase::Finalizing => "FINALIZING",
            RunPhase::Done => "DONE",
        };
        f.write_str(s)
    }
}
