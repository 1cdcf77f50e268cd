//! Engine errors.

use crate::domain::{OrderError, OrderId, PositionId};
use thiserror::Error;

/// Errors raised by the book and the bar-replay driver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("commands are only accepted while the replay is running")]
    NotRunning,

    #[error("position {0} not found")]
    UnknownPosition(PositionId),

    #[error("order {0} not found")]
    UnknownOrder(OrderId),

    #[error("position {0} is already closed")]
    PositionClosed(PositionId),

    #[error("position {position} already has an active closing order {order}")]
    ClosingOrderActive { position: PositionId, order: OrderId },

    #[error("book not empty after finalization: {orders} orders, {positions} positions live")]
    BookNotEmpty { orders: usize, positions: usize },

    #[error("{0} removed from the live set twice")]
    DoubleRemoval(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    /// Fatal errors are invariant violations. Returned from a command, a
    /// non-fatal error rejects that command only; returned from
    /// `BackTester::advance`, every error ends the run.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Order(e) => e.is_fatal(),
            EngineError::NotRunning
            | EngineError::UnknownPosition(_)
            | EngineError::UnknownOrder(_)
            | EngineError::PositionClosed(_)
            | EngineError::ClosingOrderActive { .. } => false,
            EngineError::BookNotEmpty { .. }
            | EngineError::DoubleRemoval(_)
            | EngineError::Invariant(_) => true,
        }
    }
}
