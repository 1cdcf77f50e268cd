//! Replay engine: order state machine, book and bar-replay driver.
//!
//! Per bar the driver steps every live order, opens positions for executed
//! opening orders, marks and prunes, then hands control back to the caller.

pub mod backtester;
pub mod book;
pub mod error;
pub mod request;
pub mod state;
pub mod step;
pub mod trigger;

pub use backtester::BackTester;
pub use book::{Book, OrderQuery, PositionQuery, Pruned};
pub use error::EngineError;
pub use request::{EntryRequest, ExitRequest};
pub use state::{EngineConfig, RunPhase};
pub use step::StepOutcome;
