//! Domain types: bars, ids, orders, positions.

pub mod bar;
pub mod ids;
pub mod order;
pub mod position;

pub use bar::{Bar, BarRef, BarSeries};
pub use ids::{OrderId, PositionId};
pub use order::{
    CloseTerms, ExecutionType, MarketEntryFn, Order, OrderError, OrderRecord, OrderRole,
    OrderStatus, PriceField, Repricer, SettleType, Side,
};
pub use position::{Position, PositionClose, PositionRecord};
