//! Order types: sides, execution kinds, lifecycle states, and the role-tagged order record.
//!
//! An order is either an opening order (executes into a new position) or a
//! closing order (terminates a position). Closing orders carry extra terms
//! (loss-cut, reprice rule, market-entry predicate, delay and force-entry
//! timers) in `OrderRole::Close`. The state machine itself lives in `engine::step`.

use super::bar::{Bar, BarRef};
use super::ids::{OrderId, PositionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn reverse(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for BUY, -1 for SELL.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// How an order executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    Market,
    Limit,
    Stop,
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionType::Market => write!(f, "MARKET"),
            ExecutionType::Limit => write!(f, "LIMIT"),
            ExecutionType::Stop => write!(f, "STOP"),
        }
    }
}

/// Settlement role, without the role-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettleType {
    Open,
    Close,
}

/// Order lifecycle states.
///
/// `Ordering` is the only live state. The closing-order reprice path is the one
/// transition that returns an order to `Ordering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Ordering,
    Executed,
    Expired,
    Canceled,
    ExpiredExecuted,
    Losscut,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Ordering => "ORDERING",
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::ExpiredExecuted => "EXPIRED_EXECUTED",
            OrderStatus::Losscut => "LOSSCUT",
        };
        f.write_str(s)
    }
}

/// Which bar value a MARKET execution is priced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    #[default]
    Open,
    High,
    Low,
    Close,
    /// Ask for BUY, bid for SELL.
    Best,
}

/// Recomputes a closing order's price each time it would otherwise expire.
#[derive(Clone)]
pub enum Repricer {
    /// Re-read a named column from the expiring bar.
    Field(String),
    /// Compute from the expiring bar and the order being repriced.
    Func(Arc<dyn Fn(&Bar, &Order) -> f64 + Send + Sync>),
}

impl Repricer {
    pub fn field(name: impl Into<String>) -> Self {
        Repricer::Field(name.into())
    }

    pub fn func(f: impl Fn(&Bar, &Order) -> f64 + Send + Sync + 'static) -> Self {
        Repricer::Func(Arc::new(f))
    }

    pub(crate) fn reprice(&self, bar: &Bar, order: &Order) -> Result<f64, OrderError> {
        match self {
            Repricer::Field(name) => bar.field(name).ok_or_else(|| OrderError::MissingField {
                field: name.clone(),
                timestamp: bar.timestamp,
            }),
            Repricer::Func(f) => Ok(f(bar, order)),
        }
    }
}

impl fmt::Debug for Repricer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repricer::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Repricer::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Caller-supplied gate for market closing entries.
///
/// For MARKET closing orders it can veto a fill; for LIMIT closing orders a
/// `true` forces an immediate market execution.
#[derive(Clone)]
pub struct MarketEntryFn(Arc<dyn Fn(&Bar, &Order) -> bool + Send + Sync>);

impl MarketEntryFn {
    pub fn new(f: impl Fn(&Bar, &Order) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn check(&self, bar: &Bar, order: &Order) -> bool {
        (self.0)(bar, order)
    }
}

impl fmt::Debug for MarketEntryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MarketEntryFn(..)")
    }
}

/// Terms only closing orders carry.
#[derive(Debug, Clone)]
pub struct CloseTerms {
    pub(crate) position: PositionId,
    pub(crate) loss_cut_price: Option<f64>,
    pub(crate) reprice: Option<Repricer>,
    pub(crate) entry_delay_seconds: i64,
    pub(crate) market_entry: Option<MarketEntryFn>,
    pub(crate) force_market_entry_seconds: Option<i64>,
    /// Entry time before any reprice reset it.
    pub(crate) initial_entry_time: DateTime<Utc>,
    pub(crate) keep_expired_orders: bool,
}

impl CloseTerms {
    pub fn position(&self) -> PositionId {
        self.position
    }

    pub fn loss_cut_price(&self) -> Option<f64> {
        self.loss_cut_price
    }

    pub fn reprice(&self) -> Option<&Repricer> {
        self.reprice.as_ref()
    }

    pub fn entry_delay_seconds(&self) -> i64 {
        self.entry_delay_seconds
    }

    pub fn force_market_entry_seconds(&self) -> Option<i64> {
        self.force_market_entry_seconds
    }

    pub fn initial_entry_time(&self) -> DateTime<Utc> {
        self.initial_entry_time
    }

    pub fn keeps_expired_orders(&self) -> bool {
        self.keep_expired_orders
    }
}

/// Opening or closing role.
#[derive(Debug, Clone)]
pub enum OrderRole {
    Open,
    Close(CloseTerms),
}

/// Errors raised by order construction and the order state machine.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{kind} order requires a price")]
    MissingPrice { kind: ExecutionType },

    #[error("closing {kind} order requires a price or a reprice rule")]
    MissingRepriceRule { kind: ExecutionType },

    #[error("bar at {timestamp} lacks {field} required for best pricing")]
    MissingQuote {
        field: &'static str,
        timestamp: DateTime<Utc>,
    },

    #[error("bar at {timestamp} lacks field '{field}'")]
    MissingField {
        field: String,
        timestamp: DateTime<Utc>,
    },

    #[error("order {id} stepped with bar at {bar_time}, before its entry time {entry_time}")]
    OutOfOrderBar {
        id: OrderId,
        bar_time: DateTime<Utc>,
        entry_time: DateTime<Utc>,
    },

    #[error("order {id} is already done (status: {status})")]
    AlreadyDone { id: OrderId, status: OrderStatus },

    #[error("order {id} cannot be canceled (status: {status})")]
    NotCancelable { id: OrderId, status: OrderStatus },
}

impl OrderError {
    /// Invariant violations abort the run; everything else fails the single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrderError::OutOfOrderBar { .. } | OrderError::AlreadyDone { .. }
        )
    }
}

/// A single order.
///
/// Fields are crate-visible so the state machine can drive them; callers read
/// them through accessors. Once an order reaches an executed status it is
/// never mutated again.
#[derive(Debug, Clone)]
pub struct Order {
    pub(crate) id: OrderId,
    pub(crate) side: Side,
    pub(crate) kind: ExecutionType,
    pub(crate) requested_kind: ExecutionType,
    pub(crate) price: Option<f64>,
    pub(crate) size: f64,
    pub(crate) entry_time: DateTime<Utc>,
    pub(crate) expire_seconds: Option<i64>,
    pub(crate) expire_time: Option<DateTime<Utc>>,
    pub(crate) status: OrderStatus,
    pub(crate) executed: Option<BarRef>,
    pub(crate) expired: Option<BarRef>,
    pub(crate) fee: f64,
    pub(crate) market_price: PriceField,
    pub(crate) slippage: f64,
    pub(crate) role: OrderRole,
}

impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Current execution kind. Forced market executions turn LIMIT/STOP into MARKET.
    pub fn kind(&self) -> ExecutionType {
        self.kind
    }

    /// Execution kind the order was placed with.
    pub fn requested_kind(&self) -> ExecutionType {
        self.requested_kind
    }

    pub fn settle_type(&self) -> SettleType {
        match self.role {
            OrderRole::Open => SettleType::Open,
            OrderRole::Close(_) => SettleType::Close,
        }
    }

    /// Order price; `None` for a MARKET order that has not executed yet.
    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn expire_seconds(&self) -> Option<i64> {
        self.expire_seconds
    }

    /// `None` means the order never expires on its own.
    pub fn expire_time(&self) -> Option<DateTime<Utc>> {
        self.expire_time
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status != OrderStatus::Ordering
    }

    pub fn is_executed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Executed | OrderStatus::ExpiredExecuted | OrderStatus::Losscut
        )
    }

    pub fn is_expired(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Expired | OrderStatus::ExpiredExecuted
        )
    }

    pub fn executed(&self) -> Option<BarRef> {
        self.executed
    }

    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed.map(|b| b.timestamp)
    }

    pub fn expired(&self) -> Option<BarRef> {
        self.expired
    }

    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired.map(|b| b.timestamp)
    }

    /// Fee rate charged on the executing bar (0 until executed).
    pub fn fee(&self) -> f64 {
        self.fee
    }

    pub fn market_price(&self) -> PriceField {
        self.market_price
    }

    pub fn slippage(&self) -> f64 {
        self.slippage
    }

    pub fn role(&self) -> &OrderRole {
        &self.role
    }

    pub fn close_terms(&self) -> Option<&CloseTerms> {
        match &self.role {
            OrderRole::Close(terms) => Some(terms),
            OrderRole::Open => None,
        }
    }

    /// Position a closing order belongs to.
    pub fn position(&self) -> Option<PositionId> {
        self.close_terms().map(|t| t.position)
    }

    pub fn is_opening(&self) -> bool {
        matches!(self.role, OrderRole::Open)
    }

    pub fn is_closing(&self) -> bool {
        matches!(self.role, OrderRole::Close(_))
    }

    /// Flat, serializable view for history export.
    pub fn record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id.0,
            side: self.side,
            exec_type: self.kind,
            settle_type: self.settle_type(),
            price: self.price,
            size: self.size,
            is_executed: self.is_executed(),
            status: self.status,
            entried_at: self.entry_time,
            executed_at: self.executed_at(),
            expired_at: self.expired_at(),
            fee: self.fee,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.id,
            self.status,
            self.price.map_or_else(|| "-".to_string(), |p| format!("{p:.0}")),
            self.side,
            self.kind,
            self.entry_time.format("%H:%M:%S"),
        )?;
        if let Some(position) = self.position() {
            write!(f, "/{position}")?;
        }
        Ok(())
    }
}

/// Serializable snapshot of an order's externally visible fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: usize,
    pub side: Side,
    pub exec_type: ExecutionType,
    pub settle_type: SettleType,
    pub price: Option<f64>,
    pub size: f64,
    pub is_executed: bool,
    pub status: OrderStatus,
    pub entried_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub fee: f64,
}
