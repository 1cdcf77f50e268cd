//! Position: one executed opening order and the closing order that ends it.

use super::bar::BarRef;
use super::ids::{OrderId, PositionId};
use super::order::{ExecutionType, Order, OrderRecord, OrderStatus, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionClose {
    pub order: OrderId,
    pub price: f64,
    pub fee: f64,
    pub bar: BarRef,
}

/// Exposure created when an opening order executes.
///
/// Open price, fee and side are copied from the opening order, which is
/// immutable once executed. The closing-order link is an id into the book's
/// arena; at most one closing order is active at a time.
#[derive(Debug, Clone)]
pub struct Position {
    pub(crate) id: PositionId,
    pub(crate) open_order: OrderId,
    pub(crate) side: Side,
    pub(crate) size: f64,
    pub(crate) open_price: f64,
    pub(crate) open_fee: f64,
    pub(crate) opened: BarRef,
    pub(crate) closing_order: Option<OrderId>,
    pub(crate) superseded: Vec<Order>,
    pub(crate) close: Option<PositionClose>,
    pub(crate) mark_price: Option<f64>,
    pub(crate) archived: bool,
}

impl Position {
    pub(crate) fn new(
        id: PositionId,
        open_order: OrderId,
        side: Side,
        size: f64,
        open_price: f64,
        open_fee: f64,
        opened: BarRef,
    ) -> Self {
        Self {
            id,
            open_order,
            side,
            size,
            open_price,
            open_fee,
            opened,
            closing_order: None,
            superseded: Vec::new(),
            close: None,
            mark_price: None,
            archived: false,
        }
    }

    /// Record the terminal closing order and the bar that priced it.
    ///
    /// Called on a genuine closing execution and on end-of-data liquidation.
    pub fn close(&mut self, bar: BarRef, order: OrderId, price: f64, fee: f64) {
        self.close = Some(PositionClose {
            order,
            price,
            fee,
            bar,
        });
        self.closing_order = None;
    }

    pub(crate) fn set_closing_order(&mut self, order: OrderId) {
        self.closing_order = Some(order);
    }

    pub(crate) fn clear_closing_order(&mut self) {
        self.closing_order = None;
    }

    /// Mark-to-market price for an open position.
    pub(crate) fn mark(&mut self, price: f64) {
        self.mark_price = Some(price);
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn open_order(&self) -> OrderId {
        self.open_order
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn open_price(&self) -> f64 {
        self.open_price
    }

    pub fn open_fee(&self) -> f64 {
        self.open_fee
    }

    pub fn opened(&self) -> BarRef {
        self.opened
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened.timestamp
    }

    pub fn closing_order(&self) -> Option<OrderId> {
        self.closing_order
    }

    pub fn is_closing(&self) -> bool {
        self.closing_order.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_some()
    }

    pub fn close_info(&self) -> Option<&PositionClose> {
        self.close.as_ref()
    }

    pub fn close_order(&self) -> Option<OrderId> {
        self.close.map(|c| c.order)
    }

    /// Executed closing price if closed, otherwise the last marked close.
    pub fn close_price(&self) -> Option<f64> {
        match &self.close {
            Some(c) => Some(c.price),
            None => self.mark_price,
        }
    }

    /// Frozen snapshots of closing orders superseded by a reprice.
    pub fn superseded_orders(&self) -> &[Order] {
        &self.superseded
    }

    /// `sign(side) * (close/open - 1) - (open_fee - close_fee)`.
    ///
    /// Uses the mark price (close fee 0) while the position is open; `None`
    /// when there is no pricing basis yet.
    pub fn gain(&self) -> Option<f64> {
        let (close_price, close_fee) = match &self.close {
            Some(c) => (c.price, c.fee),
            None => (self.mark_price?, 0.0),
        };
        Some(self.side.sign() * (close_price / self.open_price - 1.0) - (self.open_fee - close_fee))
    }

    /// Gain of a closed position only.
    pub fn realized_gain(&self) -> Option<f64> {
        if self.is_closed() {
            self.gain()
        } else {
            None
        }
    }

    /// Flat record joining the opening and closing orders.
    pub fn record(&self, open: &Order, close: Option<&Order>) -> PositionRecord {
        let open = open.record();
        let close: Option<OrderRecord> = close.map(Order::record);
        PositionRecord {
            id: self.id.0,
            side: self.side,
            size: self.size,
            open_order_id: open.id,
            open_exec_type: open.exec_type,
            open_price: self.open_price,
            open_status: open.status,
            open_entried_at: open.entried_at,
            open_executed_at: open.executed_at,
            open_fee: self.open_fee,
            close_order_id: close.as_ref().map(|c| c.id),
            close_exec_type: close.as_ref().map(|c| c.exec_type),
            close_price: self.close_price(),
            close_status: close.as_ref().map(|c| c.status),
            close_entried_at: close.as_ref().map(|c| c.entried_at),
            close_executed_at: close.as_ref().and_then(|c| c.executed_at),
            close_expired_at: close.as_ref().and_then(|c| c.expired_at),
            close_fee: self.close.map(|c| c.fee),
            gain: self.gain(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{:.0}",
            self.id,
            self.side,
            self.is_closing(),
            self.is_closed(),
            self.open_price
        )?;
        if let (Some(close), Some(gain)) = (&self.close, self.gain()) {
            write!(f, "/{:.0}/{gain:.3}", close.price)?;
        }
        Ok(())
    }
}

/// Flat export row: `open_*` and `close_*` order fields plus realized gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: usize,
    pub side: Side,
    pub size: f64,
    pub open_order_id: usize,
    pub open_exec_type: ExecutionType,
    pub open_price: f64,
    pub open_status: OrderStatus,
    pub open_entried_at: DateTime<Utc>,
    pub open_executed_at: Option<DateTime<Utc>>,
    pub open_fee: f64,
    pub close_order_id: Option<usize>,
    pub close_exec_type: Option<ExecutionType>,
    pub close_price: Option<f64>,
    pub close_status: Option<OrderStatus>,
    pub close_entried_at: Option<DateTime<Utc>>,
    pub close_executed_at: Option<DateTime<Utc>>,
    pub close_expired_at: Option<DateTime<Utc>>,
    pub close_fee: Option<f64>,
    pub gain: Option<f64>,
}

impl PositionRecord {
    /// The record as a flat attribute map for tabular consumers.
    pub fn as_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
