//! Book: arena of every order and position plus the live sets for the
//! current simulation instant.
//!
//! Orders and positions are stored once and addressed by index ids. The live
//! sets hold the ids still in play; `prune()` moves finished entities out of
//! them exactly once and accumulates realized gain. A closing order refers to
//! its position through `CloseTerms::position`, and the position refers back
//! through its active closing-order slot; all traversal goes through here.

use super::error::EngineError;
use super::step::StepOutcome;
use crate::domain::{
    Bar, BarRef, ExecutionType, Order, OrderError, OrderId, Position, PositionId, PriceField,
    SettleType, Side,
};
use crate::engine::request::ExitRequest;

/// Conjunctive filter over live orders. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub side: Option<Side>,
    pub settle: Option<SettleType>,
    pub kind: Option<ExecutionType>,
}

impl OrderQuery {
    pub fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn settle(mut self, settle: SettleType) -> Self {
        self.settle = Some(settle);
        self
    }

    pub fn kind(mut self, kind: ExecutionType) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches(&self, order: &Order) -> bool {
        self.side.map_or(true, |s| order.side() == s)
            && self.settle.map_or(true, |s| order.settle_type() == s)
            && self.kind.map_or(true, |k| order.kind() == k)
    }
}

/// Conjunctive filter over live positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionQuery {
    pub side: Option<Side>,
    /// Only positions without an active closing order.
    pub non_closing: bool,
}

impl PositionQuery {
    pub fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn non_closing(mut self) -> Self {
        self.non_closing = true;
        self
    }

    fn matches(&self, position: &Position) -> bool {
        self.side.map_or(true, |s| position.side() == s)
            && (!self.non_closing || !position.is_closing())
    }
}

/// Entities that left the live sets in one `prune()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pruned {
    pub orders: Vec<OrderId>,
    pub positions: Vec<PositionId>,
}

impl Pruned {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.positions.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Book {
    orders: Vec<Order>,
    positions: Vec<Position>,
    order_archived: Vec<bool>,
    live_orders: Vec<OrderId>,
    live_positions: Vec<PositionId>,
    cum_gain: f64,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ───────────────────────────────────────────────────

    /// Register an order built against the next free id.
    ///
    /// A closing order takes its position's active-close slot.
    pub(crate) fn add_order<F>(&mut self, build: F) -> Result<OrderId, EngineError>
    where
        F: FnOnce(OrderId) -> Result<Order, OrderError>,
    {
        let id = OrderId(self.orders.len());
        let order = build(id)?;
        if let Some(pid) = order.position() {
            self.position_mut(pid)?.set_closing_order(id);
        }
        self.orders.push(order);
        self.order_archived.push(false);
        self.live_orders.push(id);
        Ok(id)
    }

    /// Register a position built against the next free id.
    pub(crate) fn add_position<F>(&mut self, build: F) -> PositionId
    where
        F: FnOnce(PositionId) -> Position,
    {
        let id = PositionId(self.positions.len());
        self.positions.push(build(id));
        self.live_positions.push(id);
        id
    }

    /// Open a position from an executed opening order.
    pub(crate) fn open_position(&mut self, order_id: OrderId) -> Result<PositionId, EngineError> {
        let order = self.order(order_id)?;
        let (Some(price), Some(opened)) = (order.price(), order.executed()) else {
            return Err(EngineError::Invariant(format!(
                "order {order_id} opened a position without an execution"
            )));
        };
        if !order.is_opening() {
            return Err(EngineError::Invariant(format!(
                "closing order {order_id} cannot open a position"
            )));
        }
        let (side, size, fee) = (order.side(), order.size(), order.fee());
        Ok(self.add_position(|id| Position::new(id, order_id, side, size, price, fee, opened)))
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    pub fn order(&self, id: OrderId) -> Result<&Order, EngineError> {
        self.orders.get(id.0).ok_or(EngineError::UnknownOrder(id))
    }

    pub(crate) fn order_mut(&mut self, id: OrderId) -> Result<&mut Order, EngineError> {
        self.orders.get_mut(id.0).ok_or(EngineError::UnknownOrder(id))
    }

    pub fn position(&self, id: PositionId) -> Result<&Position, EngineError> {
        self.positions.get(id.0).ok_or(EngineError::UnknownPosition(id))
    }

    pub(crate) fn position_mut(&mut self, id: PositionId) -> Result<&mut Position, EngineError> {
        self.positions
            .get_mut(id.0)
            .ok_or(EngineError::UnknownPosition(id))
    }

    /// Every order ever registered, in id order.
    pub fn all_orders(&self) -> &[Order] {
        &self.orders
    }

    /// Every position ever opened, in id order.
    pub fn all_positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn live_order_ids(&self) -> &[OrderId] {
        &self.live_orders
    }

    pub fn live_position_ids(&self) -> &[PositionId] {
        &self.live_positions
    }

    // ── Transitions ────────────────────────────────────────────────────

    /// Step one order and apply its effects to the owning position.
    pub(crate) fn step_order(
        &mut self,
        id: OrderId,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<StepOutcome, EngineError> {
        let outcome = self.order_mut(id)?.step(bar_index, bar)?;
        self.propagate(id, &outcome)?;
        Ok(outcome)
    }

    fn propagate(&mut self, id: OrderId, outcome: &StepOutcome) -> Result<(), EngineError> {
        let order = self.order(id)?;
        let Some(pid) = order.position() else {
            return Ok(());
        };
        match outcome {
            StepOutcome::Executed | StepOutcome::Losscut | StepOutcome::ExpiredExecuted => {
                let (Some(at), Some(price)) = (order.executed(), order.price()) else {
                    return Err(EngineError::Invariant(format!(
                        "order {id} reported a fill without execution data"
                    )));
                };
                let fee = order.fee();
                self.position_mut(pid)?.close(at, id, price, fee);
            }
            StepOutcome::Expired => self.position_mut(pid)?.clear_closing_order(),
            StepOutcome::Repriced {
                snapshot: Some(snapshot),
            } => self.position_mut(pid)?.superseded.push((**snapshot).clone()),
            StepOutcome::Pending | StepOutcome::Waiting | StepOutcome::Repriced { .. } => {}
        }
        Ok(())
    }

    /// Cancel a live order. A closing order releases its position's slot.
    pub(crate) fn cancel(&mut self, id: OrderId) -> Result<(), EngineError> {
        let order = self.order_mut(id)?;
        order.cancel()?;
        if let Some(pid) = order.position() {
            self.position_mut(pid)?.clear_closing_order();
        }
        Ok(())
    }

    /// Expire a live opening order without executing it.
    pub(crate) fn force_expire(&mut self, id: OrderId, at: BarRef) -> Result<(), EngineError> {
        self.order_mut(id)?.mark_expired(at);
        Ok(())
    }

    /// Expire a live closing order and execute it at `field` on `bar`,
    /// closing its position.
    pub(crate) fn force_expire_executed(
        &mut self,
        id: OrderId,
        at: BarRef,
        bar: &Bar,
        field: PriceField,
    ) -> Result<(), EngineError> {
        self.order_mut(id)?.expire_and_execute(at, bar, Some(field))?;
        self.propagate(id, &StepOutcome::ExpiredExecuted)
    }

    /// Close a position without a closing order through a synthetic MARKET
    /// order executed at `bar`'s close with no slippage.
    pub(crate) fn liquidate(
        &mut self,
        pid: PositionId,
        at: BarRef,
        bar: &Bar,
    ) -> Result<OrderId, EngineError> {
        let position = self.position(pid)?.clone();
        let id = self.add_order(|id| {
            ExitRequest::market()
                .with_market_price(PriceField::Close)
                .into_order(id, &position, bar, PriceField::Close, false)
        })?;
        self.order_mut(id)?.execute(at, bar, true, Some(PriceField::Close))?;
        self.propagate(id, &StepOutcome::Executed)?;
        Ok(id)
    }

    /// Mark every live position to `close`.
    pub(crate) fn mark_positions(&mut self, close: f64) {
        for pid in &self.live_positions {
            if let Some(p) = self.positions.get_mut(pid.0) {
                p.mark(close);
            }
        }
    }

    /// Move done orders and closed positions out of the live sets.
    ///
    /// Realized gain of each newly closed position is added to the running
    /// total. Calling again without intervening transitions removes nothing.
    pub(crate) fn prune(&mut self) -> Result<Pruned, EngineError> {
        let mut pruned = Pruned::default();

        let mut live = Vec::with_capacity(self.live_orders.len());
        for id in std::mem::take(&mut self.live_orders) {
            if !self.order(id)?.is_done() {
                live.push(id);
                continue;
            }
            let archived = self
                .order_archived
                .get_mut(id.0)
                .ok_or(EngineError::UnknownOrder(id))?;
            if *archived {
                return Err(EngineError::DoubleRemoval(id.to_string()));
            }
            *archived = true;
            pruned.orders.push(id);
        }
        self.live_orders = live;

        let mut open = Vec::with_capacity(self.live_positions.len());
        for pid in std::mem::take(&mut self.live_positions) {
            let position = self.position_mut(pid)?;
            if !position.is_closed() {
                open.push(pid);
                continue;
            }
            if position.archived {
                return Err(EngineError::DoubleRemoval(pid.to_string()));
            }
            position.archived = true;
            let gain = position.realized_gain().unwrap_or(0.0);
            self.cum_gain += gain;
            pruned.positions.push(pid);
        }
        self.live_positions = open;

        Ok(pruned)
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn orders(&self, query: &OrderQuery) -> Vec<&Order> {
        self.live_orders
            .iter()
            .filter_map(|id| self.orders.get(id.0))
            .filter(|o| query.matches(o))
            .collect()
    }

    pub fn positions(&self, query: &PositionQuery) -> Vec<&Position> {
        self.live_positions
            .iter()
            .filter_map(|id| self.positions.get(id.0))
            .filter(|p| query.matches(p))
            .collect()
    }

    /// Number of live orders.
    pub fn order_count(&self) -> usize {
        self.live_orders.len()
    }

    /// Number of live positions.
    pub fn position_count(&self) -> usize {
        self.live_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_orders.is_empty() && self.live_positions.is_empty()
    }

    /// Sum of realized gains of every pruned position.
    pub fn cum_gain(&self) -> f64 {
        self.cum_gain
    }
}
