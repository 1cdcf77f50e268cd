//! Bar-replay driver.
//!
//! The driver owns the bar series and the book and walks the series one bar
//! at a time. Each `advance()`:
//! 1. steps every live order against the bar, in registration order
//! 2. opens a position for each opening order that executed
//! 3. marks live positions to the bar's close and prunes finished entities
//! 4. suspends, returning the bar index
//!
//! While suspended the caller may issue `entry`, `exit` and `cancel`; new
//! orders are first evaluated on the following bar. The call after the last
//! bar finalizes the run: live orders are expired (closing ones executed at
//! the last close) and any position still open is liquidated.

use super::book::{Book, OrderQuery, PositionQuery};
use super::error::EngineError;
use super::request::{EntryRequest, ExitRequest};
use super::state::{EngineConfig, RunPhase};
use crate::domain::{
    Bar, BarSeries, Order, OrderId, OrderRecord, Position, PositionId, PositionRecord, PriceField,
};
use tracing::{debug, info};

pub struct BackTester {
    bars: BarSeries,
    config: EngineConfig,
    book: Book,
    phase: RunPhase,
    cursor: Option<usize>,
    position_history: Vec<PositionId>,
}

impl BackTester {
    pub fn new(bars: impl Into<BarSeries>, config: EngineConfig) -> Self {
        Self {
            bars: bars.into(),
            config,
            book: Book::new(),
            phase: RunPhase::NotStarted,
            cursor: None,
            position_history: Vec::new(),
        }
    }

    // ── Driving ────────────────────────────────────────────────────────

    /// Process the next bar and suspend on it.
    ///
    /// Returns `Ok(None)` once the series is exhausted and the run has been
    /// finalized. Any error stops the run for good, fatal or not: the bar may
    /// have been stepped only in part.
    pub fn advance(&mut self) -> Result<Option<usize>, EngineError> {
        let next = match self.phase {
            RunPhase::Done => return Ok(None),
            RunPhase::Finalizing => {
                return Err(EngineError::Invariant(
                    "advance called during finalization".into(),
                ))
            }
            RunPhase::NotStarted => {
                info!(bars = self.bars.len(), "replay started");
                self.phase = RunPhase::Running;
                0
            }
            RunPhase::Running => self.cursor.map_or(0, |c| c + 1),
        };

        let result = if next < self.bars.len() {
            self.process_bar(next).map(|()| Some(next))
        } else {
            self.finalize().map(|()| None)
        };
        if result.is_err() {
            self.phase = RunPhase::Done;
        }
        result
    }

    /// Drive the replay to completion, handing control to `strategy` at every
    /// bar.
    pub fn run<F>(&mut self, mut strategy: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut BackTester, usize) -> Result<(), EngineError>,
    {
        while let Some(index) = self.advance()? {
            strategy(self, index)?;
        }
        Ok(())
    }

    fn process_bar(&mut self, index: usize) -> Result<(), EngineError> {
        self.cursor = Some(index);
        let bar = &self.bars[index];

        let live: Vec<OrderId> = self.book.live_order_ids().to_vec();
        for id in live {
            if self.book.order(id)?.is_done() {
                continue;
            }
            let outcome = self.book.step_order(id, index, bar)?;
            if self.config.debug {
                debug!(bar = index, order = %self.book.order(id)?, ?outcome, "order stepped");
            }
            if outcome.is_fill() && self.book.order(id)?.is_opening() {
                let pid = self.book.open_position(id)?;
                if self.config.debug {
                    debug!(bar = index, position = %pid, order = %id, "position opened");
                }
            }
        }

        self.book.mark_positions(bar.close);
        let pruned = self.book.prune()?;
        if self.config.debug && !pruned.is_empty() {
            debug!(
                bar = index,
                orders = pruned.orders.len(),
                positions = pruned.positions.len(),
                cum_gain = self.book.cum_gain(),
                "pruned"
            );
        }
        self.position_history.extend(pruned.positions);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        self.phase = RunPhase::Finalizing;

        if let Some(index) = self.bars.len().checked_sub(1) {
            let bar = &self.bars[index];
            let at = self.bars.bar_ref(index).ok_or_else(|| {
                EngineError::Invariant(format!("last bar {index} out of range"))
            })?;

            for id in self.book.live_order_ids().to_vec() {
                let order = self.book.order(id)?;
                if order.is_done() {
                    continue;
                }
                if order.is_opening() {
                    self.book.force_expire(id, at)?;
                } else {
                    self.book
                        .force_expire_executed(id, at, bar, PriceField::Close)?;
                }
            }

            for pid in self.book.live_position_ids().to_vec() {
                let position = self.book.position(pid)?;
                if position.is_closed() {
                    continue;
                }
                if let Some(order) = position.closing_order() {
                    return Err(EngineError::Invariant(format!(
                        "position {pid} still closing through {order} after expiry"
                    )));
                }
                let order = self.book.liquidate(pid, at, bar)?;
                if self.config.debug {
                    debug!(position = %pid, %order, "liquidated at last close");
                }
            }
        }

        let pruned = self.book.prune()?;
        self.position_history.extend(pruned.positions);

        if !self.book.is_empty() {
            return Err(EngineError::BookNotEmpty {
                orders: self.book.order_count(),
                positions: self.book.position_count(),
            });
        }

        self.phase = RunPhase::Done;
        info!(
            orders = self.book.all_orders().len(),
            positions = self.position_history.len(),
            cum_gain = self.book.cum_gain(),
            "replay finished"
        );
        Ok(())
    }

    // ── Commands ───────────────────────────────────────────────────────

    fn running_index(&self) -> Result<usize, EngineError> {
        match (self.phase, self.cursor) {
            (RunPhase::Running, Some(index)) => Ok(index),
            _ => Err(EngineError::NotRunning),
        }
    }

    /// Issue an opening order at the current bar.
    pub fn entry(&mut self, request: EntryRequest) -> Result<OrderId, EngineError> {
        let index = self.running_index()?;
        let entry_time = self.bars[index].timestamp;
        let default_field = self.config.market_price;
        let id = self
            .book
            .add_order(|id| request.into_order(id, entry_time, default_field))?;
        if self.config.debug {
            debug!(bar = index, order = %self.book.order(id)?, "entry issued");
        }
        Ok(id)
    }

    /// Issue a closing order for `position` at the current bar.
    ///
    /// Rejected if the position is unknown, already closed, or already has
    /// an active closing order.
    pub fn exit(
        &mut self,
        position: PositionId,
        request: ExitRequest,
    ) -> Result<OrderId, EngineError> {
        let index = self.running_index()?;
        let target = self.book.position(position)?;
        if target.is_closed() {
            return Err(EngineError::PositionClosed(position));
        }
        if let Some(order) = target.closing_order() {
            return Err(EngineError::ClosingOrderActive { position, order });
        }
        let target = target.clone();

        let bar = &self.bars[index];
        let default_field = self.config.market_price;
        let keep = self.config.keep_expired_orders;
        let id = self
            .book
            .add_order(|id| request.into_order(id, &target, bar, default_field, keep))?;
        if self.config.debug {
            debug!(bar = index, order = %self.book.order(id)?, position = %position, "exit issued");
        }
        Ok(id)
    }

    /// Cancel a live order.
    pub fn cancel(&mut self, order: OrderId) -> Result<(), EngineError> {
        self.running_index()?;
        self.book.cancel(order)
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bars(&self) -> &BarSeries {
        &self.bars
    }

    /// The bar the driver is suspended on.
    pub fn current_bar(&self) -> Option<&Bar> {
        self.cursor.and_then(|i| self.bars.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn order(&self, id: OrderId) -> Result<&Order, EngineError> {
        self.book.order(id)
    }

    pub fn position(&self, id: PositionId) -> Result<&Position, EngineError> {
        self.book.position(id)
    }

    /// Live orders matching `query`.
    pub fn orders(&self, query: &OrderQuery) -> Vec<&Order> {
        self.book.orders(query)
    }

    /// Live positions matching `query`.
    pub fn positions(&self, query: &PositionQuery) -> Vec<&Position> {
        self.book.positions(query)
    }

    /// Every order registered during the run, synthetic liquidation orders
    /// included, in id order.
    pub fn order_history(&self) -> &[Order] {
        self.book.all_orders()
    }

    /// Closed positions in the order they were closed.
    pub fn position_history(&self) -> impl Iterator<Item = &Position> + '_ {
        self.position_history
            .iter()
            .filter_map(|id| self.book.position(*id).ok())
    }

    pub fn cum_gain(&self) -> f64 {
        self.book.cum_gain()
    }

    pub fn order_records(&self) -> Vec<OrderRecord> {
        self.order_history().iter().map(Order::record).collect()
    }

    /// Flat records of the closed positions, joined with their orders.
    pub fn position_records(&self) -> Result<Vec<PositionRecord>, EngineError> {
        self.position_history()
            .map(|p| {
                let open = self.book.order(p.open_order())?;
                let close = p.close_order().map(|id| self.book.order(id)).transpose()?;
                Ok(p.record(open, close))
            })
            .collect()
    }
}
