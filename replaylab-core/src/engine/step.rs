//! Order state machine. One evaluation of a live order against one bar.
//!
//! Opening orders: fill check, then expiration.
//!
//! Closing orders, in fixed priority:
//! 1. loss-cut (stop-style touch of the loss-cut price)
//! 2. entry-delay gate
//! 3. fill check, with the market-entry predicate able to veto MARKET fills
//! 4. forced market entry (elapsed since initial entry, or predicate for LIMIT)
//! 5. expiration: MARKET executes, LIMIT/STOP reprice or expire
//!
//! The state machine only touches the order itself. Effects on the position
//! (close, detach, archive) are reported through `StepOutcome` and applied by
//! the book.

use super::request::{expire_time, offset_seconds};
use super::trigger;
use crate::domain::{Bar, BarRef, ExecutionType, Order, OrderError, OrderRole, OrderStatus, PriceField, Side};
use tracing::trace;

/// What one step did to an order.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Still ordering.
    Pending,
    /// Closing order inside its entry delay; nothing evaluated but loss-cut.
    Waiting,
    Executed,
    Expired,
    Losscut,
    ExpiredExecuted,
    /// Closing order expired and was repriced back into `Ordering`.
    /// Carries the frozen pre-reprice snapshot when retention is on.
    Repriced { snapshot: Option<Box<Order>> },
}

impl StepOutcome {
    /// The order executed on this step.
    pub fn is_fill(&self) -> bool {
        matches!(
            self,
            StepOutcome::Executed | StepOutcome::Losscut | StepOutcome::ExpiredExecuted
        )
    }
}

impl Order {
    /// Advance this order by one bar.
    ///
    /// Fails fatally if the order is already done or the bar precedes the
    /// order's entry time.
    pub fn step(&mut self, bar_index: usize, bar: &Bar) -> Result<StepOutcome, OrderError> {
        if self.is_done() {
            return Err(OrderError::AlreadyDone {
                id: self.id,
                status: self.status,
            });
        }
        if bar.timestamp < self.entry_time {
            return Err(OrderError::OutOfOrderBar {
                id: self.id,
                bar_time: bar.timestamp,
                entry_time: self.entry_time,
            });
        }

        let at = BarRef {
            index: bar_index,
            timestamp: bar.timestamp,
        };
        let outcome = if self.is_opening() {
            self.step_open(at, bar)?
        } else {
            self.step_close(at, bar)?
        };
        trace!(order = %self, ?outcome, "stepped");
        Ok(outcome)
    }

    /// Cancel a live order. Releasing a closing order's slot is the book's job.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Ordering {
            return Err(OrderError::NotCancelable {
                id: self.id,
                status: self.status,
            });
        }
        self.status = OrderStatus::Canceled;
        Ok(())
    }

    fn step_open(&mut self, at: BarRef, bar: &Bar) -> Result<StepOutcome, OrderError> {
        if self.touched(bar) {
            self.execute(at, bar, false, None)?;
            Ok(StepOutcome::Executed)
        } else if self.expires_at(bar) {
            self.mark_expired(at);
            Ok(StepOutcome::Expired)
        } else {
            Ok(StepOutcome::Pending)
        }
    }

    fn step_close(&mut self, at: BarRef, bar: &Bar) -> Result<StepOutcome, OrderError> {
        let OrderRole::Close(terms) = &self.role else {
            return Ok(StepOutcome::Pending);
        };
        let loss_cut_price = terms.loss_cut_price;
        // `None`: the delay reaches past any representable time.
        let active_from = offset_seconds(terms.initial_entry_time, terms.entry_delay_seconds);
        let market_entry = terms.market_entry.clone();
        let force_after = terms.force_market_entry_seconds;
        let initial_entry_time = terms.initial_entry_time;

        if let Some(loss_cut) = loss_cut_price {
            if trigger::stop_touched(self.side, loss_cut, bar.high, bar.low) {
                // SELL closes a long at the low, BUY closes a short at the high.
                let field = match self.side {
                    Side::Buy => PriceField::High,
                    Side::Sell => PriceField::Low,
                };
                self.execute(at, bar, true, Some(field))?;
                self.status = OrderStatus::Losscut;
                return Ok(StepOutcome::Losscut);
            }
        }

        if active_from.map_or(true, |t| bar.timestamp < t) {
            return Ok(StepOutcome::Waiting);
        }

        let mut filled = self.touched(bar);
        if filled && self.kind == ExecutionType::Market {
            if let Some(predicate) = &market_entry {
                filled = predicate.check(bar, self);
            }
        }
        if filled {
            self.execute(at, bar, false, None)?;
            return Ok(StepOutcome::Executed);
        }

        let elapsed_ms = (bar.timestamp - initial_entry_time).num_milliseconds();
        let timed_out = force_after.is_some_and(|s| elapsed_ms > s.saturating_mul(1000));
        let predicate_says_go = self.kind == ExecutionType::Limit
            && market_entry.as_ref().is_some_and(|p| p.check(bar, self));
        if timed_out || predicate_says_go {
            self.execute(at, bar, true, None)?;
            return Ok(StepOutcome::Executed);
        }

        if !self.expires_at(bar) {
            return Ok(StepOutcome::Pending);
        }
        if self.kind == ExecutionType::Market {
            self.expire_and_execute(at, bar, None)?;
            return Ok(StepOutcome::ExpiredExecuted);
        }
        self.reprice_or_expire(at, bar)
    }

    fn touched(&self, bar: &Bar) -> bool {
        match (self.kind, self.price) {
            (ExecutionType::Market, _) => true,
            (kind, Some(price)) => trigger::touches(kind, self.side, price, bar),
            (_, None) => false,
        }
    }

    fn expires_at(&self, bar: &Bar) -> bool {
        self.expire_time.is_some_and(|t| bar.timestamp >= t)
    }

    /// Execute on `bar`. MARKET (or forced) executions resolve their price from
    /// `field`, defaulting to the order's own price field.
    pub(crate) fn execute(
        &mut self,
        at: BarRef,
        bar: &Bar,
        force_market: bool,
        field: Option<PriceField>,
    ) -> Result<(), OrderError> {
        if self.kind == ExecutionType::Market || force_market {
            let field = field.unwrap_or(self.market_price);
            self.price = Some(trigger::market_price(bar, self.side, field, self.slippage)?);
            self.kind = ExecutionType::Market;
        }
        self.executed = Some(at);
        self.fee = trigger::fee_rate(bar, self.kind);
        self.status = OrderStatus::Executed;
        Ok(())
    }

    pub(crate) fn mark_expired(&mut self, at: BarRef) {
        self.expired = Some(at);
        self.status = OrderStatus::Expired;
    }

    /// Expire and immediately execute at market.
    pub(crate) fn expire_and_execute(
        &mut self,
        at: BarRef,
        bar: &Bar,
        field: Option<PriceField>,
    ) -> Result<(), OrderError> {
        self.execute(at, bar, true, field)?;
        self.expired = Some(at);
        self.status = OrderStatus::ExpiredExecuted;
        Ok(())
    }

    fn reprice_or_expire(&mut self, at: BarRef, bar: &Bar) -> Result<StepOutcome, OrderError> {
        let (rule, keep) = match &self.role {
            OrderRole::Close(terms) => (terms.reprice.clone(), terms.keep_expired_orders),
            OrderRole::Open => (None, false),
        };
        let Some(rule) = rule else {
            self.mark_expired(at);
            return Ok(StepOutcome::Expired);
        };

        let price = rule.reprice(bar, self)?;
        let snapshot = keep.then(|| {
            let mut frozen = self.clone();
            frozen.mark_expired(at);
            Box::new(frozen)
        });

        self.price = Some(price);
        self.expired = None;
        self.entry_time = bar.timestamp;
        self.expire_time = expire_time(bar.timestamp, self.expire_seconds);
        self.status = OrderStatus::Ordering;
        Ok(StepOutcome::Repriced { snapshot })
    }
}
