//! Entry and exit commands issued by the caller while the driver is suspended.

use crate::domain::{
    Bar, CloseTerms, ExecutionType, MarketEntryFn, Order, OrderError, OrderId, OrderRole,
    OrderStatus, Position, PriceField, Repricer, Side,
};
use chrono::{DateTime, Duration, Utc};

/// Parameters of an opening order.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub side: Side,
    pub kind: ExecutionType,
    pub price: Option<f64>,
    pub size: f64,
    /// `None` means the order never expires on its own.
    pub expire_seconds: Option<i64>,
    /// Falls back to `EngineConfig::market_price` when unset.
    pub market_price: Option<PriceField>,
    pub slippage: f64,
}

impl EntryRequest {
    pub fn new(side: Side, kind: ExecutionType) -> Self {
        Self {
            side,
            kind,
            price: None,
            size: 1.0,
            expire_seconds: None,
            market_price: None,
            slippage: 0.0,
        }
    }

    pub fn market(side: Side) -> Self {
        Self::new(side, ExecutionType::Market)
    }

    pub fn limit(side: Side, price: f64) -> Self {
        Self::new(side, ExecutionType::Limit).with_price(price)
    }

    pub fn stop(side: Side, price: f64) -> Self {
        Self::new(side, ExecutionType::Stop).with_price(price)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_expire_seconds(mut self, seconds: i64) -> Self {
        self.expire_seconds = Some(seconds);
        self
    }

    pub fn with_market_price(mut self, field: PriceField) -> Self {
        self.market_price = Some(field);
        self
    }

    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.slippage = slippage;
        self
    }

    pub(crate) fn into_order(
        self,
        id: OrderId,
        entry_time: DateTime<Utc>,
        default_price_field: PriceField,
    ) -> Result<Order, OrderError> {
        if self.kind != ExecutionType::Market && self.price.is_none() {
            return Err(OrderError::MissingPrice { kind: self.kind });
        }

        Ok(Order {
            id,
            side: self.side,
            kind: self.kind,
            requested_kind: self.kind,
            price: self.price,
            size: self.size,
            entry_time,
            expire_seconds: self.expire_seconds,
            expire_time: expire_time(entry_time, self.expire_seconds),
            status: OrderStatus::Ordering,
            executed: None,
            expired: None,
            fee: 0.0,
            market_price: self.market_price.unwrap_or(default_price_field),
            slippage: self.slippage,
            role: OrderRole::Open,
        })
    }
}

/// Parameters of a closing order.
#[derive(Debug, Clone)]
pub struct ExitRequest {
    pub kind: ExecutionType,
    pub price: Option<f64>,
    pub loss_cut_price: Option<f64>,
    pub expire_seconds: Option<i64>,
    pub market_price: Option<PriceField>,
    pub slippage: f64,
    /// Applied when a LIMIT/STOP closing order expires; without it the order
    /// expires and detaches from its position.
    pub reprice: Option<Repricer>,
    /// Delay after the initial entry time before fills are considered. Loss-cut
    /// is checked during the delay too.
    pub entry_delay_seconds: i64,
    pub market_entry: Option<MarketEntryFn>,
    pub force_market_entry_seconds: Option<i64>,
    /// Falls back to `EngineConfig::keep_expired_orders` when unset.
    pub keep_expired_orders: Option<bool>,
}

impl ExitRequest {
    pub fn new(kind: ExecutionType) -> Self {
        Self {
            kind,
            price: None,
            loss_cut_price: None,
            expire_seconds: None,
            market_price: None,
            slippage: 0.0,
            reprice: None,
            entry_delay_seconds: 0,
            market_entry: None,
            force_market_entry_seconds: None,
            keep_expired_orders: None,
        }
    }

    pub fn market() -> Self {
        Self::new(ExecutionType::Market)
    }

    pub fn limit(price: f64) -> Self {
        Self::new(ExecutionType::Limit).with_price(price)
    }

    pub fn stop(price: f64) -> Self {
        Self::new(ExecutionType::Stop).with_price(price)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_loss_cut(mut self, price: f64) -> Self {
        self.loss_cut_price = Some(price);
        self
    }

    pub fn with_expire_seconds(mut self, seconds: i64) -> Self {
        self.expire_seconds = Some(seconds);
        self
    }

    pub fn with_market_price(mut self, field: PriceField) -> Self {
        self.market_price = Some(field);
        self
    }

    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn with_reprice(mut self, rule: Repricer) -> Self {
        self.reprice = Some(rule);
        self
    }

    pub fn with_entry_delay_seconds(mut self, seconds: i64) -> Self {
        self.entry_delay_seconds = seconds;
        self
    }

    pub fn with_market_entry(mut self, predicate: MarketEntryFn) -> Self {
        self.market_entry = Some(predicate);
        self
    }

    pub fn with_force_market_entry_seconds(mut self, seconds: i64) -> Self {
        self.force_market_entry_seconds = Some(seconds);
        self
    }

    pub fn keep_expired_orders(mut self, keep: bool) -> Self {
        self.keep_expired_orders = Some(keep);
        self
    }

    /// Build the closing order against `position`, issued while observing `bar`.
    ///
    /// A LIMIT/STOP order without a price takes its first price from the
    /// reprice rule applied to `bar`.
    pub(crate) fn into_order(
        self,
        id: OrderId,
        position: &Position,
        bar: &Bar,
        default_price_field: PriceField,
        default_keep_expired: bool,
    ) -> Result<Order, OrderError> {
        if self.kind != ExecutionType::Market && self.price.is_none() && self.reprice.is_none() {
            return Err(OrderError::MissingRepriceRule { kind: self.kind });
        }

        let entry_time = bar.timestamp;
        let mut order = Order {
            id,
            side: position.side().reverse(),
            kind: self.kind,
            requested_kind: self.kind,
            price: self.price,
            size: position.size(),
            entry_time,
            expire_seconds: self.expire_seconds,
            expire_time: expire_time(entry_time, self.expire_seconds),
            status: OrderStatus::Ordering,
            executed: None,
            expired: None,
            fee: 0.0,
            market_price: self.market_price.unwrap_or(default_price_field),
            slippage: self.slippage,
            role: OrderRole::Close(CloseTerms {
                position: position.id(),
                loss_cut_price: self.loss_cut_price,
                reprice: self.reprice,
                entry_delay_seconds: self.entry_delay_seconds,
                market_entry: self.market_entry,
                force_market_entry_seconds: self.force_market_entry_seconds,
                initial_entry_time: entry_time,
                keep_expired_orders: self.keep_expired_orders.unwrap_or(default_keep_expired),
            }),
        };

        if order.kind != ExecutionType::Market && order.price.is_none() {
            let initial = match order.close_terms().and_then(|t| t.reprice.clone()) {
                Some(rule) => rule.reprice(bar, &order)?,
                None => return Err(OrderError::MissingRepriceRule { kind: order.kind }),
            };
            order.price = Some(initial);
        }

        Ok(order)
    }
}

/// `Some(s)` past `entry_time`. An offset chrono cannot represent means never.
pub(crate) fn expire_time(entry_time: DateTime<Utc>, seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| offset_seconds(entry_time, s))
}

/// `t + seconds`, or `None` when the result is out of chrono's range.
pub(crate) fn offset_seconds(t: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(seconds).and_then(|d| t.checked_add_signed(d))
}
