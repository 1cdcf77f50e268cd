//! Touch conditions and execution pricing.
//!
//! Shared by the order state machine and the vectorized matching loop so both
//! agree on when a price is reached within a bar's range.

use crate::domain::{Bar, ExecutionType, OrderError, PriceField, Side};

/// Limit touch.
///
/// Buy limit: `low <= price`. Sell limit: `high >= price`.
#[inline]
pub fn limit_touched(side: Side, price: f64, high: f64, low: f64) -> bool {
    match side {
        Side::Buy => low <= price,
        Side::Sell => high >= price,
    }
}

/// Stop touch.
///
/// Buy stop: `high >= price`. Sell stop: `low <= price`.
#[inline]
pub fn stop_touched(side: Side, price: f64, high: f64, low: f64) -> bool {
    match side {
        Side::Buy => high >= price,
        Side::Sell => low <= price,
    }
}

/// Does `bar` reach `price` for an order of this side and kind?
///
/// MARKET orders always touch.
pub fn touches(kind: ExecutionType, side: Side, price: f64, bar: &Bar) -> bool {
    match kind {
        ExecutionType::Market => true,
        ExecutionType::Limit => limit_touched(side, price, bar.high, bar.low),
        ExecutionType::Stop => stop_touched(side, price, bar.high, bar.low),
    }
}

/// MARKET execution price: the chosen bar field plus slippage against the taker.
///
/// `Best` reads the ask for BUY and the bid for SELL and fails if the bar
/// lacks the quote.
pub fn market_price(bar: &Bar, side: Side, field: PriceField, slippage: f64) -> Result<f64, OrderError> {
    let base = match field {
        PriceField::Open => bar.open,
        PriceField::High => bar.high,
        PriceField::Low => bar.low,
        PriceField::Close => bar.close,
        PriceField::Best => {
            let (quote, name) = match side {
                Side::Buy => (bar.ask, "ask"),
                Side::Sell => (bar.bid, "bid"),
            };
            quote.ok_or(OrderError::MissingQuote {
                field: name,
                timestamp: bar.timestamp,
            })?
        }
    };
    Ok(base + side.sign() * slippage)
}

/// Fee rate for an execution on `bar`: taker for MARKET, maker otherwise, 0 if absent.
pub fn fee_rate(bar: &Bar, kind: ExecutionType) -> f64 {
    let rate = match kind {
        ExecutionType::Market => bar.taker_fee,
        ExecutionType::Limit | ExecutionType::Stop => bar.maker_fee,
    };
    rate.unwrap_or(0.0)
}
