//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Finalization empties the book under arbitrary command streams
//! 2. Closed-position gain identity
//! 3. Limit touch timing: the first bar reaching the price fills the order
//! 4. Expiration timing: expiry at the first bar at or after entry + seconds
//! 5. Repricing: a repriced closing limit never ends EXPIRED
//! 6. Vectorized loss-cut pricing and fill timing

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use replaylab_core::domain::OrderStatus;
use replaylab_core::vectorized::{LimitSimulation, Outcome, PriceSource};
use replaylab_core::{
    BackTester, Bar, BarSeries, EngineConfig, EntryRequest, ExitRequest, PositionQuery, Repricer,
    Side,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 4, 16, 21, 0, 0).unwrap()
}

/// Random-walk bars one minute apart with consistent OHLC.
fn arb_bars(min: usize, max: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-2.0..2.0_f64, 0.0..3.0_f64, 0.0..3.0_f64), min..max).prop_map(
        |steps| {
            let mut price = 100.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (drift, up, down))| {
                    let open = price;
                    let close = (price + drift).max(1.0);
                    let high = open.max(close) + up;
                    let low = (open.min(close) - down).max(0.5);
                    price = close;
                    Bar::new(t0() + Duration::minutes(i as i64), open, high, low, close)
                })
                .collect()
        },
    )
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

#[derive(Debug, Clone)]
enum Action {
    Idle,
    MarketEntry(Side),
    LimitEntry(Side, f64, Option<i64>),
    LimitExit(f64, Option<i64>),
    MarketExit,
    CancelFirst,
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => Just(Action::Idle),
        1 => arb_side().prop_map(Action::MarketEntry),
        1 => (arb_side(), 90.0..110.0_f64, prop::option::of(60..600_i64))
            .prop_map(|(s, p, e)| Action::LimitEntry(s, p, e)),
        1 => (-5.0..5.0_f64, prop::option::of(60..600_i64)).prop_map(|(d, e)| Action::LimitExit(d, e)),
        1 => Just(Action::MarketExit),
        1 => Just(Action::CancelFirst),
    ]
}

fn apply(bt: &mut BackTester, action: &Action) {
    match action {
        Action::Idle => {}
        Action::MarketEntry(side) => {
            bt.entry(EntryRequest::market(*side)).unwrap();
        }
        Action::LimitEntry(side, price, expire) => {
            let mut req = EntryRequest::limit(*side, *price);
            if let Some(s) = expire {
                req = req.with_expire_seconds(*s);
            }
            bt.entry(req).unwrap();
        }
        Action::LimitExit(offset, expire) => {
            let free: Vec<_> = bt
                .positions(&PositionQuery::default().non_closing())
                .iter()
                .map(|p| (p.id(), p.open_price()))
                .collect();
            if let Some(&(pid, open)) = free.first() {
                let mut req = ExitRequest::limit(open + offset);
                if let Some(s) = expire {
                    req = req.with_expire_seconds(*s);
                }
                bt.exit(pid, req).unwrap();
            }
        }
        Action::MarketExit => {
            let free = bt
                .positions(&PositionQuery::default().non_closing())
                .first()
                .map(|p| p.id());
            if let Some(pid) = free {
                bt.exit(pid, ExitRequest::market()).unwrap();
            }
        }
        Action::CancelFirst => {
            let first = bt
                .orders(&Default::default())
                .iter()
                .find(|o| o.status() == OrderStatus::Ordering)
                .map(|o| o.id());
            if let Some(id) = first {
                bt.cancel(id).unwrap();
            }
        }
    }
}

// ── 1 & 2. Finalization and Gain Identity ────────────────────────────

proptest! {
    /// Whatever the strategy does, the book is empty after the run and every
    /// closed position's gain follows the identity.
    #[test]
    fn finalize_empties_book(
        bars in arb_bars(2, 40),
        actions in prop::collection::vec(arb_action(), 40),
    ) {
        let mut bt = BackTester::new(bars, EngineConfig::default());
        bt.run(|bt, i| {
            apply(bt, &actions[i % actions.len()]);
            Ok(())
        }).unwrap();

        prop_assert_eq!(bt.book().order_count(), 0);
        prop_assert_eq!(bt.book().position_count(), 0);
        prop_assert!(bt.order_history().iter().all(|o| o.is_done()));

        let mut total = 0.0;
        for p in bt.position_history() {
            prop_assert!(p.is_closed());
            let close = p.close_info().unwrap();
            let expected = p.side().sign() * (close.price / p.open_price() - 1.0)
                - (p.open_fee() - close.fee);
            prop_assert!((p.gain().unwrap() - expected).abs() < 1e-12);
            total += expected;
        }
        prop_assert!((bt.cum_gain() - total).abs() < 1e-9);
    }
}

// ── 3. Limit Touch Timing ────────────────────────────────────────────

proptest! {
    /// A BUY limit issued on bar 0 fills on the first later bar with
    /// `low <= price`, at the limit price.
    #[test]
    fn limit_fills_on_first_touch(bars in arb_bars(3, 30), price in 90.0..105.0_f64) {
        let expected = bars.iter().skip(1).position(|b| b.low <= price).map(|k| k + 1);
        let mut bt = BackTester::new(bars, EngineConfig::default());
        let mut id = None;
        bt.run(|bt, i| {
            if i == 0 {
                id = Some(bt.entry(EntryRequest::limit(Side::Buy, price))?);
            }
            Ok(())
        }).unwrap();

        let order = bt.order(id.unwrap()).unwrap();
        match expected {
            Some(k) => {
                prop_assert_eq!(order.status(), OrderStatus::Executed);
                prop_assert_eq!(order.executed().map(|r| r.index), Some(k));
                prop_assert_eq!(order.price(), Some(price));
            }
            None => prop_assert_eq!(order.status(), OrderStatus::Expired),
        }
    }
}

// ── 4. Expiration Timing ─────────────────────────────────────────────

proptest! {
    /// An order that never fills expires on the first bar stamped at or
    /// after `entry_time + expire_seconds`.
    #[test]
    fn expiry_at_first_bar_past_deadline(
        bars in arb_bars(3, 30),
        issue in 0usize..3,
        seconds in 1..1800_i64,
    ) {
        let n = bars.len();
        let issue = issue.min(n - 1);
        let deadline = bars[issue].timestamp + Duration::seconds(seconds);
        let expected = bars
            .iter()
            .enumerate()
            .skip(issue + 1)
            .find(|(_, b)| b.timestamp >= deadline)
            .map_or(n - 1, |(k, _)| k);

        let mut bt = BackTester::new(bars, EngineConfig::default());
        let mut id = None;
        bt.run(|bt, i| {
            if i == issue {
                id = Some(bt.entry(
                    EntryRequest::limit(Side::Buy, f64::NEG_INFINITY).with_expire_seconds(seconds),
                )?);
            }
            Ok(())
        }).unwrap();

        let order = bt.order(id.unwrap()).unwrap();
        prop_assert_eq!(order.status(), OrderStatus::Expired);
        prop_assert_eq!(order.expired().map(|r| r.index), Some(expected));
    }
}

// ── 5. Repricing ─────────────────────────────────────────────────────

proptest! {
    /// A closing limit with a reprice rule is never left EXPIRED: it either
    /// fills or is executed at the last close.
    #[test]
    fn repriced_close_never_expires(bars in arb_bars(4, 30), expire in 60..300_i64) {
        let mut bt = BackTester::new(bars, EngineConfig::default().with_keep_expired_orders(true));
        let mut exit = None;
        bt.run(|bt, i| {
            if i == 0 {
                bt.entry(EntryRequest::market(Side::Buy))?;
            }
            if i == 1 {
                let pid = bt.positions(&PositionQuery::default())[0].id();
                exit = Some(bt.exit(
                    pid,
                    ExitRequest::limit(1e9)
                        .with_expire_seconds(expire)
                        .with_reprice(Repricer::func(|bar, _| bar.high + 10.0)),
                )?);
            }
            Ok(())
        }).unwrap();

        let order = bt.order(exit.unwrap()).unwrap();
        prop_assert_ne!(order.status(), OrderStatus::Expired);
        prop_assert!(order.is_executed());
        let p = bt.position_history().next().unwrap();
        prop_assert_eq!(p.close_order(), exit);
        prop_assert!(p.superseded_orders().iter().all(|o| o.status() == OrderStatus::Expired));
    }
}

// ── 6. Vectorized Loop ───────────────────────────────────────────────

proptest! {
    /// Loss-cut exits are priced at `loss_cut ∓ slippage`, and every entry
    /// happens on the first bar after the candidate that touches the price.
    #[test]
    fn vectorized_loss_cut_and_entry_timing(
        bars in arb_bars(3, 40),
        side in arb_side(),
        entry_offset in 0.0..3.0_f64,
        cut_offset in 1.0..4.0_f64,
        slippage in 0.0..1.0_f64,
    ) {
        let n = bars.len();
        let sign = side.sign();
        let entry: Vec<f64> = bars.iter().map(|b| b.close - sign * entry_offset).collect();
        let exit: Vec<f64> = entry.iter().map(|p| p + sign * 5.0).collect();
        let cut: Vec<f64> = entry.iter().map(|p| p - sign * cut_offset).collect();
        let series = BarSeries::new(bars);

        let rows = LimitSimulation::new(side)
            .with_entry_prices(PriceSource::Values(entry.clone()))
            .with_exit_prices(PriceSource::Values(exit))
            .with_loss_cut_prices(PriceSource::Values(cut.clone()))
            .with_loss_cut_slippage(slippage)
            .run(&series)
            .unwrap();
        prop_assert_eq!(rows.len(), n);

        for (i, row) in rows.iter().enumerate() {
            if row.outcome == Outcome::LossCut {
                prop_assert_eq!(row.exit_price, Some(cut[i] - sign * slippage));
            }
            let first_touch = (i + 1..n).find(|&j| match side {
                Side::Buy => series[j].low <= entry[i],
                Side::Sell => series[j].high >= entry[i],
            });
            match row.entry_at {
                Some(ts) => prop_assert_eq!(Some(ts), first_touch.map(|j| series[j].timestamp)),
                None => {
                    prop_assert_eq!(first_touch, None);
                    prop_assert_eq!(row.outcome, Outcome::EntryTimeout);
                }
            }
            if let (Some(entry_at), Some(exit_at)) = (row.entry_at, row.exit_at) {
                prop_assert!(exit_at >= entry_at);
            }
        }
    }
}
