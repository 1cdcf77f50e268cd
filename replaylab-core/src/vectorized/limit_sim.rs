//! Vectorized limit-order matching loop.
//!
//! Every bar is a candidate: a resting entry limit placed at the candidate's
//! bar, then a resting exit limit (plus an optional loss-cut) once the entry
//! fills. Candidates are independent, so they are evaluated in parallel over
//! read-only columns.
//!
//! Per candidate `i`, bars `j > i` are scanned:
//! - the phase timeout is checked first: entry phase measures from bar `i`,
//!   exit phase from the entry bar; `elapsed > timeout` ends the scan
//! - entry phase: the entry limit fills when touched
//! - exit phase (from the bar after the entry fill): loss-cut beats a same-bar
//!   target exit and is priced at `loss_cut ∓ slippage`
//!
//! Touches are inclusive, the same as the replay engine's.

use crate::domain::{BarSeries, Side};
use crate::engine::trigger::{limit_touched, stop_touched};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_LOSS_CUT_SLIPPAGE: f64 = 2000.0;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("{name} has {actual} values, expected one per bar ({expected})")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("price column '{column}' missing at row {row}")]
    MissingColumn { column: String, row: usize },

    #[error("{phase} timeout must be non-negative, got {value}")]
    InvalidTimeout { phase: &'static str, value: f64 },
}

/// Result code per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    EntryTimeout,
    ExitTimeout,
    Filtered,
    LossCut,
}

impl Outcome {
    /// Stable numeric code, `Success = 1`.
    pub fn code(self) -> u8 {
        match self {
            Outcome::Success => 1,
            Outcome::EntryTimeout => 2,
            Outcome::ExitTimeout => 3,
            Outcome::Filtered => 4,
            Outcome::LossCut => 5,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "SUCCESS",
            Outcome::EntryTimeout => "ENTRY_TIMEOUT",
            Outcome::ExitTimeout => "EXIT_TIMEOUT",
            Outcome::Filtered => "FILTERED",
            Outcome::LossCut => "LOSSCUT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutUnit {
    #[default]
    Seconds,
    Bars,
}

/// Independent entry and exit timeouts. `None` never times out.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeout {
    pub entry: Option<f64>,
    pub exit: Option<f64>,
    pub unit: TimeoutUnit,
}

impl Timeout {
    pub fn seconds(entry: f64, exit: f64) -> Self {
        Self {
            entry: Some(entry),
            exit: Some(exit),
            unit: TimeoutUnit::Seconds,
        }
    }

    pub fn bars(entry: usize, exit: usize) -> Self {
        Self {
            entry: Some(entry as f64),
            exit: Some(exit as f64),
            unit: TimeoutUnit::Bars,
        }
    }

    fn validate(&self) -> Result<(), SimError> {
        for (phase, value) in [("entry", self.entry), ("exit", self.exit)] {
            if let Some(v) = value {
                if v.is_nan() || v < 0.0 {
                    return Err(SimError::InvalidTimeout { phase, value: v });
                }
            }
        }
        Ok(())
    }
}

/// Where a per-candidate price comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceSource {
    Values(Vec<f64>),
    /// A bar column, looked up through `Bar::field`.
    Column(String),
}

impl PriceSource {
    fn resolve(&self, name: &'static str, bars: &BarSeries) -> Result<Vec<f64>, SimError> {
        match self {
            PriceSource::Values(v) if v.len() == bars.len() => Ok(v.clone()),
            PriceSource::Values(v) => Err(SimError::LengthMismatch {
                name,
                expected: bars.len(),
                actual: v.len(),
            }),
            PriceSource::Column(column) => bars
                .iter()
                .enumerate()
                .map(|(row, bar)| {
                    bar.field(column).ok_or_else(|| SimError::MissingColumn {
                        column: column.clone(),
                        row,
                    })
                })
                .collect(),
        }
    }
}

/// One output row per candidate bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimRow {
    pub id: usize,
    pub start: DateTime<Utc>,
    pub entry_at: Option<DateTime<Utc>>,
    pub entry_price: Option<f64>,
    pub exit_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub outcome: Outcome,
    pub entry_price_order: f64,
    pub exit_price_order: f64,
    pub loss_cut_price_order: Option<f64>,
    /// Side-signed `exit/entry - 1`.
    pub profit: Option<f64>,
    pub is_win: Option<bool>,
    /// Seconds from candidate start to entry fill.
    pub entry_duration: Option<f64>,
    /// Seconds from entry fill to exit.
    pub exit_duration: Option<f64>,
    /// Seconds from candidate start to exit.
    pub total_duration: Option<f64>,
}

/// Serializable form of a simulation, with prices read from bar columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSimConfig {
    pub side: Side,
    /// Defaults to `buy_price` for BUY and `sell_price` for SELL.
    pub entry_column: Option<String>,
    /// Defaults to the opposite of the entry column.
    pub exit_column: Option<String>,
    pub loss_cut_column: Option<String>,
    /// Boolean column in the source frame; rows where it is false are skipped.
    pub entry_filter_column: Option<String>,
    pub timeout: Timeout,
    pub loss_cut_slippage: f64,
}

impl Default for LimitSimConfig {
    fn default() -> Self {
        Self {
            side: Side::Buy,
            entry_column: None,
            exit_column: None,
            loss_cut_column: None,
            entry_filter_column: None,
            timeout: Timeout::default(),
            loss_cut_slippage: DEFAULT_LOSS_CUT_SLIPPAGE,
        }
    }
}

impl LimitSimConfig {
    /// Build the simulation. The entry filter column is resolved by whoever
    /// loaded the frame and passed in here.
    pub fn to_simulation(&self, entry_filter: Option<Vec<bool>>) -> LimitSimulation {
        let mut sim = LimitSimulation::new(self.side)
            .with_timeout(self.timeout)
            .with_loss_cut_slippage(self.loss_cut_slippage);
        if let Some(c) = &self.entry_column {
            sim = sim.with_entry_prices(PriceSource::Column(c.clone()));
        }
        if let Some(c) = &self.exit_column {
            sim = sim.with_exit_prices(PriceSource::Column(c.clone()));
        }
        if let Some(c) = &self.loss_cut_column {
            sim = sim.with_loss_cut_prices(PriceSource::Column(c.clone()));
        }
        if let Some(mask) = entry_filter {
            sim = sim.with_entry_filter(mask);
        }
        sim
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitSimulation {
    pub side: Side,
    pub entry_prices: PriceSource,
    pub exit_prices: PriceSource,
    pub loss_cut_prices: Option<PriceSource>,
    pub entry_filter: Option<Vec<bool>>,
    pub timeout: Timeout,
    pub loss_cut_slippage: f64,
}

fn default_column(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy_price",
        Side::Sell => "sell_price",
    }
}

impl LimitSimulation {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            entry_prices: PriceSource::Column(default_column(side).into()),
            exit_prices: PriceSource::Column(default_column(side.reverse()).into()),
            loss_cut_prices: None,
            entry_filter: None,
            timeout: Timeout::default(),
            loss_cut_slippage: DEFAULT_LOSS_CUT_SLIPPAGE,
        }
    }

    pub fn with_entry_prices(mut self, source: PriceSource) -> Self {
        self.entry_prices = source;
        self
    }

    pub fn with_exit_prices(mut self, source: PriceSource) -> Self {
        self.exit_prices = source;
        self
    }

    pub fn with_loss_cut_prices(mut self, source: PriceSource) -> Self {
        self.loss_cut_prices = Some(source);
        self
    }

    pub fn with_entry_filter(mut self, mask: Vec<bool>) -> Self {
        self.entry_filter = Some(mask);
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_loss_cut_slippage(mut self, slippage: f64) -> Self {
        self.loss_cut_slippage = slippage;
        self
    }

    /// Evaluate every bar of `bars` as a candidate.
    pub fn run(&self, bars: &BarSeries) -> Result<Vec<SimRow>, SimError> {
        self.timeout.validate()?;
        let n = bars.len();
        let entry = self.entry_prices.resolve("entry prices", bars)?;
        let exit = self.exit_prices.resolve("exit prices", bars)?;
        let loss_cut = self
            .loss_cut_prices
            .as_ref()
            .map(|s| s.resolve("loss-cut prices", bars))
            .transpose()?;
        if let Some(mask) = &self.entry_filter {
            if mask.len() != n {
                return Err(SimError::LengthMismatch {
                    name: "entry filter",
                    expected: n,
                    actual: mask.len(),
                });
            }
        }

        let columns = Columns {
            ts: bars.iter().map(|b| b.timestamp.timestamp_millis()).collect(),
            high: bars.iter().map(|b| b.high).collect(),
            low: bars.iter().map(|b| b.low).collect(),
            close: bars.iter().map(|b| b.close).collect(),
            entry,
            exit,
            loss_cut,
            filter: self.entry_filter.clone(),
        };

        let scans: Vec<Scan> = (0..n)
            .into_par_iter()
            .map(|i| columns.scan(i, self.side, &self.timeout, self.loss_cut_slippage))
            .collect();

        Ok(scans
            .into_iter()
            .enumerate()
            .map(|(i, scan)| columns.row(i, scan, self.side, bars))
            .collect())
    }
}

struct Columns {
    /// Epoch milliseconds.
    ts: Vec<i64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    entry: Vec<f64>,
    exit: Vec<f64>,
    loss_cut: Option<Vec<f64>>,
    filter: Option<Vec<bool>>,
}

#[derive(Debug, Clone, Copy)]
struct Scan {
    entry: Option<usize>,
    exit: Option<(usize, f64)>,
    outcome: Outcome,
}

impl Columns {
    fn elapsed(&self, unit: TimeoutUnit, from: usize, to: usize) -> f64 {
        match unit {
            TimeoutUnit::Seconds => (self.ts[to] - self.ts[from]) as f64 / 1000.0,
            TimeoutUnit::Bars => (to - from) as f64,
        }
    }

    fn scan(&self, i: usize, side: Side, timeout: &Timeout, slippage: f64) -> Scan {
        if self.filter.as_ref().is_some_and(|m| !m[i]) {
            return Scan {
                entry: None,
                exit: None,
                outcome: Outcome::Filtered,
            };
        }

        let exit_side = side.reverse();
        let loss_cut = self.loss_cut.as_ref().map(|l| l[i]);
        let mut entered: Option<usize> = None;

        for j in i + 1..self.ts.len() {
            let (from, limit) = match entered {
                None => (i, timeout.entry),
                Some(e) => (e, timeout.exit),
            };
            if limit.is_some_and(|l| self.elapsed(timeout.unit, from, j) > l) {
                return match entered {
                    None => Scan {
                        entry: None,
                        exit: None,
                        outcome: Outcome::EntryTimeout,
                    },
                    Some(e) => Scan {
                        entry: Some(e),
                        exit: Some((j, self.close[j])),
                        outcome: Outcome::ExitTimeout,
                    },
                };
            }

            let (high, low) = (self.high[j], self.low[j]);
            let Some(e) = entered else {
                if limit_touched(side, self.entry[i], high, low) {
                    entered = Some(j);
                }
                continue;
            };

            if let Some(lc) = loss_cut {
                if stop_touched(exit_side, lc, high, low) {
                    return Scan {
                        entry: Some(e),
                        exit: Some((j, lc - side.sign() * slippage)),
                        outcome: Outcome::LossCut,
                    };
                }
            }
            if limit_touched(exit_side, self.exit[i], high, low) {
                return Scan {
                    entry: Some(e),
                    exit: Some((j, self.exit[i])),
                    outcome: Outcome::Success,
                };
            }
        }

        match entered {
            None => Scan {
                entry: None,
                exit: None,
                outcome: Outcome::EntryTimeout,
            },
            Some(e) => {
                let last = self.ts.len() - 1;
                Scan {
                    entry: Some(e),
                    exit: Some((last, self.close[last])),
                    outcome: Outcome::ExitTimeout,
                }
            }
        }
    }

    fn row(&self, i: usize, scan: Scan, side: Side, bars: &BarSeries) -> SimRow {
        let at = |j: usize| bars.get(j).map(|b| b.timestamp);
        let seconds = |from: usize, to: usize| (self.ts[to] - self.ts[from]) as f64 / 1000.0;

        let entry_price = scan.entry.map(|_| self.entry[i]);
        let exit_price = scan.exit.map(|(_, p)| p);
        let profit = match (entry_price, exit_price) {
            (Some(open), Some(close)) => Some(side.sign() * (close / open - 1.0)),
            _ => None,
        };

        SimRow {
            id: i,
            start: bars[i].timestamp,
            entry_at: scan.entry.and_then(at),
            entry_price,
            exit_at: scan.exit.and_then(|(j, _)| at(j)),
            exit_price,
            outcome: scan.outcome,
            entry_price_order: self.entry[i],
            exit_price_order: self.exit[i],
            loss_cut_price_order: self.loss_cut.as_ref().map(|l| l[i]),
            profit,
            is_win: profit.map(|p| p > 0.0),
            entry_duration: scan.entry.map(|e| seconds(i, e)),
            exit_duration: scan.entry.zip(scan.exit).map(|(e, (x, _))| seconds(e, x)),
            total_duration: scan.exit.map(|(x, _)| seconds(i, x)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::{Duration, TimeZone};

    fn series(rows: &[(f64, f64, f64)]) -> BarSeries {
        let t0 = Utc.with_ymd_and_hms(2021, 4, 16, 21, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                Bar::new(t0 + Duration::minutes(i as i64), close, high, low, close)
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn flat(n: usize, price: f64) -> PriceSource {
        PriceSource::Values(vec![price; n])
    }

    #[test]
    fn long_round_trip_exits_on_later_bar() {
        let bars = series(&[
            (101.0, 99.0, 100.0),
            (100.0, 98.0, 99.0),
            (105.0, 97.0, 100.0),
            (106.0, 100.0, 105.0),
        ]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(4, 98.0))
            .with_exit_prices(flat(4, 105.0))
            .run(&bars)
            .unwrap();

        let r = &rows[0];
        assert_eq!(r.outcome, Outcome::Success);
        assert_eq!(r.entry_at, Some(bars[1].timestamp));
        assert_eq!(r.exit_at, Some(bars[2].timestamp));
        assert_eq!(r.exit_price, Some(105.0));
        assert!((r.profit.unwrap() - (105.0 / 98.0 - 1.0)).abs() < 1e-12);
        assert_eq!(r.entry_duration, Some(60.0));
        assert_eq!(r.exit_duration, Some(60.0));
        assert_eq!(r.total_duration, Some(120.0));
    }

    #[test]
    fn exit_is_not_checked_on_the_entry_bar() {
        let bars = series(&[(100.0, 100.0, 100.0), (110.0, 90.0, 100.0), (101.0, 99.0, 100.0)]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(3, 95.0))
            .with_exit_prices(flat(3, 105.0))
            .run(&bars)
            .unwrap();
        assert_eq!(rows[0].entry_at, Some(bars[1].timestamp));
        assert_eq!(rows[0].outcome, Outcome::ExitTimeout);
        assert_eq!(rows[0].exit_at, Some(bars[2].timestamp));
        assert_eq!(rows[0].exit_price, Some(100.0));
    }

    #[test]
    fn loss_cut_wins_over_same_bar_target() {
        let bars = series(&[(100.0, 100.0, 100.0), (100.0, 98.0, 99.0), (120.0, 80.0, 100.0)]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(3, 98.0))
            .with_exit_prices(flat(3, 110.0))
            .with_loss_cut_prices(flat(3, 90.0))
            .with_loss_cut_slippage(0.5)
            .run(&bars)
            .unwrap();
        assert_eq!(rows[0].outcome, Outcome::LossCut);
        assert_eq!(rows[0].exit_price, Some(89.5));
    }

    #[test]
    fn short_loss_cut_adds_slippage() {
        let bars = series(&[(100.0, 100.0, 100.0), (102.0, 99.0, 101.0), (111.0, 100.0, 110.0)]);
        let rows = LimitSimulation::new(Side::Sell)
            .with_entry_prices(flat(3, 102.0))
            .with_exit_prices(flat(3, 90.0))
            .with_loss_cut_prices(flat(3, 110.0))
            .with_loss_cut_slippage(1.0)
            .run(&bars)
            .unwrap();
        assert_eq!(rows[0].outcome, Outcome::LossCut);
        assert_eq!(rows[0].exit_price, Some(111.0));
        assert!(rows[0].profit.unwrap() < 0.0);
    }

    #[test]
    fn entry_timeout_in_bars() {
        let bars = series(&[(100.0, 100.0, 100.0); 5]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(5, 50.0))
            .with_exit_prices(flat(5, 150.0))
            .with_timeout(Timeout::bars(2, 2))
            .run(&bars)
            .unwrap();
        assert!(rows.iter().all(|r| r.outcome == Outcome::EntryTimeout));
        assert!(rows.iter().all(|r| r.entry_at.is_none()));
    }

    #[test]
    fn exit_timeout_exits_at_close_of_breaching_bar() {
        let bars = series(&[
            (100.0, 100.0, 100.0),
            (100.0, 98.0, 99.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (102.0, 99.0, 101.5),
        ]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(5, 98.0))
            .with_exit_prices(flat(5, 150.0))
            .with_timeout(Timeout::seconds(600.0, 120.0))
            .run(&bars)
            .unwrap();
        // entered at bar 1; 180s > 120s first at bar 4
        assert_eq!(rows[0].outcome, Outcome::ExitTimeout);
        assert_eq!(rows[0].exit_at, Some(bars[4].timestamp));
        assert_eq!(rows[0].exit_price, Some(101.5));
    }

    #[test]
    fn entry_on_last_bar_exits_there_at_close() {
        let bars = series(&[(100.0, 100.0, 100.0), (101.0, 99.0, 100.0), (100.0, 97.0, 99.0)]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(3, 98.0))
            .with_exit_prices(flat(3, 150.0))
            .run(&bars)
            .unwrap();
        let r = &rows[0];
        assert_eq!(r.outcome, Outcome::ExitTimeout);
        assert_eq!(r.entry_at, Some(bars[2].timestamp));
        assert_eq!(r.exit_at, r.entry_at);
        assert_eq!(r.exit_price, Some(99.0));
        assert_eq!(r.exit_duration, Some(0.0));
        assert_eq!(r.total_duration, Some(120.0));
    }

    #[test]
    fn filtered_candidates_are_skipped() {
        let bars = series(&[(100.0, 100.0, 100.0); 3]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(3, 100.0))
            .with_exit_prices(flat(3, 100.0))
            .with_entry_filter(vec![false, true, true])
            .run(&bars)
            .unwrap();
        assert_eq!(rows[0].outcome, Outcome::Filtered);
        assert_eq!(rows[0].profit, None);
        assert_ne!(rows[1].outcome, Outcome::Filtered);
    }

    #[test]
    fn last_candidate_never_enters() {
        let bars = series(&[(100.0, 100.0, 100.0); 3]);
        let rows = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(3, 100.0))
            .with_exit_prices(flat(3, 200.0))
            .run(&bars)
            .unwrap();
        assert_eq!(rows[2].outcome, Outcome::EntryTimeout);
    }

    #[test]
    fn default_columns_follow_side() {
        let t0 = Utc.with_ymd_and_hms(2021, 4, 16, 21, 0, 0).unwrap();
        let bars: BarSeries = (0..3)
            .map(|i| {
                Bar::new(t0 + Duration::minutes(i), 100.0, 101.0, 99.0, 100.0)
                    .with_extra("buy_price", 99.0)
                    .with_extra("sell_price", 101.0)
            })
            .collect::<Vec<_>>()
            .into();
        let rows = LimitSimulation::new(Side::Buy).run(&bars).unwrap();
        assert_eq!(rows[0].entry_price_order, 99.0);
        assert_eq!(rows[0].exit_price_order, 101.0);
        assert_eq!(rows[0].outcome, Outcome::Success);
    }

    #[test]
    fn missing_column_and_bad_lengths_are_errors() {
        let bars = series(&[(100.0, 100.0, 100.0); 3]);
        assert!(matches!(
            LimitSimulation::new(Side::Buy).run(&bars),
            Err(SimError::MissingColumn { .. })
        ));
        assert!(matches!(
            LimitSimulation::new(Side::Buy)
                .with_entry_prices(flat(2, 1.0))
                .run(&bars),
            Err(SimError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let bars = series(&[(100.0, 100.0, 100.0); 2]);
        let err = LimitSimulation::new(Side::Buy)
            .with_entry_prices(flat(2, 1.0))
            .with_exit_prices(flat(2, 1.0))
            .with_timeout(Timeout::seconds(-1.0, 0.0))
            .run(&bars)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidTimeout { phase: "entry", .. }));
    }

    #[test]
    fn outcome_codes_start_at_one() {
        assert_eq!(Outcome::Success.code(), 1);
        assert_eq!(Outcome::LossCut.code(), 5);
        assert_eq!(Outcome::EntryTimeout.to_string(), "ENTRY_TIMEOUT");
    }
}
