//! DataFrame → `BarSeries` conversion.
//!
//! The timestamp column may be a polars `Datetime`/`Date` or an integer of
//! epoch milliseconds. Null OHLC values become NaN (void bars); null optional
//! values stay absent. Any other numeric column is carried in `Bar::extra`.

use super::ingest::DataError;
use super::schema::BarSchema;
use crate::domain::{Bar, BarSeries};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::collections::BTreeMap;

/// Bars plus the optional per-row entry mask, kept in the same order.
#[derive(Debug, Clone)]
pub struct BarFrame {
    pub bars: BarSeries,
    pub entry_filter: Option<Vec<bool>>,
}

/// Convert a frame into a time-sorted bar series.
pub fn frame_to_bars(df: &DataFrame) -> Result<BarSeries, DataError> {
    Ok(frame_to_bar_frame(df, None)?.bars)
}

/// Convert a frame, also reading the boolean column `filter_column` as the
/// entry mask. Null mask values count as not eligible.
pub fn frame_to_bar_frame(
    df: &DataFrame,
    filter_column: Option<&str>,
) -> Result<BarFrame, DataError> {
    BarSchema::validate(df)?;
    let n = df.height();

    let ts = timestamps(column(df, BarSchema::TIMESTAMP)?)?;
    let open = floats(column(df, "open")?)?;
    let high = floats(column(df, "high")?)?;
    let low = floats(column(df, "low")?)?;
    let close = floats(column(df, "close")?)?;

    let optional = |name: &str| -> Result<Option<Vec<Option<f64>>>, DataError> {
        match df.column(name) {
            Ok(c) => floats(c).map(Some),
            Err(_) => Ok(None),
        }
    };
    let volume = optional("volume")?;
    let bid = optional("bid")?;
    let ask = optional("ask")?;
    let maker_fee = optional("maker_fee")?;
    let taker_fee = optional("taker_fee")?;

    let mut extras: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    for c in df.get_columns() {
        let name = c.name().as_str();
        if BarSchema::is_known(name) || Some(name) == filter_column || !is_numeric(c.dtype()) {
            continue;
        }
        extras.push((name.to_string(), floats(c)?));
    }

    let filter = filter_column
        .map(|name| bools(column(df, name)?))
        .transpose()?;

    let at = |v: &Option<Vec<Option<f64>>>, i: usize| v.as_ref().and_then(|col| col[i]);

    let mut rows: Vec<(Bar, bool)> = Vec::with_capacity(n);
    for i in 0..n {
        let ms = ts[i].ok_or_else(|| DataError::NullValue {
            column: BarSchema::TIMESTAMP.into(),
            row: i,
        })?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
            DataError::ValidationFailed(format!("timestamp {ms} out of range at row {i}"))
        })?;

        let extra: BTreeMap<String, f64> = extras
            .iter()
            .filter_map(|(name, values)| values[i].map(|v| (name.clone(), v)))
            .collect();

        let bar = Bar {
            timestamp,
            open: open[i].unwrap_or(f64::NAN),
            high: high[i].unwrap_or(f64::NAN),
            low: low[i].unwrap_or(f64::NAN),
            close: close[i].unwrap_or(f64::NAN),
            volume: at(&volume, i),
            bid: at(&bid, i),
            ask: at(&ask, i),
            maker_fee: at(&maker_fee, i),
            taker_fee: at(&taker_fee, i),
            extra,
        };
        let eligible = filter.as_ref().map_or(true, |f| f[i]);
        rows.push((bar, eligible));
    }

    // Stable, so equal timestamps keep file order.
    rows.sort_by_key(|(bar, _)| bar.timestamp);
    let (bars, mask): (Vec<Bar>, Vec<bool>) = rows.into_iter().unzip();

    Ok(BarFrame {
        bars: BarSeries::new(bars),
        entry_filter: filter.map(|_| mask),
    })
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, DataError> {
    df.column(name)
        .map_err(|e| DataError::ValidationFailed(format!("column '{name}': {e}")))
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn floats(col: &Column) -> Result<Vec<Option<f64>>, DataError> {
    let map_err = |e: PolarsError| {
        DataError::ValidationFailed(format!("column '{}' as f64: {e}", col.name()))
    };
    let cast = col.cast(&DataType::Float64).map_err(map_err)?;
    let ca = cast.f64().map_err(map_err)?;
    Ok(ca.into_iter().collect())
}

fn bools(col: &Column) -> Result<Vec<bool>, DataError> {
    let map_err = |e: PolarsError| {
        DataError::ValidationFailed(format!("column '{}' as bool: {e}", col.name()))
    };
    let cast = col.cast(&DataType::Boolean).map_err(map_err)?;
    let ca = cast.bool().map_err(map_err)?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(false)).collect())
}

/// Epoch milliseconds per row.
fn timestamps(col: &Column) -> Result<Vec<Option<i64>>, DataError> {
    let map_err = |e: PolarsError| {
        DataError::ValidationFailed(format!("column '{}' as timestamp: {e}", col.name()))
    };
    let millis = match col.dtype() {
        DataType::Datetime(_, _) | DataType::Date => col
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .and_then(|c| c.cast(&DataType::Int64))
            .map_err(map_err)?,
        dt if is_numeric(dt) => col.cast(&DataType::Int64).map_err(map_err)?,
        other => {
            return Err(DataError::ValidationFailed(format!(
                "column '{}' has type {other}, expected a datetime or epoch milliseconds",
                col.name()
            )))
        }
    };
    let ca = millis.i64().map_err(map_err)?;
    Ok(ca.into_iter().collect())
}
