//! Export of replay histories and simulation rows as CSV or JSON.
//!
//! Positions are written as flat `open_*`/`close_*` rows, orders as their
//! externally visible fields, simulation rows one per candidate bar.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use replaylab_core::domain::{OrderRecord, PositionRecord};
use replaylab_core::vectorized::SimRow;
use replaylab_core::BackTester;
use serde::Serialize;

use crate::config::{ExportFormat, OutputConfig};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize any record list to pretty JSON.
pub fn export_json<T: Serialize>(records: &[T]) -> Result<String> {
    serde_json::to_string_pretty(records).context("failed to serialize records to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

fn export_csv<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record).context("failed to write CSV row")?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Position history, one row per position.
pub fn export_positions_csv(records: &[PositionRecord]) -> Result<String> {
    export_csv(records)
}

/// Order history, one row per order.
pub fn export_orders_csv(records: &[OrderRecord]) -> Result<String> {
    export_csv(records)
}

/// Vectorized simulation output, one row per candidate.
pub fn export_sim_rows_csv(rows: &[SimRow]) -> Result<String> {
    export_csv(rows)
}

fn render<T: Serialize>(records: &[T], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => export_csv(records),
        ExportFormat::Json => export_json(records),
    }
}

fn write_file(dir: &Path, stem: &str, format: ExportFormat, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    let path = dir.join(format!("{stem}.{}", format.extension()));
    std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

// ─── Artifact files ─────────────────────────────────────────────────

/// Write `positions.{csv,json}` and `orders.{csv,json}` for a finished
/// replay. Returns the written paths.
pub fn save_replay(bt: &BackTester, output: &OutputConfig) -> Result<Vec<PathBuf>> {
    let positions = bt
        .position_records()
        .context("failed to build position records")?;
    let orders = bt.order_records();

    Ok(vec![
        write_file(
            &output.dir,
            "positions",
            output.format,
            &render(&positions, output.format)?,
        )?,
        write_file(
            &output.dir,
            "orders",
            output.format,
            &render(&orders, output.format)?,
        )?,
    ])
}

/// Write `limit_sim.{csv,json}`.
pub fn save_sim_rows(rows: &[SimRow], output: &OutputConfig) -> Result<PathBuf> {
    write_file(
        &output.dir,
        "limit_sim",
        output.format,
        &render(rows, output.format)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use replaylab_core::vectorized::Outcome;

    fn row(id: usize, outcome: Outcome) -> SimRow {
        let t = Utc.with_ymd_and_hms(2021, 4, 16, 21, id as u32, 0).unwrap();
        let filled = outcome == Outcome::Success;
        SimRow {
            id,
            start: t,
            entry_at: filled.then_some(t),
            entry_price: filled.then_some(100.0),
            exit_at: filled.then_some(t),
            exit_price: filled.then_some(101.0),
            outcome,
            entry_price_order: 100.0,
            exit_price_order: 101.0,
            loss_cut_price_order: None,
            profit: filled.then_some(0.01),
            is_win: filled.then_some(true),
            entry_duration: filled.then_some(0.0),
            exit_duration: filled.then_some(0.0),
            total_duration: filled.then_some(0.0),
        }
    }

    #[test]
    fn sim_rows_csv_has_header_and_empty_cells() {
        let csv = export_sim_rows_csv(&[row(0, Outcome::Success), row(1, Outcome::Filtered)])
            .unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,start,entry_at,entry_price,exit_at,exit_price,outcome"));
        assert!(lines.next().unwrap().contains("SUCCESS"));
        let filtered = lines.next().unwrap();
        assert!(filtered.contains("FILTERED"));
        assert!(filtered.contains(",,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn empty_input_gives_empty_csv() {
        assert_eq!(export_sim_rows_csv(&[]).unwrap(), "");
    }

    #[test]
    fn json_is_an_array() {
        let json = export_json(&[row(3, Outcome::Success)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["id"], 3);
        assert_eq!(value[0]["outcome"], "SUCCESS");
    }
}
