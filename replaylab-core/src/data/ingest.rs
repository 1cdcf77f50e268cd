use crate::data::schema::SchemaError;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk bar formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Csv,
    Parquet,
}

impl DataFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(DataFormat::Csv),
            "parquet" | "pq" => Some(DataFormat::Parquet),
            _ => None,
        }
    }
}

/// Reads bar tables from CSV and Parquet files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataIngestor;

impl DataIngestor {
    pub fn new() -> Self {
        Self
    }

    /// Lazily scan a CSV file with a header row; date-like columns are parsed.
    pub fn ingest_csv(&self, path: &Path) -> Result<LazyFrame, DataError> {
        LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()
            .map_err(|e| DataError::IngestFailed(format!("{}: {e}", path.display())))
    }

    /// Lazily scan a Parquet file.
    pub fn ingest_parquet(&self, path: &Path) -> Result<LazyFrame, DataError> {
        LazyFrame::scan_parquet(path, Default::default())
            .map_err(|e| DataError::IngestFailed(format!("{}: {e}", path.display())))
    }

    /// Read `path` fully into a `DataFrame`.
    pub fn load(&self, path: &Path, format: DataFormat) -> Result<DataFrame, DataError> {
        let lf = match format {
            DataFormat::Csv => self.ingest_csv(path)?,
            DataFormat::Parquet => self.ingest_parquet(path)?,
        };
        lf.collect()
            .map_err(|e| DataError::IngestFailed(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Ingest failed: {0}")]
    IngestFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("null {column} at row {row}")]
    NullValue { column: String, row: usize },
}
