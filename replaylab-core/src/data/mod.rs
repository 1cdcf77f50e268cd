//! Data ingestion: CSV/Parquet files and polars frames into bar series.

pub mod frame;
pub mod ingest;
pub mod schema;

pub use frame::{frame_to_bar_frame, frame_to_bars, BarFrame};
pub use ingest::{DataError, DataFormat, DataIngestor};
pub use schema::{BarSchema, SchemaError};
