use polars::prelude::*;

/// Column layout expected of a bar frame.
pub struct BarSchema;

impl BarSchema {
    pub const TIMESTAMP: &'static str = "timestamp";

    /// Columns every frame must carry.
    pub const REQUIRED: [&'static str; 5] = ["timestamp", "open", "high", "low", "close"];

    /// Columns mapped onto named `Bar` fields when present.
    pub const OPTIONAL: [&'static str; 5] = ["volume", "bid", "ask", "maker_fee", "taker_fee"];

    /// Check that every required column exists.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let actual = df.schema();
        for name in Self::REQUIRED {
            if !actual.contains(name) {
                return Err(SchemaError::MissingColumn(name.to_string()));
            }
        }
        Ok(())
    }

    /// True for columns that map onto a named `Bar` field.
    pub fn is_known(name: &str) -> bool {
        Self::REQUIRED.contains(&name) || Self::OPTIONAL.contains(&name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing column: {0}")]
    MissingColumn(String),
}
