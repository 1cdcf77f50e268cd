//! Bar loading for a configured run.

use replaylab_core::data::{frame_to_bar_frame, BarFrame, DataError, DataIngestor};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, DataConfig};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("no bars in {0}")]
    Empty(String),
}

/// Read the configured file into time-sorted bars, plus the boolean entry
/// mask when `filter_column` is given.
pub fn load_bars(data: &DataConfig, filter_column: Option<&str>) -> Result<BarFrame, LoadError> {
    let format = data.resolved_format()?;
    let df = DataIngestor::new().load(&data.path, format)?;
    let frame = frame_to_bar_frame(&df, filter_column)?;
    if frame.bars.is_empty() {
        return Err(LoadError::Empty(data.path.display().to_string()));
    }

    info!(
        path = %data.path.display(),
        ?format,
        bars = frame.bars.len(),
        "loaded bars"
    );
    let insane = frame.bars.iter().filter(|b| !b.is_sane()).count();
    if insane > 0 {
        warn!(
            path = %data.path.display(),
            insane,
            "bars with NaN or inconsistent OHLC; fills on them may be wrong"
        );
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaylab_core::data::DataFormat;
    use std::path::PathBuf;

    fn write_csv(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("bars.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_csv_with_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "timestamp,open,high,low,close,ok\n\
             1618606800000,10,11,9,10.5,true\n\
             1618606740000,9,10,8,9.5,false\n",
        );
        let data = DataConfig { path, format: None };

        let frame = load_bars(&data, Some("ok")).unwrap();
        assert_eq!(frame.bars.len(), 2);
        assert_eq!(frame.bars[0].close, 9.5);
        assert_eq!(frame.entry_filter, Some(vec![false, true]));
    }

    #[test]
    fn inconsistent_bars_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        // second bar: high below close
        let path = write_csv(
            &dir,
            "timestamp,open,high,low,close\n\
             1618606740000,9,10,8,9.5\n\
             1618606800000,10,10.2,9,10.5\n",
        );
        let data = DataConfig { path, format: None };

        let frame = load_bars(&data, None).unwrap();
        assert_eq!(frame.bars.len(), 2);
        assert!(frame.bars[0].is_sane());
        assert!(!frame.bars[1].is_sane());
    }

    #[test]
    fn header_only_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "timestamp,open,high,low,close\n");
        let data = DataConfig {
            path,
            format: Some(DataFormat::Csv),
        };
        assert!(load_bars(&data, None).is_err());
    }

    #[test]
    fn unknown_format_is_a_config_error() {
        let data = DataConfig {
            path: PathBuf::from("bars.dat"),
            format: None,
        };
        assert!(matches!(
            load_bars(&data, None),
            Err(LoadError::Config(ConfigError::UnknownFormat(_)))
        ));
    }
}
