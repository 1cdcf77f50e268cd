//! Serializable run configuration.
//!
//! A run is described by one TOML file:
//!
//! ```toml
//! [data]
//! path = "bars.csv"
//!
//! [engine]
//! debug = false
//! market_price = "open"
//!
//! [limit_sim]
//! side = "BUY"
//! loss_cut_column = "loss_cut"
//!
//! [output]
//! dir = "out"
//! format = "csv"
//! ```

use std::path::{Path, PathBuf};

use replaylab_core::data::DataFormat;
use replaylab_core::vectorized::LimitSimConfig;
use replaylab_core::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot infer data format of {0}; set data.format")]
    UnknownFormat(PathBuf),
}

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub data: DataConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Present when the vectorized limit simulation should run.
    #[serde(default)]
    pub limit_sim: Option<LimitSimConfig>,

    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file. A relative `data.path` is resolved against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if config.data.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.data.path = dir.join(&config.data.path);
            }
        }
        Ok(config)
    }
}

/// Where the bars come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    pub path: PathBuf,

    /// Inferred from the extension when omitted.
    #[serde(default)]
    pub format: Option<DataFormat>,
}

impl DataConfig {
    pub fn resolved_format(&self) -> Result<DataFormat, ConfigError> {
        self.format
            .or_else(|| DataFormat::from_path(&self.path))
            .ok_or_else(|| ConfigError::UnknownFormat(self.path.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: ExportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("replaylab-out"),
            format: ExportFormat::Csv,
        }
    }
}
