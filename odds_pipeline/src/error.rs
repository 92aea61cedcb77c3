//! Error types for the odds pipeline

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the odds pipeline.
///
/// Unparseable odds cells are not errors; they become undefined probabilities.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    /// A required input was not supplied (e.g. game odds before expected points)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The referenced odds file does not exist
    #[error("Odds file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// No row with this competitor name
    #[error("Driver {0} not found in data")]
    DriverNotFound(String),

    #[error("Invalid odds table: {0}")]
    InvalidTable(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_table(msg: impl Into<String>) -> Self {
        Self::InvalidTable(msg.into())
    }

    /// True for both flavours of "not found": a missing source file or a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound(_) | Self::DriverNotFound(_))
    }
}
