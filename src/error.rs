//! Typed failures for loading and scoring.

use thiserror::Error;

/// Fatal problems with the input source. Nothing is processed after one of these.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Unsupported input format: {path} (expected .xlsx, .xlsm, .xls, .ods or .csv)")]
    UnsupportedFormat { path: String },

    #[error("Sheet '{sheet}' not found in {path}")]
    SheetNotFound { path: String, sheet: String },

    #[error("Required column '{column}' missing from input")]
    MissingColumn { column: String },

    #[error("Row {row}: cannot parse {column} value '{value}'")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Input contains no data rows")]
    Empty,
}

/// Statistical edge cases surfaced during quintile scoring.
#[derive(Error, Debug, PartialEq)]
pub enum ScoringError {
    #[error("Cannot score an empty customer population")]
    EmptyPopulation,

    #[error("Bin edges for {metric} must be unique, got {edges:?}")]
    DuplicateBinEdges { metric: String, edges: Vec<f64> },

    #[error("RF score {recency}{frequency} matches no segment rule")]
    UnmappedScore { recency: u8, frequency: u8 },
}
