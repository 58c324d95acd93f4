//! Error types for the Bayes-net engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Bayes-net engine.
#[derive(Error, Debug)]
pub enum Error {
    // Model construction errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid probability {value} for node {node}: must be in [0, 1] or NaN")]
    InvalidProbability { node: String, value: f64 },

    #[error("duplicate category '{category}' for variable {variable}")]
    DuplicateCategory { variable: String, category: String },

    // Lookup errors (20-29)
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("variable {0} not present in data set")]
    UnknownVariable(String),

    // Inference errors (30-39)
    #[error("evidence is incompatible with model: {0}")]
    IncompatibleEvidence(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidProbability { .. } => 11,
            Error::DuplicateCategory { .. } => 12,
            Error::UnknownNode(_) => 20,
            Error::UnknownVariable(_) => 21,
            Error::IncompatibleEvidence(_) => 30,
            Error::UnsupportedOperation(_) => 31,
            Error::NumericalInstability(_) => 32,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }
}
