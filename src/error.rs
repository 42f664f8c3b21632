#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarmonizeError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-cell failures inside the percent-change engine and the decomposition.
///
/// These never abort a group; they are collected into the run log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoftError {
    #[error("no {scenario} reference at year {year} for {metric}")]
    ReferenceNotFound {
        scenario: String,
        year: i64,
        metric: &'static str,
    },

    #[error("interpolation of {scenario} at {year} skipped: {reason}")]
    Interpolation {
        scenario: String,
        year: i64,
        reason: String,
    },
}

#[cfg(feature = "python")]
impl From<HarmonizeError> for PyErr {
    fn from(err: HarmonizeError) -> PyErr {
        match err {
            HarmonizeError::MalformedInput(_)
            | HarmonizeError::InvalidGroup(_)
            | HarmonizeError::OutOfRange(_)
            | HarmonizeError::MissingColumn(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
