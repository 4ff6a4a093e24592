use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MfaError {
    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Dimension mismatch: expected {expected}x{expected}, found {found_rows}x{found_cols}")]
    DimensionMismatch {
        expected: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("Singular system: {0}")]
    SingularSystem(String),

    #[error("Closed re-export loop between areas: {}", areas.join(", "))]
    ClosedReexportLoop { areas: Vec<String> },

    #[error("No supply chain from {production_of} to {consumption_of}")]
    InvalidChain {
        production_of: String,
        consumption_of: String,
    },

    #[error("Cached matrix already exists: {}", .0.display())]
    CacheConflict(PathBuf),

    #[error("Unknown mineral: {0}")]
    UnknownMineral(String),
}

#[cfg(feature = "python")]
impl From<MfaError> for pyo3::PyErr {
    fn from(err: MfaError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
