use std::path::PathBuf;
use thiserror::Error;

/// Failures reading or writing knowledge records on disk.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed record in '{path}' at line {line}: {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
