//! Error types shared across the library

use thiserror::Error;

/// Errors surfaced by catalog loading and scan history persistence
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("failed to persist scan record: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
