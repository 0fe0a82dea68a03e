//! Error types shared by the block store, metadata store, and coherency arbiter.

use thiserror::Error;

/// Errors surfaced by the cache engine. None are fatal to the process except
/// `Store` failures during construction, which the caller should treat as
/// init failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found")]
    NotFound,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("invalid input: {0}")]
    Input(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
