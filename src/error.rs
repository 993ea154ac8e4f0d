//! Error types for every crate boundary: extraction, matching, and storage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while sliding the PCM window and emitting sample frames.
#[derive(Debug, Error)]
pub enum FramerError {
    #[error("fewer than {needed} initial samples available")]
    InputTooShort { needed: usize },

    #[error("PCM read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by an `Index` implementation (the storage backend).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("fingerprint file {path:?} has length {len} which is not a multiple of 16")]
    Corrupt { path: PathBuf, len: u64 },
}

/// Errors raised while matching a query fingerprint against an index.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("query too short: trimmed query has {got} frames, need at least {min}")]
    QueryTooShort { got: usize, min: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}
