//! Error types for watching and persistence.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Invalid path. Please enter an existing directory: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("File watcher failed: {0}")]
    NotifierFailure(String),
    #[error("Session is already watching")]
    AlreadyStarted,
    #[error("Session has been stopped; start a new session to watch again")]
    SessionStopped,
}

/// A storage operation the engine rejected.
///
/// `committed` counts rows that are durably written despite the failure.
/// Batch writes are transactional, so it is zero for a failed `append_all`.
#[derive(Debug, Error)]
#[error("Database {operation} failed ({committed} rows committed): {source}")]
pub struct PersistenceError {
    pub operation: &'static str,
    pub committed: usize,
    #[source]
    pub source: rusqlite::Error,
}

impl PersistenceError {
    pub fn new(operation: &'static str, source: rusqlite::Error) -> Self {
        Self {
            operation,
            committed: 0,
            source,
        }
    }
}

pub type WatchResult<T> = std::result::Result<T, WatchError>;
pub type StoreResult<T> = std::result::Result<T, PersistenceError>;
