//! Error types for the job pool.

use std::fmt;
use std::io;

/// Errors that can occur while constructing a [`JobPool`](crate::JobPool).
#[derive(Debug)]
pub enum PoolError {
    /// A worker thread failed to spawn.
    SpawnFailed(io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(err) => write!(f, "failed to spawn worker thread: {err}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SpawnFailed(err) => Some(err),
        }
    }
}

/// A specialized `Result` type for job pool construction.
pub type Result<T> = std::result::Result<T, PoolError>;
