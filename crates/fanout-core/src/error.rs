//! Error types for fanout-core.

use thiserror::Error;

/// Result type for fanout-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fanout-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Strategy token not in the known set.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Worker count must be at least 1.
    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(usize),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IPC communication error with a worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Execution error outside any single job (pool setup, supervisor failure).
    #[error("execution error: {0}")]
    Execution(String),

    /// Capability not available on this runtime.
    #[error("unsupported on this runtime: {0}")]
    Unsupported(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Execution was aborted by user request.
    #[error("execution aborted")]
    Aborted,
}
