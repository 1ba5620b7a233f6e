//! Daemon error types.

use allocator_domain::DomainError;
use allocator_engine::EngineError;
use allocator_exec::{AllocationError, ExecError};
use allocator_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Execution error (adapters, oracle)
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Allocation command rejected or failed
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
