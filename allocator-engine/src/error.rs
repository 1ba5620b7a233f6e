//! Engine error types.

use thiserror::Error;

/// Errors raised while deriving decision inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A venue-native rate figure was out of range
    #[error("Invalid rate input: {0}")]
    InvalidRateInput(String),

    /// Decimal arithmetic overflowed
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
