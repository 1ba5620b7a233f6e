//! Execution layer error types.

use thiserror::Error;

use allocator_domain::{Amount, DomainError, Event, Venue};
use allocator_engine::EngineError;

/// Errors raised by ports and adapters.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Venue rejected the request (paused, missing approval, unreachable)
    #[error("Venue unavailable: {0}")]
    VenueUnavailable(String),

    /// Rate oracle could not produce a quote
    #[error("Rate oracle error: {0}")]
    Oracle(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Typed failures of the allocation operations.
///
/// Every failure leaves the ledger exactly as it was, except
/// `PartialRebalanceFailure`, which records the principal as held outside
/// any venue.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Caller is not the administrator. Always checked first.
    #[error("Access denied")]
    Unauthorized,

    /// Deposit amount was zero
    #[error("Amount must be greater than 0")]
    InvalidAmount,

    /// Principal is already under management
    #[error("Assets already deposited: {principal}")]
    AlreadyDeposited {
        /// Principal currently recorded
        principal: Amount,
    },

    /// Nothing has been deposited
    #[error("No assets to withdraw")]
    NothingToWithdraw,

    /// Nothing has been deposited
    #[error("No assets to rebalance")]
    NothingToRebalance,

    /// Principal is held outside any venue; only a rebalance retry resolves it
    #[error("Placement pending: {held} held outside any venue, awaiting placement into {intended}")]
    PlacementPending {
        /// Principal held outside any venue
        held: Amount,
        /// Venue the principal is waiting for
        intended: Venue,
    },

    /// Adapter call failed before any custody change
    #[error("Venue {venue} unavailable: {reason}")]
    VenueUnavailable {
        /// Venue that failed
        venue: Venue,
        /// Venue-side failure description
        reason: String,
    },

    /// Withdrawal succeeded but placement failed; principal held unplaced
    #[error("Partial rebalance failure: {held} held unplaced, placement into {intended} failed")]
    PartialRebalanceFailure {
        /// Principal now held outside any venue
        held: Amount,
        /// Venue placement should be retried into
        intended: Venue,
        /// Event recording the failure, for publication
        event: Event,
    },

    /// Ledger rejected the transition
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl AllocationError {
    /// Short machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AllocationError::Unauthorized => "unauthorized",
            AllocationError::InvalidAmount => "invalid_amount",
            AllocationError::AlreadyDeposited { .. } => "already_deposited",
            AllocationError::NothingToWithdraw => "nothing_to_withdraw",
            AllocationError::NothingToRebalance => "nothing_to_rebalance",
            AllocationError::PlacementPending { .. } => "placement_pending",
            AllocationError::VenueUnavailable { .. } => "venue_unavailable",
            AllocationError::PartialRebalanceFailure { .. } => "partial_rebalance_failure",
            AllocationError::Domain(_) => "domain",
        }
    }
}

/// Result type for allocation operations.
pub type AllocationResult<T> = Result<T, AllocationError>;
