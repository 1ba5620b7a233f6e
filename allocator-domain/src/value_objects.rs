//! Value Objects for the Allocator Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation and ledger transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Amount must be non-negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Identity must be non-empty
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Venue name could not be parsed
    #[error("Invalid venue: {0}")]
    InvalidVenue(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Ledger invariant does not hold
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

// =============================================================================
// Amount
// =============================================================================

/// Amount of the base asset (wrapped ether) under management.
///
/// # Invariants
/// - Must be >= 0
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Zero amount ("nothing deposited")
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Create a new Amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value < 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value.is_zero() {
            return Ok(Self::ZERO);
        }
        if value.is_sign_negative() {
            return Err(DomainError::InvalidAmount(format!(
                "Amount must not be negative: {}",
                value
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// True when nothing is represented
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Sum of two amounts, `None` on overflow
    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(|sum| Amount(sum.normalize()))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// Comparable yield figure quoted for a venue.
///
/// Rates are transient inputs: they are compared, logged, and discarded.
/// Any sign is accepted, only the ordering matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    /// Wrap a decimal yield figure
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Rate {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Identity of a caller issuing commands (e.g., an account address).
///
/// # Invariants
/// - Non-empty after trimming surrounding whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Create an Identity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidIdentity` if the value is blank
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidIdentity("Identity must be non-empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Venue
// =============================================================================

/// One of the two yield-bearing money-market venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// Venue A (the deposit tie-break default)
    VenueA,
    /// Venue B
    VenueB,
}

impl Venue {
    /// Both venues, in tie-break order
    pub const ALL: [Venue; 2] = [Venue::VenueA, Venue::VenueB];

    /// The venue that is not `self`
    pub fn other(&self) -> Venue {
        match self {
            Venue::VenueA => Venue::VenueB,
            Venue::VenueB => Venue::VenueA,
        }
    }

    /// Stable lowercase name used in logs and the API
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::VenueA => "venue_a",
            Venue::VenueB => "venue_b",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Venue {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "venue_a" | "a" => Ok(Venue::VenueA),
            "venue_b" | "b" => Ok(Venue::VenueB),
            other => Err(DomainError::InvalidVenue(format!(
                "Unknown venue: {}. Expected: venue_a, venue_b",
                other
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
