//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (venues, rate oracle).
//! Adapters implement these ports for specific venues (cToken market,
//! lending pool, stub, etc.), including any prior asset approval they need.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use allocator_domain::{Amount, Rate, Venue};

use crate::error::ExecError;

// =============================================================================
// Venue Port
// =============================================================================

/// Port for a yield-bearing venue holding the depositor's principal.
///
/// Implementations:
/// - `StubVenue` - For testing (in-memory balance, injectable failures)
#[async_trait]
pub trait VenuePort: Send + Sync {
    /// Which venue this adapter talks to.
    fn venue(&self) -> Venue;

    /// Move `amount` of the base asset into the venue.
    ///
    /// # Returns
    ///
    /// The amount the venue actually accepted. Fails with
    /// `ExecError::VenueUnavailable` if the venue rejects the transfer.
    async fn place_principal(&self, amount: Amount) -> Result<Amount, ExecError>;

    /// Withdraw everything held for the depositor.
    ///
    /// # Returns
    ///
    /// The amount returned; zero if nothing was held (not an error).
    async fn withdraw_all_principal(&self) -> Result<Amount, ExecError>;

    /// Check if the venue is reachable and accepting requests.
    async fn health_check(&self) -> Result<(), ExecError>;
}

// =============================================================================
// Rate Oracle
// =============================================================================

/// Port for the current comparable yield of each venue.
///
/// Quotes are consumed by a single command and never stored by the engine.
#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Current rates as of call time.
    async fn current_rates(&self) -> Result<RateQuote, ExecError>;
}

/// Rates for both venues observed at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    /// Venue A rate
    pub venue_a: Rate,
    /// Venue B rate
    pub venue_b: Rate,
    /// When the quote was taken
    pub observed_at: DateTime<Utc>,
}

impl RateQuote {
    /// Create a quote observed now.
    pub fn new(venue_a: Rate, venue_b: Rate) -> Self {
        Self { venue_a, venue_b, observed_at: Utc::now() }
    }

    /// Rate quoted for `venue`.
    pub fn rate_for(&self, venue: Venue) -> Rate {
        match venue {
            Venue::VenueA => self.venue_a,
            Venue::VenueB => self.venue_b,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_quote_lookup() {
        let quote = RateQuote::new(Rate::new(dec!(3)), Rate::new(dec!(2)));

        assert_eq!(quote.rate_for(Venue::VenueA), Rate::new(dec!(3)));
        assert_eq!(quote.rate_for(Venue::VenueB), Rate::new(dec!(2)));
    }

    #[test]
    fn test_rate_quote_serialization() {
        let quote = RateQuote::new(Rate::new(dec!(3.1)), Rate::new(dec!(2.7)));

        let json = serde_json::to_string(&quote).unwrap();
        let parsed: RateQuote = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, quote);
    }
}
