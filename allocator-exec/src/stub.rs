//! Stub implementations for testing.
//!
//! These implementations simulate venue and oracle behavior
//! without touching any chain.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use allocator_domain::{Amount, Rate, Venue};
use allocator_engine::{aave_supply_apy, compound_supply_apy, BLOCKS_PER_DAY, DAYS_PER_YEAR};
use rust_decimal::Decimal;

use crate::error::{ExecError, ExecResult};
use crate::ports::{RateOracle, RateQuote, VenuePort};

// =============================================================================
// Stub Venue
// =============================================================================

#[derive(Debug, Default)]
struct StubVenueState {
    held: Amount,
    placements: Vec<Amount>,
    withdrawals: Vec<Amount>,
    fail_next_place: bool,
    fail_next_withdraw: bool,
    paused: bool,
    acceptance_cap: Option<Amount>,
}

/// Stub venue for testing.
///
/// Holds an in-memory balance and records every accepted call.
pub struct StubVenue {
    venue: Venue,
    state: Mutex<StubVenueState>,
}

impl StubVenue {
    /// Create a new empty stub venue.
    pub fn new(venue: Venue) -> Self {
        Self { venue, state: Mutex::new(StubVenueState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, StubVenueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Configure the next placement to fail.
    pub fn set_fail_next_place(&self, fail: bool) {
        self.state().fail_next_place = fail;
    }

    /// Configure the next withdrawal to fail.
    pub fn set_fail_next_withdraw(&self, fail: bool) {
        self.state().fail_next_withdraw = fail;
    }

    /// Pause the venue: every call fails until unpaused.
    pub fn set_paused(&self, paused: bool) {
        self.state().paused = paused;
    }

    /// Accept at most `cap` per placement (simulates partial acceptance).
    pub fn set_acceptance_cap(&self, cap: Option<Amount>) {
        self.state().acceptance_cap = cap;
    }

    /// Principal currently held by this venue.
    pub fn held(&self) -> Amount {
        self.state().held
    }

    /// Amounts accepted by successful placements, in order.
    pub fn placements(&self) -> Vec<Amount> {
        self.state().placements.clone()
    }

    /// Amounts returned by successful withdrawals, in order.
    pub fn withdrawals(&self) -> Vec<Amount> {
        self.state().withdrawals.clone()
    }

    /// Number of successful calls that moved (or attempted to move) funds.
    pub fn call_count(&self) -> usize {
        let state = self.state();
        state.placements.len() + state.withdrawals.len()
    }
}

#[async_trait]
impl VenuePort for StubVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_principal(&self, amount: Amount) -> Result<Amount, ExecError> {
        let mut state = self.state();

        if state.paused {
            return Err(ExecError::VenueUnavailable(format!("{} is paused", self.venue)));
        }
        if std::mem::take(&mut state.fail_next_place) {
            return Err(ExecError::VenueUnavailable("Simulated placement failure".to_string()));
        }

        let accepted = match state.acceptance_cap {
            Some(cap) => amount.min(cap),
            None => amount,
        };
        state.held = state.held.checked_add(accepted).ok_or_else(|| {
            ExecError::VenueUnavailable(format!("{} balance overflow", self.venue))
        })?;
        state.placements.push(accepted);

        tracing::debug!(venue = %self.venue, %amount, %accepted, "Stub: principal placed");
        Ok(accepted)
    }

    async fn withdraw_all_principal(&self) -> Result<Amount, ExecError> {
        let mut state = self.state();

        if state.paused {
            return Err(ExecError::VenueUnavailable(format!("{} is paused", self.venue)));
        }
        if std::mem::take(&mut state.fail_next_withdraw) {
            return Err(ExecError::VenueUnavailable("Simulated withdrawal failure".to_string()));
        }

        let withdrawn = std::mem::take(&mut state.held);
        state.withdrawals.push(withdrawn);

        tracing::debug!(venue = %self.venue, %withdrawn, "Stub: principal withdrawn");
        Ok(withdrawn)
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        if self.state().paused {
            return Err(ExecError::VenueUnavailable(format!("{} is paused", self.venue)));
        }
        Ok(())
    }
}

// =============================================================================
// Stub Rate Oracle
// =============================================================================

/// Stub rate oracle for testing.
///
/// Returns whatever rates were last injected.
pub struct StubRateOracle {
    quote: Mutex<(Rate, Rate)>,
    fail_next: Mutex<bool>,
}

impl StubRateOracle {
    /// Create a stub oracle quoting the given rates.
    pub fn new(venue_a: Rate, venue_b: Rate) -> Self {
        Self { quote: Mutex::new((venue_a, venue_b)), fail_next: Mutex::new(false) }
    }

    /// Create a stub oracle from venue-native figures.
    ///
    /// Venue A quotes a per-block supply rate scaled by 1e18, Venue B an
    /// annual liquidity rate in ray. Both are converted to APY percent.
    pub fn from_native(
        supply_rate_per_block: Decimal,
        liquidity_rate_ray: Decimal,
    ) -> ExecResult<Self> {
        let venue_a = compound_supply_apy(supply_rate_per_block, BLOCKS_PER_DAY, DAYS_PER_YEAR)?;
        let venue_b = aave_supply_apy(liquidity_rate_ray)?;
        Ok(Self::new(venue_a, venue_b))
    }

    /// Replace the quoted rates.
    pub fn set_rates(&self, venue_a: Rate, venue_b: Rate) {
        *self.quote.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = (venue_a, venue_b);
    }

    /// Configure the next quote to fail.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = fail;
    }
}

#[async_trait]
impl RateOracle for StubRateOracle {
    async fn current_rates(&self) -> Result<RateQuote, ExecError> {
        let should_fail = {
            let mut fail_next = self.fail_next.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *fail_next)
        };
        if should_fail {
            return Err(ExecError::Oracle("Simulated oracle failure".to_string()));
        }

        let (venue_a, venue_b) = *self.quote.lock().unwrap_or_else(|p| p.into_inner());
        Ok(RateQuote::new(venue_a, venue_b))
    }
}

// =============================================================================
// Tests
// =============================================================================
