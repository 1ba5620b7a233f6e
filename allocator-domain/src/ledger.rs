//! Allocation ledger: the single source of truth for custody.
//!
//! The ledger records who may mutate it, how much principal is under
//! management, and where that principal currently sits. It performs no I/O;
//! the exec layer moves funds first and then records the outcome here.
//!
//! # State Machine
//!
//! ```text
//!            deposit              rebalance (move)
//!   Empty ───────────► Placed(A) ◄───────────────► Placed(B)
//!     ▲                   │  │                        │
//!     └──── withdraw ─────┘  │ place fails after      │
//!                            │ withdrawal succeeded   │
//!                            ▼                        │
//!                      HeldUnplaced ── retry ok ──────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::value_objects::{Amount, DomainError, Identity, Venue};

// =============================================================================
// Ledger State
// =============================================================================

/// Where the principal currently is.
///
/// Principal and location live in the same variant so they can only ever be
/// updated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerState {
    /// Nothing deposited
    Empty,

    /// Principal is held by exactly one venue
    Placed {
        /// Venue holding the principal
        venue: Venue,
        /// Principal under management
        amount: Amount,
    },

    /// Principal was withdrawn from `from` but placement into `intended`
    /// failed. Funds sit in the engine's custody until a retry succeeds.
    HeldUnplaced {
        /// Principal held outside any venue
        amount: Amount,
        /// Venue the principal was withdrawn from
        from: Venue,
        /// Venue the principal is waiting to be placed into
        intended: Venue,
    },
}

impl LedgerState {
    /// Get the name of the state for display
    pub fn name(&self) -> &'static str {
        match self {
            LedgerState::Empty => "empty",
            LedgerState::Placed { venue: Venue::VenueA, .. } => "in_venue_a",
            LedgerState::Placed { venue: Venue::VenueB, .. } => "in_venue_b",
            LedgerState::HeldUnplaced { .. } => "held_unplaced",
        }
    }

    /// Principal represented by this state (zero for `Empty`)
    pub fn amount(&self) -> Amount {
        match self {
            LedgerState::Empty => Amount::ZERO,
            LedgerState::Placed { amount, .. } | LedgerState::HeldUnplaced { amount, .. } => {
                *amount
            },
        }
    }

    /// `Empty` iff the amount is zero; held funds have distinct endpoints.
    fn validate(&self) -> Result<(), DomainError> {
        match self {
            LedgerState::Empty => Ok(()),
            LedgerState::Placed { venue, amount } if amount.is_zero() => {
                Err(DomainError::InvariantViolation(format!(
                    "{} recorded with zero principal",
                    venue
                )))
            },
            LedgerState::HeldUnplaced { amount, .. } if amount.is_zero() => {
                Err(DomainError::InvariantViolation(
                    "held_unplaced recorded with zero principal".to_string(),
                ))
            },
            LedgerState::HeldUnplaced { from, intended, .. } if from == intended => {
                Err(DomainError::InvariantViolation(format!(
                    "held_unplaced source and destination are both {}",
                    from
                )))
            },
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Allocation Ledger
// =============================================================================

/// Custody record for a single depositor.
///
/// # Invariants
/// - `administrator` is fixed at construction
/// - `principal_amount() == 0` iff the state is `Empty`
/// - principal is recorded in at most one place at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLedger {
    administrator: Identity,
    state: LedgerState,
}

impl AllocationLedger {
    /// Create an empty ledger owned by `administrator`
    pub fn new(administrator: Identity) -> Self {
        Self { administrator, state: LedgerState::Empty }
    }

    /// Rebuild a ledger from persisted parts.
    ///
    /// # Errors
    /// Returns `DomainError::InvariantViolation` if the state is inconsistent
    pub fn from_parts(administrator: Identity, state: LedgerState) -> Result<Self, DomainError> {
        state.validate()?;
        Ok(Self { administrator, state })
    }

    /// The identity allowed to mutate this ledger
    pub fn administrator(&self) -> &Identity {
        &self.administrator
    }

    /// Whether `caller` is the administrator
    pub fn is_administrator(&self, caller: &Identity) -> bool {
        &self.administrator == caller
    }

    /// Current state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Principal under management (zero means nothing deposited)
    pub fn principal_amount(&self) -> Amount {
        self.state.amount()
    }

    /// Venue currently holding the principal, if any
    pub fn current_venue(&self) -> Option<Venue> {
        match self.state {
            LedgerState::Placed { venue, .. } => Some(venue),
            _ => None,
        }
    }

    /// Amount held outside any venue after a failed rebalance placement
    pub fn held_unplaced(&self) -> Option<Amount> {
        match self.state {
            LedgerState::HeldUnplaced { amount, .. } => Some(amount),
            _ => None,
        }
    }

    /// True when nothing is deposited
    pub fn is_empty(&self) -> bool {
        matches!(self.state, LedgerState::Empty)
    }

    /// Verify the custody invariants hold for the current state
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        self.state.validate()
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Record principal placed into `venue` by a deposit.
    pub fn record_deposit(&mut self, venue: Venue, amount: Amount) -> Result<(), DomainError> {
        if !self.is_empty() {
            return Err(self.invalid_transition("deposit"));
        }
        self.transition(LedgerState::Placed { venue, amount })
    }

    /// Record that all principal left the current venue.
    ///
    /// Returns the venue the principal was withdrawn from.
    pub fn record_withdrawal(&mut self) -> Result<Venue, DomainError> {
        let venue = self.current_venue().ok_or_else(|| self.invalid_transition("withdraw"))?;
        self.transition(LedgerState::Empty)?;
        Ok(venue)
    }

    /// Record a completed move of principal into `to`.
    ///
    /// `amount` is the settled amount accepted by the destination venue.
    pub fn record_rebalance(&mut self, to: Venue, amount: Amount) -> Result<Venue, DomainError> {
        let from = match self.state {
            LedgerState::Placed { venue, .. } if venue != to => venue,
            _ => return Err(self.invalid_transition("rebalance")),
        };
        self.transition(LedgerState::Placed { venue: to, amount })?;
        Ok(from)
    }

    /// Record that `amount` was withdrawn from the current venue but could
    /// not be placed into `intended`.
    pub fn record_held_unplaced(
        &mut self,
        intended: Venue,
        amount: Amount,
    ) -> Result<Venue, DomainError> {
        let from = match self.state {
            LedgerState::Placed { venue, .. } if venue != intended => venue,
            _ => return Err(self.invalid_transition("hold unplaced principal")),
        };
        self.transition(LedgerState::HeldUnplaced { amount, from, intended })?;
        Ok(from)
    }

    /// Record that held principal was finally placed into its intended venue.
    ///
    /// Returns `(from, intended)` of the rebalance being completed.
    pub fn record_placement_recovered(
        &mut self,
        amount: Amount,
    ) -> Result<(Venue, Venue), DomainError> {
        let (from, intended) = match self.state {
            LedgerState::HeldUnplaced { from, intended, .. } => (from, intended),
            _ => return Err(self.invalid_transition("recover placement")),
        };
        self.transition(LedgerState::Placed { venue: intended, amount })?;
        Ok((from, intended))
    }

    fn transition(&mut self, next: LedgerState) -> Result<(), DomainError> {
        next.validate()?;
        self.state = next;
        Ok(())
    }

    fn invalid_transition(&self, operation: &str) -> DomainError {
        DomainError::InvalidStateTransition(format!(
            "cannot {} from state {}",
            operation,
            self.state.name()
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn admin() -> Identity {
        Identity::new("admin").unwrap()
    }

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn placed(venue: Venue, value: rust_decimal::Decimal) -> AllocationLedger {
        let mut ledger = AllocationLedger::new(admin());
        ledger.record_deposit(venue, amount(value)).unwrap();
        ledger
    }

    #[test]
    fn test_new_ledger_is_empty() {
        let ledger = AllocationLedger::new(admin());

        assert!(ledger.is_empty());
        assert!(ledger.principal_amount().is_zero());
        assert_eq!(ledger.current_venue(), None);
        assert_eq!(ledger.state().name(), "empty");
        assert!(ledger.check_invariants().is_ok());
    }

    #[test]
    fn test_administrator_check() {
        let ledger = AllocationLedger::new(admin());

        assert!(ledger.is_administrator(&admin()));
        assert!(!ledger.is_administrator(&Identity::new("mallory").unwrap()));
    }

    #[test]
    fn test_deposit_sets_amount_and_venue_together() {
        let ledger = placed(Venue::VenueA, dec!(100));

        assert_eq!(ledger.principal_amount(), amount(dec!(100)));
        assert_eq!(ledger.current_venue(), Some(Venue::VenueA));
        assert_eq!(ledger.state().name(), "in_venue_a");
    }

    #[test]
    fn test_zero_deposit_rejected_by_invariant() {
        let mut ledger = AllocationLedger::new(admin());

        let result = ledger.record_deposit(Venue::VenueA, Amount::ZERO);

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_double_deposit_rejected() {
        let mut ledger = placed(Venue::VenueA, dec!(100));

        let result = ledger.record_deposit(Venue::VenueB, amount(dec!(5)));

        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(ledger.current_venue(), Some(Venue::VenueA));
    }

    #[test]
    fn test_withdrawal_empties_ledger() {
        let mut ledger = placed(Venue::VenueB, dec!(100));

        let venue = ledger.record_withdrawal().unwrap();

        assert_eq!(venue, Venue::VenueB);
        assert!(ledger.is_empty());
        assert!(ledger.principal_amount().is_zero());
    }

    #[test]
    fn test_withdrawal_from_empty_rejected() {
        let mut ledger = AllocationLedger::new(admin());
        assert!(ledger.record_withdrawal().is_err());
    }

    #[test]
    fn test_rebalance_moves_principal() {
        let mut ledger = placed(Venue::VenueA, dec!(100));

        let from = ledger.record_rebalance(Venue::VenueB, amount(dec!(99.5))).unwrap();

        assert_eq!(from, Venue::VenueA);
        assert_eq!(ledger.current_venue(), Some(Venue::VenueB));
        assert_eq!(ledger.principal_amount(), amount(dec!(99.5)));
    }

    #[test]
    fn test_rebalance_to_same_venue_rejected() {
        let mut ledger = placed(Venue::VenueA, dec!(100));
        assert!(ledger.record_rebalance(Venue::VenueA, amount(dec!(100))).is_err());
    }

    #[test]
    fn test_held_unplaced_and_recovery() {
        let mut ledger = placed(Venue::VenueA, dec!(100));

        let from = ledger.record_held_unplaced(Venue::VenueB, amount(dec!(100))).unwrap();
        assert_eq!(from, Venue::VenueA);
        assert_eq!(ledger.current_venue(), None);
        assert_eq!(ledger.held_unplaced(), Some(amount(dec!(100))));
        assert_eq!(ledger.principal_amount(), amount(dec!(100)));
        assert!(ledger.check_invariants().is_ok());

        let (from, to) = ledger.record_placement_recovered(amount(dec!(100))).unwrap();
        assert_eq!((from, to), (Venue::VenueA, Venue::VenueB));
        assert_eq!(ledger.current_venue(), Some(Venue::VenueB));
        assert_eq!(ledger.held_unplaced(), None);
    }

    #[test]
    fn test_held_unplaced_blocks_other_transitions() {
        let mut ledger = placed(Venue::VenueA, dec!(100));
        ledger.record_held_unplaced(Venue::VenueB, amount(dec!(100))).unwrap();

        assert!(ledger.record_withdrawal().is_err());
        assert!(ledger.record_deposit(Venue::VenueA, amount(dec!(1))).is_err());
        assert!(ledger.record_rebalance(Venue::VenueA, amount(dec!(1))).is_err());
        assert_eq!(ledger.held_unplaced(), Some(amount(dec!(100))));
    }

    #[test]
    fn test_from_parts_validates() {
        let bad = LedgerState::Placed { venue: Venue::VenueA, amount: Amount::ZERO };
        assert!(AllocationLedger::from_parts(admin(), bad).is_err());

        let good = LedgerState::Placed { venue: Venue::VenueB, amount: amount(dec!(7)) };
        let ledger = AllocationLedger::from_parts(admin(), good).unwrap();
        assert_eq!(ledger.current_venue(), Some(Venue::VenueB));
    }

    #[test]
    fn test_ledger_serialization() {
        let ledger = placed(Venue::VenueA, dec!(100));

        let json = serde_json::to_string(&ledger).unwrap();
        let parsed: AllocationLedger = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, ledger);
        assert!(json.contains("\"state\":\"placed\""));
    }

    #[test]
    fn test_negative_snapshot_rejected() {
        let json = concat!(
            r#"{"administrator":"admin","#,
            r#""state":{"state":"placed","venue":"venue_a","amount":"-5"}}"#
        );

        assert!(serde_json::from_str::<AllocationLedger>(json).is_err());
    }
}
