//! AllocationEngine: orchestrates ledger transitions and venue calls.
//!
//! The AllocationEngine is the bridge between the pure ledger/decision
//! layers and the impure venues (I/O). Funds are moved first; the ledger is
//! only updated once the venue confirmed the move.
//!
//! # Flow
//!
//! ```text
//! Command → Authorize → Validate → Decide → Venue(s) → Ledger → Event
//! ```
//!
//! Entry is serialized through a mutex held for the whole operation, so
//! the ledger is never observed mid-mutation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use allocator_domain::{AllocationLedger, Amount, Event, Identity, LedgerState, Rate, Venue};
use allocator_engine::{decide_rebalance, select_deposit_venue, RebalanceDecision};

use crate::error::{AllocationError, AllocationResult, ExecError, ExecResult};
use crate::ports::VenuePort;

// =============================================================================
// Operation Outcome
// =============================================================================

/// Result of a successful allocation operation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    /// Event emitted by the operation (`None` for a rebalance no-op)
    pub event: Option<Event>,
    /// Ledger snapshot after the operation
    pub ledger: AllocationLedger,
}

// =============================================================================
// Allocation Engine
// =============================================================================

/// Custodial allocation state machine for a single depositor.
pub struct AllocationEngine {
    /// Copy of the ledger's administrator, checked before taking the lock
    administrator: Identity,
    /// Venue A adapter
    venue_a: Arc<dyn VenuePort>,
    /// Venue B adapter
    venue_b: Arc<dyn VenuePort>,
    /// Ledger, owned exclusively by this engine
    ledger: Mutex<AllocationLedger>,
}

impl AllocationEngine {
    /// Create a new engine with an empty ledger.
    ///
    /// Fails if the adapters are wired to the wrong venues.
    pub fn new(
        administrator: Identity,
        venue_a: Arc<dyn VenuePort>,
        venue_b: Arc<dyn VenuePort>,
    ) -> ExecResult<Self> {
        for (expected, port) in [(Venue::VenueA, &venue_a), (Venue::VenueB, &venue_b)] {
            if port.venue() != expected {
                return Err(ExecError::Config(format!(
                    "adapter for {} reports {}",
                    expected,
                    port.venue()
                )));
            }
        }

        Ok(Self {
            ledger: Mutex::new(AllocationLedger::new(administrator.clone())),
            administrator,
            venue_a,
            venue_b,
        })
    }

    /// Replace the ledger with a persisted snapshot.
    ///
    /// The snapshot must belong to the same administrator and satisfy the
    /// custody invariants.
    pub async fn restore(&self, snapshot: AllocationLedger) -> ExecResult<()> {
        if snapshot.administrator() != &self.administrator {
            return Err(ExecError::Config(format!(
                "snapshot administrator {} does not match {}",
                snapshot.administrator(),
                self.administrator
            )));
        }
        snapshot.check_invariants()?;

        let mut ledger = self.ledger.lock().await;
        info!(
            state = snapshot.state().name(),
            principal = %snapshot.principal_amount(),
            "Ledger restored"
        );
        *ledger = snapshot;
        Ok(())
    }

    /// Snapshot of the current ledger.
    pub async fn ledger(&self) -> AllocationLedger {
        self.ledger.lock().await.clone()
    }

    /// The configured administrator.
    pub fn administrator(&self) -> &Identity {
        &self.administrator
    }

    /// Health of both venue adapters.
    pub async fn venue_health(&self) -> Vec<(Venue, ExecResult<()>)> {
        let mut results = Vec::with_capacity(2);
        for venue in Venue::ALL {
            results.push((venue, self.port(venue).health_check().await));
        }
        results
    }

    // -------------------------------------------------------------------------
    // Deposit
    // -------------------------------------------------------------------------

    /// Place `amount` into the venue with the higher rate (tie → Venue A).
    pub async fn deposit(
        &self,
        caller: &Identity,
        amount: Amount,
        rate_a: Rate,
        rate_b: Rate,
    ) -> AllocationResult<OperationOutcome> {
        self.authorize(caller, "deposit")?;

        if amount.is_zero() {
            warn!(%caller, "Deposit rejected: zero amount");
            return Err(AllocationError::InvalidAmount);
        }

        let mut ledger = self.ledger.lock().await;
        if !ledger.is_empty() {
            warn!(
                state = ledger.state().name(),
                principal = %ledger.principal_amount(),
                "Deposit rejected: assets already deposited"
            );
            return Err(AllocationError::AlreadyDeposited { principal: ledger.principal_amount() });
        }

        let target = select_deposit_venue(rate_a, rate_b);
        let operation_id = Uuid::now_v7();

        info!(%operation_id, venue = %target, %amount, %rate_a, %rate_b, "Placing deposit");

        let accepted = self
            .port(target)
            .place_principal(amount)
            .await
            .map_err(|e| Self::unavailable(operation_id, target, e.to_string()))?;

        if accepted != amount {
            let reason = format!("partial acceptance: requested {}, accepted {}", amount, accepted);
            return Err(Self::unavailable(operation_id, target, reason));
        }

        ledger.record_deposit(target, amount)?;

        info!(%operation_id, venue = %target, %amount, "Deposit placed");

        Ok(OperationOutcome {
            event: Some(Event::Deposited {
                operation_id,
                venue: target,
                amount,
                timestamp: Utc::now(),
            }),
            ledger: ledger.clone(),
        })
    }

    // -------------------------------------------------------------------------
    // Withdraw
    // -------------------------------------------------------------------------

    /// Withdraw all principal from its current venue.
    pub async fn withdraw(&self, caller: &Identity) -> AllocationResult<OperationOutcome> {
        self.authorize(caller, "withdraw")?;

        let mut ledger = self.ledger.lock().await;
        let (venue, principal) = match ledger.state().clone() {
            LedgerState::Empty => {
                warn!("Withdraw rejected: no assets to withdraw");
                return Err(AllocationError::NothingToWithdraw);
            },
            LedgerState::HeldUnplaced { amount, intended, .. } => {
                warn!(held = %amount, %intended, "Withdraw rejected: placement pending");
                return Err(AllocationError::PlacementPending { held: amount, intended });
            },
            LedgerState::Placed { venue, amount } => (venue, amount),
        };

        let operation_id = Uuid::now_v7();
        info!(%operation_id, %venue, %principal, "Withdrawing principal");

        let withdrawn = self
            .port(venue)
            .withdraw_all_principal()
            .await
            .map_err(|e| Self::unavailable(operation_id, venue, e.to_string()))?;

        if withdrawn != principal {
            warn!(
                %operation_id,
                %venue,
                recorded = %principal,
                %withdrawn,
                "Venue returned a different amount than recorded"
            );
        }

        ledger.record_withdrawal()?;

        info!(%operation_id, %venue, amount = %withdrawn, "Principal withdrawn");

        Ok(OperationOutcome {
            event: Some(Event::Withdrawn {
                operation_id,
                venue,
                amount: withdrawn,
                timestamp: Utc::now(),
            }),
            ledger: ledger.clone(),
        })
    }

    // -------------------------------------------------------------------------
    // Rebalance
    // -------------------------------------------------------------------------

    /// Move principal to the venue with the strictly higher rate.
    ///
    /// On an exact tie nothing moves. When principal is held unplaced after
    /// an earlier failure, this retries placement into the intended venue.
    pub async fn rebalance(
        &self,
        caller: &Identity,
        rate_a: Rate,
        rate_b: Rate,
    ) -> AllocationResult<OperationOutcome> {
        self.authorize(caller, "rebalance")?;

        let mut ledger = self.ledger.lock().await;
        let operation_id = Uuid::now_v7();

        match ledger.state().clone() {
            LedgerState::Empty => {
                warn!("Rebalance rejected: no assets to rebalance");
                Err(AllocationError::NothingToRebalance)
            },

            LedgerState::HeldUnplaced { amount, from, intended } => {
                info!(
                    %operation_id,
                    held = %amount,
                    %from,
                    %intended,
                    %rate_a,
                    %rate_b,
                    "Retrying placement of held principal"
                );
                self.retry_placement(&mut ledger, operation_id, amount).await
            },

            LedgerState::Placed { venue, amount } => {
                match decide_rebalance(venue, rate_a, rate_b) {
                    RebalanceDecision::Stay(_) => {
                        debug!(%venue, %rate_a, %rate_b, "Rebalance not needed");
                        Ok(OperationOutcome { event: None, ledger: ledger.clone() })
                    },
                    RebalanceDecision::Move { from, to } => {
                        info!(%operation_id, %from, %to, %amount, %rate_a, %rate_b, "Rebalancing");
                        self.move_principal(&mut ledger, operation_id, from, to).await
                    },
                }
            },
        }
    }

    /// Withdraw from `from`, then place into `to`.
    async fn move_principal(
        &self,
        ledger: &mut AllocationLedger,
        operation_id: Uuid,
        from: Venue,
        to: Venue,
    ) -> AllocationResult<OperationOutcome> {
        let withdrawn = self
            .port(from)
            .withdraw_all_principal()
            .await
            .map_err(|e| Self::unavailable(operation_id, from, e.to_string()))?;

        if withdrawn.is_zero() {
            return Err(Self::unavailable(
                operation_id,
                from,
                "source venue returned no principal".to_string(),
            ));
        }

        match self.place_settled(to, withdrawn).await {
            Ok(accepted) => {
                if accepted != withdrawn {
                    warn!(%operation_id, %to, %withdrawn, %accepted, "Settled amount differs");
                }
                ledger.record_rebalance(to, accepted)?;

                info!(%operation_id, %from, %to, amount = %accepted, "Rebalance complete");

                Ok(OperationOutcome {
                    event: Some(Event::Rebalanced {
                        operation_id,
                        from,
                        to,
                        amount: accepted,
                        timestamp: Utc::now(),
                    }),
                    ledger: ledger.clone(),
                })
            },
            Err(reason) => {
                ledger.record_held_unplaced(to, withdrawn)?;
                Err(Self::partial_failure(operation_id, from, to, withdrawn, reason))
            },
        }
    }

    /// Place held principal into the venue recorded at failure time.
    async fn retry_placement(
        &self,
        ledger: &mut AllocationLedger,
        operation_id: Uuid,
        held: Amount,
    ) -> AllocationResult<OperationOutcome> {
        let LedgerState::HeldUnplaced { from, intended, .. } = *ledger.state() else {
            return Err(AllocationError::NothingToRebalance);
        };

        match self.place_settled(intended, held).await {
            Ok(accepted) => {
                ledger.record_placement_recovered(accepted)?;

                info!(
                    %operation_id,
                    %from,
                    to = %intended,
                    amount = %accepted,
                    "Held principal placed"
                );

                Ok(OperationOutcome {
                    event: Some(Event::Rebalanced {
                        operation_id,
                        from,
                        to: intended,
                        amount: accepted,
                        timestamp: Utc::now(),
                    }),
                    ledger: ledger.clone(),
                })
            },
            Err(reason) => Err(Self::partial_failure(operation_id, from, intended, held, reason)),
        }
    }

    /// Place `amount`; a rejected call or nothing accepted is a failure.
    async fn place_settled(&self, venue: Venue, amount: Amount) -> Result<Amount, String> {
        match self.port(venue).place_principal(amount).await {
            Ok(accepted) if accepted.is_zero() => Err(format!("{} accepted nothing", venue)),
            Ok(accepted) => Ok(accepted),
            Err(e) => Err(e.to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn authorize(&self, caller: &Identity, operation: &str) -> AllocationResult<()> {
        if caller != &self.administrator {
            warn!(%caller, operation, "Access denied");
            return Err(AllocationError::Unauthorized);
        }
        Ok(())
    }

    fn port(&self, venue: Venue) -> &dyn VenuePort {
        match venue {
            Venue::VenueA => self.venue_a.as_ref(),
            Venue::VenueB => self.venue_b.as_ref(),
        }
    }

    fn unavailable(operation_id: Uuid, venue: Venue, reason: String) -> AllocationError {
        error!(%operation_id, %venue, %reason, "Venue call failed, ledger unchanged");
        AllocationError::VenueUnavailable { venue, reason }
    }

    fn partial_failure(
        operation_id: Uuid,
        from: Venue,
        intended: Venue,
        held: Amount,
        reason: String,
    ) -> AllocationError {
        error!(
            %operation_id,
            %from,
            %intended,
            %held,
            %reason,
            "Placement failed after withdrawal, principal held unplaced"
        );

        let event = Event::PartialRebalanceFailure {
            operation_id,
            from,
            intended,
            held_amount: held,
            reason,
            timestamp: Utc::now(),
        };

        AllocationError::PartialRebalanceFailure { held, intended, event }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubVenue;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: AllocationEngine,
        venue_a: Arc<StubVenue>,
        venue_b: Arc<StubVenue>,
    }

    fn admin() -> Identity {
        Identity::new("admin").unwrap()
    }

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn rate(value: rust_decimal::Decimal) -> Rate {
        Rate::new(value)
    }

    impl Fixture {
        async fn deposit(
            &self,
            value: rust_decimal::Decimal,
            rate_a: rust_decimal::Decimal,
            rate_b: rust_decimal::Decimal,
        ) -> AllocationResult<OperationOutcome> {
            self.engine.deposit(&admin(), amount(value), rate(rate_a), rate(rate_b)).await
        }
    }

    fn create_fixture() -> Fixture {
        let venue_a = Arc::new(StubVenue::new(Venue::VenueA));
        let venue_b = Arc::new(StubVenue::new(Venue::VenueB));
        let engine = AllocationEngine::new(admin(), venue_a.clone(), venue_b.clone()).unwrap();
        Fixture { engine, venue_a, venue_b }
    }

    #[test]
    fn test_new_rejects_miswired_venues() {
        let venue_a = Arc::new(StubVenue::new(Venue::VenueA));
        let result = AllocationEngine::new(admin(), venue_a.clone(), venue_a);
        assert!(matches!(result, Err(ExecError::Config(_))));
    }

    #[tokio::test]
    async fn test_deposit_places_into_better_venue() {
        let f = create_fixture();

        let outcome = f.deposit(dec!(100), dec!(2), dec!(3)).await.unwrap();

        assert_eq!(outcome.ledger.current_venue(), Some(Venue::VenueB));
        assert_eq!(f.venue_b.held(), amount(dec!(100)));
        assert_eq!(f.venue_a.call_count(), 0);
        assert!(matches!(outcome.event, Some(Event::Deposited { venue: Venue::VenueB, .. })));
    }

    #[tokio::test]
    async fn test_deposit_partial_acceptance_rejected() {
        let f = create_fixture();
        f.venue_a.set_acceptance_cap(Some(amount(dec!(60))));

        let result = f.deposit(dec!(100), dec!(3), dec!(2)).await;

        assert!(matches!(
            result,
            Err(AllocationError::VenueUnavailable { venue: Venue::VenueA, .. })
        ));
        assert!(f.engine.ledger().await.is_empty());
    }

    #[tokio::test]
    async fn test_deposit_adapter_failure_leaves_ledger_unchanged() {
        let f = create_fixture();
        f.venue_a.set_fail_next_place(true);

        let result = f.deposit(dec!(100), dec!(3), dec!(2)).await;

        assert!(matches!(result, Err(AllocationError::VenueUnavailable { .. })));
        assert!(f.engine.ledger().await.is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_failure_keeps_principal_recorded() {
        let f = create_fixture();
        f.deposit(dec!(100), dec!(3), dec!(2)).await.unwrap();
        f.venue_a.set_fail_next_withdraw(true);

        let result = f.engine.withdraw(&admin()).await;

        assert!(matches!(result, Err(AllocationError::VenueUnavailable { .. })));
        let ledger = f.engine.ledger().await;
        assert_eq!(ledger.current_venue(), Some(Venue::VenueA));
        assert_eq!(ledger.principal_amount(), amount(dec!(100)));
    }

    #[tokio::test]
    async fn test_rebalance_withdraw_failure_keeps_old_venue() {
        let f = create_fixture();
        f.deposit(dec!(100), dec!(3), dec!(2)).await.unwrap();
        f.venue_a.set_fail_next_withdraw(true);

        let result = f.engine.rebalance(&admin(), rate(dec!(2)), rate(dec!(3))).await;

        assert!(matches!(
            result,
            Err(AllocationError::VenueUnavailable { venue: Venue::VenueA, .. })
        ));
        assert_eq!(f.engine.ledger().await.current_venue(), Some(Venue::VenueA));
        assert!(f.venue_b.placements().is_empty());
    }

    #[tokio::test]
    async fn test_rebalance_records_settled_amount() {
        let f = create_fixture();
        f.deposit(dec!(100), dec!(3), dec!(2)).await.unwrap();
        f.venue_b.set_acceptance_cap(Some(amount(dec!(99.9))));

        let outcome = f.engine.rebalance(&admin(), rate(dec!(2)), rate(dec!(3))).await.unwrap();

        assert_eq!(outcome.ledger.current_venue(), Some(Venue::VenueB));
        assert_eq!(outcome.ledger.principal_amount(), amount(dec!(99.9)));
    }

    #[tokio::test]
    async fn test_withdraw_while_held_unplaced_is_rejected() {
        let f = create_fixture();
        f.deposit(dec!(100), dec!(3), dec!(2)).await.unwrap();
        f.venue_b.set_fail_next_place(true);
        let _ = f.engine.rebalance(&admin(), rate(dec!(2)), rate(dec!(3))).await;

        let result = f.engine.withdraw(&admin()).await;

        assert!(matches!(
            result,
            Err(AllocationError::PlacementPending { intended: Venue::VenueB, .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_rejects_foreign_administrator() {
        let f = create_fixture();
        let foreign = AllocationLedger::new(Identity::new("mallory").unwrap());

        assert!(f.engine.restore(foreign).await.is_err());
    }

    #[tokio::test]
    async fn test_restore_replaces_ledger() {
        let f = create_fixture();
        let snapshot = AllocationLedger::from_parts(
            admin(),
            LedgerState::Placed { venue: Venue::VenueB, amount: amount(dec!(5)) },
        )
        .unwrap();

        f.engine.restore(snapshot.clone()).await.unwrap();

        assert_eq!(f.engine.ledger().await, snapshot);
    }

    #[tokio::test]
    async fn test_venue_health_reports_both() {
        let f = create_fixture();
        f.venue_b.set_paused(true);

        let health = f.engine.venue_health().await;

        assert_eq!(health.len(), 2);
        assert!(health[0].1.is_ok());
        assert!(health[1].1.is_err());
    }
}
