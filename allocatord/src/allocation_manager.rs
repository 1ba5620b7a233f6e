//! Allocation Manager: runs allocation commands and records their outcome.
//!
//! The Allocation Manager is responsible for:
//! - Resolving rates (explicit command rates, or the rate oracle)
//! - Forwarding commands to the allocation engine
//! - Persisting emitted events and the resulting ledger snapshot
//! - Publishing emitted events on the event bus
//! - Restoring the ledger from the store at startup
//!
//! Commands run one at a time: the engine call, the event append, the
//! snapshot save and the publish all happen under one command lock, so the
//! stored snapshot always matches the engine ledger.
//!
//! # Architecture
//!
//! ```text
//! API → AllocationManager → AllocationEngine → Venue A / Venue B
//!             │   ↑
//!             │   RateOracle
//!             ↓
//!        Store (events, ledger) → EventBus
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use allocator_domain::{AllocationLedger, Amount, Event, Identity, LedgerState, Rate, Venue};
use allocator_exec::{
    AllocationEngine, AllocationError, ExecResult, OperationOutcome, RateOracle, RateQuote,
};
use allocator_store::Store;

use crate::error::DaemonResult;
use crate::event_bus::{DaemonEvent, EventBus};

// =============================================================================
// Allocation Manager
// =============================================================================

/// Runs allocation commands on behalf of the API.
pub struct AllocationManager<S: Store + 'static> {
    /// Allocation engine (owns the ledger)
    engine: AllocationEngine,
    /// Rate source for commands that carry no rates
    oracle: Arc<dyn RateOracle>,
    /// Store for persistence
    store: Arc<S>,
    /// Event bus for publishing events
    event_bus: Arc<EventBus>,
    /// Held from the engine call until the outcome is recorded
    commands: Mutex<()>,
}

impl<S: Store + 'static> AllocationManager<S> {
    /// Create a new allocation manager.
    pub fn new(
        engine: AllocationEngine,
        oracle: Arc<dyn RateOracle>,
        store: Arc<S>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self { engine, oracle, store, event_bus, commands: Mutex::new(()) }
    }

    /// Load the last ledger snapshot from the store into the engine.
    ///
    /// Returns `true` if a snapshot was found.
    pub async fn restore(&self) -> DaemonResult<bool> {
        let Some(snapshot) = self.store.ledger().load().await? else {
            info!("No ledger snapshot to restore");
            return Ok(false);
        };

        if let LedgerState::HeldUnplaced { amount, from, intended } = snapshot.state() {
            warn!(
                held = %amount,
                %from,
                %intended,
                "Restored ledger has principal held unplaced, rebalance to retry placement"
            );
        }

        self.engine.restore(snapshot).await?;
        let events = self.store.events().latest_seq().await?.unwrap_or(0);
        info!(events, "Ledger restored from store");
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Deposit `amount` into the better-paying venue.
    pub async fn deposit(
        &self,
        caller: &Identity,
        amount: Amount,
        rate_a: Option<Rate>,
        rate_b: Option<Rate>,
    ) -> DaemonResult<OperationOutcome> {
        self.authorize(caller)?;
        let (rate_a, rate_b) = self.resolve_rates(rate_a, rate_b).await?;

        let _command = self.commands.lock().await;
        let result = self.engine.deposit(caller, amount, rate_a, rate_b).await;
        self.settle(result).await
    }

    /// Withdraw all principal.
    pub async fn withdraw(&self, caller: &Identity) -> DaemonResult<OperationOutcome> {
        let _command = self.commands.lock().await;
        let result = self.engine.withdraw(caller).await;
        self.settle(result).await
    }

    /// Rebalance towards the better-paying venue (or retry a held placement).
    pub async fn rebalance(
        &self,
        caller: &Identity,
        rate_a: Option<Rate>,
        rate_b: Option<Rate>,
    ) -> DaemonResult<OperationOutcome> {
        self.authorize(caller)?;
        let (rate_a, rate_b) = self.resolve_rates(rate_a, rate_b).await?;

        let _command = self.commands.lock().await;
        let result = self.engine.rebalance(caller, rate_a, rate_b).await;
        self.settle(result).await
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of the ledger.
    pub async fn ledger(&self) -> AllocationLedger {
        self.engine.ledger().await
    }

    /// Current oracle quote.
    pub async fn current_rates(&self) -> DaemonResult<RateQuote> {
        Ok(self.oracle.current_rates().await?)
    }

    /// Health of both venue adapters.
    pub async fn venue_health(&self) -> Vec<(Venue, ExecResult<()>)> {
        self.engine.venue_health().await
    }

    /// Events recorded so far, in order.
    pub async fn events(&self) -> DaemonResult<Vec<Event>> {
        Ok(self.store.events().all().await?)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Reject strangers before any oracle call or input validation.
    pub fn authorize(&self, caller: &Identity) -> DaemonResult<()> {
        if caller != self.engine.administrator() {
            warn!(%caller, "Access denied");
            return Err(AllocationError::Unauthorized.into());
        }
        Ok(())
    }

    /// Fill in missing rates from the oracle.
    async fn resolve_rates(
        &self,
        rate_a: Option<Rate>,
        rate_b: Option<Rate>,
    ) -> DaemonResult<(Rate, Rate)> {
        if let (Some(a), Some(b)) = (rate_a, rate_b) {
            return Ok((a, b));
        }

        let quote = self.oracle.current_rates().await?;
        debug!(
            rate_a = %quote.venue_a,
            rate_b = %quote.venue_b,
            observed_at = %quote.observed_at,
            "Rates fetched from oracle"
        );
        Ok((
            rate_a.unwrap_or_else(|| quote.rate_for(Venue::VenueA)),
            rate_b.unwrap_or_else(|| quote.rate_for(Venue::VenueB)),
        ))
    }

    /// Record whatever the engine reported, then hand the result back.
    ///
    /// Callers hold the command lock, so the engine ledger read on partial
    /// failure is the one this command produced.
    async fn settle(
        &self,
        result: Result<OperationOutcome, AllocationError>,
    ) -> DaemonResult<OperationOutcome> {
        match result {
            Ok(outcome) => {
                if let Some(event) = &outcome.event {
                    self.record(event, &outcome.ledger).await;
                }
                Ok(outcome)
            },
            Err(AllocationError::PartialRebalanceFailure { held, intended, event }) => {
                let ledger = self.engine.ledger().await;
                self.record(&event, &ledger).await;
                Err(AllocationError::PartialRebalanceFailure { held, intended, event }.into())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Append the event, save the ledger, publish the event.
    ///
    /// Custody already changed when this runs, so persistence failures are
    /// logged and the outcome still reaches the caller.
    async fn record(&self, event: &Event, ledger: &AllocationLedger) {
        match self.store.events().append(event).await {
            Ok(seq) => debug!(seq, event_type = event.event_type(), "Event appended"),
            Err(e) => error!(
                error = %e,
                operation_id = %event.operation_id(),
                event_type = event.event_type(),
                "Failed to append event"
            ),
        }

        if let Err(e) = self.store.ledger().save(ledger).await {
            error!(error = %e, state = ledger.state().name(), "Failed to save ledger snapshot");
        }

        let receivers = self.event_bus.send(DaemonEvent::Allocation(event.clone()));
        debug!(receivers, event_type = event.event_type(), "Event published");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;
    use allocator_exec::{StubRateOracle, StubVenue};
    use allocator_store::{EventRepository, LedgerRepository, MemoryStore, StoreError};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    struct Fixture {
        manager: AllocationManager<MemoryStore>,
        store: Arc<MemoryStore>,
        oracle: Arc<StubRateOracle>,
        venue_b: Arc<StubVenue>,
        event_bus: Arc<EventBus>,
    }

    fn admin() -> Identity {
        Identity::new("admin").unwrap()
    }

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn create_fixture_with_store(store: Arc<MemoryStore>) -> Fixture {
        let venue_a = Arc::new(StubVenue::new(Venue::VenueA));
        let venue_b = Arc::new(StubVenue::new(Venue::VenueB));
        let engine = AllocationEngine::new(admin(), venue_a, venue_b.clone()).unwrap();
        let oracle = Arc::new(StubRateOracle::new(Rate::new(dec!(3)), Rate::new(dec!(2))));
        let event_bus = Arc::new(EventBus::new(16));
        let manager =
            AllocationManager::new(engine, oracle.clone(), store.clone(), event_bus.clone());

        Fixture { manager, store, oracle, venue_b, event_bus }
    }

    fn create_fixture() -> Fixture {
        create_fixture_with_store(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_deposit_uses_oracle_rates() {
        let f = create_fixture();
        f.oracle.set_rates(Rate::new(dec!(1)), Rate::new(dec!(5)));

        let outcome = f.manager.deposit(&admin(), amount(dec!(10)), None, None).await.unwrap();

        assert_eq!(outcome.ledger.current_venue(), Some(Venue::VenueB));
    }

    #[tokio::test]
    async fn test_explicit_rates_override_oracle() {
        let f = create_fixture();
        f.oracle.set_fail_next(true);

        let outcome = f
            .manager
            .deposit(&admin(), amount(dec!(10)), Some(Rate::new(dec!(1))), Some(Rate::new(dec!(2))))
            .await
            .unwrap();

        assert_eq!(outcome.ledger.current_venue(), Some(Venue::VenueB));
    }

    #[tokio::test]
    async fn test_partial_override_fills_from_oracle() {
        let f = create_fixture();

        // Oracle quotes A=3, B=2; override only B
        let outcome = f
            .manager
            .deposit(&admin(), amount(dec!(10)), None, Some(Rate::new(dec!(4))))
            .await
            .unwrap();

        assert_eq!(outcome.ledger.current_venue(), Some(Venue::VenueB));
    }

    #[tokio::test]
    async fn test_oracle_failure_surfaces_without_custody_change() {
        let f = create_fixture();
        f.oracle.set_fail_next(true);

        let result = f.manager.deposit(&admin(), amount(dec!(10)), None, None).await;

        assert!(matches!(result, Err(DaemonError::Exec(_))));
        assert!(f.manager.ledger().await.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_before_oracle() {
        let f = create_fixture();
        f.oracle.set_fail_next(true);
        let stranger = Identity::new("mallory").unwrap();

        let result = f.manager.rebalance(&stranger, None, None).await;

        assert!(matches!(result, Err(DaemonError::Allocation(AllocationError::Unauthorized))));
    }

    #[tokio::test]
    async fn test_outcome_is_persisted_and_published() {
        let f = create_fixture();
        let mut receiver = f.event_bus.subscribe();

        f.manager.deposit(&admin(), amount(dec!(10)), None, None).await.unwrap();

        assert_eq!(f.store.event_count(), 1);
        let saved = f.store.ledger().load().await.unwrap().unwrap();
        assert_eq!(saved.current_venue(), Some(Venue::VenueA));

        let published = receiver.recv().await.unwrap().unwrap();
        assert!(matches!(published, DaemonEvent::Allocation(Event::Deposited { .. })));
    }

    #[tokio::test]
    async fn test_rebalance_noop_records_nothing() {
        let f = create_fixture();
        f.manager.deposit(&admin(), amount(dec!(10)), None, None).await.unwrap();

        let outcome = f.manager.rebalance(&admin(), None, None).await.unwrap();

        assert!(outcome.event.is_none());
        assert_eq!(f.store.event_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded() {
        let f = create_fixture();
        f.manager.deposit(&admin(), amount(dec!(10)), None, None).await.unwrap();
        f.venue_b.set_fail_next_place(true);
        f.oracle.set_rates(Rate::new(dec!(2)), Rate::new(dec!(3)));

        let result = f.manager.rebalance(&admin(), None, None).await;

        assert!(matches!(
            result,
            Err(DaemonError::Allocation(AllocationError::PartialRebalanceFailure { .. }))
        ));
        let events = f.manager.events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].requires_attention());
        let saved = f.store.ledger().load().await.unwrap().unwrap();
        assert_eq!(saved.held_unplaced(), Some(amount(dec!(10))));
    }

    #[tokio::test]
    async fn test_restore_from_store() {
        let store = Arc::new(MemoryStore::new());
        let first = create_fixture_with_store(store.clone());
        first.manager.deposit(&admin(), amount(dec!(10)), None, None).await.unwrap();

        let second = create_fixture_with_store(store);
        assert!(second.manager.restore().await.unwrap());

        let ledger = second.manager.ledger().await;
        assert_eq!(ledger.current_venue(), Some(Venue::VenueA));
        assert_eq!(ledger.principal_amount(), amount(dec!(10)));
    }

    #[tokio::test]
    async fn test_restore_empty_store() {
        let f = create_fixture();
        assert!(!f.manager.restore().await.unwrap());
        assert!(f.manager.ledger().await.is_empty());
    }

    /// Memory store whose first ledger save parks until released.
    struct GatedStore {
        inner: MemoryStore,
        gated: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                gated: AtomicBool::new(true),
                parked: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl LedgerRepository for GatedStore {
        async fn save(&self, ledger: &AllocationLedger) -> Result<(), StoreError> {
            if self.gated.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            self.inner.ledger().save(ledger).await
        }

        async fn load(&self) -> Result<Option<AllocationLedger>, StoreError> {
            self.inner.ledger().load().await
        }
    }

    impl Store for GatedStore {
        fn ledger(&self) -> &dyn LedgerRepository {
            self
        }

        fn events(&self) -> &dyn EventRepository {
            self.inner.events()
        }
    }

    #[tokio::test]
    async fn test_snapshot_matches_engine_under_concurrent_commands() {
        let venue_a = Arc::new(StubVenue::new(Venue::VenueA));
        let venue_b = Arc::new(StubVenue::new(Venue::VenueB));
        let engine = AllocationEngine::new(admin(), venue_a.clone(), venue_b).unwrap();
        let oracle = Arc::new(StubRateOracle::new(Rate::new(dec!(3)), Rate::new(dec!(2))));
        let store = Arc::new(GatedStore::new());
        let manager = Arc::new(AllocationManager::new(
            engine,
            oracle,
            store.clone(),
            Arc::new(EventBus::new(16)),
        ));

        // 1. Deposit parks inside its snapshot save
        let depositing = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.deposit(&admin(), amount(dec!(100)), None, None).await
            })
        };
        store.parked.notified().await;

        // 2. Withdraw is issued while the deposit is still recording
        let withdrawing = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.withdraw(&admin()).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // 3. Release the deposit and let both finish
        store.release.notify_one();
        depositing.await.unwrap().unwrap();
        withdrawing.await.unwrap().unwrap();

        let engine_ledger = manager.ledger().await;
        let saved = store.ledger().load().await.unwrap().unwrap();
        assert!(engine_ledger.is_empty());
        assert_eq!(saved, engine_ledger);
        assert!(venue_a.held().is_zero());

        let types: Vec<&str> =
            manager.events().await.unwrap().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["deposited", "withdrawn"]);
    }
}
