//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Allocation Manager (commands, persistence)
//! - Event Bus (internal communication)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Restore the ledger from store
//! 4. Start API server
//! 5. Main event loop (log allocation events)
//! 6. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use allocator_domain::{Event, Rate, Venue};
use allocator_exec::{AllocationEngine, StubRateOracle, StubVenue};
use allocator_store::{MemoryStore, Store};

use crate::allocation_manager::AllocationManager;
use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus};

// =============================================================================
// Daemon
// =============================================================================

/// The main allocator daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Allocation manager
    allocation_manager: Arc<AllocationManager<S>>,
    /// Event bus
    event_bus: Arc<EventBus>,
}

impl Daemon<MemoryStore> {
    /// Create a new daemon with stub venues and oracle (for testing/development).
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        let venue_a = Arc::new(StubVenue::new(Venue::VenueA));
        let venue_b = Arc::new(StubVenue::new(Venue::VenueB));
        let engine =
            AllocationEngine::new(config.allocation.administrator.clone(), venue_a, venue_b)?;
        let oracle = Arc::new(match config.allocation.stub_native_rates {
            Some(native) => StubRateOracle::from_native(
                native.supply_rate_per_block,
                native.liquidity_rate_ray,
            )?,
            None => StubRateOracle::new(
                Rate::new(config.allocation.stub_rate_a),
                Rate::new(config.allocation.stub_rate_b),
            ),
        });
        let store = Arc::new(MemoryStore::new());
        let event_bus = Arc::new(EventBus::new(config.allocation.event_bus_capacity));

        let allocation_manager =
            Arc::new(AllocationManager::new(engine, oracle, store, event_bus.clone()));

        Ok(Self { config, allocation_manager, event_bus })
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a new daemon with provided components.
    pub fn new(
        config: Config,
        allocation_manager: Arc<AllocationManager<S>>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self { config, allocation_manager, event_bus }
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT or a
    /// `DaemonEvent::Shutdown` on the bus).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            administrator = %self.config.allocation.administrator,
            "Starting allocator daemon"
        );

        // 1. Restore ledger
        self.allocation_manager.restore().await?;

        // 2. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Subscribe to event bus
        let mut event_receiver = self.event_bus.subscribe();

        // 4. Main event loop
        info!("Entering main event loop");
        loop {
            tokio::select! {
                received = event_receiver.recv() => {
                    match received {
                        Some(Ok(event)) => {
                            if let Err(DaemonError::Shutdown) = self.handle_event(event) {
                                break;
                            }
                        },
                        Some(Err(lag_msg)) => {
                            warn!(%lag_msg, "Event receiver lagged");
                        },
                        None => {
                            warn!("Event bus closed");
                            break;
                        },
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // 5. Graceful shutdown
        self.shutdown().await
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState { allocation_manager: self.allocation_manager.clone() });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Handle an event from the event bus.
    fn handle_event(&self, event: DaemonEvent) -> DaemonResult<()> {
        match event {
            DaemonEvent::Allocation(event) => log_allocation_event(&event),
            DaemonEvent::Shutdown => {
                info!("Shutdown event received");
                return Err(DaemonError::Shutdown);
            },
        }

        Ok(())
    }

    /// Graceful shutdown.
    async fn shutdown(&self) -> DaemonResult<()> {
        info!("Initiating graceful shutdown");

        // Blocks until any in-flight command releases the ledger
        let ledger = self.allocation_manager.ledger().await;
        info!(
            state = ledger.state().name(),
            principal = %ledger.principal_amount(),
            "Shutdown complete"
        );

        Ok(())
    }
}

fn log_allocation_event(event: &Event) {
    match event {
        Event::Deposited { operation_id, venue, amount, .. } => {
            info!(%operation_id, %venue, %amount, "Deposited");
        },
        Event::Withdrawn { operation_id, venue, amount, .. } => {
            info!(%operation_id, %venue, %amount, "Withdrawn");
        },
        Event::Rebalanced { operation_id, from, to, amount, .. } => {
            info!(%operation_id, %from, %to, %amount, "Rebalanced");
        },
        Event::PartialRebalanceFailure {
            operation_id, from, intended, held_amount, reason, ..
        } => {
            error!(
                %operation_id,
                %from,
                %intended,
                held = %held_amount,
                %reason,
                "Principal held unplaced, operator attention required"
            );
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NativeRates;
    use allocator_domain::{Amount, Identity};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();

        let ledger = daemon.allocation_manager.ledger().await;
        assert!(ledger.is_empty());
        assert_eq!(ledger.administrator().as_str(), "admin");
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();

        let addr = daemon.start_api_server().await.unwrap();

        assert!(addr.port() > 0);

        let client = reqwest::Client::new();
        let response = client.get(format!("http://{}/health", addr)).send().await.unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_daemon_stub_from_native_rates() {
        let mut config = Config::test();
        config.allocation.stub_native_rates = Some(NativeRates {
            supply_rate_per_block: dec!(10000000000),
            liquidity_rate_ray: dec!(30000000000000000000000000),
        });
        let daemon = Daemon::new_stub(config).unwrap();

        let quote = daemon.allocation_manager.current_rates().await.unwrap();
        assert_eq!(quote.venue_b, Rate::new(dec!(3)));

        // Venue B pays more, so the deposit lands there
        let admin = Identity::new("admin").unwrap();
        let outcome = daemon
            .allocation_manager
            .deposit(&admin, Amount::new(dec!(1)).unwrap(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome.ledger.current_venue(), Some(Venue::VenueB));
    }

    #[tokio::test]
    async fn test_daemon_stub_rejects_overflowing_native_rates() {
        let mut config = Config::test();
        config.allocation.stub_native_rates = Some(NativeRates {
            supply_rate_per_block: rust_decimal::Decimal::MAX,
            liquidity_rate_ray: dec!(0),
        });

        assert!(matches!(Daemon::new_stub(config), Err(DaemonError::Exec(_))));
    }

    #[tokio::test]
    async fn test_daemon_restore_empty() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();

        assert!(!daemon.allocation_manager.restore().await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_event_stops_run() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();
        let event_bus = daemon.event_bus.clone();
        let manager = daemon.allocation_manager.clone();

        let handle = tokio::spawn(daemon.run());

        // Wait for the loop to subscribe before publishing
        while event_bus.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        let admin = Identity::new("admin").unwrap();
        manager.deposit(&admin, Amount::new(dec!(5)).unwrap(), None, None).await.unwrap();
        event_bus.send(DaemonEvent::Shutdown);

        handle.await.unwrap().unwrap();
        assert_eq!(manager.ledger().await.principal_amount(), Amount::new(dec!(5)).unwrap());
    }
}
