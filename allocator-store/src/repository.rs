//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the allocator.
//! Implementations can be in-memory or a database for production.

use crate::error::StoreError;
use allocator_domain::{AllocationLedger, Event};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for the single allocation ledger snapshot
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Save the ledger snapshot (replaces the previous one)
    async fn save(&self, ledger: &AllocationLedger) -> Result<(), StoreError>;

    /// Load the last saved snapshot, if any
    async fn load(&self) -> Result<Option<AllocationLedger>, StoreError>;
}

/// Repository for allocation events (append-only)
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event to the log, returning its sequence number
    ///
    /// Appending the same `operation_id` twice with the same event type is
    /// rejected as a duplicate.
    async fn append(&self, event: &Event) -> Result<i64, StoreError>;

    /// Load all events in append order
    async fn all(&self) -> Result<Vec<Event>, StoreError>;

    /// Load events for one operation
    async fn find_by_operation(&self, operation_id: Uuid) -> Result<Vec<Event>, StoreError>;

    /// Get the latest event sequence number
    async fn latest_seq(&self) -> Result<Option<i64>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get ledger repository
    fn ledger(&self) -> &dyn LedgerRepository;

    /// Get event repository
    fn events(&self) -> &dyn EventRepository;
}
