//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access. The ledger is kept as a
//! serialized snapshot so a load goes through the same decode and
//! invariant check a durable backend would.

use crate::error::StoreError;
use crate::repository::{EventRepository, LedgerRepository, Store};
use allocator_domain::{AllocationLedger, Event};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory store for testing
pub struct MemoryStore {
    ledger: RwLock<Option<String>>,
    events: RwLock<Vec<StoredEvent>>,
    event_seq: AtomicI64,
}

/// Event with sequence number
struct StoredEvent {
    seq: i64,
    event: Event,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            ledger: RwLock::new(None),
            events: RwLock::new(Vec::new()),
            event_seq: AtomicI64::new(0),
        }
    }

    /// Get the number of events
    pub fn event_count(&self) -> usize {
        read(&self.events).len()
    }

    /// True once a ledger snapshot has been saved
    pub fn has_ledger(&self) -> bool {
        read(&self.ledger).is_some()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        write(&self.ledger).take();
        write(&self.events).clear();
        self.event_seq.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Ledger Repository Implementation
// =============================================================================

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn save(&self, ledger: &AllocationLedger) -> Result<(), StoreError> {
        ledger.check_invariants()?;
        let snapshot = serde_json::to_string(ledger)?;
        *write(&self.ledger) = Some(snapshot);
        debug!(state = ledger.state().name(), "Ledger snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<AllocationLedger>, StoreError> {
        let snapshot = read(&self.ledger).clone();
        match snapshot {
            None => Ok(None),
            Some(json) => {
                let ledger: AllocationLedger = serde_json::from_str(&json)?;
                ledger.check_invariants()?;
                Ok(Some(ledger))
            },
        }
    }
}

// =============================================================================
// Event Repository Implementation
// =============================================================================

#[async_trait]
impl EventRepository for MemoryStore {
    async fn append(&self, event: &Event) -> Result<i64, StoreError> {
        let mut events = write(&self.events);

        let duplicate = events.iter().any(|stored| {
            stored.event.operation_id() == event.operation_id()
                && stored.event.event_type() == event.event_type()
        });
        if duplicate {
            return Err(StoreError::duplicate(event.event_type(), event.operation_id().to_string()));
        }

        let seq = self.event_seq.fetch_add(1, Ordering::SeqCst) + 1;
        events.push(StoredEvent { seq, event: event.clone() });
        Ok(seq)
    }

    async fn all(&self) -> Result<Vec<Event>, StoreError> {
        Ok(read(&self.events).iter().map(|stored| stored.event.clone()).collect())
    }

    async fn find_by_operation(&self, operation_id: Uuid) -> Result<Vec<Event>, StoreError> {
        Ok(read(&self.events)
            .iter()
            .filter(|stored| stored.event.operation_id() == operation_id)
            .map(|stored| stored.event.clone())
            .collect())
    }

    async fn latest_seq(&self) -> Result<Option<i64>, StoreError> {
        Ok(read(&self.events).last().map(|stored| stored.seq))
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn ledger(&self) -> &dyn LedgerRepository {
        self
    }

    fn events(&self) -> &dyn EventRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
