//! Allocator Storage Layer
//!
//! Provides persistence for the allocation ledger snapshot and the
//! append-only event log.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing and the stub daemon
//!
//! # Usage
//!
//! ```rust
//! use allocator_store::{MemoryStore, Store};
//! use allocator_domain::{AllocationLedger, Identity};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let ledger = AllocationLedger::new(Identity::new("admin").unwrap());
//!     store.ledger().save(&ledger).await.unwrap();
//!
//!     let restored = store.ledger().load().await.unwrap();
//!     assert_eq!(restored, Some(ledger));
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{EventRepository, LedgerRepository, Store};
