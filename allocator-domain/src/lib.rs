//! Allocator Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the allocation ledger, value objects, and domain events.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod events;
pub mod ledger;
pub mod value_objects;

// Re-export commonly used types
pub use events::Event;
pub use ledger::{AllocationLedger, LedgerState};
pub use value_objects::{Amount, DomainError, Identity, Rate, Venue};
