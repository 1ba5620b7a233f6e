//! Allocator Execution Layer
//!
//! Custody state machine orchestrating venue adapters.
//!
//! # Architecture
//!
//! ```text
//! Admin Command → AllocationEngine → Ledger check → Venue(s) → Ledger update → Event
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits defining interfaces for venues and the rate oracle
//! - **AllocationEngine**: Authorizes, validates, moves funds, records custody
//! - **Stub**: Test implementations for development
//!
//! # Example
//!
//! ```rust,ignore
//! use allocator_exec::{AllocationEngine, StubVenue};
//! use allocator_domain::{Amount, Identity, Rate, Venue};
//! use std::sync::Arc;
//!
//! let admin = Identity::new("admin")?;
//! let engine = AllocationEngine::new(
//!     admin.clone(),
//!     Arc::new(StubVenue::new(Venue::VenueA)),
//!     Arc::new(StubVenue::new(Venue::VenueB)),
//! )?;
//!
//! let amount = Amount::new(dec!(100))?;
//! let outcome = engine.deposit(&admin, amount, Rate::new(dec!(3)), Rate::new(dec!(2))).await?;
//! ```

#![warn(clippy::all)]

pub mod allocator;
pub mod error;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use allocator::{AllocationEngine, OperationOutcome};
pub use error::{AllocationError, AllocationResult, ExecError, ExecResult};
pub use ports::{RateOracle, RateQuote, VenuePort};
pub use stub::{StubRateOracle, StubVenue};
