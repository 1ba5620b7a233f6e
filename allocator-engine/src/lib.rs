//! Allocator Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes rate quotes and ledger state → returns where principal belongs.

#![warn(clippy::all)]

pub mod apy;
pub mod decision;
pub mod error;

pub use apy::{aave_supply_apy, compound_supply_apy, BLOCKS_PER_DAY, DAYS_PER_YEAR};
pub use decision::{decide_rebalance, select_deposit_venue, RebalanceDecision};
pub use error::{EngineError, EngineResult};
