//! Allocator Daemon Library
//!
//! Runtime orchestrator for the yield allocator.
//!
//! # Architecture
//!
//! ```text
//! CLI → API Server → Allocation Manager → AllocationEngine → Venue A / Venue B
//!                          │        ↑
//!                          │    Rate Oracle
//!                          ↓
//!                   Store → Event Bus → subscribers
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Allocation Manager**: Runs commands, persists and publishes outcomes
//! - **Event Bus**: Fan-out of allocation events
//! - **API**: HTTP endpoints for the administrator
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use allocatord::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod allocation_manager;
pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;

// Re-exports for convenience
pub use allocation_manager::AllocationManager;
pub use config::{AllocationConfig, ApiConfig, Config, Environment, NativeRates};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{DaemonEvent, EventBus, EventReceiver};
