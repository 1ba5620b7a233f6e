//! Allocator Daemon
//!
//! Runtime orchestrator for the allocation engine and API server.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p allocatord
//!
//! # Start with custom environment
//! ALLOCATOR_ENV=test ALLOCATOR_API_PORT=8081 cargo run -p allocatord
//! ```
//!
//! # Environment Variables
//!
//! - `ALLOCATOR_ENV`: Environment (test, development, production)
//! - `ALLOCATOR_API_HOST`: API host (default: 0.0.0.0)
//! - `ALLOCATOR_API_PORT`: API port (default: 8080)
//! - `ALLOCATOR_ADMIN`: Administrator identity (required in production)
//! - `ALLOCATOR_EVENT_BUS_CAPACITY`: Event bus buffer (default: 1000)
//! - `ALLOCATOR_STUB_RATE_A`: Stub oracle rate for Venue A (default: 3)
//! - `ALLOCATOR_STUB_RATE_B`: Stub oracle rate for Venue B (default: 2)

use allocatord::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("allocatord=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Allocator Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config)?;
    daemon.run().await?;

    Ok(())
}
