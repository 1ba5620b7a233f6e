//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use allocator_domain::Identity;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Allocation configuration
    pub allocation: AllocationConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Allocation configuration.
#[derive(Debug, Clone)]
pub struct AllocationConfig {
    /// Identity allowed to deposit, withdraw and rebalance
    pub administrator: Identity,
    /// Capacity of the daemon event bus
    pub event_bus_capacity: usize,
    /// Rate the stub oracle quotes for Venue A
    pub stub_rate_a: Decimal,
    /// Rate the stub oracle quotes for Venue B
    pub stub_rate_b: Decimal,
    /// Venue-native figures for the stub oracle, overriding the rates above
    pub stub_native_rates: Option<NativeRates>,
}

/// Venue-native rate figures, converted to APY by the stub oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeRates {
    /// Venue A supply rate per block, scaled by 1e18
    pub supply_rate_per_block: Decimal,
    /// Venue B annual liquidity rate in ray (1e27)
    pub liquidity_rate_ray: Decimal,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

const DEFAULT_ADMIN: &str = "admin";
const DEFAULT_EVENT_BUS_CAPACITY: usize = 1000;

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    fn from_source(lookup: impl Fn(&str) -> Option<String>) -> DaemonResult<Self> {
        let environment = Self::load_environment(&lookup)?;
        let api = Self::load_api_config(&lookup)?;
        let allocation = Self::load_allocation_config(&lookup, environment)?;

        Ok(Self { api, allocation, environment })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            allocation: AllocationConfig::default(),
            environment: Environment::Test,
        }
    }

    fn load_environment(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<Environment> {
        let env_str = lookup("ALLOCATOR_ENV").unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid ALLOCATOR_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<ApiConfig> {
        let host = lookup("ALLOCATOR_API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port_str = lookup("ALLOCATOR_API_PORT").unwrap_or_else(|| "8080".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            DaemonError::Config(format!("Invalid ALLOCATOR_API_PORT: {}", port_str))
        })?;

        Ok(ApiConfig { host, port })
    }

    fn load_allocation_config(
        lookup: &impl Fn(&str) -> Option<String>,
        environment: Environment,
    ) -> DaemonResult<AllocationConfig> {
        let administrator = match lookup("ALLOCATOR_ADMIN") {
            Some(value) => Identity::new(value)
                .map_err(|e| DaemonError::Config(format!("Invalid ALLOCATOR_ADMIN: {}", e)))?,
            None if environment == Environment::Production => {
                return Err(DaemonError::Config(
                    "ALLOCATOR_ADMIN is required in production".to_string(),
                ));
            },
            None => Identity::new(DEFAULT_ADMIN)?,
        };

        let capacity_str = lookup("ALLOCATOR_EVENT_BUS_CAPACITY")
            .unwrap_or_else(|| DEFAULT_EVENT_BUS_CAPACITY.to_string());
        let event_bus_capacity = match capacity_str.parse::<usize>() {
            Ok(capacity) if capacity > 0 => capacity,
            _ => {
                return Err(DaemonError::Config(format!(
                    "Invalid ALLOCATOR_EVENT_BUS_CAPACITY: {}",
                    capacity_str
                )));
            },
        };

        let stub_rate_a = Self::load_decimal(lookup, "ALLOCATOR_STUB_RATE_A", Decimal::new(3, 0))?;
        let stub_rate_b = Self::load_decimal(lookup, "ALLOCATOR_STUB_RATE_B", Decimal::new(2, 0))?;

        let stub_native_rates = match (
            Self::load_optional_decimal(lookup, "ALLOCATOR_STUB_SUPPLY_RATE_PER_BLOCK")?,
            Self::load_optional_decimal(lookup, "ALLOCATOR_STUB_LIQUIDITY_RATE_RAY")?,
        ) {
            (Some(supply_rate_per_block), Some(liquidity_rate_ray)) => {
                Some(NativeRates { supply_rate_per_block, liquidity_rate_ray })
            },
            (None, None) => None,
            _ => {
                return Err(DaemonError::Config(
                    "ALLOCATOR_STUB_SUPPLY_RATE_PER_BLOCK and ALLOCATOR_STUB_LIQUIDITY_RATE_RAY \
                     must be set together"
                        .to_string(),
                ));
            },
        };

        Ok(AllocationConfig {
            administrator,
            event_bus_capacity,
            stub_rate_a,
            stub_rate_b,
            stub_native_rates,
        })
    }

    fn load_optional_decimal(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> DaemonResult<Option<Decimal>> {
        lookup(key)
            .map(|val| {
                Decimal::from_str(&val)
                    .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val)))
            })
            .transpose()
    }

    fn load_decimal(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
        default: Decimal,
    ) -> DaemonResult<Decimal> {
        match lookup(key) {
            Some(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig { host: "0.0.0.0".to_string(), port: 8080 },
            allocation: AllocationConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            administrator: Identity::new(DEFAULT_ADMIN)
                .unwrap_or_else(|_| unreachable!("default administrator is non-empty")),
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
            stub_rate_a: Decimal::new(3, 0),
            stub_rate_b: Decimal::new(2, 0),
            stub_native_rates: None,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
