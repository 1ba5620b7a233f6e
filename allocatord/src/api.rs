//! HTTP API for the allocator daemon.
//!
//! Provides REST endpoints for:
//! - Health check (daemon and both venues)
//! - Ledger snapshot and event log
//! - Current oracle rates
//! - Deposit, withdraw, rebalance
//!
//! Mutating endpoints identify the caller through the `x-allocator-caller`
//! header; only the configured administrator is accepted.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use allocator_domain::{AllocationLedger, Amount, Event, Identity, LedgerState, Rate, Venue};
use allocator_exec::{AllocationError, ExecError, OperationOutcome};
use allocator_store::Store;

use crate::allocation_manager::AllocationManager;
use crate::error::DaemonError;

/// Header carrying the caller identity.
pub const CALLER_HEADER: &str = "x-allocator-caller";

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static> {
    pub allocation_manager: Arc<AllocationManager<S>>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub venues: Vec<VenueHealth>,
}

/// Health of a single venue adapter.
#[derive(Debug, Serialize)]
pub struct VenueHealth {
    pub venue: Venue,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ledger snapshot.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub administrator: String,
    pub state: String,
    pub principal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_unplaced: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intended: Option<Venue>,
}

/// Current rate quote.
#[derive(Debug, Serialize)]
pub struct RatesResponse {
    pub venue_a: Decimal,
    pub venue_b: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Request to deposit principal.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub rate_a: Option<Decimal>,
    #[serde(default)]
    pub rate_b: Option<Decimal>,
}

/// Request to rebalance.
#[derive(Debug, Default, Deserialize)]
pub struct RebalanceRequest {
    #[serde(default)]
    pub rate_a: Option<Decimal>,
    #[serde(default)]
    pub rate_b: Option<Decimal>,
}

/// Response after a mutating command.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    pub ledger: LedgerResponse,
}

/// Event log response.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub count: usize,
    pub events: Vec<Event>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intended: Option<Venue>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/ledger", get(ledger_handler))
        .route("/events", get(events_handler))
        .route("/rates", get(rates_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/rebalance", post(rebalance_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler<S>(State(state): State<Arc<ApiState<S>>>) -> Json<HealthResponse>
where
    S: Store + 'static,
{
    let venues: Vec<VenueHealth> = state
        .allocation_manager
        .venue_health()
        .await
        .into_iter()
        .map(|(venue, result)| VenueHealth {
            venue,
            healthy: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        })
        .collect();

    let status = if venues.iter().all(|v| v.healthy) { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        venues,
    })
}

/// Get the ledger snapshot.
async fn ledger_handler<S>(State(state): State<Arc<ApiState<S>>>) -> Json<LedgerResponse>
where
    S: Store + 'static,
{
    let ledger = state.allocation_manager.ledger().await;
    Json(ledger_to_response(&ledger))
}

/// Get the recorded events.
async fn events_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<EventsResponse>, ApiError>
where
    S: Store + 'static,
{
    let events = state.allocation_manager.events().await.map_err(to_error_response)?;
    Ok(Json(EventsResponse { count: events.len(), events }))
}

/// Get the current oracle quote.
async fn rates_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<RatesResponse>, ApiError>
where
    S: Store + 'static,
{
    let quote = state.allocation_manager.current_rates().await.map_err(to_error_response)?;

    Ok(Json(RatesResponse {
        venue_a: quote.venue_a.as_decimal(),
        venue_b: quote.venue_b.as_decimal(),
        observed_at: quote.observed_at,
    }))
}

/// Deposit principal.
///
/// The body is parsed only after the caller is authorized.
async fn deposit_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<OperationResponse>), ApiError>
where
    S: Store + 'static,
{
    let caller = caller_identity(&headers)?;
    state.allocation_manager.authorize(&caller).map_err(to_error_response)?;
    let req: DepositRequest = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("Invalid deposit request: {}", e)))?;
    let amount = Amount::new(req.amount)
        .map_err(|e| bad_request(format!("Invalid amount: {}", e)))?;

    let outcome = state
        .allocation_manager
        .deposit(&caller, amount, req.rate_a.map(Rate::new), req.rate_b.map(Rate::new))
        .await
        .map_err(to_error_response)?;

    Ok((StatusCode::CREATED, Json(outcome_to_response(outcome))))
}

/// Withdraw all principal.
async fn withdraw_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    headers: HeaderMap,
) -> Result<Json<OperationResponse>, ApiError>
where
    S: Store + 'static,
{
    let caller = caller_identity(&headers)?;

    let outcome = state.allocation_manager.withdraw(&caller).await.map_err(to_error_response)?;

    Ok(Json(outcome_to_response(outcome)))
}

/// Rebalance towards the better rate.
async fn rebalance_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    headers: HeaderMap,
    req: Option<Json<RebalanceRequest>>,
) -> Result<Json<OperationResponse>, ApiError>
where
    S: Store + 'static,
{
    let caller = caller_identity(&headers)?;
    let req = req.map(|Json(req)| req).unwrap_or_default();

    let outcome = state
        .allocation_manager
        .rebalance(&caller, req.rate_a.map(Rate::new), req.rate_b.map(Rate::new))
        .await
        .map_err(to_error_response)?;

    Ok(Json(outcome_to_response(outcome)))
}

// =============================================================================
// Helpers
// =============================================================================

fn caller_identity(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let value = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(StatusCode::UNAUTHORIZED, format!("Missing {} header", CALLER_HEADER))
        })?;

    Identity::new(value).map_err(|e| error_response(StatusCode::UNAUTHORIZED, e.to_string()))
}

fn error_response(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error, code: None, held: None, intended: None }))
}

fn bad_request(error: String) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, error)
}

fn to_error_response(error: DaemonError) -> ApiError {
    let status = match &error {
        DaemonError::Allocation(e) => match e {
            AllocationError::Unauthorized => StatusCode::FORBIDDEN,
            AllocationError::InvalidAmount => StatusCode::BAD_REQUEST,
            AllocationError::AlreadyDeposited { .. }
            | AllocationError::NothingToWithdraw
            | AllocationError::NothingToRebalance
            | AllocationError::PlacementPending { .. } => StatusCode::CONFLICT,
            AllocationError::VenueUnavailable { .. }
            | AllocationError::PartialRebalanceFailure { .. } => StatusCode::BAD_GATEWAY,
            AllocationError::Domain(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        DaemonError::Exec(ExecError::Oracle(_)) => StatusCode::SERVICE_UNAVAILABLE,
        DaemonError::Exec(_) => StatusCode::BAD_GATEWAY,
        DaemonError::Domain(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let code = match &error {
        DaemonError::Allocation(e) => Some(e.code()),
        _ => None,
    };

    let (held, intended) = match &error {
        DaemonError::Allocation(AllocationError::PartialRebalanceFailure {
            held, intended, ..
        })
        | DaemonError::Allocation(AllocationError::PlacementPending { held, intended }) => {
            (Some(held.as_decimal()), Some(*intended))
        },
        _ => (None, None),
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.map(str::to_string),
            held,
            intended,
        }),
    )
}

fn ledger_to_response(ledger: &AllocationLedger) -> LedgerResponse {
    let intended = match ledger.state() {
        LedgerState::HeldUnplaced { intended, .. } => Some(*intended),
        _ => None,
    };

    LedgerResponse {
        administrator: ledger.administrator().to_string(),
        state: ledger.state().name().to_string(),
        principal: ledger.principal_amount().as_decimal(),
        venue: ledger.current_venue(),
        held_unplaced: ledger.held_unplaced().map(|a| a.as_decimal()),
        intended,
    }
}

fn outcome_to_response(outcome: OperationOutcome) -> OperationResponse {
    OperationResponse { event: outcome.event, ledger: ledger_to_response(&outcome.ledger) }
}

// =============================================================================
// Tests
// =============================================================================
