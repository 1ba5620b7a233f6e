//! Domain Events for the Allocator
//!
//! Events represent custody changes. Dashboards and accounting subscribe to
//! them rather than polling ledger state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{Amount, Venue};

/// Domain events for the allocation lifecycle
///
/// Events are immutable records of state changes.
/// Every event carries the id of the operation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Principal placed into a venue by a deposit
    Deposited {
        /// Operation identifier
        operation_id: Uuid,
        /// Venue that received the principal
        venue: Venue,
        /// Principal placed
        amount: Amount,
        /// When the deposit completed
        timestamp: DateTime<Utc>,
    },

    /// All principal withdrawn back to the depositor
    Withdrawn {
        /// Operation identifier
        operation_id: Uuid,
        /// Venue the principal was withdrawn from
        venue: Venue,
        /// Amount the venue returned
        amount: Amount,
        /// When the withdrawal completed
        timestamp: DateTime<Utc>,
    },

    /// Principal moved to the venue with the better rate
    Rebalanced {
        /// Operation identifier
        operation_id: Uuid,
        /// Source venue
        from: Venue,
        /// Destination venue
        to: Venue,
        /// Amount now held by the destination venue
        amount: Amount,
        /// When the move completed
        timestamp: DateTime<Utc>,
    },

    /// Withdrawal from the source venue succeeded but placement failed.
    /// The principal is held outside any venue until a retry succeeds.
    PartialRebalanceFailure {
        /// Operation identifier
        operation_id: Uuid,
        /// Venue the principal was withdrawn from
        from: Venue,
        /// Venue the principal should be placed into
        intended: Venue,
        /// Principal held outside any venue
        held_amount: Amount,
        /// Venue-side failure description
        reason: String,
        /// When the failure occurred
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the operation ID from any event
    pub fn operation_id(&self) -> Uuid {
        match self {
            Event::Deposited { operation_id, .. }
            | Event::Withdrawn { operation_id, .. }
            | Event::Rebalanced { operation_id, .. }
            | Event::PartialRebalanceFailure { operation_id, .. } => *operation_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Deposited { timestamp, .. }
            | Event::Withdrawn { timestamp, .. }
            | Event::Rebalanced { timestamp, .. }
            | Event::PartialRebalanceFailure { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Deposited { .. } => "deposited",
            Event::Withdrawn { .. } => "withdrawn",
            Event::Rebalanced { .. } => "rebalanced",
            Event::PartialRebalanceFailure { .. } => "partial_rebalance_failure",
        }
    }

    /// Whether this event requires operator follow-up
    pub fn requires_attention(&self) -> bool {
        matches!(self, Event::PartialRebalanceFailure { .. })
    }
}
