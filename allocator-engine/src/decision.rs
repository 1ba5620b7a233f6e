//! Venue selection rules.
//!
//! Tie-breaks are asymmetric: an initial deposit needs a deterministic
//! default (Venue A), while a rebalance on an exact tie stays put so no
//! transfer is made.

use serde::{Deserialize, Serialize};
use tracing::debug;

use allocator_domain::{Rate, Venue};

/// Outcome of comparing the current venue against the quoted rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceDecision {
    /// Current venue is at least as good as the other
    Stay(Venue),
    /// The other venue strictly beats the current one
    Move {
        /// Venue the principal leaves
        from: Venue,
        /// Venue the principal goes to
        to: Venue,
    },
}

impl RebalanceDecision {
    /// Venue that should hold the principal after this decision
    pub fn target(&self) -> Venue {
        match self {
            RebalanceDecision::Stay(venue) => *venue,
            RebalanceDecision::Move { to, .. } => *to,
        }
    }
}

/// Pick the venue for a fresh deposit.
///
/// Higher rate wins; an exact tie selects Venue A.
pub fn select_deposit_venue(rate_a: Rate, rate_b: Rate) -> Venue {
    let venue = if rate_b > rate_a { Venue::VenueB } else { Venue::VenueA };
    debug!(%rate_a, %rate_b, %venue, "Deposit venue selected");
    venue
}

/// Decide whether principal held at `current` should move.
///
/// Moves only when the other venue's rate is strictly higher.
pub fn decide_rebalance(current: Venue, rate_a: Rate, rate_b: Rate) -> RebalanceDecision {
    let (current_rate, other_rate) = match current {
        Venue::VenueA => (rate_a, rate_b),
        Venue::VenueB => (rate_b, rate_a),
    };

    let decision = if other_rate > current_rate {
        RebalanceDecision::Move { from: current, to: current.other() }
    } else {
        RebalanceDecision::Stay(current)
    };

    debug!(%current, %rate_a, %rate_b, ?decision, "Rebalance decision");
    decision
}
