use serde::{Deserialize, Serialize};
use std::fmt;

/// Auction lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionState {
    /// Created, not yet accepting bids (deferred start)
    Pending,
    /// Accepting bids
    Active,
    /// Ended at `end_at` or force-closed; winner determined or no-winner
    Closed,
    /// Ended by the seller before close; no winner
    Cancelled,
}

impl AuctionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionState::Pending => "pending",
            AuctionState::Active => "active",
            AuctionState::Closed => "closed",
            AuctionState::Cancelled => "cancelled",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: AuctionState) -> bool {
        use AuctionState::*;

        match (self, target) {
            // From Pending
            (Pending, Active) => true, // start_at reached or immediate activation

            // From Active
            (Active, Closed) => true,    // scheduler fire or force-close
            (Active, Cancelled) => true, // seller cancel

            // Closed and Cancelled are terminal
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<AuctionState> {
        use AuctionState::*;

        match self {
            Pending => vec![Active],
            Active => vec![Closed, Cancelled],
            Closed => vec![],
            Cancelled => vec![],
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionState::Closed | AuctionState::Cancelled)
    }

    /// A live auction occupies its deal room (one-per-room invariant)
    pub fn is_live(&self) -> bool {
        matches!(self, AuctionState::Pending | AuctionState::Active)
    }

    /// Only active auctions admit bids
    pub fn accepts_bids(&self) -> bool {
        matches!(self, AuctionState::Active)
    }
}

impl fmt::Display for AuctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for AuctionState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AuctionState::Pending),
            "active" => Ok(AuctionState::Active),
            "closed" => Ok(AuctionState::Closed),
            "cancelled" => Ok(AuctionState::Cancelled),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// What asked for an `active -> closed` transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseTrigger {
    /// Scheduler fired at `end_at`; terminal states are absorbed silently
    Schedule,
    /// Administrative force-close; closing a cancelled auction is an error
    Force,
}

impl CloseTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseTrigger::Schedule => "schedule",
            CloseTrigger::Force => "force",
        }
    }
}

impl fmt::Display for CloseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionTransition {
    pub from: AuctionState,
    pub to: AuctionState,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AuctionTransition {
    pub fn new(from: AuctionState, to: AuctionState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
