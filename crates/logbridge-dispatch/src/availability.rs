//! Aggregator availability state machine

use std::fmt;
use tracing::{info, warn};

/// Producer's belief about the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    /// No candidate address known yet
    #[default]
    Unresolved,
    Available,
    Unavailable,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Unresolved => "unresolved",
            Availability::Available => "available",
            Availability::Unavailable => "unavailable",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks availability and logs each transition once
#[derive(Debug, Default)]
pub struct AvailabilityTracker {
    current: Availability,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Availability {
        self.current
    }

    /// Move to `next`. Returns true if the state changed.
    /// Once an address is known the state never goes back to `Unresolved`.
    pub fn set(&mut self, next: Availability, target: &str) -> bool {
        if next == self.current || next == Availability::Unresolved {
            return false;
        }

        match next {
            Availability::Available => info!("Aggregator available at {}", target),
            Availability::Unavailable => {
                warn!("Aggregator at {} unreachable, printing locally", target)
            }
            Availability::Unresolved => {}
        }

        self.current = next;
        true
    }
}
