//! Reload coordinator
//!
//! Single-flight plus debounce for the "fetch the default sink" request.
//! Every transition goes through [`ReloadCoordinator`]; the ticket value makes
//! "at most one fetch in flight" a property of the type instead of a pair of
//! flags.

use std::time::Duration;

use tokio::time::Instant;

/// Per-resource reload state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTicket {
    Idle,
    /// One fetch in flight, nothing pending
    InFlight { id: u64 },
    /// One fetch in flight and one follow-up fetch due at `retry_at`
    InFlightWithPendingRetry { id: u64, retry_at: Instant },
    /// Nothing in flight, a fetch is due at `retry_at`
    RetryScheduled { retry_at: Instant },
}

#[derive(Debug)]
pub struct ReloadCoordinator {
    ticket: ReloadTicket,
    debounce: Duration,
    next_id: u64,
}

impl ReloadCoordinator {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            ticket: ReloadTicket::Idle,
            debounce,
            next_id: 0,
        }
    }

    #[must_use]
    pub fn ticket(&self) -> ReloadTicket {
        self.ticket
    }

    /// Id of the fetch currently in flight
    #[must_use]
    pub fn in_flight(&self) -> Option<u64> {
        match self.ticket {
            ReloadTicket::InFlight { id } | ReloadTicket::InFlightWithPendingRetry { id, .. } => {
                Some(id)
            }
            ReloadTicket::Idle | ReloadTicket::RetryScheduled { .. } => None,
        }
    }

    /// When the pending debounce timer fires, if one is pending
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.ticket {
            ReloadTicket::InFlightWithPendingRetry { retry_at, .. }
            | ReloadTicket::RetryScheduled { retry_at } => Some(retry_at),
            ReloadTicket::Idle | ReloadTicket::InFlight { .. } => None,
        }
    }

    /// Ask for a reload.
    ///
    /// Returns the id of a fetch to issue now, or `None` when one is already
    /// in flight; in that case the single pending retry is (re)scheduled one
    /// debounce window from `now`.
    pub fn trigger(&mut self, now: Instant) -> Option<u64> {
        match self.ticket {
            ReloadTicket::Idle | ReloadTicket::RetryScheduled { .. } => Some(self.begin()),
            ReloadTicket::InFlight { id } | ReloadTicket::InFlightWithPendingRetry { id, .. } => {
                self.ticket = ReloadTicket::InFlightWithPendingRetry {
                    id,
                    retry_at: now + self.debounce,
                };
                None
            }
        }
    }

    /// Start a fetch unconditionally, superseding whatever was in flight
    pub fn restart(&mut self) -> u64 {
        self.begin()
    }

    /// A fetch completed (successfully or not).
    ///
    /// Returns `false` if `id` is not the fetch in flight; such a completion
    /// must be ignored.
    pub fn complete(&mut self, id: u64) -> bool {
        match self.ticket {
            ReloadTicket::InFlight { id: current } if current == id => {
                self.ticket = ReloadTicket::Idle;
                true
            }
            ReloadTicket::InFlightWithPendingRetry {
                id: current,
                retry_at,
            } if current == id => {
                self.ticket = ReloadTicket::RetryScheduled { retry_at };
                true
            }
            _ => false,
        }
    }

    /// The debounce deadline elapsed.
    ///
    /// Returns the id of a fetch to issue now. A fetch still in flight pushes
    /// the retry one more window out instead.
    pub fn fire(&mut self, now: Instant) -> Option<u64> {
        match self.ticket {
            ReloadTicket::RetryScheduled { retry_at } if retry_at <= now => Some(self.begin()),
            ReloadTicket::InFlightWithPendingRetry { id, retry_at } if retry_at <= now => {
                self.ticket = ReloadTicket::InFlightWithPendingRetry {
                    id,
                    retry_at: now + self.debounce,
                };
                None
            }
            _ => None,
        }
    }

    /// Drop any in-flight fetch and pending timer
    pub fn reset(&mut self) {
        self.ticket = ReloadTicket::Idle;
    }

    fn begin(&mut self) -> u64 {
        self.next_id += 1;
        self.ticket = ReloadTicket::InFlight { id: self.next_id };
        self.next_id
    }
}
