//! Circuit breaker for service protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//!
//! # State Transitions
//! ```text
//! Closed → Open:   consecutive_failures >= threshold
//! Open → Closed:   now > open_until (checked on the next availability query)
//! Open → Closed:   any recorded success, even before open_until
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - `open_until` is `Some` exactly while the circuit is open
//! - Only a success resets the failure streak; elapsed time alone never does,
//!   except through the auto-close transition itself

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Circuit was closed and stays closed.
    BelowThreshold,
    /// This failure tripped the circuit.
    Opened,
    /// Circuit was already open.
    AlreadyOpen,
}

/// Closed/open breaker state driven by a consecutive failure streak.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    open_until: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open_until.is_some()
    }

    pub fn open_until(&self) -> Option<DateTime<Utc>> {
        self.open_until
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns true when traffic may pass.
    ///
    /// An open circuit whose cool-down has elapsed closes here and its
    /// failure streak is cleared.
    pub fn try_pass(&mut self, now: DateTime<Utc>) -> bool {
        match self.open_until {
            None => true,
            Some(until) if now > until => {
                self.open_until = None;
                self.consecutive_failures = 0;
                true
            }
            Some(_) => false,
        }
    }

    /// Record a success. Returns true if this closed an open circuit.
    pub fn on_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        self.open_until.take().is_some()
    }

    /// Record a failure, opening the circuit once the streak reaches `threshold`.
    pub fn on_failure(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        open_duration: Duration,
    ) -> FailureOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.is_open() {
            return FailureOutcome::AlreadyOpen;
        }
        if self.consecutive_failures < threshold {
            return FailureOutcome::BelowThreshold;
        }

        let open_for = chrono::Duration::from_std(open_duration).unwrap_or(chrono::Duration::MAX);
        let until = now.checked_add_signed(open_for).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.open_until = Some(until);
        FailureOutcome::Opened
    }
}
