//! Pure connectivity decisions
//!
//! Rate limiting and state derivation for the supervisor, kept free of I/O so
//! every branch can be tested with plain values.

use crate::clock::elapsed_more_than;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Link/session health as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// No check has run yet
    Unknown,
    LinkDown,
    LinkUpSessionDown,
    LinkUpSessionUp,
}

impl ConnectivityState {
    pub fn link_up(&self) -> bool {
        matches!(
            self,
            ConnectivityState::LinkUpSessionDown | ConnectivityState::LinkUpSessionUp
        )
    }

    pub fn session_up(&self) -> bool {
        matches!(self, ConnectivityState::LinkUpSessionUp)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::LinkDown => "link down",
            ConnectivityState::LinkUpSessionDown => "link up, session down",
            ConnectivityState::LinkUpSessionUp => "online",
        };
        f.write_str(text)
    }
}

/// Fixed intervals governing repair attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairPolicy {
    /// Minimum spacing between link/session checks
    pub monitor_interval: Duration,
    /// Minimum spacing between session connect attempts
    pub session_retry: Duration,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(10),
            session_retry: Duration::from_secs(5),
        }
    }
}

/// Outcome of the session rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    /// Session already up, nothing to do
    AlreadyConnected,
    /// Retry window still open
    Wait,
    /// Attempt a connect; `attempt` is the new consecutive-failure count
    Attempt { attempt: u32 },
}

impl RepairPolicy {
    /// Whether the periodic check is due
    pub fn should_monitor(&self, now: Duration, last_monitor: Duration) -> bool {
        elapsed_more_than(now, last_monitor, self.monitor_interval)
    }

    /// Session rate limiter; `last_attempt = None` means retry immediately
    pub fn session_decision(
        &self,
        session_connected: bool,
        now: Duration,
        last_attempt: Option<Duration>,
        attempts: u32,
    ) -> SessionDecision {
        if session_connected {
            return SessionDecision::AlreadyConnected;
        }
        match last_attempt {
            Some(last) if !elapsed_more_than(now, last, self.session_retry) => {
                SessionDecision::Wait
            }
            _ => SessionDecision::Attempt {
                attempt: attempts.saturating_add(1),
            },
        }
    }
}

/// Log a state change once, at a level matching its severity
pub fn log_state_transition(from: ConnectivityState, to: ConnectivityState) {
    if from == to {
        return;
    }
    match (from, to) {
        (_, ConnectivityState::LinkUpSessionUp) => {
            info!("Connectivity restored: {} -> {}", from, to);
        }
        (_, ConnectivityState::LinkDown) => {
            error!("Connectivity degraded: {} -> {}", from, to);
        }
        _ => {
            warn!("Connectivity changed: {} -> {}", from, to);
        }
    }
}
