//! Deferred reboot
//!
//! A `reset` command arms the timer instead of restarting on the spot, so the
//! reply has time to leave the device. Arming again restarts the countdown.

use crate::clock::elapsed_more_than;
use std::time::Duration;
use tracing::{info, warn};

/// Exit code asking the service manager for a restart
pub const RESTART_EXIT_CODE: i32 = 3;

/// Idle until armed, fires once after `delay`
#[derive(Debug, Clone)]
pub struct RebootTimer {
    delay: Duration,
    armed_at: Option<Duration>,
}

impl RebootTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed_at: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Start, or restart, the countdown at `now`
    pub fn arm(&mut self, now: Duration) {
        if self.armed_at.replace(now).is_some() {
            info!("Reboot already pending, countdown restarted");
        } else {
            info!(delay_ms = self.delay.as_millis() as u64, "Reboot scheduled");
        }
    }

    /// True exactly once, when the countdown has run out; disarms the timer
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.armed_at {
            Some(at) if elapsed_more_than(now, at, self.delay) => {
                self.armed_at = None;
                true
            }
            _ => false,
        }
    }
}

/// Performs the actual restart
pub trait Restarter: Send {
    fn restart(&mut self);
}

/// Exits the process so the service manager starts a fresh one
#[derive(Debug, Default)]
pub struct ProcessRestarter;

impl Restarter for ProcessRestarter {
    fn restart(&mut self) {
        warn!(code = RESTART_EXIT_CODE, "Restarting process");
        std::process::exit(RESTART_EXIT_CODE);
    }
}
