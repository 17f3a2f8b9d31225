//! OS signal flags
//!
//! Handlers only flip atomics; the control loop reads them. SIGUSR1 raises
//! the interrupt flag, SIGINT and SIGTERM request a graceful shutdown.

use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    interrupt: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl SignalFlags {
    /// Flags not connected to any signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags wired to the process signal handlers
    pub fn register() -> std::io::Result<Self> {
        let flags = Self::new();
        signal_hook::flag::register(SIGUSR1, Arc::clone(&flags.interrupt))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&flags.shutdown))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&flags.shutdown))?;
        debug!("Signal handlers registered");
        Ok(flags)
    }

    /// Consume a pending interrupt
    pub fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::AcqRel)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn raise_interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_is_consumed() {
        let flags = SignalFlags::new();
        assert!(!flags.take_interrupt());
        flags.raise_interrupt();
        flags.raise_interrupt();
        assert!(flags.take_interrupt());
        assert!(!flags.take_interrupt());
    }

    #[test]
    fn test_clones_share_state() {
        let flags = SignalFlags::new();
        let handle = flags.clone();
        handle.request_shutdown();
        assert!(flags.shutdown_requested());
        assert!(flags.shutdown_requested());
    }

    #[test]
    fn test_sigusr1_raises_interrupt() {
        let flags = SignalFlags::register().unwrap();
        signal_hook::low_level::raise(SIGUSR1).unwrap();
        assert!(flags.take_interrupt());
    }
}
