//! Top-level error type for the node agent
//!
//! Module errors are aggregated here. Link and session failures are normally
//! handled by the supervisor and only reach this type during setup.

use crate::commands::{CommandError, RegistryError};
use crate::config::ConfigError;
use crate::transport::{LinkError, SessionError};
use thiserror::Error;

/// Exit code for startup failures
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Command error: {0}")]
    CommandParse(#[from] CommandError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: AgentError = SessionError::NotConnected.into();
        assert!(matches!(err, AgentError::Session(_)));
        assert_eq!(err.to_string(), "Session error: Session not connected");

        let err: AgentError = CommandError::EmptyCommand.into();
        assert_eq!(err.to_string(), "Command error: parse error: empty command");
    }
}
