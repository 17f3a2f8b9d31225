//! Observability for the node agent
//!
//! Structured logging only; device state itself is reported over the
//! session by the publisher.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{command_span, connectivity_span, lifecycle_span};
