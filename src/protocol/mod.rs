//! Channel layout and message payloads exchanged over the session

pub mod snapshots;
pub mod topics;

pub use snapshots::*;
pub use topics::*;
