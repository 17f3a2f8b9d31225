//! Testing utilities and fake collaborators
//!
//! Lets the agent loop, supervisor and publisher run against scripted link,
//! session, probe and restart behavior instead of real hardware and brokers.

pub mod mocks;

pub use mocks::*;
