//! Node agent: setup sequence and the cooperative control loop

pub mod lifecycle;

pub use lifecycle::*;
