//! nodeagent - always-on device agent
//!
//! Keeps a network link and an MQTT session alive, reports device state on
//! nested cadences and executes short text commands received over the
//! session.
//!
//! # Overview
//!
//! - [`supervisor`] detects and repairs link/session loss without restarting
//! - [`scheduler`] fires the 1 s / 10 s / 30 s / 60 s cadences from one tick
//! - [`commands`] parses command lines and produces bounded replies
//! - [`agent`] owns all of the above and runs the cooperative control loop
//!
//! # Quick Start
//!
//! ```rust
//! use nodeagent::commands::CommandRegistry;
//! use std::time::Duration;
//!
//! let registry = CommandRegistry::with_builtins(Duration::from_secs(5)).unwrap();
//! assert_eq!(registry.dispatch("helloadd 2 3").text, "The Answer is: 5");
//! assert_eq!(registry.dispatch("bogus").text, "parse error: unknown command");
//! ```

pub mod agent;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod publisher;
pub mod reboot;
pub mod scheduler;
pub mod signals;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use agent::{AgentPhase, Collaborators, IterationOutcome, NodeAgent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{CommandRegistry, DeviceAction, Reply, MAX_RESPONSE_SIZE};
pub use config::*;
pub use error::{AgentError, AgentResult};
pub use protocol::*;
pub use reboot::{ProcessRestarter, RebootTimer, Restarter};
pub use scheduler::{CadenceTier, Scheduler};
pub use signals::SignalFlags;
pub use supervisor::{ConnectivityState, RepairPolicy, Supervisor};
pub use transport::mqtt::MqttSession;
