//! MQTT session client built on rumqttc
//!
//! Split the same way as the rest of the transport layer: pure option
//! building and event routing, plus one impure client.
//!
//! - [`connection`] - broker URL parsing and rumqttc option construction
//! - [`message_handler`] - event routing and inbound filtering
//! - [`client`] - the [`SessionClient`](crate::transport::SessionClient) implementation
//!
//! # Usage
//!
//! ```rust,no_run
//! use nodeagent::config::AgentConfig;
//! use nodeagent::transport::mqtt::MqttSession;
//! use nodeagent::transport::{LastWill, SessionClient, SessionParams};
//!
//! # tokio_test::block_on(async {
//! let config = AgentConfig::from_toml_str("[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n")?;
//! let mut session = MqttSession::new(config.mqtt);
//! session
//!     .connect(&SessionParams {
//!         client_id: "esp32_1a-2b-3c".to_string(),
//!         last_will: LastWill {
//!             topic: "esp32/default/status".to_string(),
//!             payload: "OFFLINE".to_string(),
//!             retain: true,
//!         },
//!     })
//!     .await?;
//! session.subscribe("esp32/default/cmd").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttSession;
pub use connection::{configure_mqtt_options, parse_broker_url, BrokerAddress};
pub use message_handler::{EventRoute, MessageHandler};
