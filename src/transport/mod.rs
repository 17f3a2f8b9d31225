//! Link and session collaborators
//!
//! The supervisor only sees these traits. Real implementations live in
//! [`link`] (host network interface) and [`mqtt`] (rumqttc session); fakes
//! for tests live in [`crate::testing`].

use crate::protocol::MacAddress;
use bytes::Bytes;
use std::net::IpAddr;
use thiserror::Error;

pub mod link;
pub mod mqtt;

/// Link-layer failures
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Link reconnect command failed: {0}")]
    ReconnectFailed(String),
    #[error("Hardware address unavailable: {0}")]
    HardwareAddressUnavailable(String),
    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-layer failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection attempt timed out after {0}s")]
    ConnectTimeout(u64),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Session not connected")]
    NotConnected,
}

/// Message the broker publishes on our behalf if the session drops
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Everything needed for one session connect attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub client_id: String,
    pub last_will: LastWill,
}

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

/// Point-to-point network link (e.g. wireless association)
#[async_trait::async_trait]
pub trait LinkClient: Send {
    /// Bring the link up; returning does not imply the link is usable
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Drop the link
    async fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Whether the link reports itself associated
    fn is_connected(&self) -> bool;

    /// Address assigned to this host on the link, if any
    fn local_address(&self) -> Option<IpAddr>;

    /// Hardware address used to derive the session client identifier
    fn hardware_address(&self) -> Result<MacAddress, LinkError>;
}

/// Publish/subscribe session layered on the link
#[async_trait::async_trait]
pub trait SessionClient: Send {
    /// Connect, registering `params.last_will` with the broker
    async fn connect(&mut self, params: &SessionParams) -> Result<(), SessionError>;

    async fn disconnect(&mut self) -> Result<(), SessionError>;

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
        -> Result<(), SessionError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    /// Drive pending network I/O and hand back messages received since the last pump
    async fn pump(&mut self) -> Vec<InboundMessage>;
}

/// Firmware-update transport polled once per loop iteration
#[async_trait::async_trait]
pub trait UpdatePump: Send {
    async fn pump(&mut self);
}

/// Update pump for deployments where updates arrive out of band
#[derive(Debug, Default)]
pub struct NoUpdates;

#[async_trait::async_trait]
impl UpdatePump for NoUpdates {
    async fn pump(&mut self) {}
}

