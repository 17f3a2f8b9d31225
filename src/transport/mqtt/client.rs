//! Impure I/O operations for the MQTT session
//!
//! Wraps a rumqttc client/event-loop pair. A fresh pair is created for every
//! connect attempt so the last will and client id are always current; the
//! event loop is only polled from [`SessionClient::pump`] and while waiting
//! for ConnAck, never from a background task.

use super::connection::configure_mqtt_options;
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::transport::{InboundMessage, SessionClient, SessionError, SessionParams};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-poll wait inside one pump; keeps the control loop responsive
const PUMP_POLL_TIMEOUT: Duration = Duration::from_millis(5);
/// Upper bound on events handled per pump
const MAX_EVENTS_PER_PUMP: usize = 64;
/// Time allowed to flush the DISCONNECT packet
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// rumqttc-backed session client
pub struct MqttSession {
    config: MqttSection,
    client: Option<AsyncClient>,
    event_loop: Option<EventLoop>,
    connected: bool,
}

impl MqttSession {
    pub fn new(config: MqttSection) -> Self {
        Self {
            config,
            client: None,
            event_loop: None,
            connected: false,
        }
    }

    /// Poll until ConnAck, an error, or the configured timeout
    async fn wait_for_connack(
        event_loop: &mut EventLoop,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                let event = event_loop
                    .poll()
                    .await
                    .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
                match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged { accepted: true, .. } => return Ok(()),
                    EventRoute::ConnectionAcknowledged {
                        accepted: false,
                        reason,
                    } => {
                        return Err(SessionError::ConnectionFailed(format!(
                            "broker refused connection: {reason}"
                        )))
                    }
                    _ => continue,
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::ConnectTimeout(timeout.as_secs())),
        }
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.connected {
            warn!("MQTT session lost: {}", reason);
        }
        self.connected = false;
        self.client = None;
        self.event_loop = None;
    }

    fn connected_client(&self) -> Result<&AsyncClient, SessionError> {
        match (&self.client, self.connected) {
            (Some(client), true) => Ok(client),
            _ => Err(SessionError::NotConnected),
        }
    }
}

#[async_trait]
impl SessionClient for MqttSession {
    async fn connect(&mut self, params: &SessionParams) -> Result<(), SessionError> {
        self.drop_connection("reconnecting");

        let options = configure_mqtt_options(&self.config, params)?;
        let (client, mut event_loop) = AsyncClient::new(options, self.config.request_capacity);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        Self::wait_for_connack(&mut event_loop, timeout).await?;

        info!(client_id = %params.client_id, "MQTT session established");
        self.client = Some(client);
        self.event_loop = Some(event_loop);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        let result = client
            .try_disconnect()
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()));

        // Flush the DISCONNECT packet; the loop reports an error once it is sent
        if let Some(mut event_loop) = self.event_loop.take() {
            let _ = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, async {
                while event_loop.poll().await.is_ok() {}
            })
            .await;
        }

        self.connected = false;
        info!("MQTT session disconnected");
        result
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), SessionError> {
        let client = self.connected_client()?;
        client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| SessionError::PublishFailed(Box::new(e)))?;
        debug!(topic, retain, bytes = payload.len(), "Queued publish");
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        let client = self.connected_client()?;
        client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| SessionError::SubscriptionFailed(Box::new(e)))?;
        info!("Subscribing to: {}", topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn pump(&mut self) -> Vec<InboundMessage> {
        let mut received = Vec::new();
        if !self.connected {
            return received;
        }
        let Some(event_loop) = self.event_loop.as_mut() else {
            return received;
        };

        let mut failure = None;
        for _ in 0..MAX_EVENTS_PER_PUMP {
            match tokio::time::timeout(PUMP_POLL_TIMEOUT, event_loop.poll()).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    failure = Some(e.to_string());
                    break;
                }
                Ok(Ok(event)) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::MessageReceived(message) => received.push(message),
                    EventRoute::Disconnected => {
                        failure = Some("broker disconnected".to_string());
                        break;
                    }
                    EventRoute::SubscriptionConfirmed { packet_id } => {
                        debug!(target: "mqtt_transport", "Subscription confirmed: {}", packet_id);
                    }
                    EventRoute::InfrastructureEvent(event_str) => {
                        debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                    }
                    EventRoute::ConnectionAcknowledged { .. } | EventRoute::OutgoingEvent => {}
                },
            }
        }

        if let Some(reason) = failure {
            error!("MQTT event loop error: {}", reason);
            self.drop_connection(&reason);
        }
        received
    }
}
