//! Pure routing of rumqttc events
//!
//! Turns raw event-loop output into [`EventRoute`] decisions so the session
//! client's I/O code stays a thin loop.

use crate::transport::InboundMessage;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::Event;
use tracing::debug;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(ack) => EventRoute::ConnectionAcknowledged {
                    accepted: ack.code == ConnectReturnCode::Success,
                    reason: format!("{:?}", ack.code),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                }),
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Whether an inbound message is a live command for `expected_topic`
    ///
    /// Retained commands are ignored: a retained `reset` would otherwise
    /// reboot the device on every reconnect.
    pub fn should_process_message(message: &InboundMessage, expected_topic: &str) -> bool {
        if message.retain {
            debug!("Ignoring retained message on topic: {}", message.topic);
            return false;
        }

        if message.topic != expected_topic {
            debug!(
                "Topic mismatch: expected {}, got {}",
                expected_topic, message.topic
            );
            return false;
        }

        true
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck received; `accepted` is false when the broker refused us
    ConnectionAcknowledged { accepted: bool, reason: String },
    /// Message received on subscribed topic
    MessageReceived(InboundMessage),
    /// MQTT broker disconnected
    Disconnected,
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PingResp, PubAck, ...)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
