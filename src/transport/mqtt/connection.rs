//! Pure connection configuration for the MQTT session
//!
//! Builds rumqttc options (broker address, credentials, last will) for each
//! connect attempt. Nothing here touches the network.

use crate::config::{MqttSection, MIN_KEEP_ALIVE_SECS};
use crate::transport::{SessionError, SessionParams};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Broker host and port extracted from the configured URL
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `mqtt://host[:port]`, `tcp://host[:port]` or `mqtts://host[:port]`
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, SessionError> {
    let url =
        Url::parse(broker_url).map_err(|_| SessionError::InvalidBrokerUrl(broker_url.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidBrokerUrl(broker_url.to_string()))?;
    let tls = url.scheme() == "mqtts";
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Build MQTT options for one connect attempt
///
/// Credentials are resolved from the configured environment variables at
/// call time so rotated secrets are picked up on the next reconnect.
pub fn configure_mqtt_options(
    config: &MqttSection,
    params: &SessionParams,
) -> Result<MqttOptions, SessionError> {
    let broker = parse_broker_url(&config.broker_url)?;
    let mut mqtt_options = MqttOptions::new(&params.client_id, broker.host, broker.port);

    if broker.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        let password = config.password().unwrap_or_default();
        mqtt_options.set_credentials(&username, &password);
    }

    // Sections built without validate() must not reach rumqttc's keep-alive assert
    let keep_alive = config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS);
    mqtt_options.set_keep_alive(Duration::from_secs(keep_alive));
    mqtt_options.set_max_packet_size(Some(config.max_packet_size));

    let will = &params.last_will;
    let lwt = LastWill::new(
        &will.topic,
        will.payload.clone(),
        QoS::AtLeastOnce,
        will.retain,
        None,
    );
    mqtt_options.set_last_will(lwt);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LastWill;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 5,
            max_packet_size: 2048,
            request_capacity: 64,
        }
    }

    fn test_params() -> SessionParams {
        SessionParams {
            client_id: "esp32_1a-2b-3c".to_string(),
            last_will: LastWill {
                topic: "esp32/default/status".to_string(),
                payload: "OFFLINE".to_string(),
                retain: true,
            },
        }
    }

    #[test]
    fn test_parse_broker_url_defaults() {
        let plain = parse_broker_url("mqtt://broker.local").unwrap();
        assert_eq!(plain.port, 1883);
        assert!(!plain.tls);

        let secure = parse_broker_url("mqtts://broker.local").unwrap();
        assert_eq!(secure.port, 8883);
        assert!(secure.tls);

        let explicit = parse_broker_url("tcp://10.0.0.2:11883").unwrap();
        assert_eq!(explicit.host, "10.0.0.2");
        assert_eq!(explicit.port, 11883);
    }

    #[test]
    fn test_invalid_broker_url() {
        let result = parse_broker_url("invalid-url");
        assert!(matches!(result, Err(SessionError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_configure_mqtt_options_sets_identity_and_will() {
        let options = configure_mqtt_options(&test_mqtt_config(), &test_params()).unwrap();

        assert_eq!(options.client_id(), "esp32_1a-2b-3c");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));

        let will = options.last_will().expect("last will must be configured");
        assert_eq!(&will.topic[..], b"esp32/default/status");
        assert_eq!(&will.message[..], b"OFFLINE");
        assert!(will.retain);
        assert_eq!(will.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_configure_mqtt_options_rejects_bad_url() {
        let mut config = test_mqtt_config();
        config.broker_url = "::::".to_string();
        assert!(configure_mqtt_options(&config, &test_params()).is_err());
    }

    #[test]
    fn test_short_keep_alive_is_raised_to_client_minimum() {
        let mut config = test_mqtt_config();
        config.keep_alive_secs = 2;
        let options = configure_mqtt_options(&config, &test_params()).unwrap();
        assert_eq!(options.keep_alive(), Duration::from_secs(MIN_KEEP_ALIVE_SECS));
    }
}
