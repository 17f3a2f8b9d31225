//! Configuration loading and validation tests
//!
//! Observable outcomes only: what loads, what the defaults are, what is rejected.

use nodeagent::config::{AgentConfig, ConfigError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_full_config_loads_from_file() {
    let file = write_config(
        r#"
[device]
prefix = "homectrl/tisch"
target = "ESP32-DEVKIT"
client_id_prefix = "tisch_"

[link]
interface = "wlan0"
reconnect_command = ["nmcli", "device", "connect", "wlan0"]
setup_max_tries = 4
setup_retry_delay_ms = 500

[mqtt]
broker_url = "mqtts://broker.example.com:8883"
username_env = "MQTT_USER"
password_env = "MQTT_PASS"
keep_alive_secs = 30

[timing]
monitor_interval_ms = 20000
reboot_delay_ms = 3000
"#,
    );

    let config = AgentConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.device.prefix, "homectrl/tisch");
    assert_eq!(config.device.client_id_prefix, "tisch_");
    assert_eq!(config.link.interface.as_deref(), Some("wlan0"));
    assert_eq!(config.link.reconnect_command.len(), 4);
    assert_eq!(config.link.setup_max_tries, 4);
    assert_eq!(config.mqtt.keep_alive_secs, 30);
    assert_eq!(config.mqtt.username_env.as_deref(), Some("MQTT_USER"));
    assert_eq!(config.timing.monitor_interval(), Duration::from_secs(20));
    assert_eq!(config.timing.reboot_delay(), Duration::from_secs(3));
    // Unset timing keys keep firmware defaults
    assert_eq!(config.timing.session_retry(), Duration::from_secs(5));
}

#[test]
fn test_minimal_config_applies_defaults() {
    let file = write_config("[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n");

    let config = AgentConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.device.prefix, "esp32/default");
    assert_eq!(config.device.target, "UNKNOWN");
    assert_eq!(config.device.client_id_prefix, "esp32_");
    assert_eq!(config.link.interface, None);
    assert!(config.link.reconnect_command.is_empty());
    assert_eq!(config.link.setup_max_tries, 10);
    assert_eq!(config.mqtt.connect_timeout_secs, 5);
    assert_eq!(config.mqtt.max_packet_size, 2048);
    assert_eq!(config.timing.monitor_interval(), Duration::from_secs(10));
    assert_eq!(config.timing.reboot_grace(), Duration::from_secs(1));
    assert_eq!(config.timing.loop_pause(), Duration::from_millis(10));
}

#[test]
fn test_missing_mqtt_section_is_rejected() {
    let file = write_config("[device]\nprefix = \"a/b\"\n");
    let result = AgentConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_wildcard_prefix_is_rejected() {
    let file = write_config(
        "[device]\nprefix = \"esp32/+\"\n[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n",
    );
    let result = AgentConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidPrefix(_))));
}

#[test]
fn test_unsupported_broker_scheme_is_rejected() {
    let file = write_config("[mqtt]\nbroker_url = \"http://localhost:1883\"\n");
    let result = AgentConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_zero_interval_is_rejected() {
    let file = write_config(
        "[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n[timing]\nmonitor_interval_ms = 0\n",
    );
    let result = AgentConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_missing_file_reports_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = AgentConfig::load_from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_round_trips_through_toml() {
    let file = write_config("[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\n");
    let config = AgentConfig::load_from_file(file.path()).unwrap();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = AgentConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(reparsed, config);
}

#[test]
fn test_keep_alive_below_client_minimum_is_rejected() {
    let file = write_config(
        "[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\nkeep_alive_secs = 2\n",
    );
    let result = AgentConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));

    let file = write_config(
        "[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\nkeep_alive_secs = 5\n",
    );
    let config = AgentConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.mqtt.keep_alive_secs, 5);
}
