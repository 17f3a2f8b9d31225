//! Configuration system for the device agent
//!
//! Loaded from a TOML file. Only `[mqtt].broker_url` is mandatory; every other
//! field has a default matching the firmware timings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub link: LinkSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub timing: TimingSection,
}

/// Device identity and channel naming
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Prefix prepended to every channel, e.g. `homectrl/tisch`
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Deployment target reported in the sketch snapshot
    #[serde(default = "default_target")]
    pub target: String,
    /// Prefix of the MQTT client identifier derived from the hardware address
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            target: default_target(),
            client_id_prefix: default_client_id_prefix(),
        }
    }
}

fn default_prefix() -> String {
    "esp32/default".to_string()
}

fn default_target() -> String {
    "UNKNOWN".to_string()
}

fn default_client_id_prefix() -> String {
    "esp32_".to_string()
}

/// Network link section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    /// Network interface to watch (default route is used when absent)
    pub interface: Option<String>,
    /// Command run to bring the link back up, e.g. `["nmcli", "device", "connect", "wlan0"]`
    #[serde(default)]
    pub reconnect_command: Vec<String>,
    /// Link connect attempts during setup
    #[serde(default = "default_setup_max_tries")]
    pub setup_max_tries: u32,
    /// Pause between setup attempts in milliseconds
    #[serde(default = "default_setup_retry_delay_ms")]
    pub setup_retry_delay_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            interface: None,
            reconnect_command: Vec::new(),
            setup_max_tries: default_setup_max_tries(),
            setup_retry_delay_ms: default_setup_retry_delay_ms(),
        }
    }
}

fn default_setup_max_tries() -> u32 {
    10
}

fn default_setup_retry_delay_ms() -> u64 {
    2000
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Upper bound for waiting on ConnAck during a connect attempt
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
    /// Capacity of the outgoing request queue
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

/// rumqttc refuses keep-alive intervals shorter than this
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

fn default_keep_alive_secs() -> u64 {
    60
}

impl MqttSection {
    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        Self::get_env_var_optional(self.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        Self::get_env_var_optional(self.password_env.as_ref())
    }
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_max_packet_size() -> u32 {
    2048
}

fn default_request_capacity() -> usize {
    64
}

/// Supervisor, reboot and loop timings in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSection {
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_session_retry_ms")]
    pub session_retry_ms: u64,
    #[serde(default = "default_reboot_delay_ms")]
    pub reboot_delay_ms: u64,
    #[serde(default = "default_reboot_grace_ms")]
    pub reboot_grace_ms: u64,
    #[serde(default = "default_loop_pause_ms")]
    pub loop_pause_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            session_retry_ms: default_session_retry_ms(),
            reboot_delay_ms: default_reboot_delay_ms(),
            reboot_grace_ms: default_reboot_grace_ms(),
            loop_pause_ms: default_loop_pause_ms(),
        }
    }
}

fn default_monitor_interval_ms() -> u64 {
    10_000
}

fn default_session_retry_ms() -> u64 {
    5_000
}

fn default_reboot_delay_ms() -> u64 {
    5_000
}

fn default_reboot_grace_ms() -> u64 {
    1_000
}

fn default_loop_pause_ms() -> u64 {
    10
}

impl TimingSection {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn session_retry(&self) -> Duration {
        Duration::from_millis(self.session_retry_ms)
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms)
    }

    pub fn reboot_grace(&self) -> Duration {
        Duration::from_millis(self.reboot_grace_ms)
    }

    pub fn loop_pause(&self) -> Duration {
        Duration::from_millis(self.loop_pause_ms)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid channel prefix: {0}")]
    InvalidPrefix(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_prefix(&self.device.prefix)?;
        validate_broker_url(&self.mqtt.broker_url)?;

        if self.device.client_id_prefix.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.client_id_prefix must not be empty".to_string(),
            ));
        }
        if self.mqtt.request_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.request_capacity must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be at least {MIN_KEEP_ALIVE_SECS}, got {}",
                self.mqtt.keep_alive_secs
            )));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.timing.monitor_interval_ms == 0 || self.timing.session_retry_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "timing intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
prefix = "test/node"
target = "TEST"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Channel prefixes must be non-empty MQTT topic levels without wildcards
fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidPrefix(
            "prefix must contain at least one topic level".to_string(),
        ));
    }
    if let Some(bad) = trimmed.chars().find(|c| matches!(c, '+' | '#' | '\0')) {
        return Err(ConfigError::InvalidPrefix(format!(
            "'{prefix}' contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}

fn validate_broker_url(broker_url: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(broker_url).map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;
    match url.scheme() {
        "mqtt" | "mqtts" | "tcp" => {}
        other => {
            return Err(ConfigError::InvalidBrokerUrl(format!(
                "unsupported scheme '{other}' in {broker_url}"
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string()));
    }
    Ok(())
}
