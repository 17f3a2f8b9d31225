//! Channel naming, status payloads and client identifier composition
//!
//! Every channel lives under the configured device prefix:
//! `<prefix>/status`, `<prefix>/cmd`, `<prefix>/result`, `<prefix>/cpu`,
//! `<prefix>/network`, `<prefix>/sketch` and `<prefix>/log`.

use std::fmt;

/// Retained payload published on the status channel once the session is up
pub const STATUS_ONLINE: &str = "ONLINE";
/// Last-will payload on the status channel
pub const STATUS_OFFLINE: &str = "OFFLINE";

/// Named publish/subscribe destinations below the device prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Retained ONLINE/OFFLINE marker, also the last-will topic
    Status,
    /// Inbound command lines (subscribed)
    Cmd,
    /// Outbound command responses
    Result,
    Cpu,
    Network,
    Sketch,
    /// Free-text diagnostics
    Log,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Cmd => "cmd",
            Channel::Result => "result",
            Channel::Cpu => "cpu",
            Channel::Network => "network",
            Channel::Sketch => "sketch",
            Channel::Log => "log",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix-qualified topic construction
#[derive(Debug, Clone, PartialEq)]
pub struct TopicBuilder {
    prefix: String,
}

impl TopicBuilder {
    /// Build from a device prefix; surrounding and repeated slashes are collapsed
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: canonicalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full topic for a channel: `<prefix>/<channel>`
    pub fn topic(&self, channel: Channel) -> String {
        format!("{}/{}", self.prefix, channel.as_str())
    }
}

/// MQTT topics are not rooted, so leading slashes are dropped as well
fn canonicalize_prefix(prefix: &str) -> String {
    prefix
        .split('/')
        .filter(|level| !level.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Six-byte link-layer hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Parse the colon separated form found in `/sys/class/net/<if>/address`
    pub fn parse(text: &str) -> Option<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = text.trim().split(':');
        for byte in bytes.iter_mut() {
            *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Session client identifier: prefix plus the last three MAC bytes, e.g. `esp32_1a-2b-3c`
///
/// Bytes are unpadded lower hex (`0x0f` becomes `f`), matching ids already
/// provisioned on brokers for deployed devices.
pub fn compose_client_id(prefix: &str, mac: Option<&MacAddress>) -> String {
    match mac {
        Some(mac) => format!(
            "{prefix}{:x}-{:x}-{:x}",
            mac.0[3], mac.0[4], mac.0[5]
        ),
        None => format!("{prefix}unknown"),
    }
}
