//! Fake collaborators for driving the agent without a network
//!
//! Every fake is `Clone` with shared state, so a test can hand one copy to
//! the agent and keep another to script behavior and inspect calls.

use crate::protocol::MacAddress;
use crate::publisher::{ChipInfo, MemoryStats, SystemProbe};
use crate::reboot::Restarter;
use crate::transport::{
    InboundMessage, LinkClient, LinkError, SessionClient, SessionError, SessionParams, UpdatePump,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub const FAKE_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 20));
pub const FAKE_MAC: MacAddress = MacAddress([0x24, 0x6f, 0x28, 0x1a, 0x2b, 0x3c]);

#[derive(Debug)]
struct LinkState {
    connected: bool,
    address: Option<IpAddr>,
    mac: Option<MacAddress>,
    restore_on_connect: bool,
    connect_calls: u32,
    disconnect_calls: u32,
}

/// Scriptable link
#[derive(Debug, Clone)]
pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    fn with_state(connected: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState {
                connected,
                address: connected.then_some(FAKE_ADDRESS),
                mac: Some(FAKE_MAC),
                restore_on_connect: false,
                connect_calls: 0,
                disconnect_calls: 0,
            })),
        }
    }

    /// Associated with an address
    pub fn up() -> Self {
        Self::with_state(true)
    }

    pub fn down() -> Self {
        Self::with_state(false)
    }

    /// Make `connect()` bring the link up
    pub fn restore_on_connect(&mut self, restore: bool) {
        lock(&self.state).restore_on_connect = restore;
    }

    pub fn set_up(&self, up: bool) {
        let mut state = lock(&self.state);
        state.connected = up;
        state.address = up.then_some(FAKE_ADDRESS);
    }

    pub fn set_mac(&self, mac: Option<MacAddress>) {
        lock(&self.state).mac = mac;
    }

    pub fn connect_calls(&self) -> u32 {
        lock(&self.state).connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        lock(&self.state).disconnect_calls
    }

    fn usable(&self) -> bool {
        let state = lock(&self.state);
        state.connected && state.address.is_some()
    }
}

#[async_trait]
impl LinkClient for FakeLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        let mut state = lock(&self.state);
        state.connect_calls += 1;
        if state.restore_on_connect {
            state.connected = true;
            state.address = Some(FAKE_ADDRESS);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        let mut state = lock(&self.state);
        state.disconnect_calls += 1;
        state.connected = false;
        state.address = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn local_address(&self) -> Option<IpAddr> {
        lock(&self.state).address
    }

    fn hardware_address(&self) -> Result<MacAddress, LinkError> {
        lock(&self.state)
            .mac
            .ok_or_else(|| LinkError::HardwareAddressUnavailable("fake link has no MAC".into()))
    }
}

/// One recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    connect_calls: u32,
    disconnect_calls: u32,
    failing_connects: u32,
    fail_subscribe: bool,
    last_params: Option<SessionParams>,
    published: Vec<PublishedMessage>,
    // Prefix of `published` that a pump has flushed to the wire
    flushed: usize,
    pump_calls: u32,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    watched_link: Option<FakeLink>,
    connects_while_link_down: u32,
}

/// Scriptable session recording everything it is asked to do
#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    state: Arc<Mutex<SessionState>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Already connected, as after a successful setup
    pub fn connected() -> Self {
        let session = Self::new();
        lock(&session.state).connected = true;
        session
    }

    /// Record connects attempted while `link` is unusable
    pub fn watch_link(&self, link: &FakeLink) {
        lock(&self.state).watched_link = Some(link.clone());
    }

    pub fn fail_next_connects(&mut self, count: u32) {
        lock(&self.state).failing_connects = count;
    }

    pub fn fail_subscribe(&mut self, fail: bool) {
        lock(&self.state).fail_subscribe = fail;
    }

    /// Queue a non-retained message for the next pump
    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        self.push(topic, payload, false);
    }

    /// Queue a message the broker replays from its retained store
    pub fn push_retained(&self, topic: &str, payload: &[u8]) {
        self.push(topic, payload, true);
    }

    fn push(&self, topic: &str, payload: &[u8], retain: bool) {
        lock(&self.state).inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
            retain,
        });
    }

    /// Simulate the broker dropping the session
    pub fn drop_connection(&self) {
        lock(&self.state).connected = false;
    }

    pub fn connect_calls(&self) -> u32 {
        lock(&self.state).connect_calls
    }

    pub fn pump_calls(&self) -> u32 {
        lock(&self.state).pump_calls
    }

    /// Messages a pump has handed to the network, in publish order
    pub fn flushed(&self) -> Vec<PublishedMessage> {
        let state = lock(&self.state);
        state.published[..state.flushed].to_vec()
    }

    pub fn disconnect_calls(&self) -> u32 {
        lock(&self.state).disconnect_calls
    }

    pub fn connects_while_link_down(&self) -> u32 {
        lock(&self.state).connects_while_link_down
    }

    pub fn last_params(&self) -> Option<SessionParams> {
        lock(&self.state).last_params.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    /// Published messages on one topic, oldest first
    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state).subscriptions.clone()
    }

    pub fn clear_history(&self) {
        let mut state = lock(&self.state);
        state.published.clear();
        state.flushed = 0;
        state.subscriptions.clear();
    }
}

#[async_trait]
impl SessionClient for FakeSession {
    async fn connect(&mut self, params: &SessionParams) -> Result<(), SessionError> {
        let link_usable = {
            let state = lock(&self.state);
            state.watched_link.as_ref().map_or(true, FakeLink::usable)
        };

        let mut state = lock(&self.state);
        state.connect_calls += 1;
        state.last_params = Some(params.clone());
        if !link_usable {
            state.connects_while_link_down += 1;
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            state.connected = false;
            return Err(SessionError::ConnectionFailed(
                "fake broker refused".to_string(),
            ));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.disconnect_calls += 1;
        state.connected = false;
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(SessionError::NotConnected);
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        if state.fail_subscribe {
            return Err(SessionError::SubscriptionFailed(
                "fake broker rejected subscription".into(),
            ));
        }
        if !state.connected {
            return Err(SessionError::NotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn pump(&mut self) -> Vec<InboundMessage> {
        let mut state = lock(&self.state);
        state.pump_calls += 1;
        if !state.connected {
            return Vec::new();
        }
        state.flushed = state.published.len();
        state.inbound.drain(..).collect()
    }
}

/// Counts restarts instead of exiting
#[derive(Debug, Clone, Default)]
pub struct RecordingRestarter {
    restarts: Arc<AtomicU32>,
}

impl RecordingRestarter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl Restarter for RecordingRestarter {
    fn restart(&mut self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Probe with settable memory readings
#[derive(Debug, Clone)]
pub struct FakeProbe {
    memory: Arc<Mutex<MemoryStats>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            memory: Arc::new(Mutex::new(MemoryStats {
                total: 320 * 1024,
                free: 200 * 1024,
                max_free: 110 * 1024,
            })),
        }
    }

    pub fn set_free(&self, free: u64) {
        lock(&self.memory).free = free;
    }
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for FakeProbe {
    fn memory(&self) -> MemoryStats {
        *lock(&self.memory)
    }

    fn chip(&self) -> ChipInfo {
        ChipInfo {
            model: "FAKE-CHIP".to_string(),
            revision: 1,
            freq_mhz: 240,
        }
    }

    fn cycle_count(&self) -> u64 {
        42
    }

    fn image_size(&self) -> u64 {
        1_048_576
    }
}

/// Update pump counting how often it was driven
#[derive(Debug, Clone, Default)]
pub struct CountingUpdatePump {
    pumps: Arc<AtomicU32>,
}

impl CountingUpdatePump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pumps(&self) -> u32 {
        self.pumps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdatePump for CountingUpdatePump {
    async fn pump(&mut self) {
        self.pumps.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_session_records_link_violations() {
        let link = FakeLink::down();
        let mut session = FakeSession::new();
        session.watch_link(&link);

        session.connect(&params()).await.unwrap();
        assert_eq!(session.connects_while_link_down(), 1);

        link.set_up(true);
        session.connect(&params()).await.unwrap();
        assert_eq!(session.connects_while_link_down(), 1);
    }

    #[tokio::test]
    async fn test_fake_session_pump_drains_queue() {
        let mut session = FakeSession::connected();
        session.push_inbound("a/cmd", b"hello");
        assert_eq!(session.pump().await.len(), 1);
        assert!(session.pump().await.is_empty());
    }

    #[tokio::test]
    async fn test_fake_link_clones_share_state() {
        let link = FakeLink::down();
        let mut handle = link.clone();
        handle.restore_on_connect(true);
        handle.connect().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.connect_calls(), 1);
    }

    fn params() -> SessionParams {
        SessionParams {
            client_id: "id".to_string(),
            last_will: crate::transport::LastWill {
                topic: "t/status".to_string(),
                payload: "OFFLINE".to_string(),
                retain: true,
            },
        }
    }
}
