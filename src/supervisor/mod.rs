//! Connectivity supervisor
//!
//! Keeps the link and the session alive without restarting the device.
//! [`Supervisor::check_and_repair`] is called on every loop iteration but only
//! acts once per monitoring interval:
//!
//! 1. If the link is down, disconnect and reconnect it once. Still down means
//!    [`ConnectivityState::LinkDown`] and no session work this round.
//! 2. If the session is down and the retry window has passed, reconnect it
//!    with the OFFLINE last will, then announce ONLINE and resubscribe to the
//!    command channel.
//!
//! Failures are logged and retried on the next interval, forever, at a fixed
//! rate.

pub mod decision;

pub use decision::{ConnectivityState, RepairPolicy, SessionDecision};

use crate::connectivity_span;
use crate::protocol::{Channel, TopicBuilder, STATUS_OFFLINE, STATUS_ONLINE};
use crate::transport::{LastWill, LinkClient, SessionClient, SessionError, SessionParams};
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Owner of all link/session health state
#[derive(Debug)]
pub struct Supervisor {
    policy: RepairPolicy,
    topics: TopicBuilder,
    client_id: String,
    state: ConnectivityState,
    link_ready: bool,
    reconnect_attempts: u32,
    last_monitor: Duration,
    last_session_attempt: Option<Duration>,
}

impl Supervisor {
    /// Create a supervisor whose intervals start counting at `now`
    pub fn new(policy: RepairPolicy, topics: TopicBuilder, client_id: String, now: Duration) -> Self {
        Self {
            policy,
            topics,
            client_id,
            state: ConnectivityState::Unknown,
            link_ready: false,
            reconnect_attempts: 0,
            last_monitor: now,
            last_session_attempt: Some(now),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Consecutive failed session reconnects since the last success
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether the last link check found the link usable
    pub fn link_ready(&self) -> bool {
        self.link_ready
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Connect parameters carrying the OFFLINE last will
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            client_id: self.client_id.clone(),
            last_will: LastWill {
                topic: self.topics.topic(Channel::Status),
                payload: STATUS_OFFLINE.to_string(),
                retain: true,
            },
        }
    }

    /// Record the link state found outside the periodic check (setup)
    pub fn note_link(&mut self, link_up: bool) {
        self.link_ready = link_up;
        let next = if link_up {
            ConnectivityState::LinkUpSessionDown
        } else {
            ConnectivityState::LinkDown
        };
        self.transition(next);
    }

    /// Periodic link and session repair; a no-op until the monitoring interval has passed
    pub async fn check_and_repair<L, S>(
        &mut self,
        now: Duration,
        link: &mut L,
        session: &mut S,
    ) -> ConnectivityState
    where
        L: LinkClient + ?Sized,
        S: SessionClient + ?Sized,
    {
        if !self.policy.should_monitor(now, self.last_monitor) {
            return self.state;
        }
        self.last_monitor = now;

        let span = connectivity_span!(client_id = %self.client_id, state = %self.state);
        async {
            if !self.repair_link(link).await {
                return;
            }
            self.repair_session(now, session).await;
        }
        .instrument(span)
        .await;

        self.state
    }

    /// Returns whether the link is usable after the check
    async fn repair_link<L: LinkClient + ?Sized>(&mut self, link: &mut L) -> bool {
        debug!(local_address = ?link.local_address(), "Monitoring link");
        if link_usable(link) {
            self.link_ready = true;
            if !self.state.link_up() {
                self.transition(ConnectivityState::LinkUpSessionDown);
            }
            return true;
        }

        warn!("Link connection lost, reconnecting");
        if let Err(e) = link.disconnect().await {
            warn!("Link disconnect failed: {}", e);
        }
        if let Err(e) = link.connect().await {
            error!("Link reconnect failed: {}", e);
        }

        if link_usable(link) {
            info!("Link connection restored");
            self.link_ready = true;
            self.transition(ConnectivityState::LinkUpSessionDown);
            true
        } else {
            error!("Link reconnection failed, trying again later; not monitoring session");
            self.link_ready = false;
            self.transition(ConnectivityState::LinkDown);
            false
        }
    }

    async fn repair_session<S: SessionClient + ?Sized>(&mut self, now: Duration, session: &mut S) {
        let decision = self.policy.session_decision(
            session.is_connected(),
            now,
            self.last_session_attempt,
            self.reconnect_attempts,
        );

        match decision {
            SessionDecision::AlreadyConnected => {
                debug!("Monitoring session... online");
                self.transition(ConnectivityState::LinkUpSessionUp);
            }
            SessionDecision::Wait => {
                debug!("Session down, retry window still open");
                self.transition(ConnectivityState::LinkUpSessionDown);
            }
            SessionDecision::Attempt { attempt } => {
                self.last_session_attempt = Some(now);
                self.reconnect_attempts = attempt;
                warn!(attempt, "Session connection lost, trying to reconnect");

                match self.establish_session(session).await {
                    Ok(()) => {
                        info!("Session successfully reconnected");
                        self.reconnect_attempts = 0;
                        self.last_session_attempt = None;
                    }
                    Err(e) => {
                        error!(attempt, "Session reconnection failed: {}", e);
                        self.transition(ConnectivityState::LinkUpSessionDown);
                    }
                }
            }
        }
    }

    /// Connect with last will, announce ONLINE and subscribe to commands
    ///
    /// Only the connect itself decides success; a failed announce or
    /// subscribe is logged and left for the next reconnect.
    pub async fn establish_session<S: SessionClient + ?Sized>(
        &mut self,
        session: &mut S,
    ) -> Result<(), SessionError> {
        session.connect(&self.session_params()).await?;

        let status_topic = self.topics.topic(Channel::Status);
        if let Err(e) = session
            .publish(&status_topic, STATUS_ONLINE.as_bytes(), true)
            .await
        {
            warn!("Failed to announce {} on {}: {}", STATUS_ONLINE, status_topic, e);
        }

        let cmd_topic = self.topics.topic(Channel::Cmd);
        if let Err(e) = session.subscribe(&cmd_topic).await {
            error!("Failed to subscribe to {}: {}", cmd_topic, e);
        }

        self.link_ready = true;
        self.transition(ConnectivityState::LinkUpSessionUp);
        Ok(())
    }

    fn transition(&mut self, next: ConnectivityState) {
        decision::log_state_transition(self.state, next);
        self.state = next;
    }
}

/// Associated and holding a real address
pub fn link_usable<L: LinkClient + ?Sized>(link: &L) -> bool {
    link.is_connected()
        && link
            .local_address()
            .is_some_and(|address| !address.is_unspecified())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLink, FakeSession};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(
            RepairPolicy::default(),
            TopicBuilder::new("esp32/default"),
            "esp32_1a-2b-3c".to_string(),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_no_action_before_monitor_interval() {
        let mut sup = supervisor();
        let mut link = FakeLink::down();
        let mut session = FakeSession::new();

        let state = sup.check_and_repair(secs(10), &mut link, &mut session).await;

        assert_eq!(state, ConnectivityState::Unknown);
        assert_eq!(link.connect_calls(), 0);
        assert_eq!(session.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_link_down_skips_session() {
        let mut sup = supervisor();
        let mut link = FakeLink::down();
        let mut session = FakeSession::new();

        let state = sup.check_and_repair(secs(11), &mut link, &mut session).await;

        assert_eq!(state, ConnectivityState::LinkDown);
        assert!(!sup.link_ready());
        assert_eq!(link.disconnect_calls(), 1);
        assert_eq!(link.connect_calls(), 1);
        assert_eq!(session.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_link_restored_by_reconnect_then_session_attempted() {
        let mut sup = supervisor();
        let mut link = FakeLink::down();
        link.restore_on_connect(true);
        let mut session = FakeSession::new();

        let state = sup.check_and_repair(secs(11), &mut link, &mut session).await;

        assert_eq!(state, ConnectivityState::LinkUpSessionUp);
        assert_eq!(session.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_successful_reconnect_announces_and_subscribes() {
        let mut sup = supervisor();
        let mut link = FakeLink::up();
        let mut session = FakeSession::new();

        let state = sup.check_and_repair(secs(11), &mut link, &mut session).await;

        assert_eq!(state, ConnectivityState::LinkUpSessionUp);
        assert_eq!(sup.reconnect_attempts(), 0);

        let params = session.last_params().expect("connect params recorded");
        assert_eq!(params.client_id, "esp32_1a-2b-3c");
        assert_eq!(params.last_will.topic, "esp32/default/status");
        assert_eq!(params.last_will.payload, "OFFLINE");
        assert!(params.last_will.retain);

        let published = session.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "esp32/default/status");
        assert_eq!(published[0].payload, "ONLINE");
        assert!(published[0].retain);
        assert_eq!(session.subscriptions(), vec!["esp32/default/cmd".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_reconnects_count_up_then_reset() {
        let mut sup = supervisor();
        let mut link = FakeLink::up();
        let mut session = FakeSession::new();
        session.fail_next_connects(2);

        sup.check_and_repair(secs(11), &mut link, &mut session).await;
        assert_eq!(sup.reconnect_attempts(), 1);
        assert_eq!(sup.state(), ConnectivityState::LinkUpSessionDown);

        sup.check_and_repair(secs(22), &mut link, &mut session).await;
        assert_eq!(sup.reconnect_attempts(), 2);

        sup.check_and_repair(secs(33), &mut link, &mut session).await;
        assert_eq!(sup.reconnect_attempts(), 0);
        assert_eq!(sup.state(), ConnectivityState::LinkUpSessionUp);
        assert_eq!(session.connect_calls(), 3);
    }

    #[tokio::test]
    async fn test_session_retry_is_rate_limited() {
        let policy = RepairPolicy {
            monitor_interval: Duration::from_millis(100),
            session_retry: secs(5),
        };
        let mut sup = Supervisor::new(
            policy,
            TopicBuilder::new("esp32/default"),
            "id".to_string(),
            Duration::ZERO,
        );
        let mut link = FakeLink::up();
        let mut session = FakeSession::new();
        session.fail_next_connects(u32::MAX);

        let mut now = Duration::ZERO;
        let mut times = Vec::new();
        for _ in 0..200 {
            now += Duration::from_millis(150);
            let before = session.connect_calls();
            sup.check_and_repair(now, &mut link, &mut session).await;
            if session.connect_calls() > before {
                times.push(now);
            }
        }

        assert!(!times.is_empty());
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] > secs(5));
        }
        assert_eq!(sup.reconnect_attempts() as usize, times.len());
    }

    #[tokio::test]
    async fn test_fully_connected_check_is_idempotent() {
        let mut sup = supervisor();
        let mut link = FakeLink::up();
        let mut session = FakeSession::connected();

        sup.check_and_repair(secs(11), &mut link, &mut session).await;
        let state = sup.state();
        sup.check_and_repair(secs(22), &mut link, &mut session).await;

        assert_eq!(state, ConnectivityState::LinkUpSessionUp);
        assert_eq!(sup.state(), state);
        assert_eq!(link.connect_calls(), 0);
        assert_eq!(link.disconnect_calls(), 0);
        assert_eq!(session.connect_calls(), 0);
        assert!(session.published().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_not_fatal() {
        let mut sup = supervisor();
        let mut session = FakeSession::new();
        session.fail_subscribe(true);

        assert!(sup.establish_session(&mut session).await.is_ok());
        assert_eq!(sup.state(), ConnectivityState::LinkUpSessionUp);
    }

    #[test]
    fn test_note_link() {
        let mut sup = supervisor();
        sup.note_link(true);
        assert_eq!(sup.state(), ConnectivityState::LinkUpSessionDown);
        assert!(sup.link_ready());
        sup.note_link(false);
        assert_eq!(sup.state(), ConnectivityState::LinkDown);
    }
}
