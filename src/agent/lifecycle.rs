//! The node agent control loop
//!
//! One struct owns every piece of mutable state and is driven by a single
//! cooperative loop. Each iteration runs, in order: reboot check,
//! connectivity check, session pump (with command dispatch), update pump,
//! interrupt drain and scheduled publishing.

use crate::clock::Clock;
use crate::commands::{normalize_payload, CommandRegistry, DeviceAction};
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::lifecycle_span;
use crate::protocol::{compose_client_id, Channel, TopicBuilder, STATUS_OFFLINE};
use crate::publisher::{StatePublisher, SystemProbe};
use crate::reboot::{RebootTimer, Restarter};
use crate::scheduler::{CadenceTier, Fired, Scheduler};
use crate::signals::SignalFlags;
use crate::supervisor::{link_usable, ConnectivityState, RepairPolicy, Supervisor};
use crate::transport::mqtt::MessageHandler;
use crate::transport::{InboundMessage, LinkClient, SessionClient, UpdatePump};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Spacing of session pumps while the reboot grace pause runs
const GRACE_PUMP_INTERVAL: Duration = Duration::from_millis(20);

/// Everything the agent talks to
pub struct Collaborators<L, S, U, C, R, P> {
    pub link: L,
    pub session: S,
    pub updates: U,
    pub clock: C,
    pub restarter: R,
    pub probe: P,
    pub signals: SignalFlags,
}

/// Where the agent is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Created,
    Running,
    Restarting,
    Stopped,
}

/// What one loop iteration ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Continue,
    /// The restart action ran; with a real restarter this never returns
    Restarted,
    ShutdownRequested,
}

pub struct NodeAgent<L, S, U, C, R, P>
where
    L: LinkClient,
    S: SessionClient,
    U: UpdatePump,
    C: Clock,
    R: Restarter,
    P: SystemProbe,
{
    config: AgentConfig,
    topics: TopicBuilder,
    link: L,
    session: S,
    updates: U,
    clock: C,
    restarter: R,
    signals: SignalFlags,
    publisher: StatePublisher<P>,
    supervisor: Supervisor,
    scheduler: Scheduler,
    commands: CommandRegistry,
    reboot: RebootTimer,
    phase: AgentPhase,
}

impl<L, S, U, C, R, P> NodeAgent<L, S, U, C, R, P>
where
    L: LinkClient,
    S: SessionClient,
    U: UpdatePump,
    C: Clock,
    R: Restarter,
    P: SystemProbe,
{
    /// Build the agent; fails only if the command registry is inconsistent
    pub fn new(config: AgentConfig, parts: Collaborators<L, S, U, C, R, P>) -> AgentResult<Self> {
        let now = parts.clock.now();
        let topics = TopicBuilder::new(&config.device.prefix);
        let commands = CommandRegistry::with_builtins(config.timing.reboot_delay())?;
        let supervisor = Supervisor::new(
            repair_policy(&config),
            topics.clone(),
            compose_client_id(&config.device.client_id_prefix, None),
            now,
        );

        Ok(Self {
            publisher: StatePublisher::new(parts.probe, config.device.target.clone(), Utc::now()),
            reboot: RebootTimer::new(config.timing.reboot_delay()),
            scheduler: Scheduler::new(now),
            supervisor,
            commands,
            topics,
            link: parts.link,
            session: parts.session,
            updates: parts.updates,
            clock: parts.clock,
            restarter: parts.restarter,
            signals: parts.signals,
            config,
            phase: AgentPhase::Created,
        })
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.supervisor.state()
    }

    pub fn client_id(&self) -> &str {
        self.supervisor.client_id()
    }

    pub fn reboot_pending(&self) -> bool {
        self.reboot.is_armed()
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    /// Bring up link and session once; failures are left to the supervisor
    pub async fn setup(&mut self) -> AgentResult<()> {
        let span = lifecycle_span!(phase = "setup", prefix = %self.topics.prefix());
        self.setup_inner().instrument(span).await
    }

    async fn setup_inner(&mut self) -> AgentResult<()> {
        info!("Setting up node agent v{}", env!("CARGO_PKG_VERSION"));

        let link_up = self.setup_link().await;

        let mac = match self.link.hardware_address() {
            Ok(mac) => Some(mac),
            Err(e) => {
                warn!("Could not read hardware address: {}", e);
                None
            }
        };
        let client_id = compose_client_id(&self.config.device.client_id_prefix, mac.as_ref());
        info!(client_id = %client_id, "Session client id");

        let now = self.clock.now();
        self.supervisor = Supervisor::new(
            repair_policy(&self.config),
            self.topics.clone(),
            client_id,
            now,
        );
        self.supervisor.note_link(link_up);

        if link_up {
            if let Err(e) = self.supervisor.establish_session(&mut self.session).await {
                error!("Initial session connect failed, supervisor will retry: {}", e);
            }
        } else {
            warn!("Link down after setup, skipping initial session connect");
        }

        info!(commands = ?self.commands.list_commands(), "Commands registered");

        self.scheduler = Scheduler::new(self.clock.now());
        self.phase = AgentPhase::Running;
        self.publish(Channel::Log, "Init complete, starting main loop", false)
            .await;
        Ok(())
    }

    async fn setup_link(&mut self) -> bool {
        let max_tries = self.config.link.setup_max_tries;
        let retry_delay = Duration::from_millis(self.config.link.setup_retry_delay_ms);

        for attempt in 1..=max_tries {
            if link_usable(&self.link) {
                break;
            }
            info!(attempt, max_tries, "Connecting link");
            if let Err(e) = self.link.connect().await {
                warn!(attempt, "Link connect failed: {}", e);
            }
            if link_usable(&self.link) {
                break;
            }
            if attempt < max_tries {
                tokio::time::sleep(retry_delay).await;
            }
        }

        let up = link_usable(&self.link);
        if up {
            info!(address = ?self.link.local_address(), "Link connected");
        } else {
            error!(max_tries, "Link setup failed, leaving repair to the supervisor");
        }
        up
    }

    /// Run iterations until shutdown is requested or the restart action returns
    pub async fn run(&mut self) -> AgentResult<()> {
        let pause = self.config.timing.loop_pause();
        loop {
            match self.run_iteration().await {
                IterationOutcome::Continue => {}
                IterationOutcome::ShutdownRequested => {
                    self.shutdown().await;
                    return Ok(());
                }
                IterationOutcome::Restarted => return Ok(()),
            }
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    /// One pass through the control loop
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        if self.signals.shutdown_requested() {
            return IterationOutcome::ShutdownRequested;
        }

        let now = self.clock.now();
        if self.reboot.poll(now) {
            return self.restart().await;
        }

        self.supervisor
            .check_and_repair(now, &mut self.link, &mut self.session)
            .await;

        let messages = self.session.pump().await;
        for message in messages {
            self.handle_message(message, now).await;
        }

        self.updates.pump().await;

        if self.signals.take_interrupt() {
            self.publish(Channel::Log, "interrupt received", false).await;
        }

        let fired = self.scheduler.tick(now);
        if !fired.is_empty() {
            self.publish_due(&fired, now).await;
        }

        IterationOutcome::Continue
    }

    async fn handle_message(&mut self, message: InboundMessage, now: Duration) {
        let cmd_topic = self.topics.topic(Channel::Cmd);
        if !MessageHandler::should_process_message(&message, &cmd_topic) {
            debug!(topic = %message.topic, retain = message.retain, "Ignoring message");
            return;
        }

        let text = normalize_payload(&message.payload);
        self.publish(
            Channel::Log,
            &format!("received command: \"{text}\""),
            false,
        )
        .await;

        let reply = self.commands.dispatch(&text);
        self.publish(Channel::Result, &reply.text, false).await;

        if let Some(DeviceAction::Reboot) = reply.action {
            self.reboot.arm(now);
        }
    }

    async fn publish_due(&mut self, fired: &Fired, now: Duration) {
        for tier in fired.iter() {
            match tier {
                CadenceTier::OneSecond => {}
                CadenceTier::TenSeconds => {
                    let snapshot = self.publisher.cpu_snapshot(now);
                    self.publish_json(Channel::Cpu, &snapshot).await;
                }
                CadenceTier::ThirtySeconds => {
                    let snapshot = self.publisher.network_snapshot(
                        self.link.local_address(),
                        self.supervisor.client_id(),
                        self.supervisor.reconnect_attempts(),
                    );
                    self.publish_json(Channel::Network, &snapshot).await;
                }
                CadenceTier::SixtySeconds => {
                    let snapshot = self.publisher.sketch_snapshot();
                    self.publish_json(Channel::Sketch, &snapshot).await;
                }
            }
        }
    }

    async fn publish_json<T: Serialize>(&mut self, channel: Channel, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.publish(channel, &json, false).await,
            Err(e) => error!(channel = %channel, "Failed to serialize snapshot: {}", e),
        }
    }

    /// Publish on a channel; dropped with an error log while the session is down
    pub async fn publish(&mut self, channel: Channel, text: &str, retain: bool) {
        if channel == Channel::Log {
            info!(target: "nodeagent::device_log", "{}", text);
        }
        if !self.session.is_connected() {
            error!(channel = %channel, "Session connection lost, message dropped");
            return;
        }
        let topic = self.topics.topic(channel);
        if let Err(e) = self.session.publish(&topic, text.as_bytes(), retain).await {
            error!(topic = %topic, "Publish failed: {}", e);
        }
    }

    async fn restart(&mut self) -> IterationOutcome {
        self.phase = AgentPhase::Restarting;
        self.publish(Channel::Log, "Rebooting now", false).await;
        self.drain_session(self.config.timing.reboot_grace()).await;
        self.restarter.restart();
        IterationOutcome::Restarted
    }

    /// Keep the session pumping for `grace` so queued publishes reach the broker
    async fn drain_session(&mut self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let ignored = self.session.pump().await;
            if !ignored.is_empty() {
                debug!(count = ignored.len(), "Ignoring messages received while rebooting");
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(GRACE_PUMP_INTERVAL)).await;
        }
    }

    /// Announce OFFLINE and close the session
    pub async fn shutdown(&mut self) {
        let span = lifecycle_span!(phase = "shutdown");
        async {
            info!("Shutting down node agent");
            self.publish(Channel::Status, STATUS_OFFLINE, true).await;
            if self.session.is_connected() {
                if let Err(e) = self.session.disconnect().await {
                    warn!("Session disconnect failed: {}", e);
                }
            }
            self.phase = AgentPhase::Stopped;
        }
        .instrument(span)
        .await;
    }
}

fn repair_policy(config: &AgentConfig) -> RepairPolicy {
    RepairPolicy {
        monitor_interval: config.timing.monitor_interval(),
        session_retry: config.timing.session_retry(),
    }
}
