use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::SmallVec;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

use crate::config::{DeliveryPolicy, HubConfig};
use crate::metrics::HubMetrics;

use super::envelope::{Envelope, SessionId};
use super::registry::{Registry, SessionEntry};
use super::stats::{HubStats, HubStatsSnapshot};
use super::{Frame, HubError, SessionRegistration};

/// Everything the router does, in the order callers issued it. The channel is
/// unbounded so a deregistration can never be lost or block its sender;
/// publishes are bounded separately by the permit they carry.
enum Command {
    Publish {
        envelope: Envelope,
        _permit: OwnedSemaphorePermit,
    },
    Register {
        id: SessionId,
        sender: mpsc::Sender<Frame>,
        ack: oneshot::Sender<()>,
    },
    Deregister {
        id: SessionId,
    },
    Subscribe {
        id: SessionId,
        topic: String,
    },
    Unsubscribe {
        id: SessionId,
        topic: String,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum RemovalReason {
    Disconnected,
    Evicted,
    QueueClosed,
}

impl RemovalReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Evicted => "evicted",
            Self::QueueClosed => "queue_closed",
        }
    }
}

/// Cloneable handle to the broadcast hub.
///
/// Collaborators publish through this handle; sessions use it to register,
/// deregister and manage subscriptions. All state lives in the [`HubRouter`]
/// task, so the handle itself holds no locks.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    publish_permits: Arc<Semaphore>,
    session_queue_capacity: usize,
    stats: Arc<HubStats>,
}

impl Hub {
    /// Build a hub handle and the router that must be driven by [`HubRouter::run`]
    pub fn new(config: &HubConfig) -> (Self, HubRouter) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let publish_permits = Arc::new(Semaphore::new(config.router_queue_capacity.max(1)));
        let stats = Arc::new(HubStats::default());

        let hub = Self {
            commands: commands_tx,
            publish_permits: publish_permits.clone(),
            session_queue_capacity: config.session_queue_capacity.max(1),
            stats: stats.clone(),
        };

        let router = HubRouter {
            commands: commands_rx,
            publish_permits,
            registry: Registry::new(),
            policy: config.delivery_policy,
            max_subscriptions: config.max_subscriptions_per_session,
            stats,
        };

        (hub, router)
    }

    /// Build a hub and spawn its router on the current runtime
    pub fn spawn(config: &HubConfig) -> (Self, JoinHandle<()>) {
        let (hub, router) = Self::new(config);
        let handle = tokio::spawn(router.run());
        (hub, handle)
    }

    /// Register a new session and wait until the router has added it.
    ///
    /// The session receives every event accepted after this returns.
    pub async fn register(&self) -> Result<SessionRegistration, HubError> {
        let id = SessionId::generate();
        let (sender, receiver) = mpsc::channel(self.session_queue_capacity);
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(Command::Register {
                id: id.clone(),
                sender,
                ack: ack_tx,
            })
            .map_err(|_| HubError::Closed)?;

        ack_rx.await.map_err(|_| HubError::Closed)?;

        Ok(SessionRegistration { id, receiver })
    }

    /// Request removal of a session. Safe to call repeatedly and from any
    /// task; removal happens at most once.
    pub fn deregister(&self, id: &SessionId) {
        if self
            .commands
            .send(Command::Deregister { id: id.clone() })
            .is_err()
        {
            tracing::debug!(session_id = %id, "Hub router stopped, deregistration skipped");
        }
    }

    /// Add a topic to the session's subscription set. Applies to events
    /// published after this call.
    pub fn subscribe(&self, id: &SessionId, topic: impl Into<String>) {
        let topic = topic.into();
        if self
            .commands
            .send(Command::Subscribe {
                id: id.clone(),
                topic,
            })
            .is_err()
        {
            tracing::debug!(session_id = %id, "Hub router stopped, subscribe skipped");
        }
    }

    /// Remove a topic from the session's subscription set. Events published
    /// before this call are still delivered.
    pub fn unsubscribe(&self, id: &SessionId, topic: impl Into<String>) {
        let topic = topic.into();
        if self
            .commands
            .send(Command::Unsubscribe {
                id: id.clone(),
                topic,
            })
            .is_err()
        {
            tracing::debug!(session_id = %id, "Hub router stopped, unsubscribe skipped");
        }
    }

    /// Publish an event to every connected session. Never blocks; if the
    /// router is saturated the event is dropped.
    ///
    /// Returns the envelope timestamp when the event was accepted.
    pub fn publish(
        &self,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Option<DateTime<Utc>> {
        self.submit(Envelope::new(event_type, payload))
    }

    /// Publish an event tagged with a routing topic
    pub fn publish_to(
        &self,
        topic: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Option<DateTime<Utc>> {
        self.submit(Envelope::new(event_type, payload).with_topic(topic))
    }

    /// Publish a domain record, converting it to a JSON payload first
    pub fn publish_value<T: Serialize>(&self, event_type: &str, record: &T) {
        match serde_json::to_value(record) {
            Ok(payload) => {
                self.publish(event_type, payload);
            }
            Err(e) => {
                self.stats
                    .dropped_serialization
                    .fetch_add(1, Ordering::Relaxed);
                HubMetrics::record_dropped("serialization");
                tracing::error!(
                    event_type = %event_type,
                    error = %e,
                    "Failed to serialize event payload, dropping event"
                );
            }
        }
    }

    fn submit(&self, envelope: Envelope) -> Option<DateTime<Utc>> {
        let permit = match self.publish_permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                self.stats.dropped_overload.fetch_add(1, Ordering::Relaxed);
                HubMetrics::record_dropped("overload");
                tracing::warn!(
                    event_type = %envelope.event_type,
                    "Hub router queue full, dropping event"
                );
                return None;
            }
            Err(TryAcquireError::Closed) => {
                self.record_closed_drop(&envelope);
                return None;
            }
        };

        let timestamp = envelope.timestamp;
        match self.commands.send(Command::Publish {
            envelope,
            _permit: permit,
        }) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                HubMetrics::record_published();
                Some(timestamp)
            }
            Err(mpsc::error::SendError(command)) => {
                if let Command::Publish { envelope, .. } = command {
                    self.record_closed_drop(&envelope);
                }
                None
            }
        }
    }

    fn record_closed_drop(&self, envelope: &Envelope) {
        HubMetrics::record_dropped("closed");
        tracing::debug!(
            event_type = %envelope.event_type,
            "Hub router stopped, dropping event"
        );
    }

    /// Ids of every currently registered session
    pub async fn sessions(&self) -> Result<Vec<SessionId>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Sessions { reply })
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub fn stats(&self) -> HubStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting registrations, close every session queue and stop the
    /// router. Events accepted before this call are fanned out first.
    pub fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_err() {
            tracing::debug!("Hub router already stopped");
        }
    }
}

/// The single task that owns the registry and performs fan-out
pub struct HubRouter {
    commands: mpsc::UnboundedReceiver<Command>,
    publish_permits: Arc<Semaphore>,
    registry: Registry,
    policy: DeliveryPolicy,
    max_subscriptions: usize,
    stats: Arc<HubStats>,
}

impl HubRouter {
    pub async fn run(mut self) {
        tracing::info!(policy = ?self.policy, "Hub router started");

        while let Some(command) = self.commands.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }

        // Closing first makes any concurrent register() or publish() fail
        self.commands.close();
        self.publish_permits.close();
        let closed = self.registry.clear();
        self.stats.active_sessions.store(0, Ordering::Relaxed);
        self.stats
            .sessions_deregistered
            .fetch_add(closed as u64, Ordering::Relaxed);
        HubMetrics::set_active_sessions(0);

        tracing::info!(closed_sessions = closed, "Hub router stopped");
    }

    /// Apply one request. Returns false once the router should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Publish { envelope, .. } => self.fan_out(envelope),
            Command::Register { id, sender, ack } => {
                let entry = SessionEntry::new(sender);
                if self.registry.add(id.clone(), entry) {
                    self.stats
                        .sessions_registered
                        .fetch_add(1, Ordering::Relaxed);
                    self.sync_active_sessions();
                    tracing::info!(
                        session_id = %id,
                        active_sessions = self.registry.len(),
                        "Session registered"
                    );
                }
                let _ = ack.send(());
            }
            Command::Deregister { id } => {
                self.remove_session(&id, RemovalReason::Disconnected);
            }
            Command::Subscribe { id, topic } => {
                let limit = self.max_subscriptions;
                if let Some(entry) = self.registry.get_mut(&id) {
                    if entry.subscriptions.len() >= limit && !entry.is_subscribed(&topic) {
                        tracing::warn!(
                            session_id = %id,
                            topic = %topic,
                            limit = limit,
                            "Subscription limit reached, ignoring subscribe"
                        );
                        return true;
                    }
                    entry.subscriptions.insert(topic.clone());
                    tracing::debug!(session_id = %id, topic = %topic, "Subscribed to topic");
                }
            }
            Command::Unsubscribe { id, topic } => {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.subscriptions.remove(&topic);
                    tracing::debug!(session_id = %id, topic = %topic, "Unsubscribed from topic");
                }
            }
            Command::Sessions { reply } => {
                let _ = reply.send(self.registry.ids());
            }
            Command::Shutdown => {
                tracing::info!("Hub router received shutdown request");
                return false;
            }
        }
        true
    }

    fn fan_out(&mut self, envelope: Envelope) {
        let start = Instant::now();

        let frame: Frame = match envelope.to_json() {
            Ok(text) => text.into(),
            Err(e) => {
                self.stats
                    .dropped_serialization
                    .fetch_add(1, Ordering::Relaxed);
                HubMetrics::record_dropped("serialization");
                tracing::error!(
                    event_type = %envelope.event_type,
                    error = %e,
                    "Failed to serialize envelope, dropping event"
                );
                return;
            }
        };

        let mut delivered = 0u64;
        let mut congested: SmallVec<[SessionId; 4]> = SmallVec::new();
        let mut closed: SmallVec<[SessionId; 4]> = SmallVec::new();

        for (id, entry) in self.registry.iter() {
            if !self.is_eligible(entry, &envelope) {
                continue;
            }
            match entry.sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => congested.push(id.clone()),
                Err(TrySendError::Closed(_)) => closed.push(id.clone()),
            }
        }

        for id in &congested {
            if self.remove_session(id, RemovalReason::Evicted) {
                self.stats.sessions_evicted.fetch_add(1, Ordering::Relaxed);
                HubMetrics::record_evicted();
            }
        }
        for id in &closed {
            self.remove_session(id, RemovalReason::QueueClosed);
        }

        self.stats
            .frames_delivered
            .fetch_add(delivered, Ordering::Relaxed);
        HubMetrics::record_delivered(delivered);
        HubMetrics::observe_fan_out(start.elapsed().as_secs_f64());

        tracing::debug!(
            event_type = %envelope.event_type,
            delivered = delivered,
            evicted = congested.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Event fanned out"
        );
    }

    fn is_eligible(&self, entry: &SessionEntry, envelope: &Envelope) -> bool {
        match (self.policy, envelope.topic.as_deref()) {
            (DeliveryPolicy::Broadcast, _) => true,
            (DeliveryPolicy::Subscribed, None) => true,
            (DeliveryPolicy::Subscribed, Some(topic)) => entry.is_subscribed(topic),
        }
    }

    /// Remove a session and close its queue. Returns false if it was
    /// already gone.
    fn remove_session(&mut self, id: &SessionId, reason: RemovalReason) -> bool {
        let Some(entry) = self.registry.remove(id) else {
            tracing::trace!(session_id = %id, reason = reason.as_str(), "Session already removed");
            return false;
        };

        let connected_secs = (Utc::now() - entry.registered_at).num_seconds();
        drop(entry);

        self.stats
            .sessions_deregistered
            .fetch_add(1, Ordering::Relaxed);
        self.sync_active_sessions();

        match reason {
            RemovalReason::Evicted => tracing::warn!(
                session_id = %id,
                connected_secs = connected_secs,
                "Session outbound queue full, evicting"
            ),
            _ => tracing::info!(
                session_id = %id,
                reason = reason.as_str(),
                connected_secs = connected_secs,
                active_sessions = self.registry.len(),
                "Session deregistered"
            ),
        }

        true
    }

    fn sync_active_sessions(&self) {
        let active = self.registry.len();
        self.stats.active_sessions.store(active, Ordering::Relaxed);
        HubMetrics::set_active_sessions(active as i64);
    }
}
