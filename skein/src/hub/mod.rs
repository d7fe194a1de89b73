//! Multi-agent coordination hub.
//!
//! The hub keeps three independent tables: registrations (agent id ->
//! handler + bounded inbox), in-flight response channels (request id ->
//! capacity-1 reply slot), and topic subscriptions. Locks guard table
//! mutation only; handler dispatch and channel sends happen outside them.
//!
//! Routing: each registration gets one delivery task that drains its inbox in
//! FIFO order and invokes the handler, so envelopes from one sender to one
//! receiver are observed in send order while different recipients process
//! concurrently. A handler's non-`None` return value is a reply: a *response*
//! with `reply_to` set resolves the matching in-flight request (non-blocking,
//! dropped if already answered); anything else is enqueued on its `to` inbox.
//!
//! Failure discipline: handler errors are logged at Error and swallowed; the
//! hub stays operational. Per-recipient broadcast and publish failures are
//! logged at Warn and never fail the call.
//!
//! **Interaction**: workflow handlers coordinate through the hub; the
//! observer receives `hub.handler.error` and `hub.delivery.failure` events.

mod envelope;

pub use envelope::{Envelope, MessageType, Priority};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::channel::{ChannelError, MessageChannel};
use crate::observer::{Event, Level, NullObserver, Observer};

/// Hub tuning knobs.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bounded inbox size per registration.
    pub inbox_capacity: usize,
    /// Upper bound on how long a request waits for its response.
    pub default_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 16,
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// Failure raised inside an agent handler. Logged by the hub, never returned
/// to senders.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-agent message handler.
///
/// Returning `Ok(Some(envelope))` asks the hub to route that envelope as a
/// reply; `Ok(None)` ends the exchange.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Result<Option<Envelope>, HandlerError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EnvelopeHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Option<Envelope>, HandlerError>> + Send,
{
    async fn handle(&self, envelope: Envelope) -> Result<Option<Envelope>, HandlerError> {
        (self.f)(envelope).await
    }
}

/// Wraps an async closure into an [`EnvelopeHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EnvelopeHandler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Option<Envelope>, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Hub operation error.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("agent id must not be empty")]
    EmptyAgentId,

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent already registered: {0}")]
    AlreadyRegistered(String),

    #[error("request deadline exceeded")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("hub is shut down")]
    Closed,

    #[error("shutdown timed out")]
    ShutdownTimeout,
}

/// Atomic snapshot of the hub counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubMetrics {
    pub local_agents: u64,
    pub messages_sent: u64,
    pub messages_recv: u64,
}

struct Registration {
    agent_id: String,
    handler: Arc<dyn EnvelopeHandler>,
    inbox: MessageChannel<Envelope>,
    last_seen: std::sync::Mutex<DateTime<Utc>>,
}

/// The coordination hub. Construct with [`Hub::new`]; always lives behind an
/// `Arc` so delivery tasks can hold it.
pub struct Hub {
    config: HubConfig,
    registrations: RwLock<HashMap<String, Arc<Registration>>>,
    /// Request id -> capacity-1 reply slot for in-flight requests.
    pending: DashMap<Uuid, oneshot::Sender<Envelope>>,
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
    lifecycle: CancellationToken,
    tracker: TaskTracker,
    observer: Arc<dyn Observer>,
    /// Handle delivery tasks hold back to the hub; set at construction.
    weak_self: Weak<Hub>,
    local_agents: AtomicU64,
    messages_sent: AtomicU64,
    messages_recv: AtomicU64,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Self> {
        Self::with_observer(config, Arc::new(NullObserver))
    }

    pub fn with_observer(config: HubConfig, observer: Arc<dyn Observer>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            config,
            registrations: RwLock::new(HashMap::new()),
            pending: DashMap::new(),
            subscriptions: RwLock::new(HashMap::new()),
            lifecycle: CancellationToken::new(),
            tracker: TaskTracker::new(),
            observer,
            weak_self: weak_self.clone(),
            local_agents: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_recv: AtomicU64::new(0),
        })
    }

    /// Registers `agent_id` with its handler, allocating a bounded inbox and
    /// starting its delivery task. Fails if the id is taken.
    pub async fn register_agent(
        &self,
        agent_id: &str,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<(), HubError> {
        if agent_id.is_empty() {
            return Err(HubError::EmptyAgentId);
        }
        if self.lifecycle.is_cancelled() {
            return Err(HubError::Closed);
        }
        let registration = {
            let mut registrations = self.registrations.write().await;
            if registrations.contains_key(agent_id) {
                return Err(HubError::AlreadyRegistered(agent_id.to_string()));
            }
            let registration = Arc::new(Registration {
                agent_id: agent_id.to_string(),
                handler,
                inbox: MessageChannel::with_parent(self.config.inbox_capacity, &self.lifecycle),
                last_seen: std::sync::Mutex::new(Utc::now()),
            });
            registrations.insert(agent_id.to_string(), Arc::clone(&registration));
            registration
        };
        self.local_agents.fetch_add(1, Ordering::Relaxed);

        // Always upgrades: the hub only hands out Arcs.
        if let Some(hub) = self.weak_self.upgrade() {
            self.tracker.spawn(hub.delivery_loop(registration));
        }
        Ok(())
    }

    /// Removes `agent_id`: closes its inbox (the delivery task drains what it
    /// can and exits) and drops all of its topic subscriptions. Empty topic
    /// sets are garbage-collected. A later register creates a fresh
    /// registration.
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<(), HubError> {
        let registration = {
            let mut registrations = self.registrations.write().await;
            registrations
                .remove(agent_id)
                .ok_or_else(|| HubError::AgentNotFound(agent_id.to_string()))?
        };
        registration.inbox.close();
        self.local_agents.fetch_sub(1, Ordering::Relaxed);

        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.retain(|_, subscribers| {
            subscribers.remove(agent_id);
            !subscribers.is_empty()
        });
        Ok(())
    }

    /// Point-to-point notification. Blocks under inbox back-pressure until
    /// accepted or `token` fires.
    pub async fn send(
        &self,
        token: &CancellationToken,
        from: &str,
        to: &str,
        data: serde_json::Value,
    ) -> Result<(), HubError> {
        let envelope = Envelope::notification(from, to, data);
        self.enqueue(token, to, envelope).await?;
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Correlated request with the hub default timeout.
    pub async fn request(
        &self,
        token: &CancellationToken,
        from: &str,
        to: &str,
        data: serde_json::Value,
    ) -> Result<Envelope, HubError> {
        self.request_with_timeout(token, from, to, data, None).await
    }

    /// Correlated request. Waits for the matching response, `token`, or
    /// `min(default_timeout, timeout)`. The response slot is deregistered and
    /// dropped on every exit path.
    pub async fn request_with_timeout(
        &self,
        token: &CancellationToken,
        from: &str,
        to: &str,
        data: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<Envelope, HubError> {
        let deadline = match timeout {
            Some(t) => t.min(self.config.default_timeout),
            None => self.config.default_timeout,
        };
        let envelope = Envelope::request(from, to, data);
        let request_id = envelope.id;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(request_id, reply_tx);

        if let Err(e) = self.enqueue(token, to, envelope).await {
            self.pending.remove(&request_id);
            return Err(e);
        }
        self.messages_sent.fetch_add(1, Ordering::Relaxed);

        let result = tokio::select! {
            response = reply_rx => response.map_err(|_| HubError::Closed),
            _ = token.cancelled() => Err(HubError::Cancelled),
            _ = tokio::time::sleep(deadline) => Err(HubError::Timeout),
        };
        // Deregister on timeout/cancellation; a no-op when the response won.
        self.pending.remove(&request_id);
        result
    }

    /// Delivers one broadcast envelope to every registered agent except
    /// `from`. Per-recipient failures are logged at Warn, never returned.
    pub async fn broadcast(
        &self,
        _token: &CancellationToken,
        from: &str,
        data: serde_json::Value,
    ) -> Result<(), HubError> {
        let recipients: Vec<Arc<Registration>> = {
            let registrations = self.registrations.read().await;
            registrations
                .values()
                .filter(|r| r.agent_id != from)
                .cloned()
                .collect()
        };
        let template = Envelope::broadcast(from, "", data);
        for registration in recipients {
            let mut envelope = template.clone();
            envelope.to = registration.agent_id.clone();
            self.offer(&registration, envelope);
        }
        Ok(())
    }

    /// Subscribes a registered agent to `topic`.
    pub async fn subscribe(&self, agent_id: &str, topic: &str) -> Result<(), HubError> {
        {
            let registrations = self.registrations.read().await;
            if !registrations.contains_key(agent_id) {
                return Err(HubError::AgentNotFound(agent_id.to_string()));
            }
        }
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions
            .entry(topic.to_string())
            .or_default()
            .insert(agent_id.to_string());
        Ok(())
    }

    /// Sends a topic-tagged notification to every subscriber except `from`.
    /// A topic with no subscribers is a no-op.
    pub async fn publish(
        &self,
        _token: &CancellationToken,
        from: &str,
        topic: &str,
        data: serde_json::Value,
    ) -> Result<(), HubError> {
        let subscribers: Vec<String> = {
            let subscriptions = self.subscriptions.read().await;
            match subscriptions.get(topic) {
                Some(subscribers) => subscribers.iter().cloned().collect(),
                None => return Ok(()),
            }
        };
        let recipients: Vec<Arc<Registration>> = {
            let registrations = self.registrations.read().await;
            subscribers
                .iter()
                .filter(|id| id.as_str() != from)
                .filter_map(|id| registrations.get(id).cloned())
                .collect()
        };
        let template = Envelope::notification(from, "", data).with_topic(topic);
        for registration in recipients {
            let mut envelope = template.clone();
            envelope.to = registration.agent_id.clone();
            self.offer(&registration, envelope);
        }
        Ok(())
    }

    /// Atomic counter snapshot.
    pub fn metrics(&self) -> HubMetrics {
        HubMetrics {
            local_agents: self.local_agents.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_recv: self.messages_recv.load(Ordering::Relaxed),
        }
    }

    /// Cancels the hub lifecycle and waits for every delivery task to finish.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), HubError> {
        self.lifecycle.cancel();
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .map_err(|_| HubError::ShutdownTimeout)
    }

    /// One registration's delivery task: drain the inbox in FIFO order,
    /// invoking the handler for each envelope. Exits when the inbox closes or
    /// the hub shuts down.
    async fn delivery_loop(self: Arc<Self>, registration: Arc<Registration>) {
        let token = self.lifecycle.child_token();
        loop {
            match registration.inbox.receive(&token).await {
                Ok(envelope) => self.deliver(&registration, envelope).await,
                Err(_) => break,
            }
        }
    }

    async fn deliver(&self, registration: &Registration, envelope: Envelope) {
        self.messages_recv.fetch_add(1, Ordering::Relaxed);
        *registration
            .last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();

        match registration.handler.handle(envelope).await {
            Ok(Some(reply)) => self.route_reply(reply).await,
            Ok(None) => {}
            Err(e) => {
                error!(agent = %registration.agent_id, error = %e, "handler failed");
                self.observer.observe(
                    &Event::new("hub.handler.error", Level::Error, "hub")
                        .with("agent", registration.agent_id.clone())
                        .with("error", e.to_string()),
                );
            }
        }
    }

    /// Routes a handler's reply: responses resolve the in-flight request slot
    /// (non-blocking, dropped when already answered); anything else goes to
    /// the destination inbox.
    async fn route_reply(&self, reply: Envelope) {
        if reply.kind == MessageType::Response {
            if let Some(request_id) = reply.reply_to {
                match self.pending.remove(&request_id) {
                    Some((_, slot)) => {
                        let _ = slot.send(reply);
                    }
                    None => {
                        debug!(request = %request_id, "response for settled request dropped");
                    }
                }
                return;
            }
        }
        let to = reply.to.clone();
        let token = self.lifecycle.child_token();
        if let Err(e) = self.enqueue(&token, &to, reply).await {
            warn!(to = %to, error = %e, "reply delivery failed");
        }
    }

    /// Blocking enqueue onto `to`'s inbox, honoring `token`.
    async fn enqueue(
        &self,
        token: &CancellationToken,
        to: &str,
        envelope: Envelope,
    ) -> Result<(), HubError> {
        let registration = {
            let registrations = self.registrations.read().await;
            registrations
                .get(to)
                .cloned()
                .ok_or_else(|| HubError::AgentNotFound(to.to_string()))?
        };
        registration
            .inbox
            .send(token, envelope)
            .await
            .map_err(|e| match e {
                ChannelError::Cancelled => HubError::Cancelled,
                ChannelError::Closed | ChannelError::Full => HubError::Closed,
            })
    }

    /// Best-effort non-blocking enqueue used by broadcast and publish.
    fn offer(&self, registration: &Registration, envelope: Envelope) {
        match registration.inbox.try_send(envelope) {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(to = %registration.agent_id, error = %e, "delivery failed");
                self.observer.observe(
                    &Event::new("hub.delivery.failure", Level::Warn, "hub")
                        .with("agent", registration.agent_id.clone())
                        .with("error", e.to_string()),
                );
            }
        }
    }
}
