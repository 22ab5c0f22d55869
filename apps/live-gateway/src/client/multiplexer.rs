//! Client Subscription Multiplexer
//!
//! Owns exactly one transport to the gateway and lets many independent
//! call sites register handlers for named topics over it. Inbound frames
//! are demultiplexed by topic and every registered handler for that topic
//! runs exactly once, in registration order.
//!
//! Subscriptions are ref-counted: the last unsubscribe for a topic drops
//! the topic from the desired set, and only when zero topics remain is the
//! transport torn down - including any pending reconnect timer.
//!
//! The desired-topic set held here is the single source of truth the
//! transport replays after reconnecting; handlers are never re-registered
//! because they were never lost.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::reconnect::ReconnectConfig;
use super::transport::{self, TransportCommand};
use crate::domain::topic::Topic;
use crate::infrastructure::metrics;

/// Identifier for one registered handler.
pub type HandlerId = u64;

type Handler = Arc<dyn Fn(&serde_json::Value) + Send + Sync + 'static>;

/// State of the multiplexer's link to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No transport, or the transport lost its connection.
    Disconnected,
    /// The transport is establishing a connection.
    Connecting,
    /// Frames are flowing.
    Connected,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway WebSocket URL, e.g. `ws://gateway:8090/ws`.
    pub url: String,
    /// Reconnection delay policy.
    pub reconnect: ReconnectConfig,
    /// Interval between liveness pings.
    pub ping_interval: Duration,
    /// Silence threshold after which the connection is considered dead.
    pub liveness_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with default reconnect and liveness settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            ping_interval: Duration::from_secs(20),
            liveness_timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Multiplexer Internals
// =============================================================================

struct HandlerEntry {
    id: HandlerId,
    handler: Handler,
}

struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    cancel: CancellationToken,
}

pub(crate) struct MuxInner {
    config: ClientConfig,
    handlers: RwLock<HashMap<Topic, Vec<HandlerEntry>>>,
    next_handler_id: AtomicU64,
    link: RwLock<LinkState>,
    transport: Mutex<Option<TransportHandle>>,
}

impl MuxInner {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn mark_link(&self, state: LinkState) {
        *self.link.write() = state;
    }

    /// Topics with at least one handler - replayed after every reconnect.
    pub(crate) fn desired_topics(&self) -> Vec<Topic> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Demultiplex one inbound frame to the handlers registered for its
    /// topic.
    ///
    /// The handler set is re-checked at dispatch time for every handler,
    /// so an unsubscribe that has returned wins over a frame already in
    /// flight. A panicking handler is caught and logged; it never stops
    /// delivery to sibling handlers or subsequent frames.
    pub(crate) fn dispatch_frame(&self, topic: &str, payload: &serde_json::Value) {
        let snapshot: Vec<(HandlerId, Handler)> = {
            let handlers = self.handlers.read();
            let Some(entries) = handlers.get(topic) else {
                tracing::trace!(topic, "Frame for topic with no handlers");
                return;
            };
            entries
                .iter()
                .map(|e| (e.id, Arc::clone(&e.handler)))
                .collect()
        };

        for (id, handler) in snapshot {
            let still_registered = self
                .handlers
                .read()
                .get(topic)
                .is_some_and(|entries| entries.iter().any(|e| e.id == id));
            if !still_registered {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                tracing::error!(topic, handler_id = id, "Subscription handler panicked");
                metrics::record_handler_panic(topic);
            }
        }
    }

    fn send_command(&self, command: TransportCommand) {
        if let Some(handle) = self.transport.lock().as_ref() {
            let _ = handle.cmd_tx.send(command);
        }
    }

    fn teardown(&self) {
        if let Some(handle) = self.transport.lock().take() {
            // Cancels the socket and any pending reconnect timer; a connect
            // attempt racing this closes its socket instead of resuming
            handle.cancel.cancel();
            tracing::debug!("Transport torn down");
        }
        *self.link.write() = LinkState::Disconnected;
    }

    fn release(&self, topic: &str, id: HandlerId) {
        let (removed, topic_empty, all_empty) = {
            let mut handlers = self.handlers.write();
            let Some(entries) = handlers.get_mut(topic) else {
                return;
            };
            let before = entries.len();
            entries.retain(|e| e.id != id);
            let removed = entries.len() != before;
            let topic_empty = entries.is_empty();
            if topic_empty {
                handlers.remove(topic);
            }
            (removed, topic_empty, handlers.is_empty())
        };

        if !removed {
            return;
        }

        if topic_empty {
            self.send_command(TransportCommand::Unsubscribe(topic.to_string()));
        }
        if all_empty {
            self.teardown();
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Process-wide subscription multiplexer.
///
/// One instance is created at application start-up and injected into call
/// sites; it replaces any ambient global while keeping
/// single-transport-per-process semantics.
///
/// # Example
///
/// ```rust,no_run
/// use live_gateway::{ClientConfig, UpdateMultiplexer, topics};
///
/// # async fn example() {
/// let mux = UpdateMultiplexer::new(ClientConfig::new("ws://localhost:8090/ws"));
///
/// let subscription = mux.subscribe(topics::MATCH_SCORE, |payload| {
///     println!("score update: {payload}");
/// });
///
/// // ... later
/// subscription.unsubscribe();
/// mux.shutdown();
/// # }
/// ```
pub struct UpdateMultiplexer {
    inner: Arc<MuxInner>,
}

impl UpdateMultiplexer {
    /// Create a multiplexer. No transport is started until the first
    /// subscribe (or an explicit `connect`).
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                config,
                handlers: RwLock::new(HashMap::new()),
                next_handler_id: AtomicU64::new(1),
                link: RwLock::new(LinkState::Disconnected),
                transport: Mutex::new(None),
            }),
        }
    }

    /// Start the transport without waiting for the first subscribe.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        self.ensure_transport();
    }

    fn ensure_transport(&self) {
        let mut slot = self.inner.transport.lock();
        if let Some(handle) = slot.as_ref()
            && !handle.cancel.is_cancelled()
            && !handle.cmd_tx.is_closed()
        {
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(transport::run(
            Arc::clone(&self.inner),
            cmd_rx,
            cancel.clone(),
        ));
        *slot = Some(TransportHandle { cmd_tx, cancel });
        tracing::debug!(url = %self.inner.config.url, "Transport started");
    }

    /// Register a handler for a topic.
    ///
    /// The first subscribe starts the transport if none is connected;
    /// subsequent subscribes to other topics reuse it. Multiple handlers
    /// for the same topic are independent and all fire, in registration
    /// order. The returned handle releases the registration when
    /// `unsubscribe` is called or the handle is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(
        &self,
        topic: impl Into<Topic>,
        handler: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let topic = topic.into();
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);

        let topic_is_new = {
            let mut handlers = self.inner.handlers.write();
            let entries = handlers.entry(topic.clone()).or_default();
            let topic_is_new = entries.is_empty();
            entries.push(HandlerEntry {
                id,
                handler: Arc::new(handler),
            });
            topic_is_new
        };

        self.ensure_transport();
        if topic_is_new {
            self.inner
                .send_command(TransportCommand::Subscribe(topic.clone()));
        }

        tracing::debug!(topic = %topic, handler_id = id, "Handler registered");

        SubscriptionHandle {
            inner: Arc::downgrade(&self.inner),
            topic,
            id,
            released: AtomicBool::new(false),
        }
    }

    /// Publish an event to the gateway (used sparingly, e.g. test and
    /// demo flows).
    pub fn publish(&self, topic: impl Into<Topic>, payload: serde_json::Value) {
        self.ensure_transport();
        self.inner.send_command(TransportCommand::Publish {
            topic: topic.into(),
            payload,
        });
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.inner.link.read()
    }

    /// Topics currently held in the desired-subscriptions set.
    #[must_use]
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.inner.desired_topics()
    }

    /// Number of handlers registered for a topic.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner
            .handlers
            .read()
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Drop every registration and tear the transport down.
    pub fn shutdown(&self) {
        self.inner.handlers.write().clear();
        self.inner.teardown();
        tracing::debug!("Multiplexer shut down");
    }
}

impl Drop for UpdateMultiplexer {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle to one `(topic, handler)` registration.
///
/// Releasing it - explicitly or by dropping - removes exactly this
/// handler. Once `unsubscribe` returns, the handler will not be invoked
/// again, even for frames already in flight.
#[must_use = "dropping the handle releases the subscription"]
pub struct SubscriptionHandle {
    inner: Weak<MuxInner>,
    topic: Topic,
    id: HandlerId,
    released: AtomicBool,
}

impl SubscriptionHandle {
    /// The topic this registration is for.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Release the registration.
    pub fn unsubscribe(self) {
        self.release();
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.release(&self.topic, self.id);
            tracing::debug!(topic = %self.topic, handler_id = self.id, "Handler released");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
