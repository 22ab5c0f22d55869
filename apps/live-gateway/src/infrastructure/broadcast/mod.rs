//! Broadcast Dispatcher
//!
//! Fans published events out to every live session subscribed to the
//! event's topic. The dispatcher owns the session table and is the only
//! component that mutates the topic registry, so producers and socket
//! handlers never reach into shared state directly.
//!
//! # Delivery semantics
//!
//! `publish` resolves the subscriber set once (a snapshot - concurrent
//! subscribe/unsubscribe does not affect an in-flight publish), serializes
//! the frame once, and hands each session an owned copy. A session that
//! cannot accept the frame drops it; one slow or dead peer never affects
//! delivery to the others, and `publish` never blocks on a client.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::registry::{SessionId, TopicRegistry};
use crate::domain::topic::EventFrame;
use crate::infrastructure::metrics;
use crate::infrastructure::session::ConnectionSession;

struct DispatcherInner {
    registry: Arc<TopicRegistry>,
    sessions: RwLock<HashMap<SessionId, Arc<ConnectionSession>>>,
}

impl DispatcherInner {
    fn session_closed(&self, session: SessionId) {
        self.sessions.write().remove(&session);
        let emptied = self.registry.session_closed(session);

        metrics::set_open_sessions(self.sessions.read().len() as f64);
        metrics::set_active_topics(self.registry.topic_count() as f64);
        tracing::debug!(
            session_id = session,
            topics_emptied = emptied.len(),
            "Session purged from registry"
        );
    }
}

/// Fan-out of published events to subscribed sessions.
pub struct BroadcastDispatcher {
    inner: Arc<DispatcherInner>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over a topic registry.
    #[must_use]
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a session and wire its close to the registry purge.
    ///
    /// When the session closes, it is removed from the session table and
    /// purged from every topic it was a member of.
    pub fn register(&self, session: Arc<ConnectionSession>) {
        let id = session.id();
        self.inner.sessions.write().insert(id, Arc::clone(&session));

        let inner = Arc::clone(&self.inner);
        session.on_close(move |session_id| {
            inner.session_closed(session_id);
        });

        metrics::set_open_sessions(self.inner.sessions.read().len() as f64);
        tracing::debug!(session_id = id, "Session registered");
    }

    /// Add a session to a topic.
    pub fn subscribe(&self, session: SessionId, topic: &str) {
        if self.inner.registry.add(topic, session) {
            tracing::debug!(session_id = session, topic, "Subscribed");
        }
        metrics::set_active_topics(self.inner.registry.topic_count() as f64);
    }

    /// Remove a session from a topic.
    pub fn unsubscribe(&self, session: SessionId, topic: &str) {
        if self.inner.registry.remove(topic, session) {
            tracing::debug!(session_id = session, topic, "Unsubscribed");
        }
        metrics::set_active_topics(self.inner.registry.topic_count() as f64);
    }

    /// Publish an event to every session subscribed to `topic`.
    ///
    /// Publishing to a topic with no subscribers is a cheap no-op, not an
    /// error. Returns the number of sessions the frame was handed to.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) -> usize {
        let subscribers = self.inner.registry.subscribers_of(topic);
        if subscribers.is_empty() {
            tracing::trace!(topic, "Publish with no subscribers");
            return 0;
        }

        let frame = EventFrame::new(topic, payload);
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(topic, error = %e, "Failed to serialize event frame");
                return 0;
            }
        };

        // Resolve session handles under the lock, deliver outside it
        let targets: Vec<Arc<ConnectionSession>> = {
            let sessions = self.inner.sessions.read();
            subscribers
                .iter()
                .filter_map(|id| sessions.get(id).cloned())
                .collect()
        };

        for session in &targets {
            session.send(topic, text.clone());
        }

        metrics::record_event_published(topic, targets.len() as u64);
        tracing::trace!(topic, delivered = targets.len(), "Event published");
        targets.len()
    }

    /// Close every registered session.
    ///
    /// Used on graceful shutdown; each close purges the session from the
    /// registry through its close callback.
    pub fn close_all(&self) {
        let sessions: Vec<Arc<ConnectionSession>> =
            self.inner.sessions.read().values().cloned().collect();

        tracing::info!(sessions = sessions.len(), "Closing all sessions");
        for session in sessions {
            session.close();
        }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Get dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        let registry = self.inner.registry.stats();
        DispatcherStats {
            sessions: self.inner.sessions.read().len(),
            topics: registry.topic_count,
            subscribed_sessions: registry.session_count,
        }
    }
}

/// Dispatcher statistics for the health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherStats {
    /// Registered sessions.
    pub sessions: usize,
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Sessions holding at least one subscription.
    pub subscribed_sessions: usize,
}

// =============================================================================
// Tests
// =============================================================================
