//! Topic Membership Tracking
//!
//! Domain bookkeeping mapping topics to the sessions interested in them.
//! Pure in-memory state with no I/O.
//!
//! # Design
//!
//! The registry tracks:
//! - Which sessions are members of each topic
//! - The reverse mapping, so a closing session can be purged from every
//!   topic it was a member of in one call
//!
//! A topic has no entry once its last member is removed; churn never grows
//! the maps. All mutation happens through the methods below under a single
//! lock, so concurrent subscribe/unsubscribe/close callbacks stay
//! consistent.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::topic::Topic;

/// Unique identifier for a connected session.
pub type SessionId = u64;

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// Map from topic to member sessions.
    topic_sessions: HashMap<Topic, HashSet<SessionId>>,
    /// Map from session to the topics it is a member of.
    session_topics: HashMap<SessionId, HashSet<Topic>>,
}

impl RegistryState {
    fn add(&mut self, topic: &str, session: SessionId) -> bool {
        let added = self
            .topic_sessions
            .entry(topic.to_string())
            .or_default()
            .insert(session);

        if added {
            self.session_topics
                .entry(session)
                .or_default()
                .insert(topic.to_string());
        }

        added
    }

    fn remove(&mut self, topic: &str, session: SessionId) -> bool {
        let Some(members) = self.topic_sessions.get_mut(topic) else {
            return false;
        };

        if !members.remove(&session) {
            return false;
        }

        // Last member removed - drop the topic entry entirely
        if members.is_empty() {
            self.topic_sessions.remove(topic);
        }

        if let Some(topics) = self.session_topics.get_mut(&session) {
            topics.remove(topic);
            if topics.is_empty() {
                self.session_topics.remove(&session);
            }
        }

        true
    }

    fn remove_session(&mut self, session: SessionId) -> Vec<Topic> {
        let Some(topics) = self.session_topics.remove(&session) else {
            return vec![];
        };

        let mut emptied = Vec::new();

        for topic in topics {
            if let Some(members) = self.topic_sessions.get_mut(&topic) {
                members.remove(&session);
                if members.is_empty() {
                    self.topic_sessions.remove(&topic);
                    emptied.push(topic);
                }
            }
        }

        emptied
    }
}

// =============================================================================
// Topic Registry
// =============================================================================

/// Process-wide mapping from topic to the set of interested sessions.
///
/// Thread-safe; `add` is idempotent and `remove` on a non-member is a
/// no-op, never an error. `subscribers_of` returns a snapshot with no
/// ordering guarantee.
///
/// # Example
///
/// ```rust
/// use live_gateway::TopicRegistry;
///
/// let registry = TopicRegistry::new();
///
/// registry.add("match:score", 1);
/// registry.add("match:score", 2);
///
/// assert_eq!(registry.subscribers_of("match:score").len(), 2);
///
/// // Session 1 goes away - purged from every topic it held
/// registry.session_closed(1);
/// assert_eq!(registry.subscribers_of("match:score"), vec![2]);
/// ```
#[derive(Debug, Default)]
pub struct TopicRegistry {
    state: RwLock<RegistryState>,
}

impl TopicRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Add a session to a topic.
    ///
    /// Idempotent: adding an existing member has no additional effect.
    /// Returns `true` if the membership is new.
    pub fn add(&self, topic: &str, session: SessionId) -> bool {
        self.state.write().add(topic, session)
    }

    /// Remove a session from a topic.
    ///
    /// Removing a non-member is a no-op. Returns `true` if a membership
    /// was actually removed. The topic entry is dropped when its last
    /// member leaves.
    pub fn remove(&self, topic: &str, session: SessionId) -> bool {
        self.state.write().remove(topic, session)
    }

    /// Get a snapshot of the sessions subscribed to a topic.
    ///
    /// Later subscribe/unsubscribe calls do not affect the returned set.
    #[must_use]
    pub fn subscribers_of(&self, topic: &str) -> Vec<SessionId> {
        self.state
            .read()
            .topic_sessions
            .get(topic)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Purge a closed session from every topic it was a member of.
    ///
    /// Returns the topics whose entries were removed because this session
    /// was their last member.
    pub fn session_closed(&self, session: SessionId) -> Vec<Topic> {
        self.state.write().remove_session(session)
    }

    /// Get the topics a session is a member of.
    #[must_use]
    pub fn topics_of(&self, session: SessionId) -> Vec<Topic> {
        self.state
            .read()
            .session_topics
            .get(&session)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of topics with at least one member.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.state.read().topic_sessions.len()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            topic_count: state.topic_sessions.len(),
            session_count: state.session_topics.len(),
        }
    }
}

/// Registry statistics for the health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    /// Topics with at least one member.
    pub topic_count: usize,
    /// Sessions holding at least one membership.
    pub session_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
