//! Connection Sessions
//!
//! Wraps one connected WebSocket peer. The session owns the outbound
//! buffer feeding the peer's writer task and a cancellation token that
//! tears the socket tasks down; it never touches the socket directly.
//!
//! `send` is fire-and-forget: a session that is not Open, or whose
//! outbound buffer is full, drops the frame with a log entry. Senders are
//! never coupled to individual peer health.

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::registry::SessionId;
use crate::infrastructure::metrics;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, not yet serving.
    Connecting,
    /// Live; frames are delivered.
    Open,
    /// Shutting down; frames are dropped.
    Closing,
    /// Gone. Terminal - a Closed session is never delivered to again.
    Closed,
}

type CloseCallback = Box<dyn FnOnce(SessionId) + Send>;

/// One connected peer.
///
/// `close` transitions to Closed exactly once, cancels the socket tasks,
/// and fires every registered `onClose` callback so the registry can purge
/// the session from all topics it was a member of.
pub struct ConnectionSession {
    id: SessionId,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
    state: RwLock<SessionState>,
    on_close: Mutex<Vec<CloseCallback>>,
}

impl ConnectionSession {
    /// Create a session in the Connecting state.
    #[must_use]
    pub fn new(id: SessionId, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            outbound,
            cancel: CancellationToken::new(),
            state: RwLock::new(SessionState::Connecting),
            on_close: Mutex::new(Vec::new()),
        }
    }

    /// Get the session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Check whether frames are currently delivered.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Token cancelled when the session closes.
    ///
    /// The socket reader/writer tasks select on this to shut down.
    #[must_use]
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Mark the session live. No-op unless currently Connecting.
    pub fn open(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Connecting {
            *state = SessionState::Open;
        }
    }

    /// Begin a graceful shutdown: frames are dropped from here on, but
    /// close callbacks have not fired yet.
    pub fn begin_close(&self) {
        let mut state = self.state.write();
        if matches!(*state, SessionState::Connecting | SessionState::Open) {
            *state = SessionState::Closing;
        }
    }

    /// Queue a serialized frame for delivery.
    ///
    /// Never raises to the caller. Frames sent to a session that is not
    /// Open are silently dropped and logged; a full outbound buffer drops
    /// the frame with a warning (best-effort broadcast, not a durable log).
    pub fn send(&self, topic: &str, text: String) {
        if !self.is_open() {
            tracing::debug!(
                session_id = self.id,
                topic,
                state = ?self.state(),
                "Dropping frame for non-open session"
            );
            metrics::record_frame_dropped(metrics::DropReason::SessionNotOpen);
            return;
        }

        match self.outbound.try_send(text) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = self.id,
                    topic,
                    "Outbound buffer full, dropping frame"
                );
                metrics::record_frame_dropped(metrics::DropReason::BufferFull);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    session_id = self.id,
                    topic,
                    "Writer gone, dropping frame"
                );
                metrics::record_frame_dropped(metrics::DropReason::SessionNotOpen);
            }
        }
    }

    /// Register a callback to run when the session closes.
    ///
    /// Callbacks fire exactly once. Registering on an already-closed
    /// session runs the callback immediately.
    pub fn on_close(&self, callback: impl FnOnce(SessionId) + Send + 'static) {
        {
            // Holding the callback lock while checking state keeps a
            // concurrent close() from draining between the check and the push
            let mut callbacks = self.on_close.lock();
            if *self.state.read() != SessionState::Closed {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self.id);
    }

    /// Close the session.
    ///
    /// Idempotent: the transition to Closed happens exactly once, and the
    /// close callbacks never fire twice. Cancels the socket tasks.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        self.cancel.cancel();

        let callbacks: Vec<CloseCallback> = std::mem::take(&mut *self.on_close.lock());
        tracing::debug!(
            session_id = self.id,
            callbacks = callbacks.len(),
            "Session closed"
        );
        for callback in callbacks {
            callback(self.id);
        }
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn make_session(buffer: usize) -> (ConnectionSession, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ConnectionSession::new(7, tx), rx)
    }

    #[test]
    fn lifecycle_transitions() {
        let (session, _rx) = make_session(4);
        assert_eq!(session.state(), SessionState::Connecting);

        session.open();
        assert_eq!(session.state(), SessionState::Open);

        session.begin_close();
        assert_eq!(session.state(), SessionState::Closing);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn open_after_close_is_ignored() {
        let (session, _rx) = make_session(4);
        session.close();
        session.open();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn send_delivers_when_open() {
        let (session, mut rx) = make_session(4);
        session.open();

        session.send("match:score", "frame".to_string());
        assert_eq!(rx.recv().await.unwrap(), "frame");
    }

    #[tokio::test]
    async fn send_drops_when_not_open() {
        let (session, mut rx) = make_session(4);

        // Still Connecting
        session.send("match:score", "early".to_string());

        session.open();
        session.close();
        session.send("match:score", "late".to_string());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_drops_on_full_buffer_without_blocking() {
        let (session, _rx) = make_session(1);
        session.open();

        session.send("odds:update", "first".to_string());
        // Buffer full - must not block or panic
        session.send("odds:update", "second".to_string());
    }

    #[test]
    fn close_is_idempotent_and_callbacks_fire_once() {
        let (session, _rx) = make_session(4);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        session.on_close(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        session.close();
        session.close();
        session.close();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_close_after_close_runs_immediately() {
        let (session, _rx) = make_session(4);
        session.close();

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        session.on_close(move |id| {
            assert_eq!(id, 7);
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_cancels_socket_tasks() {
        let (session, _rx) = make_session(4);
        let token = session.cancelled();
        assert!(!token.is_cancelled());

        session.close();
        assert!(token.is_cancelled());
    }

    #[test]
    fn concurrent_close_fires_callbacks_once() {
        use std::thread;

        let (session, _rx) = make_session(4);
        let session = Arc::new(session);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        session.on_close(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let mut handles = vec![];
        for _ in 0..8 {
            let s = Arc::clone(&session);
            handles.push(thread::spawn(move || s.close()));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
