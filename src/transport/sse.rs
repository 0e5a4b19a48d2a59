//! Streaming Carrier Sessions
//!
//! The server half of the streaming transport: a long-lived SSE channel
//! from server to client, opened with an `endpoint` event that names the
//! reverse POST path for this session. The session table is the one piece
//! of shared mutable state touched by concurrent request handlers, so all
//! access goes through its lock.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use uuid::Uuid;

/// Path a client uses to open a streaming session.
pub const SSE_PATH: &str = "/sse";

/// Path a client POSTs session-scoped messages to.
pub const MESSAGE_PATH: &str = "/messages";

/// Buffered events per session before a slow client backpressures POSTs.
const SESSION_CHANNEL_CAPACITY: usize = 32;

/// Live streaming sessions, keyed by unguessable session id.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, mpsc::Sender<Event>>>,
}

impl SessionTable {
    /// Open a new session: generates the session id, registers the outbound
    /// channel, and queues the `endpoint` control event as the first thing
    /// the client sees.
    pub fn open(self: &Arc<Self>) -> (String, Sse<SessionStream>) {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

        let endpoint = format!("{}?sessionId={}", MESSAGE_PATH, session_id);
        // The channel was just created with free capacity.
        let _ = tx.try_send(Event::default().event("endpoint").data(endpoint));

        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(session_id.clone(), tx);
        }

        let stream = SessionStream {
            session_id: session_id.clone(),
            table: Arc::clone(self),
            inner: ReceiverStream::new(rx),
        };

        (
            session_id,
            Sse::new(stream).keep_alive(KeepAlive::default()),
        )
    }

    /// The outbound channel for a session, if it is still open.
    pub fn sender(&self, session_id: &str) -> Option<mpsc::Sender<Event>> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(session_id).cloned())
    }

    /// Drop a session from the live set.
    pub fn remove(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            if sessions.remove(session_id).is_some() {
                tracing::debug!(session_id = %session_id, "streaming session closed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The event stream backing one session's SSE response. Dropping the
/// stream (client disconnect or server shutdown) removes the session from
/// the live set.
pub struct SessionStream {
    session_id: String,
    table: Arc<SessionTable>,
    inner: ReceiverStream<Event>,
}

impl Stream for SessionStream {
    type Item = std::result::Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|e| e.map(Ok))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.table.remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_registers_session() {
        let table = Arc::new(SessionTable::default());
        let (session_id, _sse) = table.open();
        assert_eq!(table.len(), 1);
        assert!(table.sender(&session_id).is_some());
    }

    #[tokio::test]
    async fn test_sessions_do_not_collide() {
        let table = Arc::new(SessionTable::default());
        let (a, _sse_a) = table.open();
        let (b, _sse_b) = table.open();
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_removes_session() {
        let table = Arc::new(SessionTable::default());
        let (session_id, sse) = table.open();
        drop(sse);
        assert!(table.sender(&session_id).is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_has_no_sender() {
        let table = Arc::new(SessionTable::default());
        assert!(table.sender("not-a-session").is_none());
    }
}
