use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::metrics;
use crate::models::{Session, SessionId};

pub mod events;
pub mod message_types;

use events::{conversation_topic, user_queue, OutboundFrame};

/// Live connection entry
struct Connection {
    session: Session,
    sender: UnboundedSender<String>,
    topics: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Connection>,
    by_user: HashMap<Uuid, HashSet<SessionId>>,
    topics: HashMap<String, HashSet<SessionId>>,
    closed: bool,
}

impl Inner {
    fn remove(&mut self, session_id: SessionId) -> Option<Session> {
        let connection = self.sessions.remove(&session_id)?;
        let user_id = connection.session.user_id();

        if let Some(ids) = self.by_user.get_mut(&user_id) {
            ids.remove(&session_id);
            if ids.is_empty() {
                self.by_user.remove(&user_id);
            }
        }
        for topic in &connection.topics {
            if let Some(ids) = self.topics.get_mut(topic) {
                ids.remove(&session_id);
                if ids.is_empty() {
                    self.topics.remove(topic);
                }
            }
        }
        // Dropping the sender ends the session's outbound stream.
        Some(connection.session)
    }

    /// Push `frame` to each session without waiting on any of them.
    fn send_all<'a>(&self, ids: impl Iterator<Item = &'a SessionId>, frame: &str) -> usize {
        let mut delivered = 0;
        let mut dropped = 0;
        for id in ids {
            match self.sessions.get(id) {
                Some(conn) if conn.sender.send(frame.to_owned()).is_ok() => delivered += 1,
                _ => dropped += 1,
            }
        }
        metrics::frames_delivered(delivered);
        if dropped > 0 {
            metrics::frames_dropped(dropped);
        }
        delivered
    }
}

/// Process-wide table of authenticated connections.
///
/// Created at startup and drained with [`ConnectionRegistry::shutdown`].
/// Every delivery is best effort: frames for sessions that are gone are
/// dropped, never queued.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` and hand back the stream of frames addressed to it.
    ///
    /// After shutdown the returned stream is already closed.
    pub async fn register(&self, session: Session) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        if guard.closed {
            return rx;
        }

        let session_id = session.session_id();
        let user_id = session.user_id();
        guard.by_user.entry(user_id).or_default().insert(session_id);
        guard.sessions.insert(
            session_id,
            Connection {
                session,
                sender: tx,
                topics: HashSet::new(),
            },
        );
        metrics::session_registered();

        tracing::debug!(
            session_id = %session_id,
            user_id = %user_id,
            user_sessions = guard.by_user.get(&user_id).map(|s| s.len()).unwrap_or(0),
            "session registered"
        );
        rx
    }

    /// Idempotent. Frames already in flight to the session are dropped.
    pub async fn unregister(&self, session_id: SessionId) -> Option<Session> {
        let removed = self.inner.write().await.remove(session_id);
        if let Some(session) = &removed {
            metrics::session_unregistered();
            tracing::debug!(
                session_id = %session_id,
                user_id = %session.user_id(),
                "session unregistered"
            );
        }
        removed
    }

    /// Deliver to every live session of `user_id` on `user/{uid}/queue/{queue}`.
    /// No live session means no delivery and no error.
    pub async fn deliver_to_user<T: Serialize>(&self, user_id: Uuid, queue: &str, body: &T) -> usize {
        let Some(frame) = encode(user_queue(user_id, queue), body) else {
            return 0;
        };
        let guard = self.inner.read().await;
        match guard.by_user.get(&user_id) {
            Some(ids) => guard.send_all(ids.iter(), &frame),
            None => 0,
        }
    }

    /// Deliver to every live session of every participant, the acting
    /// user's other devices included.
    pub async fn deliver_to_conversation<'a, T: Serialize>(
        &self,
        conversation_id: Uuid,
        participants: impl IntoIterator<Item = &'a Uuid>,
        body: &T,
    ) -> usize {
        self.deliver_to_participants(conversation_topic(conversation_id), participants, None, body)
            .await
    }

    /// Participant fanout on an arbitrary destination, optionally skipping
    /// every session of one user.
    pub async fn deliver_to_participants<'a, T: Serialize>(
        &self,
        destination: String,
        participants: impl IntoIterator<Item = &'a Uuid>,
        exclude_user: Option<Uuid>,
        body: &T,
    ) -> usize {
        let Some(frame) = encode(destination, body) else {
            return 0;
        };
        let guard = self.inner.read().await;
        let ids = participants
            .into_iter()
            .filter(|user_id| Some(**user_id) != exclude_user)
            .filter_map(|user_id| guard.by_user.get(user_id))
            .flatten();
        guard.send_all(ids, &frame)
    }

    /// Returns `false` if the session is not registered.
    pub async fn subscribe(&self, session_id: SessionId, topic: &str) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connection) = guard.sessions.get_mut(&session_id) else {
            return false;
        };
        connection.topics.insert(topic.to_string());
        guard
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(session_id);
        true
    }

    pub async fn unsubscribe(&self, session_id: SessionId, topic: &str) {
        let mut guard = self.inner.write().await;
        if let Some(connection) = guard.sessions.get_mut(&session_id) {
            connection.topics.remove(topic);
        }
        if let Some(ids) = guard.topics.get_mut(topic) {
            ids.remove(&session_id);
            if ids.is_empty() {
                guard.topics.remove(topic);
            }
        }
    }

    /// Deliver to sessions subscribed to `topic` only.
    pub async fn deliver_to_topic<T: Serialize>(&self, topic: &str, body: &T) -> usize {
        let Some(frame) = encode(topic.to_string(), body) else {
            return 0;
        };
        let guard = self.inner.read().await;
        match guard.topics.get(topic) {
            Some(ids) => guard.send_all(ids.iter(), &frame),
            None => 0,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn sessions_for_user(&self, user_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Unregister everything and refuse further registrations.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.write().await;
        guard.closed = true;
        let ids: Vec<SessionId> = guard.sessions.keys().copied().collect();
        for id in &ids {
            if guard.remove(*id).is_some() {
                metrics::session_unregistered();
            }
        }
        tracing::info!(sessions = ids.len(), "connection registry drained");
    }
}

fn encode<T: Serialize>(destination: String, body: &T) -> Option<String> {
    match serde_json::to_string(&OutboundFrame { destination, body }) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode outbound frame");
            None
        }
    }
}
