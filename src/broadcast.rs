//! Best-effort push of room events to connected sockets.
//!
//! Services only see the [`Broadcaster`] interface. The socket transport owns the
//! connection-to-room mapping through [`RoomHub`].

use std::fmt;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event carrying the current roster of a session.
pub const UPDATE_USERS: &str = "updateUsers";
pub const NEW_MESSAGE: &str = "newMessage";
pub const MESSAGE_UPDATED: &str = "messageUpdated";
pub const MESSAGE_DELETED: &str = "messageDeleted";

/// Unique socket connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::new_v4()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Broadcaster: Send + Sync {
    /// Subscribes a connection to a session's room, leaving any previous room.
    fn join_room(&self, connection: &ConnectionId, session_hash: &str);
    fn leave_room(&self, connection: &ConnectionId);
    /// Unsubscribes every connection of `user_id` that watches `session_hash`.
    fn evict_user(&self, user_id: Uuid, session_hash: &str);
    /// Pushes an already-serialized frame to every connection in the room.
    /// Must not block on slow or disconnected subscribers.
    fn emit_to_room(&self, session_hash: &str, event: &str, frame: String);
}

#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

/// Serializes `{"event": .., "data": ..}`.
pub fn encode_frame<T: Serialize>(event: &str, data: &T) -> Option<String> {
    match sonic_rs::to_string(&Frame { event, data }) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("❌ Failed to encode '{}' frame: {}", event, e);
            None
        }
    }
}

/// Encodes and emits an event to a room.
pub fn publish<T: Serialize>(
    broadcaster: &dyn Broadcaster,
    session_hash: &str,
    event: &str,
    data: &T,
) {
    if let Some(frame) = encode_frame(event, data) {
        broadcaster.emit_to_room(session_hash, event, frame);
    }
}

struct Subscriber {
    user_id: Uuid,
    room: Option<String>,
    tx: mpsc::Sender<String>,
}

/// Registry of connected sockets and the room each one watches.
pub struct RoomHub {
    connections: DashMap<ConnectionId, Subscriber>,
    max_send_queue: usize,
}

impl RoomHub {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Registers a new connection and returns its ID and outbound queue.
    pub fn register(&self, user_id: Uuid) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.connections.insert(
            id.clone(),
            Subscriber {
                user_id,
                room: None,
                tx,
            },
        );
        (id, rx)
    }

    pub fn unregister(&self, id: &ConnectionId) {
        self.connections.remove(id);
    }

    /// Queues a frame for one connection. Returns false if it was dropped.
    pub fn send_to(&self, id: &ConnectionId, frame: String) -> bool {
        match self.connections.get(id) {
            Some(sub) => sub.tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn room_of(&self, id: &ConnectionId) -> Option<String> {
        self.connections.get(id).and_then(|sub| sub.room.clone())
    }

    /// Number of connected sockets.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Broadcaster for RoomHub {
    fn join_room(&self, connection: &ConnectionId, session_hash: &str) {
        if let Some(mut sub) = self.connections.get_mut(connection) {
            sub.room = Some(session_hash.to_string());
            tracing::debug!("🔌 {} joined room {}", connection, session_hash);
        }
    }

    fn leave_room(&self, connection: &ConnectionId) {
        if let Some(mut sub) = self.connections.get_mut(connection) {
            sub.room = None;
        }
    }

    fn evict_user(&self, user_id: Uuid, session_hash: &str) {
        for mut entry in self.connections.iter_mut() {
            if entry.user_id == user_id && entry.room.as_deref() == Some(session_hash) {
                entry.room = None;
                tracing::debug!("🔌 {} evicted from room {}", entry.key(), session_hash);
            }
        }
    }

    fn emit_to_room(&self, session_hash: &str, event: &str, frame: String) {
        let mut delivered = 0usize;
        for entry in self.connections.iter() {
            if entry.room.as_deref() != Some(session_hash) {
                continue;
            }
            match entry.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection = %entry.key(),
                        "Send queue full, dropping '{}' frame",
                        event
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        tracing::debug!("📣 '{}' to room {} reached {} socket(s)", event, session_hash, delivered);
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures every emitted frame.
    #[derive(Default)]
    pub struct RecordingBroadcaster {
        pub frames: Mutex<Vec<(String, String, String)>>,
        pub evictions: Mutex<Vec<(Uuid, String)>>,
    }

    impl RecordingBroadcaster {
        /// Frames emitted for `event`, parsed as JSON.
        pub fn emitted(&self, event: &str) -> Vec<(String, serde_json::Value)> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, e, _)| e == event)
                .map(|(room, _, frame)| (room.clone(), serde_json::from_str(frame).unwrap()))
                .collect()
        }
    }

    impl Broadcaster for RecordingBroadcaster {
        fn join_room(&self, _connection: &ConnectionId, _session_hash: &str) {}

        fn leave_room(&self, _connection: &ConnectionId) {}

        fn evict_user(&self, user_id: Uuid, session_hash: &str) {
            self.evictions
                .lock()
                .unwrap()
                .push((user_id, session_hash.to_string()));
        }

        fn emit_to_room(&self, session_hash: &str, event: &str, frame: String) {
            self.frames
                .lock()
                .unwrap()
                .push((session_hash.to_string(), event.to_string(), frame));
        }
    }
}
