use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message scoped to one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The unique identifier for the message.
    pub id: Uuid,
    /// The session the message belongs to.
    pub session_hash: String,
    /// The author. Only the author may edit or delete.
    pub user_id: Uuid,
    /// The message body.
    pub content: String,
    pub is_edited: bool,
    pub is_pinned: bool,
    /// The timestamp when the message was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last edit or pin change.
    pub updated_at: DateTime<Utc>,
}
