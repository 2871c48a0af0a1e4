use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{message::Message, task::Task, user::RosterEntry};

/// A capacity-bounded collab session, addressed by its hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Eight hex characters derived from four random bytes.
    pub hash: String,
    /// The task this session works on.
    pub task_id: Uuid,
    /// True once the session is finalized. Closed sessions accept no members.
    pub is_passed: bool,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
}

/// An open session together with its current member count.
#[derive(Clone, Debug)]
pub struct SessionOccupancy {
    pub session: Session,
    pub member_count: usize,
}

/// A session with its task, messages and roster, as returned to callers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub task: Task,
    pub messages: Vec<Message>,
    pub members: Vec<RosterEntry>,
}
