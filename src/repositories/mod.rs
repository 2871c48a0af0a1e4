//! Store adapter: transactional CRUD over users, tasks, sessions, memberships,
//! referral links and messages.
//!
//! The services never talk to a database directly. They go through [`Store`],
//! which has a PostgreSQL implementation for production and an in-process one
//! for tests and local development.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    message::Message,
    referral::ReferralLink,
    session::{Session, SessionOccupancy},
    task::{Task, TaskDescriptor},
    user::{RosterEntry, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Failures raised by a store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("duplicate {0}")]
    UniqueViolation(String),

    /// The row addressed by an update or delete does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Anything else the backend reports.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The result of a conditional membership insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The membership row was written.
    Inserted,
    /// No session has that hash.
    SessionMissing,
    /// The session is passed.
    SessionClosed,
    /// The session already holds `capacity` members.
    SessionFull,
    /// The user already holds a membership in the session.
    AlreadyMember,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: User) -> Result<User, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError>;
    /// Overwrites the fields given as `Some`, leaving the others untouched.
    async fn update_user(
        &self,
        id: Uuid,
        user_name: Option<String>,
        profile_picture_url: Option<String>,
    ) -> Result<User, StoreError>;

    async fn create_task(&self, task: Task) -> Result<Task, StoreError>;
    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    /// The oldest non-deleted task satisfying `descriptor`.
    async fn find_task_for_descriptor(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Option<Task>, StoreError>;

    /// Inserts a session. Fails with `UniqueViolation` if the hash is taken.
    async fn insert_session(&self, session: Session) -> Result<Session, StoreError>;
    async fn find_session(&self, hash: &str) -> Result<Option<Session>, StoreError>;
    /// Sessions with `is_passed = false` whose task satisfies `descriptor`,
    /// oldest first (ties broken by insertion order).
    async fn open_sessions_for_descriptor(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Vec<SessionOccupancy>, StoreError>;
    /// Sets `is_passed = true`. Returns whether the flag changed.
    async fn mark_session_passed(&self, hash: &str) -> Result<bool, StoreError>;

    /// Inserts `(user_id, hash)` iff the session exists, is not passed and holds
    /// fewer than `capacity` members. The check and the insert are atomic with
    /// respect to every other call targeting the same hash.
    async fn insert_membership_if_open(
        &self,
        user_id: Uuid,
        hash: &str,
        capacity: usize,
    ) -> Result<JoinOutcome, StoreError>;
    /// Returns whether a row was deleted.
    async fn delete_membership(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError>;
    async fn membership_exists(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError>;
    async fn count_members(&self, hash: &str) -> Result<usize, StoreError>;
    /// Members of the session in membership insertion order.
    async fn list_members(&self, hash: &str) -> Result<Vec<RosterEntry>, StoreError>;

    async fn create_referral(&self, link: ReferralLink) -> Result<ReferralLink, StoreError>;
    async fn find_referral(&self, token: &str) -> Result<Option<ReferralLink>, StoreError>;

    async fn insert_message(&self, message: Message) -> Result<Message, StoreError>;
    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, StoreError>;
    /// Replaces the content, sets `is_edited` and bumps `updated_at`.
    async fn update_message_content(&self, id: Uuid, content: &str) -> Result<Message, StoreError>;
    async fn set_message_pinned(&self, id: Uuid, pinned: bool) -> Result<Message, StoreError>;
    /// Returns whether a row was deleted.
    async fn delete_message(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Messages of the session, ascending by `updated_at`.
    async fn list_messages(&self, hash: &str) -> Result<Vec<Message>, StoreError>;
    /// Messages of the session whose content contains `query`, case-sensitively.
    async fn search_messages(&self, hash: &str, query: &str) -> Result<Vec<Message>, StoreError>;
}
