use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    message::Message,
    referral::ReferralLink,
    session::{Session, SessionOccupancy},
    task::{Task, TaskDescriptor},
    user::{RosterEntry, User},
};
use crate::repositories::{JoinOutcome, Store, StoreError};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tasks: Vec<Task>,
    // Insertion order doubles as the creation tie-breaker.
    sessions: Vec<Session>,
    memberships: Vec<(Uuid, String)>,
    referrals: HashMap<String, ReferralLink>,
    messages: Vec<Message>,
}

impl Tables {
    fn member_count(&self, hash: &str) -> usize {
        self.memberships.iter().filter(|(_, h)| h == hash).count()
    }

    fn message_mut(&mut self, id: Uuid) -> Result<&mut Message, StoreError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound("message".to_string()))
    }
}

/// An in-process store. Every operation runs under one lock, which makes the
/// conditional membership insert trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    /// Number of stored users.
    pub fn user_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables()?.users.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut t = self.tables()?;
        if t.users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation("user id".to_string()));
        }
        if let Some(email) = &user.email {
            if t.users.values().any(|u| u.email.as_ref() == Some(email)) {
                return Err(StoreError::UniqueViolation("user email".to_string()));
            }
        }
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        t.users
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound("user".to_string()))?;
        t.memberships.retain(|(user_id, _)| *user_id != id);
        Ok(())
    }

    async fn update_user(
        &self,
        id: Uuid,
        user_name: Option<String>,
        profile_picture_url: Option<String>,
    ) -> Result<User, StoreError> {
        let mut t = self.tables()?;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("user".to_string()))?;
        if let Some(name) = user_name {
            user.user_name = name;
        }
        if let Some(url) = profile_picture_url {
            user.profile_picture_url = Some(url);
        }
        Ok(user.clone())
    }

    async fn create_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut t = self.tables()?;
        if t.tasks.iter().any(|existing| existing.id == task.id) {
            return Err(StoreError::UniqueViolation("task id".to_string()));
        }
        t.tasks.push(task.clone());
        Ok(task)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tables()?.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn find_task_for_descriptor(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Option<Task>, StoreError> {
        let t = self.tables()?;
        // Stable sort keeps insertion order among equal timestamps.
        let mut matching: Vec<&Task> = t.tasks.iter().filter(|task| descriptor.matches(task)).collect();
        matching.sort_by_key(|task| task.created_at);
        Ok(matching.first().map(|task| (*task).clone()))
    }

    async fn insert_session(&self, session: Session) -> Result<Session, StoreError> {
        let mut t = self.tables()?;
        if t.sessions.iter().any(|s| s.hash == session.hash) {
            return Err(StoreError::UniqueViolation("session hash".to_string()));
        }
        t.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session(&self, hash: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.tables()?.sessions.iter().find(|s| s.hash == hash).cloned())
    }

    async fn open_sessions_for_descriptor(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Vec<SessionOccupancy>, StoreError> {
        let t = self.tables()?;
        let mut open: Vec<SessionOccupancy> = t
            .sessions
            .iter()
            .filter(|s| !s.is_passed)
            .filter(|s| {
                t.tasks
                    .iter()
                    .find(|task| task.id == s.task_id)
                    .is_some_and(|task| descriptor.matches(task))
            })
            .map(|s| SessionOccupancy {
                session: s.clone(),
                member_count: t.member_count(&s.hash),
            })
            .collect();
        open.sort_by_key(|o| o.session.created_at);
        Ok(open)
    }

    async fn mark_session_passed(&self, hash: &str) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        let session = t
            .sessions
            .iter_mut()
            .find(|s| s.hash == hash)
            .ok_or_else(|| StoreError::NotFound("session".to_string()))?;
        let changed = !session.is_passed;
        session.is_passed = true;
        Ok(changed)
    }

    async fn insert_membership_if_open(
        &self,
        user_id: Uuid,
        hash: &str,
        capacity: usize,
    ) -> Result<JoinOutcome, StoreError> {
        let mut t = self.tables()?;
        let Some(session) = t.sessions.iter().find(|s| s.hash == hash) else {
            return Ok(JoinOutcome::SessionMissing);
        };
        if session.is_passed {
            return Ok(JoinOutcome::SessionClosed);
        }
        if t.memberships.iter().any(|(u, h)| *u == user_id && h == hash) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if t.member_count(hash) >= capacity {
            return Ok(JoinOutcome::SessionFull);
        }
        t.memberships.push((user_id, hash.to_string()));
        Ok(JoinOutcome::Inserted)
    }

    async fn delete_membership(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        let before = t.memberships.len();
        t.memberships.retain(|(u, h)| !(*u == user_id && h == hash));
        Ok(t.memberships.len() != before)
    }

    async fn membership_exists(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables()?
            .memberships
            .iter()
            .any(|(u, h)| *u == user_id && h == hash))
    }

    async fn count_members(&self, hash: &str) -> Result<usize, StoreError> {
        Ok(self.tables()?.member_count(hash))
    }

    async fn list_members(&self, hash: &str) -> Result<Vec<RosterEntry>, StoreError> {
        let t = self.tables()?;
        Ok(t.memberships
            .iter()
            .filter(|(_, h)| h == hash)
            .filter_map(|(user_id, _)| t.users.get(user_id))
            .map(RosterEntry::from)
            .collect())
    }

    async fn create_referral(&self, link: ReferralLink) -> Result<ReferralLink, StoreError> {
        let mut t = self.tables()?;
        if t.referrals.contains_key(&link.token) {
            return Err(StoreError::UniqueViolation("referral token".to_string()));
        }
        t.referrals.insert(link.token.clone(), link.clone());
        Ok(link)
    }

    async fn find_referral(&self, token: &str) -> Result<Option<ReferralLink>, StoreError> {
        Ok(self.tables()?.referrals.get(token).cloned())
    }

    async fn insert_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut t = self.tables()?;
        if !t.sessions.iter().any(|s| s.hash == message.session_hash) {
            return Err(StoreError::NotFound("session".to_string()));
        }
        t.messages.push(message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self.tables()?.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn update_message_content(&self, id: Uuid, content: &str) -> Result<Message, StoreError> {
        let mut t = self.tables()?;
        let message = t.message_mut(id)?;
        message.content = content.to_string();
        message.is_edited = true;
        message.updated_at = Utc::now();
        Ok(message.clone())
    }

    async fn set_message_pinned(&self, id: Uuid, pinned: bool) -> Result<Message, StoreError> {
        let mut t = self.tables()?;
        let message = t.message_mut(id)?;
        message.is_pinned = pinned;
        message.updated_at = Utc::now();
        Ok(message.clone())
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        let before = t.messages.len();
        t.messages.retain(|m| m.id != id);
        Ok(t.messages.len() != before)
    }

    async fn list_messages(&self, hash: &str) -> Result<Vec<Message>, StoreError> {
        let t = self.tables()?;
        let mut messages: Vec<Message> = t
            .messages
            .iter()
            .filter(|m| m.session_hash == hash)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.updated_at);
        Ok(messages)
    }

    async fn search_messages(&self, hash: &str, query: &str) -> Result<Vec<Message>, StoreError> {
        let t = self.tables()?;
        let mut messages: Vec<Message> = t
            .messages
            .iter()
            .filter(|m| m.session_hash == hash && m.content.contains(query))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.updated_at);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::Difficulty;

    fn session(hash: &str, task_id: Uuid) -> Session {
        Session {
            hash: hash.to_string(),
            task_id,
            is_passed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_session_hash_is_a_unique_violation() {
        let store = MemoryStore::new();
        let task_id = Uuid::new_v4();
        store.insert_session(session("deadbeef", task_id)).await.unwrap();

        let err = store.insert_session(session("deadbeef", task_id)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn conditional_insert_reports_each_refusal() {
        let store = MemoryStore::new();
        store.insert_session(session("0000aaaa", Uuid::new_v4())).await.unwrap();
        let user = Uuid::new_v4();

        assert_eq!(
            store.insert_membership_if_open(user, "ffffffff", 4).await.unwrap(),
            JoinOutcome::SessionMissing
        );
        assert_eq!(
            store.insert_membership_if_open(user, "0000aaaa", 1).await.unwrap(),
            JoinOutcome::Inserted
        );
        assert_eq!(
            store.insert_membership_if_open(user, "0000aaaa", 4).await.unwrap(),
            JoinOutcome::AlreadyMember
        );
        assert_eq!(
            store.insert_membership_if_open(Uuid::new_v4(), "0000aaaa", 1).await.unwrap(),
            JoinOutcome::SessionFull
        );

        store.mark_session_passed("0000aaaa").await.unwrap();
        assert_eq!(
            store.insert_membership_if_open(Uuid::new_v4(), "0000aaaa", 4).await.unwrap(),
            JoinOutcome::SessionClosed
        );
    }

    #[tokio::test]
    async fn search_is_case_sensitive_and_scoped() {
        let store = MemoryStore::new();
        let task_id = Uuid::new_v4();
        store.insert_session(session("11111111", task_id)).await.unwrap();
        store.insert_session(session("22222222", task_id)).await.unwrap();
        let author = Uuid::new_v4();

        for (hash, content) in [
            ("11111111", "Hello there"),
            ("11111111", "hello again"),
            ("22222222", "Hello elsewhere"),
        ] {
            let now = Utc::now();
            store
                .insert_message(Message {
                    id: Uuid::new_v4(),
                    session_hash: hash.to_string(),
                    user_id: author,
                    content: content.to_string(),
                    is_edited: false,
                    is_pinned: false,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let found = store.search_messages("11111111", "Hello").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "Hello there");
    }

    #[tokio::test]
    async fn descriptor_skips_deleted_tasks() {
        let store = MemoryStore::new();
        let mut task = Task {
            id: Uuid::new_v4(),
            title: "Two sum".to_string(),
            category: "algorithms".to_string(),
            difficulty: Difficulty::Easy,
            content: "...".to_string(),
            is_deleted: true,
            created_at: Utc::now(),
        };
        store.create_task(task.clone()).await.unwrap();
        task.id = Uuid::new_v4();
        task.is_deleted = false;
        store.create_task(task.clone()).await.unwrap();

        let descriptor = TaskDescriptor {
            category: "algorithms".to_string(),
            difficulty: Difficulty::Easy,
            title: None,
        };
        let found = store.find_task_for_descriptor(&descriptor).await.unwrap().unwrap();
        assert_eq!(found.id, task.id);
    }
}
