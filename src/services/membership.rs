use uuid::Uuid;

use crate::{
    broadcast::{self, UPDATE_USERS},
    error::{AppError, Result},
    models::{
        session::{Session, SessionView},
        user::RosterEntry,
    },
    repositories::JoinOutcome,
    services::registry,
    state::AppState,
};

/// Adds a user to a session and pushes the new roster to the session's room.
///
/// The open/capacity check and the insert run as one atomic store operation,
/// so concurrent joins can never push a session past capacity. If the view
/// cannot be built afterwards the membership is removed again and nothing
/// is broadcast.
///
/// # Returns
///
/// A `Result` containing the refreshed `SessionView`.
pub async fn add_member(state: &AppState, user_id: Uuid, hash: &str) -> Result<SessionView> {
    let outcome = state
        .store
        .insert_membership_if_open(user_id, hash, state.config.session_capacity)
        .await
        .map_err(|e| {
            tracing::error!("❌ Error adding user {} to session {}: {}", user_id, hash, e);
            AppError::Internal("Error adding user to session".to_string())
        })?;

    match outcome {
        JoinOutcome::Inserted => {}
        JoinOutcome::SessionMissing => {
            return Err(AppError::NotFound(format!("session {} not found", hash)));
        }
        JoinOutcome::SessionClosed | JoinOutcome::SessionFull => {
            tracing::debug!("Session {} refused user {}: {:?}", hash, user_id, outcome);
            return Err(AppError::BadRequest("session not available".to_string()));
        }
        JoinOutcome::AlreadyMember => {
            return Err(AppError::Conflict("user already in session".to_string()));
        }
    }

    let view = match session_view(state, hash).await {
        Ok(view) => view,
        Err(e) => {
            if let Err(undo) = state.store.delete_membership(user_id, hash).await {
                tracing::error!(
                    "❌ Could not undo membership of {} in {}: {}",
                    user_id,
                    hash,
                    undo
                );
            }
            return Err(e);
        }
    };

    tracing::info!("👥 User {} joined session {}", user_id, hash);
    broadcast::publish(state.broadcaster.as_ref(), hash, UPDATE_USERS, &view.members);
    Ok(view)
}

/// Removes a user from a session, unsubscribes their sockets from its room
/// and pushes the new roster.
///
/// An emptied session stays open; closing is a separate action.
pub async fn remove_member(state: &AppState, user_id: Uuid, hash: &str) -> Result<()> {
    let deleted = state.store.delete_membership(user_id, hash).await?;
    if !deleted {
        return Err(AppError::NotFound(format!(
            "user {} is not a member of session {}",
            user_id, hash
        )));
    }

    tracing::info!("👋 User {} left session {}", user_id, hash);
    state.broadcaster.evict_user(user_id, hash);
    broadcast_roster(state, hash).await
}

/// The public projection of the session's members.
pub async fn get_roster(state: &AppState, hash: &str) -> Result<Vec<RosterEntry>> {
    Ok(state.store.list_members(hash).await?)
}

/// Fetches the session and asserts `user_id` is a member of it.
pub async fn require_membership(state: &AppState, user_id: Uuid, hash: &str) -> Result<Session> {
    let session = registry::get_session_by_hash(state, hash).await?;
    if !state.store.membership_exists(user_id, hash).await? {
        return Err(AppError::BadRequest("user not in session".to_string()));
    }
    Ok(session)
}

/// The full session view for a member.
pub async fn get_collab(state: &AppState, user_id: Uuid, hash: &str) -> Result<SessionView> {
    require_membership(state, user_id, hash).await?;
    session_view(state, hash).await
}

/// The session with its task, messages and roster.
pub async fn session_view(state: &AppState, hash: &str) -> Result<SessionView> {
    let session = registry::get_session_by_hash(state, hash).await?;
    let task = state
        .store
        .find_task(session.task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task {} not found", session.task_id)))?;
    let messages = state.store.list_messages(hash).await?;
    let members = state.store.list_members(hash).await?;

    Ok(SessionView {
        session,
        task,
        messages,
        members,
    })
}

/// Recomputes the roster and emits it. Never waits on subscribers.
async fn broadcast_roster(state: &AppState, hash: &str) -> Result<()> {
    let roster = get_roster(state, hash).await?;
    broadcast::publish(state.broadcaster.as_ref(), hash, UPDATE_USERS, &roster);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::broadcast::{testing::RecordingBroadcaster, RoomHub};
    use crate::config::Config;
    use crate::models::{
        task::{Difficulty, Task},
        user::User,
    };
    use crate::repositories::MemoryStore;
    use crate::token_cache::MemoryTokenCache;

    /// A state over concrete in-memory backends the test can inspect.
    pub(crate) struct Fixture {
        pub state: AppState,
        pub recorder: Arc<RecordingBroadcaster>,
        pub store: Arc<MemoryStore>,
        pub tokens: Arc<MemoryTokenCache>,
    }

    pub(crate) fn fixture() -> Fixture {
        let recorder = Arc::new(RecordingBroadcaster::default());
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(MemoryTokenCache::new());
        let state = AppState::from_parts(
            Config::default(),
            store.clone(),
            tokens.clone(),
            recorder.clone(),
            Arc::new(RoomHub::new(8)),
        );
        Fixture {
            state,
            recorder,
            store,
            tokens,
        }
    }

    pub(crate) fn recording_state() -> (AppState, Arc<RecordingBroadcaster>) {
        let Fixture { state, recorder, .. } = fixture();
        (state, recorder)
    }

    pub(crate) async fn seed_user(state: &AppState, name: &str) -> Uuid {
        state
            .store
            .create_user(User {
                id: Uuid::new_v4(),
                email: None,
                user_name: name.to_string(),
                profile_picture_url: Some(format!("https://cdn.example/{}.png", name)),
                password_hash: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id
    }

    pub(crate) async fn seed_task(state: &AppState, category: &str) -> Task {
        state
            .store
            .create_task(Task {
                id: Uuid::new_v4(),
                title: "Reverse a linked list".to_string(),
                category: category.to_string(),
                difficulty: Difficulty::Medium,
                content: "Given the head of a list...".to_string(),
                is_deleted: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn session_with_members(state: &AppState, n: usize) -> String {
        let task = seed_task(state, "lists").await;
        let session = registry::create_session(state, task.id).await.unwrap();
        for i in 0..n {
            let user = seed_user(state, &format!("member{}", i)).await;
            add_member(state, user, &session.hash).await.unwrap();
        }
        session.hash
    }

    #[tokio::test]
    async fn fourth_member_fits_and_roster_is_broadcast() {
        let (state, recorder) = recording_state();
        let hash = session_with_members(&state, 3).await;

        let fourth = seed_user(&state, "fourth").await;
        let view = add_member(&state, fourth, &hash).await.unwrap();
        assert_eq!(view.members.len(), 4);

        let frames = recorder.emitted(UPDATE_USERS);
        let (room, last) = frames.last().unwrap();
        assert_eq!(room, &hash);
        assert_eq!(last["event"], "updateUsers");
        let roster = last["data"].as_array().unwrap();
        assert_eq!(roster.len(), 4);
        assert_eq!(roster[3]["userName"], "fourth");
        assert!(roster[3]["profilePictureUrl"].is_string());
        assert!(roster[3]["id"].is_string());
    }

    #[tokio::test]
    async fn fifth_member_is_refused() {
        let (state, _) = recording_state();
        let hash = session_with_members(&state, 4).await;

        let fifth = seed_user(&state, "fifth").await;
        let err = add_member(&state, fifth, &hash).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "session not available"));
        assert_eq!(state.store.count_members(&hash).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn closed_session_refuses_any_member_count() {
        for existing in 0..4 {
            let (state, _) = recording_state();
            let hash = session_with_members(&state, existing).await;
            registry::close_session(&state, &hash).await.unwrap();

            let late = seed_user(&state, "late").await;
            let err = add_member(&state, late, &hash).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "existing = {}", existing);
        }
    }

    #[tokio::test]
    async fn joining_twice_is_a_conflict() {
        let (state, _) = recording_state();
        let hash = session_with_members(&state, 0).await;
        let user = seed_user(&state, "twice").await;

        add_member(&state, user, &hash).await.unwrap();
        let err = add_member(&state, user, &hash).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_never_exceed_capacity() {
        let (state, _) = recording_state();
        let hash = session_with_members(&state, 0).await;

        let mut users = Vec::new();
        for i in 0..12 {
            users.push(seed_user(&state, &format!("racer{}", i)).await);
        }

        let handles: Vec<_> = users
            .into_iter()
            .map(|user| {
                let state = state.clone();
                let hash = hash.clone();
                tokio::spawn(async move { add_member(&state, user, &hash).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 4);
        assert_eq!(state.store.count_members(&hash).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn leave_broadcasts_and_keeps_session_open() {
        let (state, recorder) = recording_state();
        let hash = session_with_members(&state, 2).await;
        let roster = get_roster(&state, &hash).await.unwrap();

        remove_member(&state, roster[0].id, &hash).await.unwrap();

        let (_, last) = recorder.emitted(UPDATE_USERS).pop().unwrap();
        assert_eq!(last["data"].as_array().unwrap().len(), 1);
        assert!(registry::is_session_open(&state, &hash).await.unwrap());

        let err = remove_member(&state, roster[0].id, &hash).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn leaving_evicts_the_leavers_sockets() {
        let (state, recorder) = recording_state();
        let hash = session_with_members(&state, 2).await;
        let leaver = get_roster(&state, &hash).await.unwrap()[1].id;

        remove_member(&state, leaver, &hash).await.unwrap();

        let evictions = recorder.evictions.lock().unwrap().clone();
        assert_eq!(evictions, vec![(leaver, hash.clone())]);
    }

    #[tokio::test]
    async fn failed_view_rolls_the_join_back_silently() {
        let (state, recorder) = recording_state();
        // A session whose task row is gone: the insert succeeds, the view cannot.
        let session = registry::create_session(&state, Uuid::new_v4()).await.unwrap();
        let user = seed_user(&state, "orphan").await;

        let err = add_member(&state, user, &session.hash).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.store.count_members(&session.hash).await.unwrap(), 0);
        assert!(recorder.emitted(UPDATE_USERS).is_empty());
    }

    #[tokio::test]
    async fn require_membership_gates_outsiders() {
        let (state, _) = recording_state();
        let hash = session_with_members(&state, 1).await;
        let member = get_roster(&state, &hash).await.unwrap()[0].id;
        let outsider = seed_user(&state, "outsider").await;

        assert!(require_membership(&state, member, &hash).await.is_ok());
        let err = require_membership(&state, outsider, &hash).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "user not in session"));
    }
}
