use chrono::Utc;
use uuid::Uuid;

use crate::{
    crypto::token::generate_session_hash,
    error::{AppError, Result},
    models::session::Session,
    repositories::StoreError,
    state::AppState,
};

/// Creates a new open session for a task under a fresh random hash.
///
/// Hash uniqueness is enforced by the store; a collision is retried with a new
/// hash up to `session_create_retries` times.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `task_id` - The task the session works on.
///
/// # Returns
///
/// A `Result` containing the created `Session`.
pub async fn create_session(state: &AppState, task_id: Uuid) -> Result<Session> {
    create_session_with(state, task_id, generate_session_hash).await
}

/// [`create_session`] with an injectable hash source.
pub async fn create_session_with<F>(
    state: &AppState,
    task_id: Uuid,
    mut next_hash: F,
) -> Result<Session>
where
    F: FnMut() -> String,
{
    let attempts = state.config.session_create_retries.max(1);

    for attempt in 1..=attempts {
        let session = Session {
            hash: next_hash(),
            task_id,
            is_passed: false,
            created_at: Utc::now(),
        };

        match state.store.insert_session(session).await {
            Ok(session) => {
                tracing::info!("✅ Session {} created for task {}", session.hash, task_id);
                return Ok(session);
            }
            Err(StoreError::UniqueViolation(_)) => {
                tracing::warn!(
                    "⚠️ Session hash collision (attempt {}/{}), retrying",
                    attempt,
                    attempts
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::ResourceExhausted(format!(
        "could not allocate a unique session hash after {} attempts",
        attempts
    )))
}

/// Looks up a session by hash.
pub async fn get_session_by_hash(state: &AppState, hash: &str) -> Result<Session> {
    state
        .store
        .find_session(hash)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("session {} not found", hash)))
}

/// Whether the session currently accepts members.
///
/// This is a snapshot. The authoritative check runs atomically with the insert
/// in [`crate::services::membership::add_member`].
pub async fn is_session_open(state: &AppState, hash: &str) -> Result<bool> {
    let session = get_session_by_hash(state, hash).await?;
    if session.is_passed {
        return Ok(false);
    }
    let count = state.store.count_members(hash).await?;
    Ok(count < state.config.session_capacity)
}

/// Marks a session as passed. Closing an already-closed session is a no-op.
pub async fn close_session(state: &AppState, hash: &str) -> Result<()> {
    let changed = state.store.mark_session_passed(hash).await.map_err(|e| match e {
        StoreError::NotFound(_) => AppError::NotFound(format!("session {} not found", hash)),
        other => other.into(),
    })?;

    if changed {
        tracing::info!("🏁 Session {} closed", hash);
    } else {
        tracing::debug!("Session {} was already closed", hash);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn state() -> AppState {
        AppState::in_memory(Config::default())
    }

    #[tokio::test]
    async fn created_session_is_open_and_empty() {
        let state = state();
        let created = create_session(&state, Uuid::new_v4()).await.unwrap();

        let fetched = get_session_by_hash(&state, &created.hash).await.unwrap();
        assert!(!fetched.is_passed);
        assert_eq!(fetched.hash.len(), 8);
        assert_eq!(state.store.count_members(&fetched.hash).await.unwrap(), 0);
        assert!(is_session_open(&state, &fetched.hash).await.unwrap());
    }

    #[tokio::test]
    async fn collision_is_retried_with_a_new_hash() {
        let state = state();
        let task_id = Uuid::new_v4();
        create_session_with(&state, task_id, || "deadbeef".to_string())
            .await
            .unwrap();

        let mut candidates = vec!["cafebabe", "deadbeef"];
        let session = create_session_with(&state, task_id, || candidates.pop().unwrap().to_string())
            .await
            .unwrap();
        assert_eq!(session.hash, "cafebabe");
    }

    #[tokio::test]
    async fn persistent_collision_exhausts_retries() {
        let state = state();
        let task_id = Uuid::new_v4();
        create_session_with(&state, task_id, || "deadbeef".to_string())
            .await
            .unwrap();

        let mut calls = 0;
        let err = create_session_with(&state, task_id, || {
            calls += 1;
            "deadbeef".to_string()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ResourceExhausted(_)));
        assert_eq!(calls, state.config.session_create_retries);
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let state = state();
        let err = get_session_by_hash(&state, "00000000").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let state = state();
        let session = create_session(&state, Uuid::new_v4()).await.unwrap();

        close_session(&state, &session.hash).await.unwrap();
        close_session(&state, &session.hash).await.unwrap();

        assert!(get_session_by_hash(&state, &session.hash).await.unwrap().is_passed);
        assert!(!is_session_open(&state, &session.hash).await.unwrap());
    }
}
