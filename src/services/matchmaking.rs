use crate::{
    error::{AppError, Result},
    models::{
        session::{Session, SessionView},
        task::TaskDescriptor,
    },
    services::{
        auth::{NewUser, Registration},
        membership, registry,
    },
    state::AppState,
};

/// The result of placing a newly registered user into a session.
#[derive(Debug)]
pub struct JoinResult {
    pub collab: SessionView,
    pub registration: Registration,
}

/// Registers a user and seats them in the oldest open session for the task,
/// creating a session when none has room.
///
/// If placement fails after registration, the registration is discarded so
/// no unmatched identity is left behind.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `input` - The new user's credentials and profile.
/// * `descriptor` - What the user wants to work on.
///
/// # Returns
///
/// A `Result` containing the `JoinResult`.
pub async fn join_or_create(
    state: &AppState,
    input: NewUser,
    descriptor: &TaskDescriptor,
) -> Result<JoinResult> {
    let registration = state.auth.register(input).await?;

    match place(state, &registration, descriptor).await {
        Ok(collab) => Ok(JoinResult {
            collab,
            registration,
        }),
        Err(e) => {
            compensate(state, &registration).await;
            Err(e)
        }
    }
}

/// Undoes a registration whose placement failed. Failures are logged only.
pub(crate) async fn compensate(state: &AppState, registration: &Registration) {
    if let Err(e) = state.auth.discard(registration).await {
        tracing::error!(
            "❌ Could not discard unmatched user {}: {}",
            registration.user.id,
            e
        );
    }
}

async fn place(
    state: &AppState,
    registration: &Registration,
    descriptor: &TaskDescriptor,
) -> Result<SessionView> {
    let user_id = registration.user.id;

    if let Some(existing) = find_available_session(state, descriptor).await? {
        tracing::debug!("🎯 Matched user {} to session {}", user_id, existing.hash);
        match membership::add_member(state, user_id, &existing.hash).await {
            Ok(view) => return Ok(view),
            // Filled up or closed between lookup and insert; fall through to a new session.
            Err(AppError::BadRequest(_)) => {
                tracing::debug!("Session {} filled before user {} could join", existing.hash, user_id);
            }
            Err(e) => return Err(e),
        }
    }

    let task = state
        .store
        .find_task_for_descriptor(descriptor)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
        .ok_or_else(|| AppError::BadRequest("no task matches the requested descriptor".to_string()))?;

    let session = registry::create_session(state, task.id).await?;
    membership::add_member(state, user_id, &session.hash).await
}

/// The oldest open session for the descriptor that still has room.
pub async fn find_available_session(
    state: &AppState,
    descriptor: &TaskDescriptor,
) -> Result<Option<Session>> {
    let candidates = state
        .store
        .open_sessions_for_descriptor(descriptor)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(candidates
        .into_iter()
        .find(|c| c.member_count < state.config.session_capacity)
        .map(|c| c.session))
}
