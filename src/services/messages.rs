use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    broadcast::{self, MESSAGE_DELETED, MESSAGE_UPDATED, NEW_MESSAGE},
    error::{AppError, Result},
    models::message::Message,
    services::membership,
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedMessage {
    id: Uuid,
}

/// Posts a message to a session. Only members may post.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `hash` - The session to post to.
/// * `user_id` - The author.
/// * `content` - The message body.
///
/// # Returns
///
/// A `Result` containing the created `Message`.
pub async fn create(state: &AppState, hash: &str, user_id: Uuid, content: String) -> Result<Message> {
    membership::require_membership(state, user_id, hash).await?;

    let now = Utc::now();
    let message = state
        .store
        .insert_message(Message {
            id: Uuid::new_v4(),
            session_hash: hash.to_string(),
            user_id,
            content,
            is_edited: false,
            is_pinned: false,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::debug!("💬 Message {} posted to session {}", message.id, hash);
    broadcast::publish(state.broadcaster.as_ref(), hash, NEW_MESSAGE, &message);
    Ok(message)
}

/// All messages of a session, oldest update first.
pub async fn list_by_session(state: &AppState, hash: &str) -> Result<Vec<Message>> {
    Ok(state.store.list_messages(hash).await?)
}

/// Fetches a message and asserts `user_id` wrote it.
async fn owned_message(state: &AppState, message_id: Uuid, user_id: Uuid, action: &str) -> Result<Message> {
    let message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("message does not exist".to_string()))?;

    if message.user_id != user_id {
        return Err(AppError::Forbidden(format!("You can only {} your own messages", action)));
    }
    Ok(message)
}

/// Deletes a message. Authors only.
pub async fn delete(state: &AppState, message_id: Uuid, user_id: Uuid) -> Result<()> {
    let message = owned_message(state, message_id, user_id, "delete").await?;

    if !state.store.delete_message(message_id).await? {
        return Err(AppError::NotFound("message does not exist".to_string()));
    }

    broadcast::publish(
        state.broadcaster.as_ref(),
        &message.session_hash,
        MESSAGE_DELETED,
        &DeletedMessage { id: message_id },
    );
    Ok(())
}

/// Replaces a message's content and marks it edited. Authors only.
pub async fn update(state: &AppState, message_id: Uuid, user_id: Uuid, content: String) -> Result<Message> {
    owned_message(state, message_id, user_id, "edit").await?;

    let message = state.store.update_message_content(message_id, &content).await?;
    broadcast::publish(
        state.broadcaster.as_ref(),
        &message.session_hash,
        MESSAGE_UPDATED,
        &message,
    );
    Ok(message)
}

/// Pins or unpins a message. Any member of the message's session may do so.
pub async fn set_pinned(state: &AppState, message_id: Uuid, user_id: Uuid, pinned: bool) -> Result<Message> {
    let message = state
        .store
        .find_message(message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("message does not exist".to_string()))?;
    if !state.store.membership_exists(user_id, &message.session_hash).await? {
        return Err(AppError::Forbidden("You are not a member of this chat".to_string()));
    }

    let message = state.store.set_message_pinned(message_id, pinned).await?;
    broadcast::publish(
        state.broadcaster.as_ref(),
        &message.session_hash,
        MESSAGE_UPDATED,
        &message,
    );
    Ok(message)
}

/// Members-only, case-sensitive substring search within one session.
pub async fn search(state: &AppState, hash: &str, user_id: Uuid, query: &str) -> Result<Vec<Message>> {
    let is_member = state
        .store
        .find_session(hash)
        .await?
        .is_some()
        && state.store.membership_exists(user_id, hash).await?;
    if !is_member {
        return Err(AppError::Forbidden("You are not a member of this chat".to_string()));
    }

    Ok(state.store.search_messages(hash, query).await?)
}
