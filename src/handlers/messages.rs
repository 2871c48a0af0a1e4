use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response,
    models::user::Identity,
    services::{membership, messages as message_service},
    state::AppState,
    validation::input::{validate, validate_query, validate_session_hash},
};

/// The request payload for posting or editing a message.
#[derive(Deserialize, Validate)]
pub struct MessageRequest {
    #[garde(length(min = 1, max = 4000))]
    pub content: String,
}

#[derive(Deserialize)]
pub struct PinRequest {
    pub pinned: bool,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

/// Lists a collab's messages for a member.
#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    membership::require_membership(&state, identity.user_id, &hash).await?;
    let messages = message_service::list_by_session(&state, &hash).await?;
    response::json(StatusCode::OK, &messages)
}

/// Posts a message to a collab.
#[axum::debug_handler]
pub async fn create_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
    Json(payload): Json<MessageRequest>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    validate(&payload)?;
    let message = message_service::create(&state, &hash, identity.user_id, payload.content).await?;
    response::json(StatusCode::CREATED, &message)
}

/// Searches a collab's messages by substring.
#[axum::debug_handler]
pub async fn search_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    validate_query(&params.query)?;
    let messages = message_service::search(&state, &hash, identity.user_id, &params.query).await?;
    response::json(StatusCode::OK, &messages)
}

/// Edits the caller's own message.
#[axum::debug_handler]
pub async fn update_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<MessageRequest>,
) -> Result<Response> {
    validate(&payload)?;
    let message = message_service::update(&state, message_id, identity.user_id, payload.content).await?;
    response::json(StatusCode::OK, &message)
}

/// Deletes the caller's own message.
#[axum::debug_handler]
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
) -> Result<Response> {
    message_service::delete(&state, message_id, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Pins or unpins a message.
#[axum::debug_handler]
pub async fn pin_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<PinRequest>,
) -> Result<Response> {
    let message =
        message_service::set_pinned(&state, message_id, identity.user_id, payload.pinned).await?;
    response::json(StatusCode::OK, &message)
}
