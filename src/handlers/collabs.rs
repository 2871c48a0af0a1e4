use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    error::Result,
    handlers::{auth::set_refresh_cookie, response},
    models::{
        session::SessionView,
        task::TaskDescriptor,
        user::{Identity, User},
    },
    services::{
        auth::NewUser,
        matchmaking::{self, JoinResult},
        membership, referral, registry,
    },
    state::AppState,
    validation::input::{validate, validate_session_hash},
};

/// The request payload for joining a collab by task.
#[derive(Deserialize, Validate)]
pub struct JoinRequest {
    #[garde(dive)]
    pub user: NewUser,
    #[garde(dive)]
    pub task: TaskDescriptor,
}

/// The request payload for joining a collab by invite.
#[derive(Deserialize, Validate)]
pub struct InviteRequest {
    #[garde(length(min = 1, max = 256))]
    pub referral: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse<'a> {
    collab: &'a SessionView,
    user: &'a User,
    access_token: &'a str,
}

fn join_response(state: &AppState, cookies: &Cookies, result: &JoinResult) -> Result<Response> {
    set_refresh_cookie(state, cookies, &result.registration);
    response::json(
        StatusCode::CREATED,
        &JoinResponse {
            collab: &result.collab,
            user: &result.registration.user,
            access_token: &result.registration.tokens.access_token,
        },
    )
}

/// Registers a user and seats them in a collab for the requested task.
#[axum::debug_handler]
pub async fn join(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<JoinRequest>,
) -> Result<Response> {
    validate(&payload)?;
    tracing::info!("🎯 Join request for {} / {}", payload.task.category, payload.task.difficulty);

    let result = matchmaking::join_or_create(&state, payload.user, &payload.task).await?;
    join_response(&state, &cookies, &result)
}

/// Seats a guest in the collab a referral link points to.
#[axum::debug_handler]
pub async fn invite(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<InviteRequest>,
) -> Result<Response> {
    validate(&payload)?;

    let result = referral::invite(&state, &payload.referral).await?;
    join_response(&state, &cookies, &result)
}

/// Returns the full collab view to a member.
#[axum::debug_handler]
pub async fn get_collab(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    let view = membership::get_collab(&state, identity.user_id, &hash).await?;
    response::json(StatusCode::OK, &view)
}

/// Returns the collab roster to a member.
#[axum::debug_handler]
pub async fn members(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    membership::require_membership(&state, identity.user_id, &hash).await?;
    let roster = membership::get_roster(&state, &hash).await?;
    response::json(StatusCode::OK, &roster)
}

/// Removes the caller from a collab.
#[axum::debug_handler]
pub async fn leave(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    membership::remove_member(&state, identity.user_id, &hash).await?;
    response::json(StatusCode::OK, &sonic_rs::json!({ "message": "Left collab" }))
}

/// Marks a collab as passed. Members only.
#[axum::debug_handler]
pub async fn close(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(hash): Path<String>,
) -> Result<Response> {
    validate_session_hash(&hash)?;
    membership::require_membership(&state, identity.user_id, &hash).await?;
    registry::close_session(&state, &hash).await?;
    response::json(StatusCode::OK, &sonic_rs::json!({ "message": "Collab closed" }))
}
