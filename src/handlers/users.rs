use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response,
    models::user::Identity,
    services::users::{self, UpdateUser},
    state::AppState,
    validation::input::validate,
};

#[derive(Deserialize, Validate)]
pub struct EmailQuery {
    #[garde(email)]
    pub email: String,
}

/// Fetches a user's public profile.
#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response> {
    let user = users::get_user(&state, user_id).await?;
    response::json(StatusCode::OK, &user)
}

/// Looks a user up by `?email=`.
#[axum::debug_handler]
pub async fn find_by_email(
    State(state): State<AppState>,
    Query(params): Query<EmailQuery>,
) -> Result<Response> {
    validate(&params)?;
    let user = users::find_by_email(&state, &params.email).await?;
    response::json(StatusCode::OK, &user)
}

/// Updates the caller's own profile.
#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> Result<Response> {
    validate(&payload)?;
    let user = users::update_profile(&state, identity.user_id, user_id, payload).await?;
    response::json(StatusCode::OK, &user)
}
