use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response,
    models::user::Identity,
    services::tasks::{self, NewTask},
    state::AppState,
    validation::input::validate,
};

/// Publishes a task.
#[axum::debug_handler]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<NewTask>,
) -> Result<Response> {
    tracing::info!("📚 Task submitted by {}: {}", identity.user_id, payload.title);
    validate(&payload)?;
    let task = tasks::create_task(&state, payload).await?;
    response::json(StatusCode::CREATED, &task)
}

#[axum::debug_handler]
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Response> {
    let task = tasks::get_task(&state, task_id).await?;
    response::json(StatusCode::OK, &task)
}
