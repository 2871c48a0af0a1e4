use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::User,
    state::AppState,
};

/// A partial profile update. Absent fields are left as they are.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[garde(length(min = 1, max = 64))]
    #[serde(default)]
    pub user_name: Option<String>,
    #[garde(length(max = 2048))]
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Fetches a user by id.
pub async fn get_user(state: &AppState, user_id: Uuid) -> Result<User> {
    state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", user_id)))
}

/// Fetches a user by email.
pub async fn find_by_email(state: &AppState, email: &str) -> Result<User> {
    state
        .store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))
}

/// Updates the caller's own profile.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `caller` - The authenticated user.
/// * `user_id` - The profile to change; must equal `caller`.
/// * `changes` - The validated partial update.
///
/// # Returns
///
/// A `Result` containing the updated `User`.
pub async fn update_profile(
    state: &AppState,
    caller: Uuid,
    user_id: Uuid,
    changes: UpdateUser,
) -> Result<User> {
    if caller != user_id {
        tracing::warn!("⚠️ User {} tried to edit profile {}", caller, user_id);
        return Err(AppError::Forbidden(
            "You can only edit your own profile".to_string(),
        ));
    }

    let user = state
        .store
        .update_user(user_id, changes.user_name, changes.profile_picture_url)
        .await?;
    tracing::info!("✏️ Profile updated for user {}", user_id);
    Ok(user)
}
