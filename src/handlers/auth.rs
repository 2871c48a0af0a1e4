use axum::{extract::State, http::StatusCode, response::Response, Json};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    handlers::response::{self, REFRESH_COOKIE},
    models::user::User,
    services::auth::{NewUser, Registration},
    state::AppState,
    validation::input::validate,
};

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Serialize)]
struct LogoutResponse {
    success: bool,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse<'a> {
    pub user: &'a User,
    pub access_token: &'a str,
}

/// Sets the refresh cookie for a fresh registration or login.
pub(crate) fn set_refresh_cookie(state: &AppState, cookies: &Cookies, registration: &Registration) {
    cookies.add(response::refresh_cookie(
        registration.tokens.refresh_token.clone(),
        state.config.refresh_token_ttl_days,
        state.config.secure_cookies,
    ));
}

fn auth_response(status: StatusCode, registration: &Registration) -> Result<Response> {
    response::json(
        status,
        &AuthResponse {
            user: &registration.user,
            access_token: &registration.tokens.access_token,
        },
    )
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<NewUser>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt: {:?}", payload);
    validate(&payload)?;

    let registration = state.auth.register(payload).await?;
    set_refresh_cookie(&state, &cookies, &registration);

    auth_response(StatusCode::CREATED, &registration)
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {}", payload.email);
    validate(&payload)?;

    let registration = state.auth.login(&payload.email, &payload.password).await?;
    set_refresh_cookie(&state, &cookies, &registration);

    auth_response(StatusCode::OK, &registration)
}

/// Exchanges the refresh cookie for a new token pair.
#[axum::debug_handler]
pub async fn refresh(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let refresh_token = cookies
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let registration = state.auth.refresh(&refresh_token).await?;
    set_refresh_cookie(&state, &cookies, &registration);
    tracing::debug!("🔄 Tokens refreshed for user {}", registration.user.id);

    auth_response(StatusCode::OK, &registration)
}

/// Handles logout: revokes the refresh token and clears its cookie.
///
/// Succeeds with a missing or unknown cookie, so a repeated logout is harmless.
#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    if let Some(refresh_token) = cookies.get(REFRESH_COOKIE).map(|c| c.value().to_string()) {
        state.auth.revoke(&refresh_token).await?;
    }

    cookies.remove(response::cleared_refresh_cookie());
    tracing::info!("👋 Logged out");

    response::json(StatusCode::OK, &LogoutResponse { success: true })
}
