use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

/// Extracts the bearer token from the `Authorization` header.
///
/// # Arguments
///
/// * `request` - The incoming request.
///
/// # Returns
///
/// An `Option` containing the token if present.
fn extract_bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// A middleware that requires a valid access token to be present.
///
/// On success the caller's [`Identity`](crate::models::user::Identity) is
/// inserted into the request extensions.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`, or 401 when the token is missing or invalid.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!("❌ No bearer token found");
        return AppError::Unauthorized("Missing access token".to_string()).into_response();
    };

    let identity = match state.auth.verify(&token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("❌ Access token rejected: {}", e);
            return e.into_response();
        }
    };

    tracing::debug!("✅ User authenticated: {}", identity.user_id);
    request.extensions_mut().insert(identity);

    next.run(request).await
}
