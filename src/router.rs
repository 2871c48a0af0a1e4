use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use http::{header, HeaderValue, Method};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Builds the application router: public auth and join routes, bearer-protected
/// collab, message, task and user routes, and the socket endpoint.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// The `Router`, ready to be served.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let public_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/collabs/join", post(handlers::collabs::join))
        .route("/api/collabs/invite", post(handlers::collabs::invite))
        .route("/ws", get(handlers::socket::ws_handler))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/collabs/{hash}", get(handlers::collabs::get_collab))
        .route("/api/collabs/{hash}/members", get(handlers::collabs::members))
        .route("/api/collabs/{hash}/leave", post(handlers::collabs::leave))
        .route("/api/collabs/{hash}/close", post(handlers::collabs::close))
        .route(
            "/api/collabs/{hash}/messages",
            get(handlers::messages::list_messages).post(handlers::messages::create_message),
        )
        .route(
            "/api/collabs/{hash}/messages/search",
            get(handlers::messages::search_messages),
        )
        .route(
            "/api/messages/{message_id}",
            patch(handlers::messages::update_message).delete(handlers::messages::delete_message),
        )
        .route(
            "/api/messages/{message_id}/pin",
            post(handlers::messages::pin_message),
        )
        .route("/api/tasks", post(handlers::tasks::create_task))
        .route("/api/tasks/{task_id}", get(handlers::tasks::get_task))
        .route("/api/users", get(handlers::users::find_by_email))
        .route(
            "/api/users/{user_id}",
            get(handlers::users::get_user).patch(handlers::users::update_user),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    fn app() -> Router {
        build_router(AppState::in_memory(Config::default())).unwrap()
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/collabs/0a1b2c3d/members")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_expires_the_refresh_cookie() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .header(header::COOKIE, "refreshToken=unknown-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cleared = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.starts_with("refreshToken=") && v.contains("Max-Age=0"));
        assert!(cleared);
    }

    #[tokio::test]
    async fn invalid_join_payload_is_a_bad_request() {
        let body = r#"{"user":{"email":"not-an-email","password":"SecurePass123!","userName":"x"},"task":{"category":"lists","difficulty":"easy"}}"#;
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/collabs/join")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "bad_request");
    }
}
