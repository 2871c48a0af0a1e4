use chrono::Utc;

use crate::{
    error::{AppError, Result},
    models::referral::ReferralLink,
    services::{matchmaking::{compensate, JoinResult}, membership},
    state::AppState,
};

/// Looks up a live referral link. Unknown and expired tokens both read as expired.
async fn resolve(state: &AppState, token: &str) -> Result<ReferralLink> {
    state
        .store
        .find_referral(token)
        .await?
        .filter(|link| link.is_valid_at(Utc::now()))
        .ok_or_else(|| AppError::BadRequest("link expired".to_string()))
}

/// Accepts an invite: registers a guest and seats them in the linked session.
///
/// Links stay usable until they expire. An expired or unknown token fails
/// before any user is created.
pub async fn invite(state: &AppState, token: &str) -> Result<JoinResult> {
    let link = resolve(state, token).await?;

    let registration = state.auth.register_anonymous().await?;
    match membership::add_member(state, registration.user.id, &link.session_hash).await {
        Ok(collab) => {
            tracing::info!(
                "🎟️ Guest {} joined session {} by invite",
                registration.user.id,
                link.session_hash
            );
            Ok(JoinResult {
                collab,
                registration,
            })
        }
        Err(e) => {
            compensate(state, &registration).await;
            Err(e)
        }
    }
}
