use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::{password, token};
use crate::error::{AppError, Result};
use crate::models::user::{Identity, User};
use crate::repositories::{Store, StoreError};
use crate::token_cache::{TokenCache, TokenKind, TokenRecord};

/// The registration payload for a user with credentials.
#[derive(Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
    #[garde(length(min = 1, max = 64))]
    pub user_name: String,
    #[garde(length(max = 2048))]
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}

/// An access/refresh token pair.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// A freshly authenticated user and the tokens issued to them.
#[derive(Clone, Debug)]
pub struct Registration {
    pub user: User,
    pub tokens: TokenPair,
}

/// The auth collaborator: identity creation and token issuance/verification.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Registers a user with credentials. Duplicate emails are rejected.
    async fn register(&self, input: NewUser) -> Result<Registration>;
    /// Registers a guest with a generated display name and no credentials.
    async fn register_anonymous(&self) -> Result<Registration>;
    async fn login(&self, email: &str, password: &str) -> Result<Registration>;
    /// Exchanges a refresh token for a new pair. The old refresh token is revoked.
    async fn refresh(&self, refresh_token: &str) -> Result<Registration>;
    async fn verify(&self, access_token: &str) -> Result<Identity>;
    /// Revokes a refresh token. Unknown tokens are ignored.
    async fn revoke(&self, refresh_token: &str) -> Result<()>;
    /// Undoes a registration: revokes its tokens and deletes the user.
    async fn discard(&self, registration: &Registration) -> Result<()>;
}

/// Users in the store, tokens in a [`TokenCache`].
pub struct Authenticator {
    store: Arc<dyn Store>,
    tokens: Arc<dyn TokenCache>,
    access_ttl_secs: u64,
    refresh_ttl_days: i64,
}

impl Authenticator {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<dyn TokenCache>, config: &Config) -> Self {
        Self {
            store,
            tokens,
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_days: config.refresh_token_ttl_days,
        }
    }

    async fn issue_tokens(&self, user_id: Uuid) -> Result<TokenPair> {
        let now = Utc::now();
        let access_token = token::generate_token();
        let refresh_token = token::generate_token();

        self.tokens
            .put(
                &token::token_digest(&access_token),
                &TokenRecord {
                    user_id,
                    kind: TokenKind::Access,
                    expires_at: now + Duration::seconds(self.access_ttl_secs as i64),
                },
                self.access_ttl_secs,
            )
            .await?;

        let refresh_ttl_secs = (self.refresh_ttl_days * 86400) as u64;
        self.tokens
            .put(
                &token::token_digest(&refresh_token),
                &TokenRecord {
                    user_id,
                    kind: TokenKind::Refresh,
                    expires_at: now + Duration::days(self.refresh_ttl_days),
                },
                refresh_ttl_secs,
            )
            .await?;

        tracing::debug!("🔑 Issued token pair for user {}", user_id);
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn persist_user(&self, user: User) -> Result<User> {
        self.store.create_user(user).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => AppError::BadRequest("user already exists".to_string()),
            other => other.into(),
        })
    }
}

#[async_trait]
impl AuthService for Authenticator {
    async fn register(&self, input: NewUser) -> Result<Registration> {
        tracing::debug!("🔐 Registering user: {}", input.email);

        if self.store.find_user_by_email(&input.email).await?.is_some() {
            return Err(AppError::BadRequest("user already exists".to_string()));
        }

        let NewUser {
            email,
            password: plain,
            user_name,
            profile_picture_url,
        } = input;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;

        let user = self
            .persist_user(User {
                id: Uuid::new_v4(),
                email: Some(email),
                user_name,
                profile_picture_url,
                password_hash: Some(password_hash),
                created_at: Utc::now(),
            })
            .await?;
        let tokens = self.issue_tokens(user.id).await?;

        tracing::info!("✅ User registered: {}", user.id);
        Ok(Registration { user, tokens })
    }

    async fn register_anonymous(&self) -> Result<Registration> {
        let user = self
            .persist_user(User {
                id: Uuid::new_v4(),
                email: None,
                user_name: format!("guest-{}", token::random_hex(4)),
                profile_picture_url: None,
                password_hash: None,
                created_at: Utc::now(),
            })
            .await?;
        let tokens = self.issue_tokens(user.id).await?;

        tracing::info!("✅ Guest registered: {} ({})", user.id, user.user_name);
        Ok(Registration { user, tokens })
    }

    async fn login(&self, email: &str, password: &str) -> Result<Registration> {
        let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

        let user = self.store.find_user_by_email(email).await?.ok_or_else(invalid)?;
        let hash = user.password_hash.clone().ok_or_else(invalid)?;
        let plain = password.to_string();
        let valid = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))??;
        if !valid {
            return Err(invalid());
        }

        let tokens = self.issue_tokens(user.id).await?;
        tracing::info!("✅ User logged in: {}", user.id);
        Ok(Registration { user, tokens })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Registration> {
        let digest = token::token_digest(refresh_token);
        let record = self
            .tokens
            .get(&digest)
            .await?
            .filter(|r| r.kind == TokenKind::Refresh)
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;
        self.tokens.remove(&digest).await?;

        let user = self
            .store
            .find_user_by_id(record.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;
        let tokens = self.issue_tokens(user.id).await?;
        Ok(Registration { user, tokens })
    }

    async fn verify(&self, access_token: &str) -> Result<Identity> {
        let record = self
            .tokens
            .get(&token::token_digest(access_token))
            .await?
            .filter(|r| r.kind == TokenKind::Access)
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        Ok(Identity {
            user_id: record.user_id,
        })
    }

    async fn revoke(&self, refresh_token: &str) -> Result<()> {
        let digest = token::token_digest(refresh_token);
        if let Some(record) = self.tokens.get(&digest).await? {
            if record.kind == TokenKind::Refresh {
                self.tokens.remove(&digest).await?;
                tracing::info!("🚪 Refresh token revoked for user {}", record.user_id);
            }
        }
        Ok(())
    }

    async fn discard(&self, registration: &Registration) -> Result<()> {
        self.tokens
            .remove(&token::token_digest(&registration.tokens.access_token))
            .await?;
        self.tokens
            .remove(&token::token_digest(&registration.tokens.refresh_token))
            .await?;
        self.store.delete_user(registration.user.id).await?;
        tracing::info!("🧹 Discarded registration of user {}", registration.user.id);
        Ok(())
    }
}
