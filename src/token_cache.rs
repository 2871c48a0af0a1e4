use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Whether a token grants API access or only a new token pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// What a stored token resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: Uuid,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

/// Short-lived token storage, keyed by token digest.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn put(&self, digest: &str, record: &TokenRecord, ttl_secs: u64) -> Result<()>;
    async fn get(&self, digest: &str) -> Result<Option<TokenRecord>>;
    async fn remove(&self, digest: &str) -> Result<()>;
}

/// Tokens in Redis under `token:{digest}` with a native TTL.
#[derive(Clone)]
pub struct RedisTokenCache {
    redis: ConnectionManager,
}

impl RedisTokenCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(digest: &str) -> String {
        format!("token:{}", digest)
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn put(&self, digest: &str, record: &TokenRecord, ttl_secs: u64) -> Result<()> {
        let json = sonic_rs::to_string(record)
            .map_err(|e| AppError::Internal(format!("Token serialization failed: {}", e)))?;

        let _: () = self
            .redis
            .clone()
            .set_ex(Self::key(digest), json, ttl_secs)
            .await
            .map_err(|e| {
                tracing::error!("❌ Redis set_ex failed for token: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    async fn get(&self, digest: &str) -> Result<Option<TokenRecord>> {
        let json: Option<String> = self.redis.clone().get(Self::key(digest)).await?;
        json.map(|j| {
            sonic_rs::from_str(&j)
                .map_err(|e| AppError::Internal(format!("Invalid token record: {}", e)))
        })
        .transpose()
    }

    async fn remove(&self, digest: &str) -> Result<()> {
        let _: () = self.redis.clone().del(Self::key(digest)).await?;
        Ok(())
    }
}

/// Tokens in process memory. Expired entries are dropped on read and on every write.
#[derive(Default)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<String, TokenRecord>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, TokenRecord>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("token cache lock poisoned".to_string()))
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn put(&self, digest: &str, record: &TokenRecord, _ttl_secs: u64) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries()?;
        entries.retain(|_, existing| existing.expires_at > now);
        entries.insert(digest.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, digest: &str) -> Result<Option<TokenRecord>> {
        let mut entries = self.entries()?;
        let expired = entries
            .get(digest)
            .is_some_and(|record| record.expires_at <= Utc::now());
        if expired {
            entries.remove(digest);
            return Ok(None);
        }
        Ok(entries.get(digest).cloned())
    }

    async fn remove(&self, digest: &str) -> Result<()> {
        self.entries()?.remove(digest);
        Ok(())
    }
}
