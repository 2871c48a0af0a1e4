use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::broadcast::{Broadcaster, RoomHub};
use crate::config::{Config, StoreBackend};
use crate::repositories::{MemoryStore, PgStore, Store};
use crate::services::auth::{AuthService, Authenticator};
use crate::token_cache::{MemoryTokenCache, RedisTokenCache, TokenCache};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The store adapter.
    pub store: Arc<dyn Store>,
    /// The auth collaborator.
    pub auth: Arc<dyn AuthService>,
    /// Where membership and message events are pushed.
    pub broadcaster: Arc<dyn Broadcaster>,
    /// The socket registry backing the broadcaster.
    pub hub: Arc<RoomHub>,
}

impl AppState {
    /// Creates a new `AppState` for the configured backend.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let (store, tokens): (Arc<dyn Store>, Arc<dyn TokenCache>) = match config.store_backend {
            StoreBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
                let pool = crate::db::create_pool(database_url)?;
                crate::db::migrate(&pool).await?;
                tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

                let redis_client = redis::Client::open(config.redis_url.as_str())?;
                let redis = ConnectionManager::new(redis_client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (pooled)");

                let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
                let tokens: Arc<dyn TokenCache> = Arc::new(RedisTokenCache::new(redis));
                (store, tokens)
            }
            StoreBackend::Memory => {
                tracing::warn!("⚠️ Using the in-memory store, nothing survives a restart");
                let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
                let tokens: Arc<dyn TokenCache> = Arc::new(MemoryTokenCache::new());
                (store, tokens)
            }
        };

        let hub = Arc::new(RoomHub::new(config.ws_send_queue));
        tracing::info!("✅ Room hub initialized");

        Ok(Self::from_parts(config.clone(), store, tokens, hub.clone(), hub))
    }

    /// Assembles a state from explicit collaborators.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        tokens: Arc<dyn TokenCache>,
        broadcaster: Arc<dyn Broadcaster>,
        hub: Arc<RoomHub>,
    ) -> Self {
        let auth = Arc::new(Authenticator::new(store.clone(), tokens, &config));
        Self {
            config,
            store,
            auth,
            broadcaster,
            hub,
        }
    }

    /// An all-in-memory state where the hub is also the broadcaster.
    pub fn in_memory(config: Config) -> Self {
        let hub = Arc::new(RoomHub::new(config.ws_send_queue));
        Self::from_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryTokenCache::new()),
            hub.clone(),
            hub,
        )
    }
}
