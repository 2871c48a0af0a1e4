use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};

/// Which store adapter backs the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL for entities, Redis for tokens.
    Postgres,
    /// Everything in process. Data is lost on restart.
    Memory,
}

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The selected store adapter.
    pub store_backend: StoreBackend,
    /// The URL of the PostgreSQL database.
    pub database_url: Option<String>,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// Maximum members per collab session.
    pub session_capacity: usize,
    /// How many fresh hashes to try before giving up on session creation.
    pub session_create_retries: u32,
    /// Lifetime of an access token in seconds.
    pub access_token_ttl_secs: u64,
    /// Lifetime of a refresh token in days.
    pub refresh_token_ttl_days: i64,
    /// Per-socket outbound queue length.
    pub ws_send_queue: usize,
    /// Whether cookies should carry the `Secure` flag.
    pub secure_cookies: bool,
    /// Allowed CORS origin for the browser client.
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store_backend: StoreBackend::Memory,
            database_url: None,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            session_capacity: 4,
            session_create_retries: 3,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_days: 7,
            ws_send_queue: 64,
            secure_cookies: false,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let session_capacity: usize = env::var("SESSION_CAPACITY")
            .unwrap_or_else(|_| defaults.session_capacity.to_string())
            .parse()
            .context("Invalid SESSION_CAPACITY")?;
        if session_capacity == 0 {
            anyhow::bail!("SESSION_CAPACITY must be at least 1");
        }

        Ok(Self {
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| defaults.bind_addr.to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            store_backend,
            database_url,
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            session_capacity,
            session_create_retries: env::var("SESSION_CREATE_RETRIES")
                .unwrap_or_else(|_| defaults.session_create_retries.to_string())
                .parse()
                .context("Invalid SESSION_CREATE_RETRIES")?,
            access_token_ttl_secs: env::var("ACCESS_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| defaults.access_token_ttl_secs.to_string())
                .parse()
                .context("Invalid ACCESS_TOKEN_TTL_SECS")?,
            refresh_token_ttl_days: env::var("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or_else(|_| defaults.refresh_token_ttl_days.to_string())
                .parse()
                .context("Invalid REFRESH_TOKEN_TTL_DAYS")?,
            ws_send_queue: env::var("WS_SEND_QUEUE")
                .unwrap_or_else(|_| defaults.ws_send_queue.to_string())
                .parse()
                .context("Invalid WS_SEND_QUEUE")?,
            secure_cookies: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string())
                == "production",
            cors_origin: env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
        })
    }
}
