//! PostgreSQL connection pooling.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use qbank_core::{Error, Result};

/// Connection pool settings.
///
/// The pool is shared by the HTTP handlers and every worker poller; its
/// ceiling should comfortably exceed the worker concurrency ceiling or
/// claim attempts start queuing on connection acquisition.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long an acquire may wait before failing.
    pub acquire_timeout: Duration,
    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolConfig {
    /// Read settings from the environment.
    ///
    /// `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS`, and
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS` override the defaults.
    pub fn from_env() -> Self {
        fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        let base = Self::default();
        Self {
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", base.max_connections),
            min_connections: parse_var("DATABASE_MIN_CONNECTIONS", base.min_connections),
            acquire_timeout: Duration::from_secs(parse_var(
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                base.acquire_timeout.as_secs(),
            )),
            idle_timeout: base.idle_timeout,
        }
    }

    /// Set the connection ceiling.
    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the number of connections kept warm.
    pub fn with_min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Open a pool with these settings.
    pub async fn connect(&self, database_url: &str) -> Result<PgPool> {
        let started = Instant::now();

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .connect(database_url)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "pool",
            op = "connect",
            max_connections = self.max_connections,
            pool_size = pool.size(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Database pool ready"
        );
        Ok(pool)
    }
}

/// Open a pool with default settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PoolConfig::default().connect(database_url).await
}
