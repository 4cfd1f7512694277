//! Postgres pool construction for the post aggregate store
//!
//! The binary builds one pool at startup and hands it to the repository
//! layer; nothing here caches a connection globally. Transactions should be
//! opened through [`begin_with_metrics`] so lock waits show up in latency.

pub mod env_utils;
mod metrics;

pub use metrics::begin_with_metrics;

use env_utils::parse_env_with_default;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Pool sizing and timeouts, all read from `DB_*` variables
#[derive(Clone)]
pub struct DbConfig {
    /// Label for pool metrics
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Limit for the `SELECT 1` run right after connecting
    pub connect_timeout_secs: u64,
    /// How long a request may wait for a free connection
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: "post-service".to_string(),
            database_url: String::new(),
            max_connections: 20,
            min_connections: 5,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl DbConfig {
    /// `DATABASE_URL` is required; everything else has a default.
    pub fn from_env(service_name: &str) -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set".to_string())?;
        let d = Self::default();

        let config = Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: parse_env_with_default("DB_MAX_CONNECTIONS", d.max_connections),
            min_connections: parse_env_with_default("DB_MIN_CONNECTIONS", d.min_connections),
            connect_timeout_secs: parse_env_with_default("DB_CONNECT_TIMEOUT_SECS", d.connect_timeout_secs),
            acquire_timeout_secs: parse_env_with_default("DB_ACQUIRE_TIMEOUT_SECS", d.acquire_timeout_secs),
            idle_timeout_secs: parse_env_with_default("DB_IDLE_TIMEOUT_SECS", d.idle_timeout_secs),
            max_lifetime_secs: parse_env_with_default("DB_MAX_LIFETIME_SECS", d.max_lifetime_secs),
        };

        if config.min_connections > config.max_connections {
            return Err(format!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                config.min_connections, config.max_connections
            ));
        }
        Ok(config)
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            acquire_timeout_secs = self.acquire_timeout_secs,
            idle_timeout_secs = self.idle_timeout_secs,
            max_lifetime_secs = self.max_lifetime_secs,
            "database pool configuration"
        );
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
            .test_before_acquire(true)
    }
}

/// Connect, verify with `SELECT 1`, and start the pool-gauge monitor
pub async fn create_pool(config: DbConfig) -> Result<PgPool, sqlx::Error> {
    debug!(service = %config.service_name, "connecting database pool");
    let pool = config.pool_options().connect(&config.database_url).await?;

    if let Err(e) = verify(&pool, Duration::from_secs(config.connect_timeout_secs)).await {
        error!(service = %config.service_name, error = %e, "database verification failed");
        pool.close().await;
        return Err(e);
    }

    info!(service = %config.service_name, "database pool ready");
    spawn_monitor(pool.clone(), config.service_name);
    Ok(pool)
}

async fn verify(pool: &PgPool, limit: Duration) -> Result<(), sqlx::Error> {
    match tokio::time::timeout(limit, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no answer to SELECT 1 within {:?}", limit),
        ))),
    }
}

fn spawn_monitor(pool: PgPool, service: String) {
    metrics::update_pool_metrics(&pool, &service);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MONITOR_INTERVAL);
        while !pool.is_closed() {
            interval.tick().await;
            metrics::update_pool_metrics(&pool, &service);
        }
    });
}
