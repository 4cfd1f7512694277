/// Configuration management for Post Service
///
/// Loads configuration from environment variables (a `.env` file is read by
/// `main` beforehand when present).
use anyhow::{anyhow, bail, Context, Result};
use db_pool::env_utils::{parse_env_flag, parse_env_with_default};
use db_pool::DbConfig;
use media_store::S3Config;
use resilience::RetryConfig;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

const SERVICE_NAME: &str = "post-service";
const MIN_PRODUCTION_SECRET_BYTES: usize = 32;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DbConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
}

/// Application settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
    /// Mount operator routes under /api/v1/admin
    pub admin_endpoints_enabled: bool,
    /// Users allowed to call operator routes
    pub admin_user_ids: Vec<Uuid>,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        matches!(self.env.as_str(), "production" | "prod")
    }
}

/// Token verification settings
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 shared secret
    pub jwt_secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .finish()
    }
}

/// Media upload and cleanup settings
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub s3: S3Config,
    /// Largest accepted file, in bytes
    pub max_upload_bytes: usize,
    /// Retries for each blob deletion after a post is removed
    pub cleanup_max_retries: u32,
    pub cleanup_backoff: Duration,
    /// Time limit for a single blob deletion attempt
    pub cleanup_attempt_timeout: Duration,
}

impl MediaConfig {
    pub fn cleanup_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.cleanup_max_retries,
            initial_backoff: self.cleanup_backoff,
            ..RetryConfig::default()
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            s3: S3Config::default(),
            max_upload_bytes: 50 * 1024 * 1024,
            cleanup_max_retries: 2,
            cleanup_backoff: Duration::from_millis(200),
            cleanup_attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("POST_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env_with_default("POST_SERVICE_PORT", 8085),
            admin_endpoints_enabled: parse_env_flag("ADMIN_ENDPOINTS_ENABLED", false),
            admin_user_ids: parse_admin_user_ids()?,
        };
        if app.admin_endpoints_enabled && app.admin_user_ids.is_empty() {
            bail!("ADMIN_ENDPOINTS_ENABLED requires at least one id in ADMIN_USER_IDS");
        }

        let database = DbConfig::from_env(SERVICE_NAME).map_err(|e| anyhow!(e))?;
        if database.database_url.is_empty() {
            bail!("DATABASE_URL environment variable not set");
        }

        let jwt_secret =
            std::env::var("JWT_SECRET").context("JWT_SECRET environment variable not set")?;
        if jwt_secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if app.is_production() && jwt_secret.len() < MIN_PRODUCTION_SECRET_BYTES {
            bail!(
                "JWT_SECRET must be at least {} bytes in production",
                MIN_PRODUCTION_SECRET_BYTES
            );
        }

        let defaults = MediaConfig::default();
        let media = MediaConfig {
            s3: S3Config::from_env(),
            max_upload_bytes: parse_env_with_default("MEDIA_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            cleanup_max_retries: parse_env_with_default(
                "MEDIA_CLEANUP_MAX_RETRIES",
                defaults.cleanup_max_retries,
            ),
            cleanup_backoff: Duration::from_millis(parse_env_with_default(
                "MEDIA_CLEANUP_BACKOFF_MS",
                defaults.cleanup_backoff.as_millis() as u64,
            )),
            cleanup_attempt_timeout: defaults.cleanup_attempt_timeout,
        };

        Ok(Config {
            app,
            database,
            auth: AuthConfig { jwt_secret },
            media,
        })
    }
}

/// Comma-separated user ids from `ADMIN_USER_IDS`
fn parse_admin_user_ids() -> Result<Vec<Uuid>> {
    let raw = std::env::var("ADMIN_USER_IDS").unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            Uuid::parse_str(id).with_context(|| format!("invalid id in ADMIN_USER_IDS: {}", id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "APP_ENV",
        "POST_SERVICE_PORT",
        "DATABASE_URL",
        "JWT_SECRET",
        "ADMIN_ENDPOINTS_ENABLED",
        "ADMIN_USER_IDS",
        "MEDIA_CLEANUP_MAX_RETRIES",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/posts");
        std::env::set_var("JWT_SECRET", "dev-secret");

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.port, 8085);
        assert!(!config.app.admin_endpoints_enabled);
        assert_eq!(config.media.cleanup_max_retries, 2);
        assert_eq!(config.database.service_name, "post-service");
        clear();
    }

    #[test]
    #[serial]
    fn test_missing_secret_fails() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/posts");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
        clear();
    }

    #[test]
    #[serial]
    fn test_short_secret_rejected_in_production() {
        clear();
        std::env::set_var("APP_ENV", "production");
        std::env::set_var("DATABASE_URL", "postgres://localhost/posts");
        std::env::set_var("JWT_SECRET", "short");

        assert!(Config::from_env().is_err());

        std::env::set_var("JWT_SECRET", "k".repeat(MIN_PRODUCTION_SECRET_BYTES));
        assert!(Config::from_env().is_ok());
        clear();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/posts");
        std::env::set_var("JWT_SECRET", "dev-secret");
        std::env::set_var("POST_SERVICE_PORT", "9100");
        std::env::set_var("ADMIN_ENDPOINTS_ENABLED", "true");
        std::env::set_var("MEDIA_CLEANUP_MAX_RETRIES", "5");
        let operator = Uuid::new_v4();
        std::env::set_var("ADMIN_USER_IDS", format!(" {} ,", operator));

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.port, 9100);
        assert!(config.app.admin_endpoints_enabled);
        assert_eq!(config.app.admin_user_ids, vec![operator]);
        assert_eq!(config.media.cleanup_retry().max_retries, 5);
        clear();
    }

    #[test]
    #[serial]
    fn test_admin_routes_need_operators() {
        clear();
        std::env::set_var("DATABASE_URL", "postgres://localhost/posts");
        std::env::set_var("JWT_SECRET", "dev-secret");
        std::env::set_var("ADMIN_ENDPOINTS_ENABLED", "true");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("ADMIN_USER_IDS"));

        std::env::set_var("ADMIN_USER_IDS", "not-a-uuid");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
        clear();
    }

    #[test]
    fn test_secret_is_redacted() {
        let auth = AuthConfig {
            jwt_secret: "super-secret".into(),
        };
        assert!(!format!("{:?}", auth).contains("super-secret"));
    }
}
