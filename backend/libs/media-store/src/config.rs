/// Object storage configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Base URL for public access (CDN domain), without trailing slash
    pub base_url: String,
    /// Custom endpoint (MinIO, LocalStack); None uses the AWS default
    pub endpoint: Option<String>,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    pub path_style: bool,
    /// Key prefix for post media
    pub key_prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "nova-media".to_string(),
            region: "us-east-1".to_string(),
            base_url: "https://nova-media.s3.amazonaws.com".to_string(),
            endpoint: None,
            path_style: false,
            key_prefix: "posts".to_string(),
        }
    }
}

impl S3Config {
    /// Load S3 configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bucket = std::env::var("S3_BUCKET").unwrap_or(defaults.bucket);
        let base_url = std::env::var("S3_BASE_URL")
            .unwrap_or_else(|_| format!("https://{}.s3.amazonaws.com", bucket));

        Self {
            region: std::env::var("AWS_REGION").unwrap_or(defaults.region),
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|s| !s.trim().is_empty()),
            path_style: std::env::var("S3_PATH_STYLE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            key_prefix: std::env::var("S3_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            bucket,
        }
    }

    /// Public URL for an object key
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Object key for a public URL, or None if the URL is not served by
    /// this bucket's base URL.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        let key = rest.split(['?', '#']).next().unwrap_or_default();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            base_url: "https://cdn.nova.dev".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_public_url_joins_key() {
        assert_eq!(
            config().public_url("posts/a/b.jpg"),
            "https://cdn.nova.dev/posts/a/b.jpg"
        );
    }

    #[test]
    fn test_key_from_url_round_trips_public_url() {
        let cfg = config();
        let url = cfg.public_url("posts/a/b.jpg");
        assert_eq!(cfg.key_from_url(&url).as_deref(), Some("posts/a/b.jpg"));
    }

    #[test]
    fn test_key_from_url_strips_query() {
        assert_eq!(
            config()
                .key_from_url("https://cdn.nova.dev/posts/x.mp4?v=2")
                .as_deref(),
            Some("posts/x.mp4")
        );
    }

    #[test]
    fn test_key_from_url_rejects_foreign_host() {
        assert_eq!(config().key_from_url("https://elsewhere.com/posts/x.jpg"), None);
        assert_eq!(config().key_from_url("https://cdn.nova.dev/"), None);
        assert_eq!(config().key_from_url("https://cdn.nova.devil/x.jpg"), None);
    }
}
