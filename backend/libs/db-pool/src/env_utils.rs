//! Environment variable parsing utilities
//!
//! Typed lookups with defaults so configuration loaders never unwrap.

use std::str::FromStr;

/// Parse an environment variable, falling back to `default` when it is
/// missing or does not parse.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse an environment variable, returning None if missing or invalid
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a boolean flag. Accepts `1`, `true`, `yes`, `on` (any case) as true.
pub fn parse_env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Parse a required environment variable
pub fn parse_env_required<T: FromStr>(key: &str) -> Result<T, String> {
    std::env::var(key)
        .map_err(|_| format!("Environment variable {} not set", key))?
        .trim()
        .parse()
        .map_err(|_| format!("Failed to parse environment variable {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_parse_env_with_default() {
        let result: u32 = parse_env_with_default("DB_POOL_TEST_MISSING_XYZ", 42);
        assert_eq!(result, 42);

        std::env::set_var("DB_POOL_TEST_PORT", " 8080 ");
        let result: u16 = parse_env_with_default("DB_POOL_TEST_PORT", 3000);
        assert_eq!(result, 8080);
        std::env::remove_var("DB_POOL_TEST_PORT");
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_value_falls_back() {
        std::env::set_var("DB_POOL_TEST_BAD", "eleven");
        let result: u32 = parse_env_with_default("DB_POOL_TEST_BAD", 11);
        assert_eq!(result, 11);
        std::env::remove_var("DB_POOL_TEST_BAD");
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_env_flag() {
        assert!(parse_env_flag("DB_POOL_TEST_FLAG_MISSING", true));

        std::env::set_var("DB_POOL_TEST_FLAG", "Yes");
        assert!(parse_env_flag("DB_POOL_TEST_FLAG", false));
        std::env::set_var("DB_POOL_TEST_FLAG", "0");
        assert!(!parse_env_flag("DB_POOL_TEST_FLAG", true));
        std::env::remove_var("DB_POOL_TEST_FLAG");
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_env_required() {
        assert!(parse_env_required::<u32>("DB_POOL_TEST_REQ_MISSING").is_err());

        std::env::set_var("DB_POOL_TEST_REQ", "456");
        assert_eq!(parse_env_required::<u32>("DB_POOL_TEST_REQ"), Ok(456));
        std::env::remove_var("DB_POOL_TEST_REQ");
    }
}
