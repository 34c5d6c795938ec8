//! Configuration module for environment variable parsing.
//!
//! Every setting has a default so the engine runs with an empty environment.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::capability::Licenser;
use crate::transform::TransformLimits;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wall-clock budget for a single transform run, in milliseconds
    pub transform_timeout_ms: u64,

    /// Operation budget for a single transform run (0 = time budget only)
    pub transform_max_operations: u64,

    /// Maximum console lines captured per transform run
    pub transform_max_log_lines: usize,

    /// Whether subscription filters are licensed
    pub feature_advanced_subscriptions: bool,

    /// Whether transform functions are licensed
    pub feature_transformations: bool,

    /// Secret used to digest portal link tokens
    pub portal_token_secret: Option<String>,

    /// Page size used when a listing does not ask for one
    pub default_per_page: usize,

    /// Upper bound on listing page size
    pub max_per_page: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            transform_timeout_ms: parse_number("TRANSFORM_TIMEOUT_MS", 1000),

            transform_max_operations: parse_number("TRANSFORM_MAX_OPERATIONS", 1_000_000),

            transform_max_log_lines: parse_number("TRANSFORM_MAX_LOG_LINES", 256),

            feature_advanced_subscriptions: parse_bool("FEATURE_ADVANCED_SUBSCRIPTIONS", true),

            feature_transformations: parse_bool("FEATURE_TRANSFORMATIONS", true),

            portal_token_secret: env::var("PORTAL_TOKEN_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            default_per_page: parse_number("DEFAULT_PER_PAGE", 20),

            max_per_page: parse_number("MAX_PER_PAGE", 100),
        }
    }

    /// Transform budget derived from this configuration.
    pub fn transform_limits(&self) -> TransformLimits {
        TransformLimits {
            timeout: Duration::from_millis(self.transform_timeout_ms.max(1)),
            max_operations: self.transform_max_operations,
            max_log_lines: self.transform_max_log_lines,
            ..TransformLimits::default()
        }
    }

    /// Capability flags derived from this configuration.
    pub fn licenser(&self) -> Licenser {
        Licenser::new(
            self.feature_advanced_subscriptions,
            self.feature_transformations,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transform_timeout_ms: 1000,
            transform_max_operations: 1_000_000,
            transform_max_log_lines: 256,
            feature_advanced_subscriptions: true,
            feature_transformations: true,
            portal_token_secret: None,
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

/// Parse a numeric variable, warning and falling back on bad input.
fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid number, using default");
            default
        }
    }
}

/// Parse a boolean flag ("true"/"false", "1"/"0", "yes"/"no", "on"/"off").
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid flag, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_valid() {
        env::set_var("TEST_HOOKWISE_NUMBER", " 250 ");
        assert_eq!(parse_number::<u64>("TEST_HOOKWISE_NUMBER", 0), 250);
        env::remove_var("TEST_HOOKWISE_NUMBER");
    }

    #[test]
    fn test_parse_number_invalid_uses_default() {
        env::set_var("TEST_HOOKWISE_BAD_NUMBER", "lots");
        assert_eq!(parse_number::<usize>("TEST_HOOKWISE_BAD_NUMBER", 7), 7);
        env::remove_var("TEST_HOOKWISE_BAD_NUMBER");
    }

    #[test]
    fn test_parse_number_default() {
        assert_eq!(parse_number::<u64>("NONEXISTENT_VAR", 10), 10);
    }

    #[test]
    fn test_parse_bool() {
        env::set_var("TEST_HOOKWISE_FLAG_OFF", "off");
        env::set_var("TEST_HOOKWISE_FLAG_ON", "YES");
        env::set_var("TEST_HOOKWISE_FLAG_BAD", "maybe");
        assert!(!parse_bool("TEST_HOOKWISE_FLAG_OFF", true));
        assert!(parse_bool("TEST_HOOKWISE_FLAG_ON", false));
        assert!(parse_bool("TEST_HOOKWISE_FLAG_BAD", true));
        env::remove_var("TEST_HOOKWISE_FLAG_OFF");
        env::remove_var("TEST_HOOKWISE_FLAG_ON");
        env::remove_var("TEST_HOOKWISE_FLAG_BAD");
    }

    #[test]
    fn test_transform_limits_from_config() {
        let config = Config {
            transform_timeout_ms: 250,
            transform_max_operations: 5000,
            ..Config::default()
        };
        let limits = config.transform_limits();
        assert_eq!(limits.timeout, Duration::from_millis(250));
        assert_eq!(limits.max_operations, 5000);
    }
}
