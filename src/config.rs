//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Pipeline policy: thresholds, retry budget, and collaborator timeouts.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    /// Minimum extraction confidence to proceed to verification.
    pub confidence_threshold: f32,
    /// Extra attempts for transient failures (store, registry).
    pub max_retries: u32,
    /// Linear backoff unit between retries.
    pub retry_backoff: Duration,
    /// Upper bound on every object store, registry and record store call.
    pub call_timeout: Duration,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct OnboardConfig {
    /// HTTP listen port.
    pub port: u16,
    /// libSQL database path, or `:memory:`.
    pub db_path: String,
    /// Root directory of the filesystem object store.
    pub object_root: PathBuf,
    /// Optional JSON file replacing the built-in registry seed data.
    pub registry_path: Option<PathBuf>,
    /// Domain for derived customer emails.
    pub email_domain: String,
    /// Upload body limit in bytes.
    pub max_upload_bytes: usize,
    pub policy: PipelinePolicy,
}

impl Default for OnboardConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "./data/onboard.db".to_string(),
            object_root: PathBuf::from("./data/uploads"),
            registry_path: None,
            email_domain: "example.com".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            policy: PipelinePolicy::default(),
        }
    }
}

impl OnboardConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_or(&lookup, "ONBOARD_PORT", defaults.port)?;
        let db_path = lookup("ONBOARD_DB_PATH").unwrap_or(defaults.db_path);
        let object_root = lookup("ONBOARD_OBJECT_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.object_root);
        let registry_path = lookup("ONBOARD_REGISTRY_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let email_domain = lookup("ONBOARD_EMAIL_DOMAIN")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.email_domain);
        let max_upload_bytes =
            parse_or(&lookup, "ONBOARD_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?;

        let confidence_threshold = parse_or(
            &lookup,
            "ONBOARD_CONFIDENCE_THRESHOLD",
            defaults.policy.confidence_threshold,
        )?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_CONFIDENCE_THRESHOLD".to_string(),
                message: format!("{confidence_threshold} is outside [0, 1]"),
            });
        }
        let max_retries = parse_or(&lookup, "ONBOARD_STORE_RETRIES", defaults.policy.max_retries)?;
        let backoff_ms: u64 = parse_or(&lookup, "ONBOARD_RETRY_BACKOFF_MS", 200)?;
        let timeout_ms: u64 = parse_or(&lookup, "ONBOARD_CALL_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_CALL_TIMEOUT_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            port,
            db_path,
            object_root,
            registry_path,
            email_domain,
            max_upload_bytes,
            policy: PipelinePolicy {
                confidence_threshold,
                max_retries,
                retry_backoff: Duration::from_millis(backoff_ms),
                call_timeout: Duration::from_millis(timeout_ms),
            },
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = OnboardConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.email_domain, "example.com");
        assert!(config.registry_path.is_none());
        assert!((config.policy.confidence_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.policy.max_retries, 2);
    }

    #[test]
    fn overrides_are_applied() {
        let config = OnboardConfig::from_lookup(lookup_from(&[
            ("ONBOARD_PORT", "9000"),
            ("ONBOARD_DB_PATH", ":memory:"),
            ("ONBOARD_EMAIL_DOMAIN", " Bank.Example "),
            ("ONBOARD_CONFIDENCE_THRESHOLD", "0.75"),
            ("ONBOARD_STORE_RETRIES", "5"),
            ("ONBOARD_CALL_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_path, ":memory:");
        assert_eq!(config.email_domain, "bank.example");
        assert!((config.policy.confidence_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.policy.max_retries, 5);
        assert_eq!(config.policy.call_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = OnboardConfig::from_lookup(lookup_from(&[("ONBOARD_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ONBOARD_PORT"));
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let err = OnboardConfig::from_lookup(lookup_from(&[(
            "ONBOARD_CONFIDENCE_THRESHOLD",
            "1.5",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(
            OnboardConfig::from_lookup(lookup_from(&[("ONBOARD_CALL_TIMEOUT_MS", "0")])).is_err()
        );
    }
}
