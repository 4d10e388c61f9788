//! Configuration management for Hubgate.
//!
//! Configuration is layered: compiled-in defaults, then an optional YAML
//! file, then environment variables prefixed with `HUBGATE__` (for example
//! `HUBGATE__SERVER__HTTP_ADDR=0.0.0.0:9000`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{HubgateError, Result};
use crate::ratelimit::{LimitPolicy, PolicyTable, DEFAULT_LIMIT, DEFAULT_WINDOW_MS};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "HUBGATE";
/// Separator between nested keys in environment variable overrides.
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Hubgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Broadcast configuration
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Derive client keys from `X-Forwarded-For` instead of the peer address.
    ///
    /// Only enable this behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests allowed per window when no policy matches
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Window length in milliseconds when no policy matches
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// How often expired windows are purged, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Named limit policies (e.g. `subscribe`, `publish`)
    #[serde(default)]
    pub policies: HashMap<String, LimitPolicy>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_window_ms: default_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            policies: HashMap::new(),
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_sweep_interval_ms() -> u64 {
    600_000
}

impl RateLimitingConfig {
    /// The policy applied when a policy name has no explicit entry.
    pub fn default_policy(&self) -> LimitPolicy {
        LimitPolicy::new(self.default_limit, self.default_window_ms)
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Build the policy lookup table used by request handlers.
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::new(self.default_policy(), self.policies.clone())
    }
}

/// Broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Frames buffered per subscriber before it counts as failed
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    64
}

impl HubgateConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: HubgateConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| HubgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: HubgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| HubgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable throttling or stall maintenance.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;

        if rl.default_limit == 0 {
            return Err(HubgateError::Config(
                "rate_limiting.default_limit must be at least 1".to_string(),
            ));
        }
        if rl.default_window_ms == 0 {
            return Err(HubgateError::Config(
                "rate_limiting.default_window_ms must be at least 1".to_string(),
            ));
        }
        if rl.sweep_interval_ms == 0 {
            return Err(HubgateError::Config(
                "rate_limiting.sweep_interval_ms must be at least 1".to_string(),
            ));
        }
        for (name, policy) in &rl.policies {
            if policy.limit == 0 || policy.window_ms == 0 {
                return Err(HubgateError::Config(format!(
                    "policy '{}' must have a non-zero limit and window_ms",
                    name
                )));
            }
        }
        if self.broadcast.channel_capacity == 0 {
            return Err(HubgateError::Config(
                "broadcast.channel_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubgateConfig::default();
        assert_eq!(config.server.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!config.server.trust_forwarded_for);
        assert_eq!(config.rate_limiting.default_limit, 10);
        assert_eq!(config.rate_limiting.default_window_ms, 60_000);
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(600));
        assert_eq!(config.broadcast.channel_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  http_addr: 0.0.0.0:9000
rate_limiting:
  default_limit: 25
  policies:
    publish:
      limit: 5
      window_ms: 1000
"#;
        let config = HubgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.rate_limiting.default_limit, 25);
        // Unspecified values keep their defaults
        assert_eq!(config.rate_limiting.default_window_ms, 60_000);

        let table = config.rate_limiting.policy_table();
        assert_eq!(table.resolve("publish"), LimitPolicy::new(5, 1000));
        assert_eq!(table.resolve("subscribe"), LimitPolicy::new(25, 60_000));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
rate_limiting:
  default_limit: 0
"#;
        let result = HubgateConfig::from_yaml(yaml);
        assert!(matches!(result, Err(HubgateError::Config(_))));
    }

    #[test]
    fn test_zero_policy_window_rejected() {
        let yaml = r#"
rate_limiting:
  policies:
    subscribe:
      limit: 3
      window_ms: 0
"#;
        let err = HubgateConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("subscribe"));
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let mut config = HubgateConfig::default();
        config.broadcast.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = HubgateConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.default_limit, 10);
    }
}
