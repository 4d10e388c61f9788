//! Named rate limit policies.
//!
//! A policy pairs a request limit with a window length. Request handlers
//! look policies up by name (`subscribe`, `publish`, ...) and fall back to
//! the default policy for names with no entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{HubgateError, Result};

/// Requests allowed per window when nothing else is configured.
pub const DEFAULT_LIMIT: u64 = 10;
/// Window length in milliseconds when nothing else is configured.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// A request limit over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl LimitPolicy {
    /// Create a policy.
    pub fn new(limit: u64, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    /// Window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW_MS)
    }
}

/// Lookup table from policy name to policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Applied to names without an entry
    #[serde(default)]
    pub default: LimitPolicy,
    /// Named policies
    #[serde(default)]
    pub policies: HashMap<String, LimitPolicy>,
}

impl PolicyTable {
    /// Create a table from a default policy and named entries.
    pub fn new(default: LimitPolicy, policies: HashMap<String, LimitPolicy>) -> Self {
        Self { default, policies }
    }

    /// Load a table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| HubgateError::Config(format!("Failed to parse rate limit policies: {}", e)))
    }

    /// Insert or replace a named policy.
    pub fn insert(&mut self, name: impl Into<String>, policy: LimitPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// The policy for `name`, or the default when there is none.
    pub fn resolve(&self, name: &str) -> LimitPolicy {
        self.policies.get(name).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = LimitPolicy::default();
        assert_eq!(policy.limit, 10);
        assert_eq!(policy.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_policy_table() {
        let yaml = r#"
default:
  limit: 100
  window_ms: 1000
policies:
  publish:
    limit: 5
    window_ms: 10000
  subscribe:
    limit: 2
"#;
        let table = PolicyTable::from_yaml(yaml).unwrap();
        assert_eq!(table.default, LimitPolicy::new(100, 1000));
        assert_eq!(table.resolve("publish"), LimitPolicy::new(5, 10_000));
        // Missing fields fall back to the compiled-in defaults
        assert_eq!(table.resolve("subscribe"), LimitPolicy::new(2, 60_000));
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_default() {
        let table = PolicyTable::default();
        assert_eq!(table.resolve("anything"), LimitPolicy::default());
    }

    #[test]
    fn test_insert_overrides() {
        let mut table = PolicyTable::default();
        table.insert("publish", LimitPolicy::new(1, 1));
        table.insert("publish", LimitPolicy::new(3, 500));
        assert_eq!(table.resolve("publish"), LimitPolicy::new(3, 500));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = PolicyTable::from_yaml("policies: [1, 2");
        assert!(matches!(result, Err(HubgateError::Config(_))));
    }
}
