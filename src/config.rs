//! Configuration management for Warden.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::ratelimit::{KeyResolver, RuleSet, DEFAULT_FORWARDED_HEADERS};

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "WARDEN";

/// Main configuration for the Warden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Message transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to the YAML file with per-operation rules
    #[serde(default)]
    pub rules_path: Option<String>,

    /// How often expired counters are purged, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Headers consulted, in order, for the caller address
    #[serde(default = "default_forwarded_headers")]
    pub forwarded_headers: Vec<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            sweep_interval_secs: default_sweep_interval(),
            forwarded_headers: default_forwarded_headers(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_forwarded_headers() -> Vec<String> {
    DEFAULT_FORWARDED_HEADERS
        .iter()
        .map(|h| h.to_string())
        .collect()
}

impl RateLimitingConfig {
    /// Interval between counter sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Key resolver using the configured header chain.
    pub fn key_resolver(&self) -> KeyResolver {
        KeyResolver::with_headers(self.forwarded_headers.iter().cloned())
    }

    /// Load the configured rules, or an empty set when none are configured.
    pub fn load_rules(&self) -> Result<RuleSet> {
        match &self.rules_path {
            Some(path) => RuleSet::from_file(path),
            None => Ok(RuleSet::new()),
        }
    }
}

/// Message transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Buffered deliveries per consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Direct queues to consume
    #[serde(default = "default_direct_queues")]
    pub direct_queues: Vec<String>,

    /// Topic subscriptions to consume
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            direct_queues: default_direct_queues(),
            topics: default_topics(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_direct_queues() -> Vec<String> {
    vec!["warden.inner.direct".to_string()]
}

fn default_topics() -> Vec<String> {
    vec!["warden.inner.topic".to_string()]
}

impl WardenConfig {
    /// Load configuration from an optional file, then `WARDEN__*` environment overrides.
    ///
    /// The file format follows its extension (YAML, TOML or JSON).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.rate_limiting.rules_path, None);
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.rate_limiting.forwarded_headers[0], "x-forwarded-for");
        assert_eq!(config.transport.channel_capacity, 1024);
        assert_eq!(config.transport.direct_queues, vec!["warden.inner.direct"]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
transport:
  topics: [device.status, device.alarm]
"#;
        let config: WardenConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.transport.topics, vec!["device.status", "device.alarm"]);
        assert_eq!(config.transport.channel_capacity, 1024);
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("warden-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("warden.yaml");
        std::fs::write(
            &path,
            "rate_limiting:\n  sweep_interval_secs: 5\ntransport:\n  channel_capacity: 16\n",
        )
        .unwrap();

        let config = WardenConfig::load(path.to_str()).unwrap();
        assert_eq!(config.rate_limiting.sweep_interval_secs, 5);
        assert_eq!(config.transport.channel_capacity, 16);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = WardenConfig::load(Some("/nonexistent/warden-config"));
        assert!(matches!(result, Err(WardenError::Config(_))));
    }

    #[test]
    fn test_load_rules_without_path_is_empty() {
        let rules = RateLimitingConfig::default().load_rules().unwrap();
        assert!(rules.is_empty());
    }
}
