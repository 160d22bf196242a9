//! Rate limit rule declarations.
//!
//! A rule is declared once per guarded operation, either in code or in a
//! YAML rules file mapping operation names to rule descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::limiter::RateLimitError;
use crate::error::{Result, WardenError};

/// Default limiter key when a rule does not name one.
pub const DEFAULT_RULE_KEY: &str = "rate_limit";
/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Default number of calls allowed per window.
pub const DEFAULT_MAX_COUNT: u64 = 100;
/// Longest window a rule may declare, in seconds (366 days).
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// How the limiter key is scoped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitType {
    /// One counter shared by every caller
    #[default]
    Global,
    /// One counter per resolved caller address
    PerIp,
}

/// A rate limit rule: at most `count` calls per `time` seconds for `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Limiter key, the prefix of every counter this rule touches
    #[serde(default = "default_key")]
    pub key: String,
    /// Window length in seconds
    #[serde(default = "default_time")]
    pub time: u64,
    /// Calls allowed per window
    #[serde(default = "default_count")]
    pub count: u64,
    /// Key scoping
    #[serde(default)]
    pub limit_type: LimitType,
}

fn default_key() -> String {
    DEFAULT_RULE_KEY.to_string()
}

fn default_time() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_count() -> u64 {
    DEFAULT_MAX_COUNT
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            key: default_key(),
            time: default_time(),
            count: default_count(),
            limit_type: LimitType::default(),
        }
    }
}

impl RateLimitRule {
    /// Create a rule with the given key and quota.
    pub fn new(key: impl Into<String>, time: u64, count: u64, limit_type: LimitType) -> Self {
        Self {
            key: key.into(),
            time,
            count,
            limit_type,
        }
    }

    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.time)
    }

    /// Reject rules that could never admit a call or whose window is out of range.
    pub fn validate(&self) -> std::result::Result<(), RateLimitError> {
        if self.time == 0 {
            return Err(RateLimitError::InvalidRule {
                key: self.key.clone(),
                reason: "time must be greater than zero".to_string(),
            });
        }
        if self.time > MAX_WINDOW_SECS {
            return Err(RateLimitError::InvalidRule {
                key: self.key.clone(),
                reason: format!("time must not exceed {} seconds", MAX_WINDOW_SECS),
            });
        }
        if self.count == 0 {
            return Err(RateLimitError::InvalidRule {
                key: self.key.clone(),
                reason: "count must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Rules registered against named operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Map of operation name to the rule guarding it
    #[serde(default)]
    pub operations: HashMap<String, RateLimitRule>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string, validating every rule.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RuleSet = serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::Config(format!("Failed to parse rate limit rules: {}", e)))?;

        for rule in rules.operations.values() {
            rule.validate()?;
        }
        for (key, operations) in rules.shared_keys() {
            warn!(
                key = %key,
                operations = ?operations,
                "Operations share one rate limit counter"
            );
        }
        Ok(rules)
    }

    /// Limiter keys declared by more than one operation with the same scoping.
    ///
    /// Such operations draw from one counter. Operation names are sorted.
    pub fn shared_keys(&self) -> Vec<(String, Vec<String>)> {
        let mut by_key: HashMap<(&str, LimitType), Vec<String>> = HashMap::new();
        for (operation, rule) in &self.operations {
            by_key
                .entry((rule.key.as_str(), rule.limit_type))
                .or_default()
                .push(operation.clone());
        }

        let mut shared: Vec<_> = by_key
            .into_iter()
            .filter(|(_, operations)| operations.len() > 1)
            .map(|((key, _), mut operations)| {
                operations.sort();
                (key.to_string(), operations)
            })
            .collect();
        shared.sort();
        shared
    }

    /// Register a rule for an operation, replacing any previous one.
    pub fn insert(&mut self, operation: impl Into<String>, rule: RateLimitRule) {
        self.operations.insert(operation.into(), rule);
    }

    /// Get the rule guarding an operation.
    pub fn get(&self, operation: &str) -> Option<&RateLimitRule> {
        self.operations.get(operation)
    }

    /// Number of guarded operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check whether no operation is guarded.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
