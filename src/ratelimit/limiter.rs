//! Core rate limiter implementation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::key::{KeyResolver, RequestContext};
use super::rules::{RateLimitRule, RuleSet};
use super::store::{CounterStore, LocalCounterStore};

/// Errors raised by the rate limiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The rule can never admit a call.
    #[error("invalid rate limit rule '{key}': {reason}")]
    InvalidRule { key: String, reason: String },

    /// A guarded operation was not admitted.
    #[error("call to '{key}' rejected: {reason}")]
    Rejected { key: String, reason: DenyReason },
}

/// Why a call was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The window quota is used up
    OverLimit,
    /// A per-IP rule could not determine the caller address
    UnresolvedKey,
    /// The counter store failed; the limiter fails closed
    StoreUnavailable,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DenyReason::OverLimit => "over limit",
            DenyReason::UnresolvedKey => "unresolved key",
            DenyReason::StoreUnavailable => "counter store unavailable",
        };
        f.write_str(reason)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The call may proceed.
    Allowed {
        /// Calls counted in the window, this one included
        count: u64,
        /// Calls left in the window
        remaining: u64,
        /// Time until the window resets
        reset_after: Duration,
    },
    /// The call must be refused.
    Denied { reason: DenyReason },
}

impl Decision {
    /// Whether the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// The denial reason, if denied.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { reason } => Some(*reason),
        }
    }
}

/// Fixed-window rate limiter.
///
/// This struct is thread-safe and can be shared across tasks behind an `Arc`.
/// All mutable state lives in the counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    resolver: KeyResolver,
    rules: RuleSet,
}

impl RateLimiter {
    /// Create a rate limiter with an in-process store and no named rules.
    pub fn new() -> Self {
        Self::with_store(Arc::new(LocalCounterStore::new()))
    }

    /// Create a rate limiter over the given counter store.
    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            resolver: KeyResolver::new(),
            rules: RuleSet::new(),
        }
    }

    /// Replace the key resolver.
    pub fn with_resolver(mut self, resolver: KeyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Register rules for named operations.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// The rules registered for named operations.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Check one call against `rule`.
    ///
    /// Every check that resolves a key counts against the window, denied
    /// calls included. Key resolution and store failures deny the call.
    pub async fn check(
        &self,
        rule: &RateLimitRule,
        context: &RequestContext,
    ) -> Result<Decision, RateLimitError> {
        rule.validate()?;

        let key = match self.resolver.resolve(rule, context) {
            Ok(key) => key,
            Err(err) => {
                debug!(rule = %rule.key, error = %err, "Denying call with unresolved key");
                return Ok(Decision::Denied {
                    reason: DenyReason::UnresolvedKey,
                });
            }
        };
        let key = key.to_string();

        trace!(key = %key, limit = rule.count, window_secs = rule.time, "Checking rate limit");

        let snapshot = match self.store.increment(&key, rule.window()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(key = %key, error = %err, "Counter store failed, denying call");
                return Ok(Decision::Denied {
                    reason: DenyReason::StoreUnavailable,
                });
            }
        };

        if snapshot.count > rule.count {
            debug!(
                key = %key,
                count = snapshot.count,
                limit = rule.count,
                "Rate limit exceeded"
            );
            return Ok(Decision::Denied {
                reason: DenyReason::OverLimit,
            });
        }

        Ok(Decision::Allowed {
            count: snapshot.count,
            remaining: rule.count - snapshot.count,
            reset_after: snapshot.reset_after,
        })
    }

    /// Check one call to a named operation.
    ///
    /// Operations without a registered rule are admitted without counting.
    pub async fn check_operation(
        &self,
        operation: &str,
        context: &RequestContext,
    ) -> Result<Decision, RateLimitError> {
        match self.rules.get(operation) {
            Some(rule) => self.check(rule, context).await,
            None => {
                trace!(operation = %operation, "No rate limit rule for operation");
                Ok(Decision::Allowed {
                    count: 0,
                    remaining: u64::MAX,
                    reset_after: Duration::ZERO,
                })
            }
        }
    }

    /// Run `operation` only if a call under `rule` is admitted.
    pub async fn guard<F, T>(
        &self,
        rule: &RateLimitRule,
        context: &RequestContext,
        operation: F,
    ) -> Result<T, RateLimitError>
    where
        F: Future<Output = T>,
    {
        match self.check(rule, context).await? {
            Decision::Allowed { .. } => Ok(operation.await),
            Decision::Denied { reason } => Err(RateLimitError::Rejected {
                key: rule.key.clone(),
                reason,
            }),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::rules::LimitType;
    use crate::ratelimit::store::StoreError;
    use crate::ratelimit::CounterSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn increment(
            &self,
            _key: &str,
            _window: Duration,
        ) -> Result<CounterSnapshot, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn limiter_with_clock() -> (RateLimiter, Arc<LocalCounterStore>, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(LocalCounterStore::with_clock(Arc::new(clock.clone())));
        (RateLimiter::with_store(store.clone()), store, clock)
    }

    #[tokio::test]
    async fn test_quota_exhausts_then_resets() {
        let (limiter, _store, clock) = limiter_with_clock();
        let rule = RateLimitRule::new("device.list", 60, 100, LimitType::Global);
        let context = RequestContext::new();

        for i in 1..=100 {
            let decision = limiter.check(&rule, &context).await.unwrap();
            assert!(decision.is_allowed(), "call {} should be allowed", i);
        }

        let decision = limiter.check(&rule, &context).await.unwrap();
        assert_eq!(decision.deny_reason(), Some(DenyReason::OverLimit));

        clock.advance(Duration::from_secs(60));
        let decision = limiter.check(&rule, &context).await.unwrap();
        assert!(matches!(decision, Decision::Allowed { count: 1, remaining: 99, .. }));
    }

    #[tokio::test]
    async fn test_denied_calls_consume_quota() {
        let (limiter, store, _clock) = limiter_with_clock();
        let rule = RateLimitRule::new("login", 60, 2, LimitType::Global);
        let context = RequestContext::new();

        for _ in 0..5 {
            limiter.check(&rule, &context).await.unwrap();
        }
        assert_eq!(store.current_count("login/global"), Some(5));
    }

    #[tokio::test]
    async fn test_invalid_rule_is_an_error() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::new("broken", 0, 5, LimitType::Global);

        let result = limiter.check(&rule, &RequestContext::new()).await;
        assert!(matches!(result, Err(RateLimitError::InvalidRule { .. })));
    }

    #[tokio::test]
    async fn test_oversized_window_is_an_error() {
        let (limiter, store, _clock) = limiter_with_clock();
        let rule = RateLimitRule::new("big", u64::MAX, 1, LimitType::Global);

        let result = limiter.check(&rule, &RequestContext::new()).await;
        assert!(matches!(result, Err(RateLimitError::InvalidRule { .. })));
        assert!(store.is_empty());

        let mut rules = RuleSet::new();
        rules.insert("op", rule);
        let limiter = limiter.with_rules(rules);
        let result = limiter.check_operation("op", &RequestContext::new()).await;
        assert!(matches!(result, Err(RateLimitError::InvalidRule { .. })));
    }

    #[tokio::test]
    async fn test_per_ip_without_address_denies() {
        let (limiter, store, _clock) = limiter_with_clock();
        let rule = RateLimitRule::new("export", 60, 5, LimitType::PerIp);

        let decision = limiter.check(&rule, &RequestContext::new()).await.unwrap();
        assert_eq!(decision.deny_reason(), Some(DenyReason::UnresolvedKey));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_per_ip_addresses_have_separate_counters() {
        let (limiter, store, _clock) = limiter_with_clock();
        let rule = RateLimitRule::new("export", 60, 1, LimitType::PerIp);
        let first = RequestContext::new().with_peer_addr("192.0.2.1:1000".parse().unwrap());
        let second = RequestContext::new().with_peer_addr("192.0.2.2:1000".parse().unwrap());

        assert!(limiter.check(&rule, &first).await.unwrap().is_allowed());
        assert!(limiter.check(&rule, &second).await.unwrap().is_allowed());
        assert!(!limiter.check(&rule, &first).await.unwrap().is_allowed());

        assert_eq!(store.current_count("export/192.0.2.1"), Some(2));
        assert_eq!(store.current_count("export/192.0.2.2"), Some(1));
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let limiter = RateLimiter::with_store(Arc::new(DownStore));
        let rule = RateLimitRule::default();

        let decision = limiter.check(&rule, &RequestContext::new()).await.unwrap();
        assert_eq!(decision.deny_reason(), Some(DenyReason::StoreUnavailable));
    }

    #[tokio::test]
    async fn test_guard_runs_operation_only_when_allowed() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::new("reboot", 60, 1, LimitType::Global);
        let context = RequestContext::new();

        let value = limiter.guard(&rule, &context, async { 42 }).await.unwrap();
        assert_eq!(value, 42);

        let ran = AtomicBool::new(false);
        let result = limiter
            .guard(&rule, &context, async {
                ran.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(
            result,
            Err(RateLimitError::Rejected {
                key: "reboot".to_string(),
                reason: DenyReason::OverLimit,
            })
        );
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_check_operation_uses_registered_rule() {
        let mut rules = RuleSet::new();
        rules.insert("device.export", RateLimitRule::new("export", 60, 1, LimitType::Global));
        let limiter = RateLimiter::new().with_rules(rules);
        let context = RequestContext::new();

        assert!(limiter.check_operation("device.export", &context).await.unwrap().is_allowed());
        assert!(!limiter.check_operation("device.export", &context).await.unwrap().is_allowed());

        for _ in 0..10 {
            assert!(limiter.check_operation("device.list", &context).await.unwrap().is_allowed());
        }
    }
}
