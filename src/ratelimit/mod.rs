//! Rate limiting logic and state management.

mod counter;
mod key;
mod limiter;
mod rules;
mod store;

pub use counter::{CounterSnapshot, WindowCounter};
pub use key::{
    CompositeKey, KeyResolver, RequestContext, UnresolvedKey, DEFAULT_FORWARDED_HEADERS,
    GLOBAL_SUBKEY,
};
pub use limiter::{Decision, DenyReason, RateLimitError, RateLimiter};
pub use rules::{
    LimitType, RateLimitRule, RuleSet, DEFAULT_MAX_COUNT, DEFAULT_RULE_KEY, DEFAULT_WINDOW_SECS,
    MAX_WINDOW_SECS,
};
pub use store::{CounterStore, LocalCounterStore, StoreError};
