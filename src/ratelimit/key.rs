//! Limiter key derivation.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

use super::rules::{LimitType, RateLimitRule};

/// Subkey shared by every caller of a global rule.
pub const GLOBAL_SUBKEY: &str = "global";

/// Headers consulted, in order, for the caller address behind proxies.
pub const DEFAULT_FORWARDED_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "proxy-client-ip",
    "wl-proxy-client-ip",
    "x-real-ip",
];

/// Raised when a per-IP rule cannot determine the caller address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no caller address could be resolved for rule '{rule_key}'")]
pub struct UnresolvedKey {
    /// Key of the rule that needed the address
    pub rule_key: String,
}

/// Caller metadata supplied by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HashMap<String, String>,
    peer_addr: Option<IpAddr>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address of the directly connected peer.
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr.ip());
        self
    }

    /// Set the peer IP when no port is known.
    pub fn with_peer_ip(mut self, ip: IpAddr) -> Self {
        self.peer_addr = Some(ip);
        self
    }

    /// Add a request header. Header names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Address of the directly connected peer.
    pub fn peer_addr(&self) -> Option<IpAddr> {
        self.peer_addr
    }
}

/// The concrete counter key for a rule and caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    /// The rule's key
    pub rule_key: String,
    /// Scope within the rule: the global marker or a caller address
    pub subkey: String,
}

impl CompositeKey {
    /// Create a composite key.
    pub fn new(rule_key: &str, subkey: impl Into<String>) -> Self {
        Self {
            rule_key: rule_key.to_string(),
            subkey: subkey.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rule_key, self.subkey)
    }
}

/// Derives composite keys from rules and request contexts.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    forwarded_headers: Vec<String>,
}

impl KeyResolver {
    /// Create a resolver using the default forwarding header chain.
    pub fn new() -> Self {
        Self::with_headers(DEFAULT_FORWARDED_HEADERS.iter().map(|h| h.to_string()))
    }

    /// Create a resolver consulting `headers` in order before the peer address.
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forwarded_headers: headers
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Compute the composite key for `rule` and `context`.
    pub fn resolve(
        &self,
        rule: &RateLimitRule,
        context: &RequestContext,
    ) -> Result<CompositeKey, UnresolvedKey> {
        match rule.limit_type {
            LimitType::Global => Ok(CompositeKey::new(&rule.key, GLOBAL_SUBKEY)),
            LimitType::PerIp => self
                .client_ip(context)
                .map(|ip| CompositeKey::new(&rule.key, ip.to_string()))
                .ok_or_else(|| UnresolvedKey {
                    rule_key: rule.key.clone(),
                }),
        }
    }

    /// Resolve the caller address: forwarding headers first, then the peer.
    pub fn client_ip(&self, context: &RequestContext) -> Option<IpAddr> {
        self.forwarded_headers
            .iter()
            .filter_map(|name| context.header(name))
            .find_map(first_forwarded_ip)
            .or(context.peer_addr())
            .map(normalize_loopback)
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// First usable address in a possibly multi-hop forwarding header.
fn first_forwarded_ip(value: &str) -> Option<IpAddr> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case("unknown"))
        .find_map(|part| part.parse::<IpAddr>().ok())
}

fn normalize_loopback(ip: IpAddr) -> IpAddr {
    if ip.is_loopback() && ip.is_ipv6() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        ip
    }
}
