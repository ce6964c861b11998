//! Read-through cache for single authorization checks
//!
//! Results are cached per exact `(user, resource, action)` triple as `"1"` or
//! `"0"` with a fixed expiry. Role, permission and group mutations do not
//! invalidate entries: a change takes effect for a cached triple only once its
//! entry expires (at most `ttl` later).

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::{CacheStats, InMemoryCacheStore};

#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;

use crate::error::Result;
use crate::types::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default expiry of a cached check (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default key namespace
pub const DEFAULT_KEY_PREFIX: &str = "authz";

const ALLOWED: &str = "1";
const DENIED: &str = "0";

/// Key-value store behind the authorization cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value stored under `key`, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cached results
    #[serde(with = "ttl_secs", default = "default_ttl")]
    pub ttl: Duration,

    /// Namespace prepended to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

mod ttl_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(ttl.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Result of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Whether the user holds a matching permission
    pub allowed: bool,

    /// Whether the answer was served from the cache
    pub cached: bool,
}

impl CheckOutcome {
    pub fn cached(allowed: bool) -> Self {
        Self { allowed, cached: true }
    }

    pub fn computed(allowed: bool) -> Self {
        Self { allowed, cached: false }
    }
}

/// Authorization result cache over a [`CacheStore`]
pub struct AuthorizationCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl AuthorizationCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache key for a triple: `{prefix}:{user}:{resource}:{action}`.
    ///
    /// `\` and `:` inside a component are backslash-escaped, so distinct
    /// triples always produce distinct keys.
    pub fn key(&self, user_id: UserId, resource: &str, action: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.config.key_prefix,
            user_id,
            escape_component(resource),
            escape_component(action)
        )
    }

    /// Cached answer for a triple, `None` on a miss.
    ///
    /// Store failures propagate; an unrecognised stored value counts as a miss.
    pub async fn lookup(&self, user_id: UserId, resource: &str, action: &str) -> Result<Option<bool>> {
        let key = self.key(user_id, resource, action);

        match self.store.get(&key).await?.as_deref() {
            Some(ALLOWED) => Ok(Some(true)),
            Some(DENIED) => Ok(Some(false)),
            Some(other) => {
                warn!("Ignoring unrecognised cache value '{}' for key {}", other, key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Store an answer. A failed write is logged and reported as `false`,
    /// never as an error: the computed answer stays valid without the cache.
    pub async fn populate(&self, user_id: UserId, resource: &str, action: &str, allowed: bool) -> bool {
        let key = self.key(user_id, resource, action);
        let value = if allowed { ALLOWED } else { DENIED };

        match self.store.set(&key, value, self.config.ttl).await {
            Ok(()) => {
                debug!("Cached {} for {} ({}s)", value, key, self.config.ttl.as_secs());
                true
            }
            Err(e) => {
                warn!("Failed to cache authorization result for {}: {}", key, e);
                false
            }
        }
    }
}

fn escape_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        if c == '\\' || c == ':' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
