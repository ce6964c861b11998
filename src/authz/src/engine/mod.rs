//! Authorization engine
//!
//! Composes the aggregator, the pattern matcher and the result cache behind
//! the three operations exposed to collaborators.

pub mod metrics;

pub use metrics::{EngineMetrics, MetricsCollector};

use crate::aggregator::PermissionAggregator;
use crate::cache::{AuthorizationCache, CacheConfig, CacheStore, CheckOutcome, InMemoryCacheStore};
use crate::error::Result;
use crate::hierarchy::CycleGuard;
use crate::pattern::PatternMatcher;
use crate::store::{InMemoryRbacStore, PermissionSource, RoleTreeSource};
use crate::types::{Permission, RoleId, UserId};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Serve repeated checks from the result cache
    pub enable_cache: bool,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// On a failed cache read, compute directly instead of failing the check
    pub degrade_on_cache_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache: CacheConfig::default(),
            enable_metrics: true,
            degrade_on_cache_error: false,
        }
    }
}

/// Authorization engine
///
/// # Architecture
///
/// ```text
/// check ─▶ [Cache] ──hit──────────────────────────────────▶ outcome (cached)
///             │ miss
///             ▼
///          Aggregator ─▶ HierarchyResolver ─▶ PatternMatcher ─▶ outcome
///             │                                                   │
///             └──────────────── populate cache ◀──────────────────┘
/// ```
pub struct AuthzEngine {
    aggregator: PermissionAggregator,
    cycle_guard: CycleGuard,
    matcher: PatternMatcher,
    cache: Option<AuthorizationCache>,
    metrics: Option<Arc<MetricsCollector>>,
    config: EngineConfig,
}

impl AuthzEngine {
    /// Create an engine over explicit data sources and a cache store
    pub fn new(
        config: EngineConfig,
        roles: Arc<dyn RoleTreeSource>,
        permissions: Arc<dyn PermissionSource>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Self {
        let aggregator = PermissionAggregator::new(roles.clone(), permissions);
        let cycle_guard = CycleGuard::new(roles);

        let cache = config
            .enable_cache
            .then(|| AuthorizationCache::new(cache_store, config.cache.clone()));

        let metrics = config.enable_metrics.then(|| Arc::new(MetricsCollector::new()));

        info!(
            "AuthzEngine initialized with cache={} (ttl={}s), metrics={}, degrade_on_cache_error={}",
            config.enable_cache,
            config.cache.ttl.as_secs(),
            config.enable_metrics,
            config.degrade_on_cache_error
        );

        Self {
            aggregator,
            cycle_guard,
            matcher: PatternMatcher::new(),
            cache,
            metrics,
            config,
        }
    }

    /// Engine over an in-memory store and an in-memory cache, default config
    pub fn in_memory(store: Arc<InMemoryRbacStore>) -> Self {
        Self::new(
            EngineConfig::default(),
            store.clone(),
            store,
            Arc::new(InMemoryCacheStore::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check whether `user_id` may perform `action` on `resource`.
    ///
    /// Served from the cache when an unexpired answer exists for the exact
    /// triple; otherwise computed, cached, and returned with `cached = false`.
    pub async fn check_permission(&self, user_id: UserId, resource: &str, action: &str) -> Result<CheckOutcome> {
        let start = Instant::now();

        debug!(
            "Permission check: user={}, resource={}, action={}",
            user_id, resource, action
        );

        let result = self.check_through_cache(user_id, resource, action).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(outcome) => metrics.record_check(outcome.allowed).await,
                Err(_) => metrics.record_error().await,
            }
            metrics.record_latency(start.elapsed()).await;
        }

        result
    }

    /// Compute a check from the current permission set, bypassing the cache
    pub async fn check_permission_uncached(&self, user_id: UserId, resource: &str, action: &str) -> Result<bool> {
        let permissions = self.aggregator.resolve_permissions(user_id).await?;

        let granted_by = permissions.iter().find(|p| {
            self.matcher.matches(&p.resource, resource) && self.matcher.matches(&p.action, action)
        });

        match granted_by {
            Some(permission) => {
                debug!(
                    "Allow: user {} {} on {} via permission {} {}",
                    user_id, action, resource, permission.id, permission
                );
                Ok(true)
            }
            None => {
                debug!(
                    "Deny: none of {} permission(s) of user {} match ({}, {})",
                    permissions.len(),
                    user_id,
                    resource,
                    action
                );
                Ok(false)
            }
        }
    }

    /// Every permission `user_id` effectively holds, deduplicated by id
    pub async fn resolve_all_permissions(&self, user_id: UserId) -> Result<Vec<Permission>> {
        let result = self.aggregator.resolve_permissions(user_id).await;

        if result.is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.record_error().await;
            }
        }

        result
    }

    /// True if making `candidate_parent_id` the parent of `role_id` would
    /// close a loop in the role tree
    pub async fn would_create_cycle(&self, role_id: RoleId, candidate_parent_id: RoleId) -> Result<bool> {
        self.cycle_guard.would_create_cycle(role_id, candidate_parent_id).await
    }

    pub fn cycle_guard(&self) -> &CycleGuard {
        &self.cycle_guard
    }

    /// Metrics snapshot, `None` when metrics are disabled
    pub async fn metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.snapshot().await),
            None => None,
        }
    }

    /// Metrics in the Prometheus text format, `None` when disabled
    pub async fn export_prometheus(&self) -> Option<String> {
        match &self.metrics {
            Some(metrics) => Some(metrics.export_prometheus().await),
            None => None,
        }
    }

    async fn check_through_cache(&self, user_id: UserId, resource: &str, action: &str) -> Result<CheckOutcome> {
        let Some(cache) = &self.cache else {
            let allowed = self.check_permission_uncached(user_id, resource, action).await?;
            return Ok(CheckOutcome::computed(allowed));
        };

        match cache.lookup(user_id, resource, action).await {
            Ok(Some(allowed)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit().await;
                }
                debug!("Cache hit for user {} ({}, {})", user_id, resource, action);
                return Ok(CheckOutcome::cached(allowed));
            }
            Ok(None) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_miss().await;
                }
            }
            Err(e) if self.config.degrade_on_cache_error && e.is_unavailable() => {
                warn!("Cache read failed, computing without cache: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_bypass().await;
                }
                let allowed = self.check_permission_uncached(user_id, resource, action).await?;
                return Ok(CheckOutcome::computed(allowed));
            }
            Err(e) => return Err(e),
        }

        let allowed = self.check_permission_uncached(user_id, resource, action).await?;

        if !cache.populate(user_id, resource, action, allowed).await {
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_write_failure().await;
            }
        }

        Ok(CheckOutcome::computed(allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engine_creation() {
        let store = Arc::new(InMemoryRbacStore::new());
        let engine = AuthzEngine::in_memory(store);

        assert!(engine.cache.is_some());
        assert!(engine.metrics.is_some());
        assert_eq!(engine.config().cache.ttl.as_secs(), 300);
    }

    #[tokio::test]
    async fn test_engine_without_cache_or_metrics() {
        let store = Arc::new(InMemoryRbacStore::new());
        let config = EngineConfig {
            enable_cache: false,
            enable_metrics: false,
            ..Default::default()
        };
        let engine = AuthzEngine::new(config, store.clone(), store, Arc::new(InMemoryCacheStore::new()));

        let outcome = engine.check_permission(UserId::new(), "users", "read").await.unwrap();
        assert_eq!(outcome, CheckOutcome::computed(false));
        assert!(engine.metrics().await.is_none());
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"degrade_on_cache_error": true}"#).unwrap();
        assert!(config.enable_cache);
        assert!(config.degrade_on_cache_error);
        assert_eq!(config.cache, CacheConfig::default());
    }
}
