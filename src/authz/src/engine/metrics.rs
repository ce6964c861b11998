//! Counters and latency percentiles for authorization checks

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Latency samples kept for percentile calculation
const MAX_SAMPLES: usize = 10_000;

/// Samples dropped at once when the window is full
const DRAIN_BATCH: usize = 1_000;

/// Snapshot of engine counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Permission checks answered (cached or computed)
    pub total_checks: u64,

    pub allowed_checks: u64,
    pub denied_checks: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Results computed but not written back to the cache
    pub cache_write_failures: u64,

    /// Cache reads that failed and were bypassed in degraded mode
    pub cache_bypasses: u64,

    /// Checks or resolutions that returned an error
    pub error_count: u64,

    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_checks + self.denied_checks;
        if total == 0 {
            0.0
        } else {
            self.allowed_checks as f64 / total as f64
        }
    }
}

/// Collects [`EngineMetrics`] across concurrent checks
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,
    latency_samples: Arc<RwLock<Vec<f64>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(MAX_SAMPLES))),
        }
    }

    pub async fn record_cache_hit(&self) {
        self.metrics.write().await.cache_hits += 1;
    }

    pub async fn record_cache_miss(&self) {
        self.metrics.write().await.cache_misses += 1;
    }

    pub async fn record_cache_write_failure(&self) {
        self.metrics.write().await.cache_write_failures += 1;
    }

    pub async fn record_cache_bypass(&self) {
        self.metrics.write().await.cache_bypasses += 1;
    }

    pub async fn record_error(&self) {
        self.metrics.write().await.error_count += 1;
    }

    /// Record an answered check
    pub async fn record_check(&self, allowed: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_checks += 1;

        if allowed {
            metrics.allowed_checks += 1;
        } else {
            metrics.denied_checks += 1;
        }
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);
        if samples.len() > MAX_SAMPLES {
            samples.drain(0..DRAIN_BATCH);
        }

        let mut sorted = samples.clone();
        drop(samples);
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    pub async fn snapshot(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Render counters in the Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP rbac_checks_total Permission checks answered
# TYPE rbac_checks_total counter
rbac_checks_total {}

# HELP rbac_checks_allowed_total Checks answered with allow
# TYPE rbac_checks_allowed_total counter
rbac_checks_allowed_total {}

# HELP rbac_checks_denied_total Checks answered with deny
# TYPE rbac_checks_denied_total counter
rbac_checks_denied_total {}

# HELP rbac_cache_hits_total Checks served from cache
# TYPE rbac_cache_hits_total counter
rbac_cache_hits_total {}

# HELP rbac_cache_misses_total Checks computed on a cache miss
# TYPE rbac_cache_misses_total counter
rbac_cache_misses_total {}

# HELP rbac_cache_write_failures_total Results not written back to cache
# TYPE rbac_cache_write_failures_total counter
rbac_cache_write_failures_total {}

# HELP rbac_cache_bypasses_total Failed cache reads answered without the cache
# TYPE rbac_cache_bypasses_total counter
rbac_cache_bypasses_total {}

# HELP rbac_check_latency_seconds Check latency percentiles
# TYPE rbac_check_latency_seconds summary
rbac_check_latency_seconds{{quantile="0.5"}} {}
rbac_check_latency_seconds{{quantile="0.9"}} {}
rbac_check_latency_seconds{{quantile="0.99"}} {}

# HELP rbac_errors_total Failed checks and resolutions
# TYPE rbac_errors_total counter
rbac_errors_total {}
"#,
            metrics.total_checks,
            metrics.allowed_checks,
            metrics.denied_checks,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.cache_write_failures,
            metrics.cache_bypasses,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.error_count,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
