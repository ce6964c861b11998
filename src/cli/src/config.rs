//! CLI configuration loading and validation

use anyhow::{Context, Result};
use rbac_authz::cache::{CacheConfig, DEFAULT_KEY_PREFIX};
use rbac_authz::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageSection {
    /// `memory` or `postgres`
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Role-graph fixture loaded into the memory backend
    #[serde(default)]
    pub fixture: Option<PathBuf>,

    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `memory` or `redis`
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSection {
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    #[serde(default)]
    pub degrade_on_cache_error: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            fixture: None,
            database_url: None,
            run_migrations: true,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_cache_backend(),
            redis_url: None,
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            degrade_on_cache_error: false,
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_storage_backend() -> String { "memory".to_string() }
fn default_cache_backend() -> String { "memory".to_string() }
fn default_ttl_secs() -> u64 { 300 }
fn default_key_prefix() -> String { DEFAULT_KEY_PREFIX.to_string() }

/// Values taken from flags or the environment, applied over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub fixture: Option<PathBuf>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub no_cache: bool,
}

impl CliConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config: CliConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(fixture) = overrides.fixture {
            self.storage.fixture = Some(fixture);
        }
        if let Some(url) = overrides.database_url {
            self.storage.database_url = Some(url);
        }
        if let Some(url) = overrides.redis_url {
            self.cache.redis_url = Some(url);
        }
        if let Some(ttl) = overrides.cache_ttl_secs {
            self.cache.ttl_secs = ttl;
        }
        if overrides.no_cache {
            self.cache.enabled = false;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.storage.backend.as_str() {
            "memory" => {}
            "postgres" => {
                if self.storage.database_url.is_none() {
                    anyhow::bail!("Storage backend 'postgres' requires database_url (or DATABASE_URL)");
                }
            }
            other => anyhow::bail!("Storage backend must be 'memory' or 'postgres', got '{}'", other),
        }

        match self.cache.backend.as_str() {
            "memory" => {}
            "redis" => {
                if self.cache.enabled && self.cache.redis_url.is_none() {
                    anyhow::bail!("Cache backend 'redis' requires redis_url (or REDIS_URL)");
                }
            }
            other => anyhow::bail!("Cache backend must be 'memory' or 'redis', got '{}'", other),
        }

        if self.cache.ttl_secs == 0 {
            anyhow::bail!("Cache TTL must be at least one second");
        }

        if self.cache.key_prefix.is_empty() {
            anyhow::bail!("Cache key prefix cannot be empty");
        }

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            enable_cache: self.cache.enabled,
            cache: CacheConfig {
                ttl: Duration::from_secs(self.cache.ttl_secs),
                key_prefix: self.cache.key_prefix.clone(),
            },
            enable_metrics: self.engine.enable_metrics,
            degrade_on_cache_error: self.engine.degrade_on_cache_error,
        }
    }

    /// Background sweep cadence for the in-memory cache: once per TTL
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CliConfig::default();
        config.validate().unwrap();

        let engine = config.engine_config();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cache]
ttl_secs = 60

[engine]
degrade_on_cache_error = true
"#
        )
        .unwrap();

        let config = CliConfig::load(file.path()).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(config.cache.enabled);
        assert_eq!(config.storage.backend, "memory");
        assert!(config.engine_config().degrade_on_cache_error);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = CliConfig::default();
        config.apply_overrides(Overrides {
            database_url: Some("postgresql://localhost/rbac".into()),
            cache_ttl_secs: Some(30),
            no_cache: true,
            ..Default::default()
        });

        assert_eq!(config.storage.database_url.as_deref(), Some("postgresql://localhost/rbac"));
        assert_eq!(config.engine_config().cache.ttl, Duration::from_secs(30));
        assert_eq!(config.cache_sweep_interval(), Duration::from_secs(30));
        assert!(!config.engine_config().enable_cache);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = CliConfig::default();
        config.storage.backend = "postgres".into();
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.cache.backend = "redis".into();
        assert!(config.validate().is_err());
        config.cache.enabled = false;
        assert!(config.validate().is_ok());

        let mut config = CliConfig::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.storage.backend = "sqlite".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(CliConfig::load("/nonexistent/rbac.toml").is_err());
        assert_eq!(CliConfig::load_or_default(None).unwrap(), CliConfig::default());
    }
}
