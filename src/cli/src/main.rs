//! RBAC command-line front end
//!
//! Runs authorization checks, effective-permission listings and cycle
//! checks against an in-memory role graph (loaded from a fixture) or a
//! PostgreSQL database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rbac_authz::cache::{CacheStore, InMemoryCacheStore};
use rbac_authz::engine::AuthzEngine;
use rbac_authz::store::{InMemoryRbacStore, PermissionSource, RoleTreeSource};
use rbac_authz::types::{RoleId, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

mod config;
mod fixture;

use config::{CliConfig, Overrides};
use fixture::{Fixture, FixtureNames};

/// RBAC authorization CLI
#[derive(Parser)]
#[command(name = "rbac")]
#[command(about = "Role-based access control checks")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "RBAC_CONFIG")]
    config: Option<PathBuf>,

    /// Role-graph fixture for the memory backend (overrides config)
    #[arg(short, long)]
    fixture: Option<PathBuf>,

    /// PostgreSQL connection string (overrides config)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection string (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Cache TTL in seconds (overrides config)
    #[arg(long, env = "AUTHZ_CACHE_TTL_SECS")]
    cache_ttl: Option<u64>,

    /// Disable the result cache
    #[arg(long)]
    no_cache: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Print engine metrics after the command
    #[arg(long)]
    metrics: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a user may perform an action on a resource
    Check {
        /// User name from the fixture, or a user id
        user: String,
        resource: String,
        action: String,

        /// Run the check several times (later runs hit the cache)
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// List a user's effective permissions
    Permissions {
        /// User name from the fixture, or a user id
        user: String,
    },

    /// Report whether a parent change would create a cycle
    Cycle {
        /// Role name from the fixture, or a role id
        role: String,
        /// Proposed parent, by name or id
        parent: String,
    },

    /// Validate configuration and fixture, then exit
    Validate,
}

/// Engine plus the names a fixture introduced
struct Backend {
    engine: AuthzEngine,
    names: FixtureNames,
}

impl Backend {
    fn user(&self, user: &str) -> Result<UserId> {
        if let Some(id) = self.names.users.get(user) {
            return Ok(*id);
        }
        user.parse()
            .with_context(|| format!("'{}' is neither a fixture user nor a user id", user))
    }

    fn role(&self, role: &str) -> Result<RoleId> {
        if let Some(id) = self.names.roles.get(role) {
            return Ok(*id);
        }
        role.parse()
            .with_context(|| format!("'{}' is neither a fixture role nor a role id", role))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},rbac_authz={}", log_level, log_level).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    // Load configuration
    let mut config = CliConfig::load_or_default(cli.config.as_deref())?;
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {:?}", path);
    }

    // Apply CLI overrides
    config.apply_overrides(Overrides {
        fixture: cli.fixture,
        database_url: cli.database_url,
        redis_url: cli.redis_url,
        cache_ttl_secs: cli.cache_ttl,
        no_cache: cli.no_cache,
    });

    // Validate configuration
    config.validate()?;

    let backend = build_backend(&config).await?;

    match cli.command {
        Command::Check {
            user,
            resource,
            action,
            repeat,
        } => {
            let user = backend.user(&user)?;
            for _ in 0..repeat.max(1) {
                let outcome = backend
                    .engine
                    .check_permission(user, &resource, &action)
                    .await
                    .context("Permission check failed")?;

                if cli.json {
                    println!("{}", serde_json::to_string(&outcome)?);
                } else {
                    println!(
                        "{} ({})",
                        if outcome.allowed { "allow" } else { "deny" },
                        if outcome.cached { "cached" } else { "computed" }
                    );
                }
            }
        }
        Command::Permissions { user } => {
            let user = backend.user(&user)?;
            let permissions = backend
                .engine
                .resolve_all_permissions(user)
                .await
                .context("Permission resolution failed")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&permissions)?);
            } else if permissions.is_empty() {
                println!("(no permissions)");
            } else {
                for permission in &permissions {
                    println!("{}\t{}\t{}", permission.resource, permission.action, permission.id);
                }
            }
        }
        Command::Cycle { role, parent } => {
            let role = backend.role(&role)?;
            let parent = backend.role(&parent)?;
            let cycle = backend
                .engine
                .would_create_cycle(role, parent)
                .await
                .context("Cycle check failed")?;

            if cli.json {
                println!("{}", serde_json::json!({ "would_create_cycle": cycle }));
            } else if cycle {
                println!("cycle: setting this parent would create a loop");
            } else {
                println!("ok: no cycle");
            }
        }
        Command::Validate => {
            println!(
                "ok: {} role(s), {} user(s) loaded",
                backend.names.roles.len(),
                backend.names.users.len()
            );
        }
    }

    if cli.metrics {
        if let Some(text) = backend.engine.export_prometheus().await {
            print!("{}", text);
        }
    }

    Ok(())
}

async fn build_backend(config: &CliConfig) -> Result<Backend> {
    let cache = build_cache_store(config).await?;
    let engine_config = config.engine_config();

    match config.storage.backend.as_str() {
        "postgres" => build_postgres(config, engine_config, cache).await,
        _ => {
            let store = Arc::new(InMemoryRbacStore::new());
            let names = match &config.storage.fixture {
                Some(path) => Fixture::load(path)?.apply(&store).await?,
                None => FixtureNames::default(),
            };
            debug!("Using in-memory store");

            let roles: Arc<dyn RoleTreeSource> = store.clone();
            let permissions: Arc<dyn PermissionSource> = store;
            Ok(Backend {
                engine: AuthzEngine::new(engine_config, roles, permissions, cache),
                names,
            })
        }
    }
}

#[cfg(feature = "postgres")]
async fn build_postgres(
    config: &CliConfig,
    engine_config: rbac_authz::engine::EngineConfig,
    cache: Arc<dyn CacheStore>,
) -> Result<Backend> {
    use rbac_authz::store::PostgresRbacStore;

    let url = config
        .storage
        .database_url
        .as_deref()
        .context("database_url is required for the postgres backend")?;

    let store = Arc::new(PostgresRbacStore::new(url).await?);
    if config.storage.run_migrations {
        store.run_migrations().await?;
    }

    let roles: Arc<dyn RoleTreeSource> = store.clone();
    let permissions: Arc<dyn PermissionSource> = store;
    Ok(Backend {
        engine: AuthzEngine::new(engine_config, roles, permissions, cache),
        names: FixtureNames::default(),
    })
}

#[cfg(not(feature = "postgres"))]
async fn build_postgres(
    _config: &CliConfig,
    _engine_config: rbac_authz::engine::EngineConfig,
    _cache: Arc<dyn CacheStore>,
) -> Result<Backend> {
    anyhow::bail!("Storage backend 'postgres' requires building with the 'postgres' feature")
}

async fn build_cache_store(config: &CliConfig) -> Result<Arc<dyn CacheStore>> {
    if config.cache.backend == "redis" && config.cache.enabled {
        return build_redis_cache(config).await;
    }

    let store = Arc::new(InMemoryCacheStore::new());
    store.spawn_sweeper(config.cache_sweep_interval());
    Ok(store)
}

#[cfg(feature = "redis")]
async fn build_redis_cache(config: &CliConfig) -> Result<Arc<dyn CacheStore>> {
    use rbac_authz::cache::RedisCacheStore;

    let url = config
        .cache
        .redis_url
        .as_deref()
        .context("redis_url is required for the redis cache backend")?;

    Ok(Arc::new(RedisCacheStore::connect(url).await?))
}

#[cfg(not(feature = "redis"))]
async fn build_redis_cache(_config: &CliConfig) -> Result<Arc<dyn CacheStore>> {
    anyhow::bail!("Cache backend 'redis' requires building with the 'redis' feature")
}
