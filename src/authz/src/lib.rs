//! # RBAC Authorization Engine
//!
//! Role-based access control with hierarchical roles, permission groups and
//! wildcard permission patterns.
//!
//! ## Features
//!
//! - **Role hierarchy**: a role inherits every permission of its descendant roles
//! - **Permission groups**: bundles of permissions granted to roles as a unit
//! - **Wildcard patterns**: `*` in a permission's resource or action matches any text
//! - **Result caching**: check results cached for 300 seconds, in memory or in Redis
//! - **Cycle guard**: parent changes that would close a loop are rejected
//! - **Pluggable storage**: in-memory store, or PostgreSQL behind the `postgres` feature
//!
//! ## Example
//!
//! ```rust
//! use rbac_authz::{AuthzEngine, InMemoryRbacStore, UserId};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryRbacStore::new());
//!
//!     let admin = store.create_role("admin", None, None).await?;
//!     let any_user = store.create_permission("users", "*", None).await?;
//!     store.grant_permission(admin.id, any_user.id).await?;
//!
//!     let alice = UserId::new();
//!     store.assign_role(alice, admin.id).await?;
//!
//!     let engine = AuthzEngine::in_memory(store);
//!     let outcome = engine.check_permission(alice, "users", "delete").await?;
//!
//!     assert!(outcome.allowed);
//!     assert!(!outcome.cached);
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod cache;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod pattern;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use aggregator::PermissionAggregator;
pub use cache::{AuthorizationCache, CacheConfig, CacheStore, CheckOutcome, InMemoryCacheStore};
pub use engine::{AuthzEngine, EngineConfig, EngineMetrics};
pub use error::{AuthzError, ErrorKind, Result};
pub use hierarchy::{CycleGuard, HierarchyResolver};
pub use pattern::PatternMatcher;
pub use store::{InMemoryRbacStore, PermissionSource, RoleTreeSource};
pub use types::{GroupId, Permission, PermissionGroup, PermissionId, Role, RoleId, UserId};

#[cfg(feature = "redis")]
pub use cache::RedisCacheStore;

#[cfg(feature = "postgres")]
pub use store::PostgresRbacStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
