//! Data-source contracts consumed by the engine, and their backends
//!
//! The engine never touches a database directly. It reads the role tree and
//! the permission grants through the two traits below, which makes every
//! backend (in-memory, PostgreSQL, test fakes) interchangeable.

use crate::error::Result;
use crate::types::{GroupId, Permission, RoleId, UserId};
use async_trait::async_trait;
use std::collections::HashSet;

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryRbacStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresRbacStore;

/// Read access to user-role assignments and the role parent pointers
#[async_trait]
pub trait RoleTreeSource: Send + Sync {
    /// Roles directly assigned to a user
    async fn find_user_role_ids(&self, user_id: UserId) -> Result<HashSet<RoleId>>;

    /// Roles whose parent is one of `parent_ids`
    async fn find_roles_with_parent_in(&self, parent_ids: &[RoleId]) -> Result<HashSet<RoleId>>;

    /// Parent of a role, `None` for a root or an unknown role
    async fn find_role_parent(&self, role_id: RoleId) -> Result<Option<RoleId>>;
}

/// Read access to the two permission grant paths
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Permissions granted directly to any of `role_ids`
    async fn find_direct_permissions(&self, role_ids: &[RoleId]) -> Result<Vec<Permission>>;

    /// Permission groups granted to any of `role_ids`
    async fn find_group_ids_for_roles(&self, role_ids: &[RoleId]) -> Result<HashSet<GroupId>>;

    /// Permissions contained in any of `group_ids`
    async fn find_permissions_in_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Permission>>;
}
