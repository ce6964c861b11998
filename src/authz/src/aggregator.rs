//! Effective permission resolution for a user
//!
//! A user holds every permission reachable from the downward closure of their
//! directly assigned roles through either grant path:
//!
//! ```text
//! user ─▶ roles ─▶ closure ─┬─▶ role_permissions ───────────────────▶ permissions
//!                           └─▶ role_permission_groups ─▶ group items ─▶ permissions
//! ```

use crate::error::Result;
use crate::hierarchy::HierarchyResolver;
use crate::store::{PermissionSource, RoleTreeSource};
use crate::types::{GroupId, Permission, PermissionId, RoleId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Aggregates a user's permissions over the role tree and both grant paths.
///
/// Performs no caching; see [`crate::cache::AuthorizationCache`].
pub struct PermissionAggregator {
    roles: Arc<dyn RoleTreeSource>,
    permissions: Arc<dyn PermissionSource>,
    hierarchy: HierarchyResolver,
}

impl PermissionAggregator {
    pub fn new(roles: Arc<dyn RoleTreeSource>, permissions: Arc<dyn PermissionSource>) -> Self {
        let hierarchy = HierarchyResolver::new(roles.clone());
        Self {
            roles,
            permissions,
            hierarchy,
        }
    }

    /// Resolve the deduplicated permission set of `user_id`.
    ///
    /// Deduplication is by permission id only. The returned order carries no
    /// meaning; it is sorted by `(resource, action, id)` for stable output.
    pub async fn resolve_permissions(&self, user_id: UserId) -> Result<Vec<Permission>> {
        let assigned = self.roles.find_user_role_ids(user_id).await?;
        if assigned.is_empty() {
            debug!("User {} has no assigned roles", user_id);
            return Ok(Vec::new());
        }

        let closure = self.hierarchy.expand_descendants(&assigned).await?;
        let role_ids: Vec<RoleId> = closure.into_iter().collect();

        // Direct grants and the group path are independent of each other
        let (direct, via_groups) = futures::try_join!(
            self.permissions.find_direct_permissions(&role_ids),
            self.group_permissions(&role_ids),
        )?;

        let direct_count = direct.len();
        let group_count = via_groups.len();

        let mut by_id: HashMap<PermissionId, Permission> = HashMap::with_capacity(direct_count + group_count);
        for permission in direct.into_iter().chain(via_groups) {
            by_id.entry(permission.id).or_insert(permission);
        }

        let mut resolved: Vec<Permission> = by_id.into_values().collect();
        resolved.sort_by(|a, b| {
            (a.resource.as_str(), a.action.as_str(), a.id).cmp(&(b.resource.as_str(), b.action.as_str(), b.id))
        });

        debug!(
            "User {}: {} assigned role(s), {} in closure, {} direct + {} group grant(s), {} unique permission(s)",
            user_id,
            assigned.len(),
            role_ids.len(),
            direct_count,
            group_count,
            resolved.len()
        );

        Ok(resolved)
    }

    /// Permissions reachable through groups granted to `role_ids`
    async fn group_permissions(&self, role_ids: &[RoleId]) -> Result<Vec<Permission>> {
        let group_ids: Vec<GroupId> = self
            .permissions
            .find_group_ids_for_roles(role_ids)
            .await?
            .into_iter()
            .collect();

        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.permissions.find_permissions_in_groups(&group_ids).await
    }
}
