//! In-memory RBAC store
//!
//! Backs both data-source traits and carries the administrative mutations
//! (roles, permissions, groups and their links) with the same integrity rules
//! a relational schema would enforce. Used by tests, fixtures and the CLI.

use crate::error::{AuthzError, Result};
use crate::hierarchy::cycle::ancestor_walk_reaches;
use crate::store::{PermissionSource, RoleTreeSource};
use crate::types::{GroupId, Permission, PermissionGroup, PermissionId, Role, RoleId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Tables {
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    groups: HashMap<GroupId, PermissionGroup>,
    user_roles: HashSet<(UserId, RoleId)>,
    role_permissions: HashSet<(RoleId, PermissionId)>,
    group_items: HashSet<(GroupId, PermissionId)>,
    role_groups: HashSet<(RoleId, GroupId)>,
}

impl Tables {
    fn require_role(&self, id: RoleId) -> Result<&Role> {
        self.roles.get(&id).ok_or_else(|| AuthzError::not_found("role", id))
    }

    fn require_permission(&self, id: PermissionId) -> Result<&Permission> {
        self.permissions
            .get(&id)
            .ok_or_else(|| AuthzError::not_found("permission", id))
    }

    fn require_group(&self, id: GroupId) -> Result<&PermissionGroup> {
        self.groups
            .get(&id)
            .ok_or_else(|| AuthzError::not_found("permission group", id))
    }

    /// Reject `candidate` as parent of `role_id` if it would close a loop
    fn check_parent(&self, role_id: RoleId, candidate: RoleId) -> Result<()> {
        self.require_role(candidate)?;

        let closes_loop = ancestor_walk_reaches(role_id, candidate, |id| {
            self.roles.get(&id).and_then(|role| role.parent_id)
        });

        if closes_loop {
            return Err(AuthzError::ValidationFailed(format!(
                "setting parent of role {} to {} would create a cycle",
                role_id, candidate
            )));
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuthzError::ValidationFailed(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// In-memory role, permission and group store
#[derive(Debug, Default)]
pub struct InMemoryRbacStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Roles
    // ---------------------------------------------------------------------

    /// Create a role with a unique name and an optional existing parent
    pub async fn create_role(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        parent_id: Option<RoleId>,
    ) -> Result<Role> {
        let name = name.into();
        require_non_empty("role name", &name)?;

        let mut tables = self.tables.write().await;
        if tables.roles.values().any(|r| r.name == name) {
            return Err(AuthzError::Conflict(format!("role name '{}' already exists", name)));
        }

        let role = Role {
            id: RoleId::new(),
            name,
            description,
            parent_id,
        };

        if let Some(parent) = parent_id {
            tables.check_parent(role.id, parent)?;
        }

        tables.roles.insert(role.id, role.clone());
        info!("Created role '{}' ({})", role.name, role.id);
        Ok(role)
    }

    /// Set or clear a role's parent.
    ///
    /// The cycle check and the write happen under one write lock, so
    /// concurrent parent changes cannot interleave between them.
    pub async fn set_role_parent(&self, role_id: RoleId, parent_id: Option<RoleId>) -> Result<Role> {
        let mut tables = self.tables.write().await;
        tables.require_role(role_id)?;

        if let Some(parent) = parent_id {
            tables.check_parent(role_id, parent)?;
        }

        let role = tables
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| AuthzError::not_found("role", role_id))?;
        role.parent_id = parent_id;

        debug!("Role {} parent set to {:?}", role_id, parent_id);
        Ok(role.clone())
    }

    /// Update a role's description
    pub async fn update_role_description(&self, role_id: RoleId, description: Option<String>) -> Result<Role> {
        let mut tables = self.tables.write().await;
        let role = tables
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| AuthzError::not_found("role", role_id))?;
        role.description = description;
        Ok(role.clone())
    }

    /// Delete a role that has no assigned users and no child roles.
    ///
    /// Its permission and group grants are removed with it.
    pub async fn delete_role(&self, role_id: RoleId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_role(role_id)?;

        if tables.user_roles.iter().any(|(_, r)| *r == role_id) {
            return Err(AuthzError::Conflict(format!(
                "cannot delete role {} with assigned users",
                role_id
            )));
        }
        if tables.roles.values().any(|r| r.parent_id == Some(role_id)) {
            return Err(AuthzError::Conflict(format!(
                "cannot delete role {} with child roles",
                role_id
            )));
        }

        tables.role_permissions.retain(|(r, _)| *r != role_id);
        tables.role_groups.retain(|(r, _)| *r != role_id);
        tables.roles.remove(&role_id);

        info!("Deleted role {}", role_id);
        Ok(())
    }

    pub async fn role(&self, role_id: RoleId) -> Option<Role> {
        self.tables.read().await.roles.get(&role_id).cloned()
    }

    pub async fn role_by_name(&self, name: &str) -> Option<Role> {
        self.tables
            .read()
            .await
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned()
    }

    /// All roles, ordered by name
    pub async fn list_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.tables.read().await.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    // ---------------------------------------------------------------------
    // Permissions
    // ---------------------------------------------------------------------

    /// Create a permission; the `(resource, action)` pair must be unique
    pub async fn create_permission(
        &self,
        resource: impl Into<String>,
        action: impl Into<String>,
        description: Option<String>,
    ) -> Result<Permission> {
        let resource = resource.into();
        let action = action.into();
        require_non_empty("resource", &resource)?;
        require_non_empty("action", &action)?;

        let mut tables = self.tables.write().await;
        if tables
            .permissions
            .values()
            .any(|p| p.resource == resource && p.action == action)
        {
            return Err(AuthzError::Conflict(format!(
                "permission ({}, {}) already exists",
                resource, action
            )));
        }

        let permission = Permission {
            id: PermissionId::new(),
            resource,
            action,
            description,
        };
        tables.permissions.insert(permission.id, permission.clone());

        debug!("Created permission {} {}", permission.id, permission);
        Ok(permission)
    }

    /// The description is the only mutable field of a permission
    pub async fn update_permission_description(
        &self,
        permission_id: PermissionId,
        description: Option<String>,
    ) -> Result<Permission> {
        let mut tables = self.tables.write().await;
        let permission = tables
            .permissions
            .get_mut(&permission_id)
            .ok_or_else(|| AuthzError::not_found("permission", permission_id))?;
        permission.description = description;
        Ok(permission.clone())
    }

    /// Delete a permission not granted to any role nor contained in any group
    pub async fn delete_permission(&self, permission_id: PermissionId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_permission(permission_id)?;

        if tables.role_permissions.iter().any(|(_, p)| *p == permission_id) {
            return Err(AuthzError::Conflict(format!(
                "cannot delete permission {} granted to a role",
                permission_id
            )));
        }
        if tables.group_items.iter().any(|(_, p)| *p == permission_id) {
            return Err(AuthzError::Conflict(format!(
                "cannot delete permission {} contained in a group",
                permission_id
            )));
        }

        tables.permissions.remove(&permission_id);
        Ok(())
    }

    pub async fn permission(&self, permission_id: PermissionId) -> Option<Permission> {
        self.tables.read().await.permissions.get(&permission_id).cloned()
    }

    // ---------------------------------------------------------------------
    // Permission groups
    // ---------------------------------------------------------------------

    pub async fn create_group(&self, name: impl Into<String>, description: Option<String>) -> Result<PermissionGroup> {
        let name = name.into();
        require_non_empty("group name", &name)?;

        let mut tables = self.tables.write().await;
        if tables.groups.values().any(|g| g.name == name) {
            return Err(AuthzError::Conflict(format!(
                "permission group name '{}' already exists",
                name
            )));
        }

        let group = PermissionGroup {
            id: GroupId::new(),
            name,
            description,
        };
        tables.groups.insert(group.id, group.clone());

        debug!("Created permission group '{}' ({})", group.name, group.id);
        Ok(group)
    }

    /// Delete a group that is not granted to any role, with its memberships
    pub async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_group(group_id)?;

        if tables.role_groups.iter().any(|(_, g)| *g == group_id) {
            return Err(AuthzError::Conflict(format!(
                "cannot delete permission group {} assigned to a role",
                group_id
            )));
        }

        tables.group_items.retain(|(g, _)| *g != group_id);
        tables.groups.remove(&group_id);
        Ok(())
    }

    pub async fn group(&self, group_id: GroupId) -> Option<PermissionGroup> {
        self.tables.read().await.groups.get(&group_id).cloned()
    }

    /// Permissions contained in a group
    pub async fn group_permissions(&self, group_id: GroupId) -> Result<Vec<Permission>> {
        let tables = self.tables.read().await;
        tables.require_group(group_id)?;

        Ok(tables
            .group_items
            .iter()
            .filter(|(g, _)| *g == group_id)
            .filter_map(|(_, p)| tables.permissions.get(p).cloned())
            .collect())
    }

    // ---------------------------------------------------------------------
    // Links. Re-adding an existing link is a no-op.
    // ---------------------------------------------------------------------

    pub async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_role(role_id)?;
        tables.user_roles.insert((user_id, role_id));
        Ok(())
    }

    /// Returns whether an assignment was removed
    pub async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> bool {
        self.tables.write().await.user_roles.remove(&(user_id, role_id))
    }

    pub async fn grant_permission(&self, role_id: RoleId, permission_id: PermissionId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_role(role_id)?;
        tables.require_permission(permission_id)?;
        tables.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    pub async fn revoke_permission(&self, role_id: RoleId, permission_id: PermissionId) -> bool {
        self.tables
            .write()
            .await
            .role_permissions
            .remove(&(role_id, permission_id))
    }

    pub async fn add_permission_to_group(&self, group_id: GroupId, permission_id: PermissionId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_group(group_id)?;
        tables.require_permission(permission_id)?;
        tables.group_items.insert((group_id, permission_id));
        Ok(())
    }

    pub async fn remove_permission_from_group(&self, group_id: GroupId, permission_id: PermissionId) -> bool {
        self.tables
            .write()
            .await
            .group_items
            .remove(&(group_id, permission_id))
    }

    pub async fn grant_group(&self, role_id: RoleId, group_id: GroupId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_role(role_id)?;
        tables.require_group(group_id)?;
        tables.role_groups.insert((role_id, group_id));
        Ok(())
    }

    pub async fn revoke_group(&self, role_id: RoleId, group_id: GroupId) -> bool {
        self.tables.write().await.role_groups.remove(&(role_id, group_id))
    }
}

#[async_trait]
impl RoleTreeSource for InMemoryRbacStore {
    async fn find_user_role_ids(&self, user_id: UserId) -> Result<HashSet<RoleId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn find_roles_with_parent_in(&self, parent_ids: &[RoleId]) -> Result<HashSet<RoleId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .filter(|role| role.parent_id.is_some_and(|p| parent_ids.contains(&p)))
            .map(|role| role.id)
            .collect())
    }

    async fn find_role_parent(&self, role_id: RoleId) -> Result<Option<RoleId>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.get(&role_id).and_then(|role| role.parent_id))
    }
}

#[async_trait]
impl PermissionSource for InMemoryRbacStore {
    async fn find_direct_permissions(&self, role_ids: &[RoleId]) -> Result<Vec<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(r, _)| role_ids.contains(r))
            .filter_map(|(_, p)| tables.permissions.get(p).cloned())
            .collect())
    }

    async fn find_group_ids_for_roles(&self, role_ids: &[RoleId]) -> Result<HashSet<GroupId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_groups
            .iter()
            .filter(|(r, _)| role_ids.contains(r))
            .map(|(_, g)| *g)
            .collect())
    }

    async fn find_permissions_in_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .group_items
            .iter()
            .filter(|(g, _)| group_ids.contains(g))
            .filter_map(|(_, p)| tables.permissions.get(p).cloned())
            .collect())
    }
}
