//! Role-graph fixtures for the in-memory backend
//!
//! ```toml
//! [[roles]]
//! name = "admin"
//! permissions = [{ resource = "users", action = "read" }]
//! groups = ["role-management"]
//!
//! [[roles]]
//! name = "support"
//! parent = "admin"
//!
//! [[groups]]
//! name = "role-management"
//! permissions = [{ resource = "roles", action = "*" }]
//!
//! [[users]]
//! name = "alice"
//! roles = ["admin"]
//! ```

use anyhow::{Context, Result};
use rbac_authz::store::InMemoryRbacStore;
use rbac_authz::types::{GroupId, PermissionId, RoleId, UserId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,

    #[serde(default)]
    pub groups: Vec<GroupSpec>,

    #[serde(default)]
    pub roles: Vec<RoleSpec>,

    #[serde(default)]
    pub users: Vec<UserSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionSpec {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSpec {
    pub name: String,
    /// Fixed identifier; a random one is generated when absent
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Names assigned while loading a fixture
#[derive(Debug, Default)]
pub struct FixtureNames {
    pub users: HashMap<String, UserId>,
    pub roles: HashMap<String, RoleId>,
}

impl Fixture {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse fixture {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Populate `store`. Parents are linked after every role exists, so
    /// roles may be listed in any order; a looping fixture is rejected.
    pub async fn apply(&self, store: &InMemoryRbacStore) -> Result<FixtureNames> {
        let mut names = FixtureNames::default();
        let mut permissions: HashMap<(String, String), PermissionId> = HashMap::new();
        let mut groups: HashMap<String, GroupId> = HashMap::new();

        for spec in &self.permissions {
            permission_id(store, &mut permissions, spec).await?;
        }

        for spec in &self.groups {
            let group = store.create_group(spec.name.clone(), spec.description.clone()).await?;
            for item in &spec.permissions {
                let permission = permission_id(store, &mut permissions, item).await?;
                store.add_permission_to_group(group.id, permission).await?;
            }
            groups.insert(spec.name.clone(), group.id);
        }

        for spec in &self.roles {
            let role = store.create_role(spec.name.clone(), spec.description.clone(), None).await?;
            names.roles.insert(spec.name.clone(), role.id);
        }

        for spec in &self.roles {
            let role = names.roles[&spec.name];

            if let Some(parent) = &spec.parent {
                let parent_id = *names
                    .roles
                    .get(parent)
                    .with_context(|| format!("Role '{}' has unknown parent '{}'", spec.name, parent))?;
                store
                    .set_role_parent(role, Some(parent_id))
                    .await
                    .with_context(|| format!("Cannot make '{}' the parent of '{}'", parent, spec.name))?;
            }

            for item in &spec.permissions {
                let permission = permission_id(store, &mut permissions, item).await?;
                store.grant_permission(role, permission).await?;
            }

            for group in &spec.groups {
                let group_id = *groups
                    .get(group)
                    .with_context(|| format!("Role '{}' references unknown group '{}'", spec.name, group))?;
                store.grant_group(role, group_id).await?;
            }
        }

        for spec in &self.users {
            let user = spec.id.map(UserId::from).unwrap_or_default();
            for role in &spec.roles {
                let role_id = *names
                    .roles
                    .get(role)
                    .with_context(|| format!("User '{}' references unknown role '{}'", spec.name, role))?;
                store.assign_role(user, role_id).await?;
            }
            names.users.insert(spec.name.clone(), user);
        }

        info!(
            "Loaded fixture: {} role(s), {} permission(s), {} group(s), {} user(s)",
            names.roles.len(),
            permissions.len(),
            groups.len(),
            names.users.len()
        );

        Ok(names)
    }
}

/// Existing id for the `(resource, action)` pair, creating it on first use
async fn permission_id(
    store: &InMemoryRbacStore,
    known: &mut HashMap<(String, String), PermissionId>,
    spec: &PermissionSpec,
) -> Result<PermissionId> {
    let key = (spec.resource.clone(), spec.action.clone());
    if let Some(id) = known.get(&key) {
        return Ok(*id);
    }

    let permission = store
        .create_permission(spec.resource.clone(), spec.action.clone(), spec.description.clone())
        .await?;
    known.insert(key, permission.id);
    Ok(permission.id)
}
