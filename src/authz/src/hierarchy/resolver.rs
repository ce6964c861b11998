//! Downward closure of a set of roles

use crate::error::Result;
use crate::store::RoleTreeSource;
use crate::types::RoleId;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Expands a set of roles to include every transitive descendant.
///
/// Breadth-first, one data-source call per tree level:
///
/// ```text
/// collected = roots, queue = roots
/// while queue not empty:
///     batch = drain(queue)
///     for child in find_roles_with_parent_in(batch):
///         if child not in collected: collected += child, queue += child
/// ```
pub struct HierarchyResolver {
    source: Arc<dyn RoleTreeSource>,
}

impl HierarchyResolver {
    pub fn new(source: Arc<dyn RoleTreeSource>) -> Self {
        Self { source }
    }

    /// Return `roots` plus all of their descendants, without duplicates.
    ///
    /// An empty input returns an empty set without touching the source.
    pub async fn expand_descendants(&self, roots: &HashSet<RoleId>) -> Result<HashSet<RoleId>> {
        let mut collected: HashSet<RoleId> = roots.clone();
        if roots.is_empty() {
            return Ok(collected);
        }

        let mut queue: VecDeque<RoleId> = roots.iter().copied().collect();
        let mut depth = 0usize;

        while !queue.is_empty() {
            let batch: Vec<RoleId> = queue.drain(..).collect();
            let children = self.source.find_roles_with_parent_in(&batch).await?;

            for child in children {
                // Never re-enqueue: a stored loop among descendants cannot spin
                if collected.insert(child) {
                    queue.push_back(child);
                }
            }
            depth += 1;
        }

        debug!(
            "Expanded {} root role(s) to {} role(s) over {} level(s)",
            roots.len(),
            collected.len(),
            depth
        );

        Ok(collected)
    }
}
