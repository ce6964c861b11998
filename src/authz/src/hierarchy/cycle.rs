//! Pre-write cycle detection for role parent changes
//!
//! Setting `role.parent = candidate` closes a loop exactly when `role` is
//! already `candidate` or one of its ancestors. The walk therefore starts at
//! the candidate and follows parent pointers up to a root.

use crate::error::{AuthzError, Result};
use crate::store::RoleTreeSource;
use crate::types::RoleId;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one step of an [`AncestorWalk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkStep {
    /// Look up the parent of this role and pass it to [`AncestorWalk::advance`]
    Visit(RoleId),
    /// The walk reached the role being re-parented
    Reached,
    /// The walk hit a root, or a node seen before if stored data already loops
    Exhausted,
}

/// Upward walk from a candidate parent towards the roots.
///
/// Every backend drives the same state machine and only supplies the parent
/// lookup, so the visited and target checks happen in one place.
pub(crate) struct AncestorWalk {
    role_id: RoleId,
    current: Option<RoleId>,
    visited: HashSet<RoleId>,
}

impl AncestorWalk {
    pub(crate) fn new(role_id: RoleId, candidate_parent_id: RoleId) -> Self {
        Self {
            role_id,
            current: Some(candidate_parent_id),
            visited: HashSet::new(),
        }
    }

    pub(crate) fn step(&mut self) -> WalkStep {
        match self.current {
            None => WalkStep::Exhausted,
            Some(id) if !self.visited.insert(id) => WalkStep::Exhausted,
            Some(id) if id == self.role_id => WalkStep::Reached,
            Some(id) => WalkStep::Visit(id),
        }
    }

    pub(crate) fn advance(&mut self, parent: Option<RoleId>) {
        self.current = parent;
    }

    pub(crate) fn steps(&self) -> usize {
        self.visited.len()
    }
}

/// Walk up from `candidate_parent_id` using `parent_of` and report whether
/// `role_id` is reached
pub(crate) fn ancestor_walk_reaches<F>(role_id: RoleId, candidate_parent_id: RoleId, mut parent_of: F) -> bool
where
    F: FnMut(RoleId) -> Option<RoleId>,
{
    let mut walk = AncestorWalk::new(role_id, candidate_parent_id);
    loop {
        match walk.step() {
            WalkStep::Visit(id) => walk.advance(parent_of(id)),
            WalkStep::Reached => return true,
            WalkStep::Exhausted => return false,
        }
    }
}

/// Checks a proposed parent pointer against the stored role tree.
///
/// The check only reads. Callers that write afterwards must serialize the
/// check and the write themselves (a transaction or lock), otherwise two
/// concurrent writers can each pass the check and still close a loop.
pub struct CycleGuard {
    source: Arc<dyn RoleTreeSource>,
}

impl CycleGuard {
    pub fn new(source: Arc<dyn RoleTreeSource>) -> Self {
        Self { source }
    }

    /// True if making `candidate_parent_id` the parent of `role_id` would
    /// create a cycle. Self-parenting is always a cycle.
    pub async fn would_create_cycle(&self, role_id: RoleId, candidate_parent_id: RoleId) -> Result<bool> {
        let mut walk = AncestorWalk::new(role_id, candidate_parent_id);

        loop {
            match walk.step() {
                WalkStep::Visit(id) => walk.advance(self.source.find_role_parent(id).await?),
                WalkStep::Reached => {
                    debug!(
                        "Parent {} for role {} rejected after {} step(s)",
                        candidate_parent_id,
                        role_id,
                        walk.steps()
                    );
                    return Ok(true);
                }
                WalkStep::Exhausted => return Ok(false),
            }
        }
    }

    /// Fail with `ValidationFailed` when the parent change would create a cycle
    pub async fn ensure_parent_allowed(&self, role_id: RoleId, candidate_parent_id: RoleId) -> Result<()> {
        if self.would_create_cycle(role_id, candidate_parent_id).await? {
            return Err(AuthzError::ValidationFailed(format!(
                "setting parent of role {} to {} would create a cycle",
                role_id, candidate_parent_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::UserId;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct ParentMap(HashMap<RoleId, RoleId>);

    #[async_trait]
    impl RoleTreeSource for ParentMap {
        async fn find_user_role_ids(&self, _user_id: UserId) -> Result<HashSet<RoleId>> {
            Ok(HashSet::new())
        }

        async fn find_roles_with_parent_in(&self, _parent_ids: &[RoleId]) -> Result<HashSet<RoleId>> {
            Ok(HashSet::new())
        }

        async fn find_role_parent(&self, role_id: RoleId) -> Result<Option<RoleId>> {
            Ok(self.0.get(&role_id).copied())
        }
    }

    /// A.parent = B, B.parent = C, C is a root
    fn chain() -> (CycleGuard, RoleId, RoleId, RoleId) {
        let (a, b, c) = (RoleId::new(), RoleId::new(), RoleId::new());
        let guard = CycleGuard::new(Arc::new(ParentMap(HashMap::from([(a, b), (b, c)]))));
        (guard, a, b, c)
    }

    #[tokio::test]
    async fn test_self_parent_is_cycle() {
        let (guard, a, b, c) = chain();
        for role in [a, b, c, RoleId::new()] {
            assert!(guard.would_create_cycle(role, role).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_chain_cases() {
        let (guard, a, b, c) = chain();
        assert!(guard.would_create_cycle(c, a).await.unwrap());
        assert!(guard.would_create_cycle(b, a).await.unwrap());
        assert!(!guard.would_create_cycle(a, c).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrelated_roots_allowed() {
        let (guard, ..) = chain();
        assert!(!guard.would_create_cycle(RoleId::new(), RoleId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_loop_terminates() {
        // x <-> y already loop in storage; z is unrelated
        let (x, y, z) = (RoleId::new(), RoleId::new(), RoleId::new());
        let guard = CycleGuard::new(Arc::new(ParentMap(HashMap::from([(x, y), (y, x)]))));
        assert!(!guard.would_create_cycle(z, x).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_parent_allowed_maps_to_validation() {
        let (guard, a, _, c) = chain();
        let err = guard.ensure_parent_allowed(c, a).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(guard.ensure_parent_allowed(a, c).await.is_ok());
    }

    #[test]
    fn test_sync_walk_deep_chain() {
        // A -> B -> C -> D -> E -> F (F root)
        let ids: Vec<RoleId> = (0..6).map(|_| RoleId::new()).collect();
        let parents: HashMap<RoleId, RoleId> = ids.windows(2).map(|w| (w[0], w[1])).collect();
        let lookup = |id: RoleId| parents.get(&id).copied();

        assert!(!ancestor_walk_reaches(ids[0], ids[5], lookup));
        assert!(ancestor_walk_reaches(ids[5], ids[0], lookup));
    }

    #[test]
    fn test_walk_steps() {
        // x -> y -> x already loops in storage
        let (x, y, z) = (RoleId::new(), RoleId::new(), RoleId::new());

        let mut walk = AncestorWalk::new(z, x);
        assert_eq!(walk.step(), WalkStep::Visit(x));
        walk.advance(Some(y));
        assert_eq!(walk.step(), WalkStep::Visit(y));
        walk.advance(Some(x));
        assert_eq!(walk.step(), WalkStep::Exhausted);
        assert_eq!(walk.steps(), 2);

        let mut walk = AncestorWalk::new(x, x);
        assert_eq!(walk.step(), WalkStep::Reached);

        let mut walk = AncestorWalk::new(x, y);
        assert_eq!(walk.step(), WalkStep::Visit(y));
        walk.advance(None);
        assert_eq!(walk.step(), WalkStep::Exhausted);
    }
}
