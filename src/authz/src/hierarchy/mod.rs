//! Role hierarchy
//!
//! Roles form a forest through single parent pointers. A parent role inherits
//! everything granted to its descendants, so authorization reads walk the tree
//! downward ([`HierarchyResolver`]) while administrative writes walk it upward
//! to keep it acyclic ([`CycleGuard`]).
//!
//! Both walks are iterative and carry a visited set, so corrupt stored data
//! containing a loop bounds the walk instead of hanging it.

pub mod cycle;
pub mod resolver;

pub use cycle::CycleGuard;
pub use resolver::HierarchyResolver;
