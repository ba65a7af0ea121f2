//! Dependency Graph Ordering
//!
//! Turns "these are my roots, and this is how to find a node's direct
//! dependencies" into a single list where every node follows everything it
//! depends on. Link order, jar merge order and task start order all come
//! out of the same traversal.

pub mod node;
pub mod deps;
pub mod orderer;

pub use node::{nodes, Node};
pub use deps::{from_fn, DependencyGraph, DependencyMap, FnDeps, Memoized};
pub use orderer::{
    sorted_transitive_dependencies, try_sorted_transitive_dependencies, CyclePolicy,
    DependencyOrderer, OrderError,
};
