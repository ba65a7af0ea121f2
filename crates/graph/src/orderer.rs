//! Dependency Orderer
//!
//! Computes the transitive closure of a set of top-level nodes and emits it
//! dependencies-first. This is the order a linker wants its libraries in,
//! the order a classloader wants its jars in, and the order a scheduler
//! wants to start its tasks in.
//!
//! The traversal is a depth-first post-order walk driven by an explicit
//! frame stack, so arbitrarily deep dependency chains cannot overflow the
//! call stack. Ties are broken by first discovery: top-level nodes are
//! visited in the order given, and each node's dependencies in the order
//! the [`DependencyMap`] returns them.

use std::collections::HashSet;
use std::hash::Hash;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::deps::DependencyMap;

/// What to do when the traversal walks back into a node it is still
/// expanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Drop the back-edge and carry on. Never fails, but nodes on a cycle
    /// may end up ahead of something they depend on.
    #[default]
    Lenient,
    /// Stop at the first back-edge and report the cycle.
    Error,
}

impl CyclePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePolicy::Lenient => "lenient",
            CyclePolicy::Error => "error",
        }
    }
}

/// Ordering errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError<N> {
    /// `path` starts and ends with the node that was re-entered.
    #[error("dependency cycle: {path:?}")]
    Cycle { path: Vec<N> },
}

/// One node being expanded: its dependency list and how far we got
struct Frame<N> {
    node: N,
    deps: Vec<N>,
    next: usize,
}

/// Dependency-first orderer
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyOrderer {
    cycle_policy: CyclePolicy,
}

impl DependencyOrderer {
    /// Create an orderer with the lenient cycle policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cycle policy
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        self.cycle_policy
    }

    /// Order every node reachable from `top_level`, dependencies first.
    ///
    /// Each reachable node appears exactly once. With
    /// [`CyclePolicy::Lenient`] this never returns an error.
    pub fn order<N, I, D>(&self, top_level: I, deps: &D) -> Result<Vec<N>, OrderError<N>>
    where
        N: Eq + Hash + Clone,
        I: IntoIterator<Item = N>,
        D: DependencyMap<N> + ?Sized,
    {
        self.walk(self.cycle_policy, top_level, deps, None)
    }

    /// Lenient ordering that also returns the path of every back-edge it
    /// dropped, each closed on the re-entered node. For callers that want
    /// to surface cycles as warnings without failing.
    pub fn order_with_cycles<N, I, D>(&self, top_level: I, deps: &D) -> (Vec<N>, Vec<Vec<N>>)
    where
        N: Eq + Hash + Clone,
        I: IntoIterator<Item = N>,
        D: DependencyMap<N> + ?Sized,
    {
        let mut cycles = Vec::new();
        let ordered = match self.walk(CyclePolicy::Lenient, top_level, deps, Some(&mut cycles)) {
            Ok(ordered) => ordered,
            // Lenient walks have no error path.
            Err(OrderError::Cycle { .. }) => Vec::new(),
        };
        (ordered, cycles)
    }

    fn walk<N, I, D>(
        &self,
        policy: CyclePolicy,
        top_level: I,
        deps: &D,
        mut cycles: Option<&mut Vec<Vec<N>>>,
    ) -> Result<Vec<N>, OrderError<N>>
    where
        N: Eq + Hash + Clone,
        I: IntoIterator<Item = N>,
        D: DependencyMap<N> + ?Sized,
    {
        let mut visited: HashSet<N> = HashSet::new();
        let mut in_progress: HashSet<N> = HashSet::new();
        let mut output: Vec<N> = Vec::new();
        let mut stack: Vec<Frame<N>> = Vec::new();
        let mut dropped_edges = 0usize;

        for root in top_level {
            if visited.contains(&root) {
                continue;
            }

            in_progress.insert(root.clone());
            let root_deps = deps.deps(&root);
            stack.push(Frame { node: root, deps: root_deps, next: 0 });

            while let Some(frame) = stack.last_mut() {
                if frame.next < frame.deps.len() {
                    let dep = frame.deps[frame.next].clone();
                    frame.next += 1;

                    if visited.contains(&dep) {
                        continue;
                    }

                    if in_progress.contains(&dep) {
                        match policy {
                            CyclePolicy::Lenient => {
                                trace!(depth = stack.len(), "dropping back-edge");
                                dropped_edges += 1;
                                if let Some(cycles) = cycles.as_deref_mut() {
                                    let path = cycle_path(&stack, dep);
                                    if !cycles.contains(&path) {
                                        cycles.push(path);
                                    }
                                }
                                continue;
                            }
                            CyclePolicy::Error => {
                                return Err(OrderError::Cycle {
                                    path: cycle_path(&stack, dep),
                                });
                            }
                        }
                    }

                    in_progress.insert(dep.clone());
                    let dep_deps = deps.deps(&dep);
                    stack.push(Frame { node: dep, deps: dep_deps, next: 0 });
                } else if let Some(done) = stack.pop() {
                    in_progress.remove(&done.node);
                    visited.insert(done.node.clone());
                    output.push(done.node);
                }
            }
        }

        if dropped_edges > 0 {
            debug!(dropped_edges, policy = policy.as_str(), "cycles broken while ordering");
        }
        debug!(nodes = output.len(), policy = policy.as_str(), "dependency order computed");

        Ok(output)
    }
}

/// Stack slice from the re-entered node up to the top, closed back on
/// itself
fn cycle_path<N: Eq + Clone>(stack: &[Frame<N>], reentered: N) -> Vec<N> {
    let start = stack
        .iter()
        .position(|frame| frame.node == reentered)
        .unwrap_or(0);
    let mut path: Vec<N> = stack[start..].iter().map(|frame| frame.node.clone()).collect();
    path.push(reentered);
    path
}

/// Lenient ordering of everything reachable from `top_level`
pub fn sorted_transitive_dependencies<N, I, D>(top_level: I, deps: &D) -> Vec<N>
where
    N: Eq + Hash + Clone,
    I: IntoIterator<Item = N>,
    D: DependencyMap<N> + ?Sized,
{
    match DependencyOrderer::new().order(top_level, deps) {
        Ok(ordered) => ordered,
        // Lenient ordering has no error path.
        Err(OrderError::Cycle { .. }) => Vec::new(),
    }
}

/// Strict ordering: fails on the first cycle
pub fn try_sorted_transitive_dependencies<N, I, D>(
    top_level: I,
    deps: &D,
) -> Result<Vec<N>, OrderError<N>>
where
    N: Eq + Hash + Clone,
    I: IntoIterator<Item = N>,
    D: DependencyMap<N> + ?Sized,
{
    DependencyOrderer::new()
        .with_cycle_policy(CyclePolicy::Error)
        .order(top_level, deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::{from_fn, DependencyGraph};
    use crate::node::{nodes, Node};

    fn sample_graph() -> DependencyGraph<Node> {
        [
            ("a", vec![]),
            ("b", vec![]),
            ("c", vec!["a"]),
            ("d", vec!["a"]),
            ("e", vec!["f"]),
            ("f", vec!["a", "d"]),
            ("g", vec![]),
            ("h", vec!["d", "b", "f"]),
            ("i", vec!["f"]),
        ]
        .into_iter()
        .map(|(node, deps)| (Node::from(node), nodes(deps)))
        .collect()
    }

    fn position(ordered: &[Node], name: &str) -> usize {
        ordered
            .iter()
            .position(|n| n.as_str() == name)
            .unwrap_or_else(|| panic!("{} missing from {:?}", name, ordered))
    }

    fn assert_dependencies_first(ordered: &[Node], graph: &DependencyGraph<Node>) {
        for node in ordered {
            for dep in graph.dependencies(node) {
                assert!(
                    position(ordered, dep.as_str()) < position(ordered, node.as_str()),
                    "{} should come before {} in {:?}",
                    dep,
                    node,
                    ordered
                );
            }
        }
    }

    #[test]
    fn test_all_nodes_in_given_order() {
        let graph = sample_graph();
        let ordered = sorted_transitive_dependencies(nodes(["a", "b", "c", "d", "e", "f", "g", "h", "i"]), &graph);
        assert_eq!(ordered, nodes(["a", "b", "c", "d", "f", "e", "g", "h", "i"]));
    }

    #[test]
    fn test_subset_of_roots_pulls_in_dependencies() {
        let graph = sample_graph();
        let ordered = sorted_transitive_dependencies(nodes(["c", "e", "g", "h", "i"]), &graph);
        assert_eq!(ordered, nodes(["a", "c", "d", "f", "e", "g", "b", "h", "i"]));
    }

    #[test]
    fn test_reversed_roots() {
        let graph = sample_graph();
        let ordered = sorted_transitive_dependencies(nodes(["i", "h", "g", "e", "c"]), &graph);
        assert_eq!(ordered, nodes(["a", "d", "f", "i", "b", "h", "g", "e", "c"]));
    }

    #[test]
    fn test_two_node_cycle_lenient() {
        let graph: DependencyGraph<Node> =
            [(Node::from("x"), nodes(["y"])), (Node::from("y"), nodes(["x"]))].into_iter().collect();

        let ordered = sorted_transitive_dependencies(nodes(["x"]), &graph);
        assert_eq!(ordered, nodes(["y", "x"]));
    }

    #[test]
    fn test_two_node_cycle_strict() {
        let graph: DependencyGraph<Node> =
            [(Node::from("x"), nodes(["y"])), (Node::from("y"), nodes(["x"]))].into_iter().collect();

        let err = try_sorted_transitive_dependencies(nodes(["x"]), &graph).unwrap_err();
        assert_eq!(err, OrderError::Cycle { path: nodes(["x", "y", "x"]) });
        assert_eq!(err.to_string(), r#"dependency cycle: ["x", "y", "x"]"#);
    }

    #[test]
    fn test_self_cycle_emitted_once() {
        let deps = from_fn(|n: &&str| vec![*n]);
        assert_eq!(sorted_transitive_dependencies(["n"], &deps), vec!["n"]);

        let strict = DependencyOrderer::new().with_cycle_policy(CyclePolicy::Error);
        assert_eq!(
            strict.order(["n"], &deps),
            Err(OrderError::Cycle { path: vec!["n", "n"] })
        );
    }

    #[test]
    fn test_three_node_cycle_lenient_order() {
        // a -> b -> c -> a: the c -> a edge is dropped, so c lands before a
        // even though it depends on it.
        let deps = from_fn(|n: &char| match n {
            'a' => vec!['b'],
            'b' => vec!['c'],
            'c' => vec!['a'],
            _ => vec![],
        });
        assert_eq!(sorted_transitive_dependencies(['a'], &deps), vec!['c', 'b', 'a']);
        assert_eq!(sorted_transitive_dependencies(['b'], &deps), vec!['a', 'c', 'b']);
    }

    #[test]
    fn test_order_with_cycles_reports_paths() {
        let deps = from_fn(|n: &char| match n {
            'a' => vec!['b', 'd'],
            'b' => vec!['c'],
            'c' => vec!['b'],
            _ => vec![],
        });
        let (ordered, cycles) = DependencyOrderer::new().order_with_cycles(['a', 'd'], &deps);

        assert_eq!(ordered, vec!['c', 'b', 'd', 'a']);
        assert_eq!(cycles, vec![vec!['b', 'c', 'b']]);
    }

    #[test]
    fn test_order_with_cycles_reports_every_cycle_under_one_root() {
        let deps = from_fn(|n: &char| match n {
            'a' => vec!['b', 'd'],
            'b' => vec!['c'],
            'c' => vec!['b'],
            'd' => vec!['e'],
            'e' => vec!['d'],
            _ => vec![],
        });
        let (ordered, cycles) = DependencyOrderer::new().order_with_cycles(['a'], &deps);

        assert_eq!(ordered, vec!['c', 'b', 'e', 'd', 'a']);
        assert_eq!(cycles, vec![vec!['b', 'c', 'b'], vec!['d', 'e', 'd']]);
    }

    #[test]
    fn test_order_with_cycles_walks_the_graph_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        const ROOTS: u32 = 500;
        let calls = AtomicUsize::new(0);
        let deps = from_fn(|n: &u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            if *n > 0 { vec![n - 1] } else { vec![] }
        });

        let roots: Vec<u32> = (0..ROOTS).rev().collect();
        let (ordered, cycles) = DependencyOrderer::new().order_with_cycles(roots, &deps);

        assert_eq!(ordered.len(), ROOTS as usize);
        assert!(cycles.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), ROOTS as usize);
    }

    #[test]
    fn test_order_with_cycles_ignores_strict_policy() {
        let deps = from_fn(|n: &char| if *n == 'x' { vec!['y'] } else { vec!['x'] });
        let strict = DependencyOrderer::new().with_cycle_policy(CyclePolicy::Error);

        assert_eq!(strict.order_with_cycles(['x'], &deps), (vec!['y', 'x'], vec![vec!['x', 'y', 'x']]));
        assert_eq!(CyclePolicy::Error.as_str(), "error");
    }

    #[test]
    fn test_every_reachable_node_exactly_once() {
        let graph = sample_graph();
        let ordered = sorted_transitive_dependencies(nodes(["h", "e"]), &graph);

        let mut seen = HashSet::new();
        for node in &ordered {
            assert!(seen.insert(node.clone()), "{} emitted twice", node);
        }
        let expected: HashSet<Node> = nodes(["a", "b", "d", "e", "f", "h"]).into_iter().collect();
        assert_eq!(seen, expected);
        assert_dependencies_first(&ordered, &graph);
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let graph = sample_graph();
        for roots in [
            nodes(["a", "b", "c", "d", "e", "f", "g", "h", "i"]),
            nodes(["i", "h", "g", "e", "c"]),
            nodes(["h"]),
        ] {
            let ordered = sorted_transitive_dependencies(roots, &graph);
            assert_dependencies_first(&ordered, &graph);
        }
    }

    #[test]
    fn test_deterministic() {
        let graph = sample_graph();
        let roots = nodes(["e", "c", "h"]);
        let first = sorted_transitive_dependencies(roots.clone(), &graph);
        let second = sorted_transitive_dependencies(roots, &graph);
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_roots_change_nothing() {
        let graph = sample_graph();
        let roots = nodes(["c", "e", "g", "h", "i"]);
        let doubled: Vec<Node> = roots.iter().chain(roots.iter()).cloned().collect();

        assert_eq!(
            sorted_transitive_dependencies(roots, &graph),
            sorted_transitive_dependencies(doubled, &graph)
        );
    }

    #[test]
    fn test_empty_inputs() {
        let graph = sample_graph();
        let ordered: Vec<Node> = sorted_transitive_dependencies(Vec::new(), &graph);
        assert!(ordered.is_empty());

        let no_deps = from_fn(|_: &&str| Vec::new());
        assert_eq!(
            sorted_transitive_dependencies(["q", "p", "q", "r"], &no_deps),
            vec!["q", "p", "r"]
        );
    }

    #[test]
    fn test_unknown_roots_are_leaves() {
        let graph = sample_graph();
        let ordered = sorted_transitive_dependencies(nodes(["zz", "c"]), &graph);
        assert_eq!(ordered, nodes(["zz", "a", "c"]));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        const DEPTH: u32 = 200_000;
        let deps = from_fn(|n: &u32| if *n < DEPTH { vec![n + 1] } else { vec![] });

        let ordered = sorted_transitive_dependencies([0u32], &deps);
        assert_eq!(ordered.len(), DEPTH as usize + 1);
        assert_eq!(ordered.first(), Some(&DEPTH));
        assert_eq!(ordered.last(), Some(&0));
    }

    #[test]
    fn test_cycle_policy_serde() {
        assert_eq!(serde_json::to_string(&CyclePolicy::Error).unwrap(), "\"error\"");
        let policy: CyclePolicy = serde_json::from_str("\"lenient\"").unwrap();
        assert_eq!(policy, CyclePolicy::Lenient);
        assert_eq!(DependencyOrderer::new().cycle_policy(), CyclePolicy::Lenient);
    }
}
