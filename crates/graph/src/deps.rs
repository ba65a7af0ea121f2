//! Dependency maps
//!
//! A dependency map answers one question: what does this node depend on
//! directly, and in which order. Nodes the map has never heard of are
//! leaves.

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Source of direct dependencies for the orderer
pub trait DependencyMap<N> {
    /// Direct dependencies of `node`, in caller-significant order.
    ///
    /// Unknown nodes must yield an empty list.
    fn deps(&self, node: &N) -> Vec<N>;
}

impl<N, D> DependencyMap<N> for &D
where
    D: DependencyMap<N> + ?Sized,
{
    fn deps(&self, node: &N) -> Vec<N> {
        (**self).deps(node)
    }
}

impl<N, S> DependencyMap<N> for HashMap<N, Vec<N>, S>
where
    N: Eq + Hash + Clone,
    S: BuildHasher,
{
    fn deps(&self, node: &N) -> Vec<N> {
        self.get(node).cloned().unwrap_or_default()
    }
}

impl<N, S> DependencyMap<N> for IndexMap<N, Vec<N>, S>
where
    N: Eq + Hash + Clone,
    S: BuildHasher,
{
    fn deps(&self, node: &N) -> Vec<N> {
        self.get(node).cloned().unwrap_or_default()
    }
}

/// Adapter turning a closure into a dependency map
pub struct FnDeps<F>(F);

/// Wrap a closure as a dependency map
pub fn from_fn<N, F>(f: F) -> FnDeps<F>
where
    F: Fn(&N) -> Vec<N>,
{
    FnDeps(f)
}

impl<N, F> DependencyMap<N> for FnDeps<F>
where
    F: Fn(&N) -> Vec<N>,
{
    fn deps(&self, node: &N) -> Vec<N> {
        (self.0)(node)
    }
}

/// Caching wrapper for expensive dependency sources.
///
/// The cache belongs to whoever owns the wrapper; dropping it drops the
/// cache.
pub struct Memoized<N, D> {
    inner: D,
    cache: Mutex<HashMap<N, Vec<N>>>,
}

impl<N, D> Memoized<N, D>
where
    N: Eq + Hash + Clone,
    D: DependencyMap<N>,
{
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of nodes answered so far
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Forget every cached answer
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<N, D> DependencyMap<N> for Memoized<N, D>
where
    N: Eq + Hash + Clone,
    D: DependencyMap<N>,
{
    fn deps(&self, node: &N) -> Vec<N> {
        if let Some(hit) = self.cache.lock().get(node) {
            return hit.clone();
        }

        // The lock is released while the inner source runs.
        let deps = self.inner.deps(node);
        self.cache.lock().insert(node.clone(), deps.clone());
        deps
    }
}

/// Explicit adjacency map, insertion ordered.
///
/// Serializes as a plain object of `node -> [deps...]`. Deserializing goes
/// through the same path as [`FromIterator`], so repeated edges collapse
/// and dependency-only nodes become known nodes.
#[derive(Clone)]
pub struct DependencyGraph<N> {
    edges: IndexMap<N, Vec<N>>,
}

impl<N> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self {
            edges: IndexMap::new(),
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for DependencyGraph<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.edges.iter()).finish()
    }
}

impl<N> DependencyGraph<N>
where
    N: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node without dependencies (no-op if already known)
    pub fn add_node(&mut self, node: N) {
        self.edges.entry(node).or_default();
    }

    /// Add the edge `from -> to`; both ends become known nodes.
    ///
    /// Repeated edges are kept once, in first-insertion position.
    pub fn add_edge(&mut self, from: N, to: N) {
        self.add_node(to.clone());
        let deps = self.edges.entry(from).or_default();
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    /// Append several dependencies to `node` in order
    pub fn add_dependencies<I>(&mut self, node: N, deps: I)
    where
        I: IntoIterator<Item = N>,
    {
        self.add_node(node.clone());
        for dep in deps {
            self.add_edge(node.clone(), dep);
        }
    }

    /// Direct dependencies of a known node, empty for unknown ones
    pub fn dependencies(&self, node: &N) -> &[N] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, node: &N) -> bool {
        self.edges.contains_key(node)
    }

    /// Known nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &N> + '_ {
        self.edges.keys()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

impl<N> DependencyMap<N> for DependencyGraph<N>
where
    N: Eq + Hash + Clone,
{
    fn deps(&self, node: &N) -> Vec<N> {
        self.dependencies(node).to_vec()
    }
}

impl<N: Serialize> Serialize for DependencyGraph<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.edges.serialize(serializer)
    }
}

impl<'de, N> Deserialize<'de> for DependencyGraph<N>
where
    N: Deserialize<'de> + Eq + Hash + Clone,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let edges = IndexMap::<N, Vec<N>>::deserialize(deserializer)?;
        Ok(edges.into_iter().collect())
    }
}

impl<N> FromIterator<(N, Vec<N>)> for DependencyGraph<N>
where
    N: Eq + Hash + Clone,
{
    fn from_iter<I: IntoIterator<Item = (N, Vec<N>)>>(iter: I) -> Self {
        let mut graph = Self::new();
        for (node, deps) in iter {
            graph.add_dependencies(node, deps);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{nodes, Node};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unknown_node_is_leaf() {
        let graph: DependencyGraph<Node> = [(Node::from("a"), nodes(["b"]))].into_iter().collect();

        assert!(graph.deps(&Node::from("zzz")).is_empty());
        assert!(graph.deps(&Node::from("b")).is_empty());
        assert_eq!(graph.deps(&Node::from("a")), nodes(["b"]));
    }

    #[test]
    fn test_add_edge_keeps_first_position() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("h", "d");
        graph.add_edge("h", "b");
        graph.add_edge("h", "d");

        assert_eq!(graph.dependencies(&"h"), &["d", "b"]);
        assert_eq!(graph.nodes().copied().collect::<Vec<_>>(), vec!["d", "h", "b"]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_graph_from_json_and_toml() {
        let graph: DependencyGraph<Node> =
            serde_json::from_str(r#"{"c": ["a"], "a": [], "f": ["a", "d", "a"]}"#).unwrap();
        assert_eq!(graph.len(), 4);
        assert!(graph.contains(&Node::from("d")));
        assert_eq!(graph.deps(&Node::from("f")), nodes(["a", "d"]));
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.nodes().next(), Some(&Node::from("c")));

        let built: DependencyGraph<Node> = [
            (Node::from("c"), nodes(["a"])),
            (Node::from("a"), Vec::new()),
            (Node::from("f"), nodes(["a", "d", "a"])),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            graph.nodes().collect::<Vec<_>>(),
            built.nodes().collect::<Vec<_>>()
        );
        assert_eq!(serde_json::to_value(&graph).unwrap(), serde_json::to_value(&built).unwrap());

        let graph: DependencyGraph<Node> = toml::from_str("c = [\"a\"]\na = []\n").unwrap();
        assert_eq!(graph.deps(&Node::from("c")), nodes(["a"]));
    }

    #[test]
    fn test_hash_map_as_dependency_map() {
        let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
        map.insert("x", vec!["y"]);

        assert_eq!(map.deps(&"x"), vec!["y"]);
        assert!(map.deps(&"y").is_empty());
    }

    #[test]
    fn test_memoized_calls_inner_once_per_node() {
        let calls = AtomicUsize::new(0);
        let source = from_fn(|n: &u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            if *n < 3 { vec![n + 1] } else { vec![] }
        });
        let memo: Memoized<u32, _> = Memoized::new(source);

        assert_eq!(memo.deps(&1), vec![2]);
        assert_eq!(memo.deps(&1), vec![2]);
        assert_eq!(memo.deps(&3), Vec::<u32>::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(memo.cached_len(), 2);

        memo.clear();
        assert_eq!(memo.cached_len(), 0);
    }
}
