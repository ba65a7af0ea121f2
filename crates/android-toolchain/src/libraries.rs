//! Native library dependencies
//!
//! Maps library file names to their paths under the build's libraries
//! directories, and resolves each library's `NEEDED` list into a cache the
//! orderer can read from. Anything not found in the libraries directories
//! is a system library (libc, liblog, ...) and never shows up as a
//! dependency.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{info, debug, warn};

use linkorder_core::events::{Event, EventBus};
use linkorder_graph::{DependencyGraph, DependencyMap, Node};

use crate::readelf::Readelf;
use crate::ToolchainError;

/// File name to full path for every library the build produced
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    paths: IndexMap<String, PathBuf>,
}

impl LibraryIndex {
    /// Index every shared object in `dirs`; earlier directories win on
    /// name clashes
    pub fn scan<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, ToolchainError> {
        let mut index = Self::default();

        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                return Err(ToolchainError::LibrariesDirNotFound(dir.to_path_buf()));
            }

            let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_shared_object(p))
                .collect();
            entries.sort();

            for path in entries {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    index.paths.entry(name.to_string()).or_insert(path.clone());
                }
            }
        }

        debug!("Indexed {} libraries", index.paths.len());
        Ok(index)
    }

    /// Build an index from explicit paths
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut index = Self::default();
        for path in paths {
            let path: PathBuf = path.into();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                index.paths.entry(name.to_string()).or_insert(path.clone());
            }
        }
        index
    }

    /// Full path of a library produced by the build
    pub fn full_path(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    /// Anything the build did not produce
    pub fn is_system_library(&self, name: &str) -> bool {
        !self.paths.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.paths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn is_shared_object(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".so") || n.contains(".so."))
        .unwrap_or(false)
}

/// Resolved `NEEDED` lists, owned by the caller and shared with the
/// resolver
#[derive(Debug, Default)]
pub struct DepsCache {
    entries: RwLock<HashMap<Node, Vec<Node>>>,
}

impl DepsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &Node) -> Option<Vec<Node>> {
        self.entries.read().get(node).cloned()
    }

    pub fn insert(&self, node: Node, deps: Vec<Node>) {
        self.entries.write().insert(node, deps);
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.entries.read().contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy the cache into an explicit graph, listing `order` first
    pub fn to_graph<'a, I>(&self, order: I) -> DependencyGraph<Node>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let entries = self.entries.read();
        order
            .into_iter()
            .map(|node| (node.clone(), entries.get(node).cloned().unwrap_or_default()))
            .collect()
    }
}

impl DependencyMap<Node> for DepsCache {
    fn deps(&self, node: &Node) -> Vec<Node> {
        self.get(node).unwrap_or_default()
    }
}

/// Resolves `NEEDED` lists for a closure of libraries with bounded
/// parallelism
pub struct NativeDepsResolver {
    readelf: Readelf,
    index: LibraryIndex,
    cache: Arc<DepsCache>,
    jobs: usize,
    events: Option<Arc<EventBus>>,
}

impl NativeDepsResolver {
    pub fn new(readelf: Readelf, index: LibraryIndex, cache: Arc<DepsCache>) -> Self {
        Self {
            readelf,
            index,
            cache,
            jobs: 1,
            events: None,
        }
    }

    /// Maximum concurrent readelf processes
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Report progress on an event bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn index(&self) -> &LibraryIndex {
        &self.index
    }

    pub fn cache(&self) -> &Arc<DepsCache> {
        &self.cache
    }

    /// Fill the cache for every library reachable from `roots`.
    ///
    /// Libraries already cached are not inspected again. Roots the build
    /// did not produce are treated as leaves.
    pub async fn resolve(&self, roots: &[Node]) -> Result<usize, ToolchainError> {
        let mut frontier: Vec<Node> = Vec::new();
        for root in roots {
            if !self.cache.contains(root) && !frontier.contains(root) {
                frontier.push(root.clone());
            }
        }

        let mut inspected = 0usize;
        while !frontier.is_empty() {
            debug!("Resolving {} libraries", frontier.len());

            let results: Vec<(Node, Result<Vec<Node>, ToolchainError>)> = stream::iter(frontier)
                .map(|lib| async move {
                    let deps = self.lookup(&lib).await;
                    (lib, deps)
                })
                .buffer_unordered(self.jobs)
                .collect()
                .await;

            let mut next: Vec<Node> = Vec::new();
            for (lib, result) in results {
                let deps = match result {
                    Ok(deps) => deps,
                    Err(err) => {
                        self.emit(Event::DepsFailed {
                            node: lib.to_string(),
                            error: err.to_string(),
                        });
                        return Err(err);
                    }
                };

                for dep in &deps {
                    if !self.cache.contains(dep) && !next.contains(dep) {
                        next.push(dep.clone());
                    }
                }
                self.emit(Event::DepsResolved {
                    node: lib.to_string(),
                    count: deps.len(),
                });
                self.cache.insert(lib, deps);
                inspected += 1;
            }

            next.retain(|dep| !self.cache.contains(dep));
            frontier = next;
        }

        info!("Resolved dependencies for {} libraries", inspected);
        Ok(inspected)
    }

    /// Non-system `NEEDED` entries of one library
    async fn lookup(&self, lib: &Node) -> Result<Vec<Node>, ToolchainError> {
        let Some(path) = self.index.full_path(lib.as_str()) else {
            warn!("{} is not in the libraries directory, treating it as a leaf", lib);
            return Ok(Vec::new());
        };

        let needed = self.readelf.needed(path).await?;
        Ok(needed
            .into_iter()
            .filter(|name| !self.index.is_system_library(name))
            .map(Node::from)
            .collect())
    }

    fn emit(&self, event: Event) {
        if let Some(ref events) = self.events {
            events.emit(event);
        }
    }
}

impl DependencyMap<Node> for NativeDepsResolver {
    fn deps(&self, node: &Node) -> Vec<Node> {
        self.cache.deps(node)
    }
}
