//! Classpath ordering
//!
//! Orders jars from the dependency edges the build graph declares, so a
//! target's jar is always preceded by the jars it depends on.

use std::path::{Path, PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use linkorder_core::load_structured;
use linkorder_graph::{CyclePolicy, DependencyGraph, DependencyMap, DependencyOrderer, Node};

use crate::BuildError;

/// One build target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Jar produced by the target, if any
    #[serde(default)]
    pub jar: Option<PathBuf>,
    /// Direct dependencies, in declaration order
    #[serde(default)]
    pub deps: Vec<Node>,
}

/// Declared build graph: target name to target info
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildGraph {
    targets: IndexMap<Node, TargetInfo>,
}

impl BuildGraph {
    /// Load a build graph from a JSON or TOML file
    pub async fn load(path: &Path) -> Result<Self, BuildError> {
        let graph: BuildGraph = load_structured(path).await?;
        debug!("Loaded {} targets from {:?}", graph.targets.len(), path);
        Ok(graph)
    }

    pub fn insert(&mut self, name: impl Into<Node>, info: TargetInfo) {
        self.targets.insert(name.into(), info);
    }

    pub fn target(&self, name: &Node) -> Option<&TargetInfo> {
        self.targets.get(name)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The edges alone, as an explicit graph
    pub fn dependency_graph(&self) -> DependencyGraph<Node> {
        self.targets
            .iter()
            .map(|(name, info)| (name.clone(), info.deps.clone()))
            .collect()
    }

    /// Every target reachable from `targets`, dependencies first
    pub fn ordered_targets(&self, targets: &[Node], policy: CyclePolicy) -> Result<Vec<Node>, BuildError> {
        let ordered = DependencyOrderer::new()
            .with_cycle_policy(policy)
            .order(targets.iter().cloned(), self)?;
        Ok(ordered)
    }

    /// Jar paths for everything reachable from `targets`, in load order.
    ///
    /// Targets without a jar (groups, resources) are skipped.
    pub fn classpath(&self, targets: &[Node], policy: CyclePolicy) -> Result<Vec<PathBuf>, BuildError> {
        let mut classpath = Vec::new();
        for name in self.ordered_targets(targets, policy)? {
            match self.targets.get(&name) {
                Some(TargetInfo { jar: Some(jar), .. }) => {
                    if !classpath.contains(jar) {
                        classpath.push(jar.clone());
                    }
                }
                Some(_) => debug!("{} has no jar", name),
                None => warn!("{} is not declared in the build graph", name),
            }
        }
        Ok(classpath)
    }
}

impl DependencyMap<Node> for BuildGraph {
    fn deps(&self, node: &Node) -> Vec<Node> {
        self.targets
            .get(node)
            .map(|info| info.deps.clone())
            .unwrap_or_default()
    }
}
