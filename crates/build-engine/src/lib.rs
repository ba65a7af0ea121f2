//! Build Engine
//!
//! Dependency-ordered build steps built on the orderer: writing ordered
//! native library manifests, ordering classpaths, and running tasks in
//! dependency order.

pub mod config;
pub mod manifest;
pub mod classpath;
pub mod scheduler;
pub mod runner;

pub use config::{parse_gn_list, LibrariesConfig};
pub use manifest::{java_library_name, write_depfile, write_json_if_changed, LibrariesManifest};
pub use classpath::{BuildGraph, TargetInfo};
pub use scheduler::{ScheduleProgress, ScheduleSummary, Scheduler, TaskFile, TaskSpec};
pub use runner::{LibrariesOutput, LibraryOrderRunner, RunnerProgress, TaskRunner};

use linkorder_android_toolchain::ToolchainError;
use linkorder_core::LinkOrderError;
use linkorder_graph::{Node, OrderError};

/// Build errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Build failed: {0}")]
    BuildFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid GN list: {0}")]
    GnList(String),
    #[error("Dependency cycle: {0}")]
    Cycle(String),
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),
    #[error(transparent)]
    Core(#[from] LinkOrderError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<OrderError<Node>> for BuildError {
    fn from(err: OrderError<Node>) -> Self {
        match err {
            OrderError::Cycle { path } => BuildError::Cycle(format_path(&path)),
        }
    }
}

/// `a -> b -> a`
pub fn format_path(path: &[Node]) -> String {
    path.iter()
        .map(Node::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
