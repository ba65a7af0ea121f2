//! linkorder - dependency-ordered transitive closure
//!
//! Given root nodes and a way to find each node's direct dependencies,
//! produces every reachable node exactly once, each after everything it
//! depends on. Used for native library load order, jar classpaths and
//! task start order.
//!
//! ## Architecture
//!
//! - `linkorder-graph`: the orderer and dependency map abstractions
//! - `linkorder-core`: configuration, errors and the event bus
//! - `linkorder-android-toolchain`: readelf/NDK lookup and `NEEDED` resolution
//! - `linkorder-build-engine`: library manifests, classpaths and the task scheduler

#![warn(clippy::all)]

pub mod commands;

// Re-export main components for library usage
pub use linkorder_core as core;
pub use linkorder_graph as graph;
pub use linkorder_android_toolchain as toolchain;
pub use linkorder_build_engine as build;

pub use linkorder_core::{APP_NAME, VERSION};

/// Prelude module for convenient imports
pub mod prelude {
    pub use linkorder_core::config::AppConfig;
    pub use linkorder_graph::{
        sorted_transitive_dependencies, CyclePolicy, DependencyGraph, DependencyMap,
        DependencyOrderer, Node,
    };
    pub use linkorder_android_toolchain::{NativeDepsResolver, Readelf, ToolchainDetector};
    pub use linkorder_build_engine::{BuildGraph, LibraryOrderRunner, Scheduler, TaskRunner};
}
