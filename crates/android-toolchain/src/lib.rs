//! Android Toolchain Integration
//!
//! Handles the native-library side of dependency ordering:
//! - Locating readelf (explicit, config, NDK, PATH)
//! - Reading `NEEDED` entries from shared objects
//! - Indexing the libraries a build produced
//! - Resolving a library closure concurrently into a cache

pub mod detector;
pub mod ndk;
pub mod readelf;
pub mod libraries;

use std::path::PathBuf;

pub use detector::{ReadelfInfo, ReadelfSource, ToolchainDetector};
pub use ndk::NdkManager;
pub use readelf::{parse_needed, Readelf};
pub use libraries::{DepsCache, LibraryIndex, NativeDepsResolver};

/// Toolchain errors
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("readelf not found: {0}")]
    ReadelfNotFound(String),
    #[error("NDK not found at {0:?}")]
    NdkNotFound(PathBuf),
    #[error("Invalid NDK: {0}")]
    InvalidNdk(String),
    #[error("readelf failed on {path:?}: {stderr}")]
    ReadelfFailed { path: PathBuf, stderr: String },
    #[error("readelf timed out after {secs}s on {path:?}")]
    Timeout { path: PathBuf, secs: u64 },
    #[error("Libraries directory not found: {0:?}")]
    LibrariesDirNotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
