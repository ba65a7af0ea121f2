//! Toolchain Detection
//!
//! Locates a readelf binary able to dump the dynamic section of the
//! libraries being ordered.

use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, debug};
use which::which;

use linkorder_core::config::ToolchainConfig;

use crate::ndk::NdkManager;
use crate::ToolchainError;

/// Environment variables that may point at an NDK
const NDK_ENV_VARS: &[&str] = &["ANDROID_NDK_HOME", "ANDROID_NDK_ROOT", "NDK_HOME"];

/// Readelf binaries looked up on `PATH`, in preference order
const PATH_CANDIDATES: &[&str] = &["llvm-readelf", "readelf"];

/// Where a readelf binary was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadelfSource {
    /// Passed on the command line
    Explicit,
    /// `toolchain.readelf_path` in the config file
    Config,
    /// Shipped inside an NDK
    Ndk { version: String },
    /// Found on `PATH`
    Path,
}

/// A located readelf binary
#[derive(Debug, Clone)]
pub struct ReadelfInfo {
    pub path: PathBuf,
    pub source: ReadelfSource,
}

/// Toolchain detector
pub struct ToolchainDetector {
    config: ToolchainConfig,
}

impl ToolchainDetector {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    /// Find readelf.
    ///
    /// Search order: `explicit`, the config file, the NDK (`ndk` argument,
    /// config, then environment), and finally `PATH`.
    pub fn locate_readelf(
        &self,
        explicit: Option<&Path>,
        ndk: Option<&Path>,
    ) -> Result<ReadelfInfo, ToolchainError> {
        if let Some(path) = explicit {
            return Self::existing(path, ReadelfSource::Explicit);
        }

        if let Some(ref path) = self.config.readelf_path {
            return Self::existing(path, ReadelfSource::Config);
        }

        if let Some(ndk_root) = self.ndk_root(ndk) {
            debug!("Looking for llvm-readelf in NDK {:?}", ndk_root);
            let mut manager = NdkManager::from_path(ndk_root)?;
            if let Some(ref host_tag) = self.config.host_tag {
                manager = manager.with_host_tag(host_tag.clone());
            }
            let path = manager.readelf()?;
            info!("Using NDK {} readelf: {:?}", manager.version(), path);
            return Ok(ReadelfInfo {
                path,
                source: ReadelfSource::Ndk {
                    version: manager.version().to_string(),
                },
            });
        }

        for candidate in PATH_CANDIDATES {
            if let Ok(path) = which(candidate) {
                info!("Using {} from PATH: {:?}", candidate, path);
                return Ok(ReadelfInfo {
                    path,
                    source: ReadelfSource::Path,
                });
            }
        }

        Err(ToolchainError::ReadelfNotFound(
            "pass --readelf, set toolchain.readelf_path, or point ANDROID_NDK_HOME at an NDK".into(),
        ))
    }

    fn ndk_root(&self, ndk: Option<&Path>) -> Option<PathBuf> {
        ndk.map(Path::to_path_buf)
            .or_else(|| self.config.ndk_path.clone())
            .or_else(|| {
                NDK_ENV_VARS
                    .iter()
                    .filter_map(|var| env::var_os(var))
                    .map(PathBuf::from)
                    .find(|path| path.exists())
            })
    }

    fn existing(path: &Path, source: ReadelfSource) -> Result<ReadelfInfo, ToolchainError> {
        if path.exists() {
            Ok(ReadelfInfo {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Err(ToolchainError::ReadelfNotFound(format!("{:?} does not exist", path)))
        }
    }
}

impl Default for ToolchainDetector {
    fn default() -> Self {
        Self::new(ToolchainConfig::default())
    }
}
