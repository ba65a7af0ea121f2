//! NDK Manager
//!
//! Finds the binary inspection tools shipped inside an Android NDK.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ToolchainError;

/// Android NDK installation
#[derive(Debug, Clone)]
pub struct NdkManager {
    ndk_path: PathBuf,
    version: String,
    host_tag: String,
}

impl NdkManager {
    /// Open an NDK installation rooted at `path`
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ToolchainError> {
        let path = path.into();
        if !path.exists() {
            return Err(ToolchainError::NdkNotFound(path));
        }

        let version = Self::read_version(&path)?;
        debug!("NDK {} at {:?}", version, path);

        Ok(Self {
            ndk_path: path,
            version,
            host_tag: Self::detect_host_tag(),
        })
    }

    /// Override the prebuilt host tag
    pub fn with_host_tag(mut self, host_tag: impl Into<String>) -> Self {
        self.host_tag = host_tag.into();
        self
    }

    /// Read `Pkg.Revision` from source.properties
    fn read_version(path: &Path) -> Result<String, ToolchainError> {
        let source_props = path.join("source.properties");

        if !source_props.exists() {
            return Err(ToolchainError::InvalidNdk(format!(
                "source.properties not found in {:?}",
                path
            )));
        }

        let content = std::fs::read_to_string(&source_props)?;
        let version = content
            .lines()
            .filter(|line| line.starts_with("Pkg.Revision"))
            .find_map(|line| line.split('=').nth(1))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(version)
    }

    /// Detect the host platform tag
    fn detect_host_tag() -> String {
        if cfg!(windows) {
            "windows-x86_64".to_string()
        } else if cfg!(target_os = "macos") {
            "darwin-x86_64".to_string()
        } else {
            "linux-x86_64".to_string()
        }
    }

    pub fn path(&self) -> &Path {
        &self.ndk_path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn host_tag(&self) -> &str {
        &self.host_tag
    }

    /// LLVM prebuilt bin directory for this host
    pub fn llvm_bin_dir(&self) -> PathBuf {
        self.ndk_path
            .join("toolchains")
            .join("llvm")
            .join("prebuilt")
            .join(&self.host_tag)
            .join("bin")
    }

    /// Path to llvm-readelf, if the NDK ships one for this host
    pub fn readelf(&self) -> Result<PathBuf, ToolchainError> {
        let exe_suffix = if cfg!(windows) { ".exe" } else { "" };
        let readelf = self.llvm_bin_dir().join(format!("llvm-readelf{}", exe_suffix));

        if readelf.exists() {
            Ok(readelf)
        } else {
            Err(ToolchainError::ReadelfNotFound(format!(
                "no llvm-readelf for host {} in NDK {:?}",
                self.host_tag, self.ndk_path
            )))
        }
    }
}
