//! Application Configuration
//!
//! Settings shared by every linkorder command:
//! - Cycle handling for the orderer
//! - Where readelf and the NDK live
//! - Parallelism, timeouts and retries for tool invocations

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{LinkOrderError, Result};

/// Ordering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    /// Fail on dependency cycles instead of dropping the back-edge
    pub strict_cycles: bool,
    /// Log a warning for every cycle broken in lenient mode
    pub report_cycles: bool,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            strict_cycles: false,
            report_cycles: true,
        }
    }
}

/// Toolchain configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Explicit readelf binary
    pub readelf_path: Option<PathBuf>,
    /// Android NDK root, searched for llvm-readelf
    pub ndk_path: Option<PathBuf>,
    /// NDK prebuilt host tag override (e.g. "linux-x86_64")
    pub host_tag: Option<String>,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs
    pub parallel_jobs: u32,
    /// Seconds before a single readelf call is abandoned
    pub readelf_timeout_secs: u64,
    /// Extra attempts for a readelf call that timed out or failed to spawn
    pub readelf_retries: u32,
    /// Keep running independent tasks after one fails
    pub keep_going: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallel_jobs: num_cpus::get() as u32,
            readelf_timeout_secs: 30,
            readelf_retries: 2,
            keep_going: false,
        }
    }
}

impl BuildConfig {
    pub fn readelf_timeout(&self) -> Duration {
        Duration::from_secs(self.readelf_timeout_secs)
    }

    /// Job count, never zero
    pub fn jobs(&self) -> usize {
        self.parallel_jobs.max(1) as usize
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration version for migrations
    pub version: u32,
    pub ordering: OrderingConfig,
    pub toolchain: ToolchainConfig,
    pub build: BuildConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            ordering: OrderingConfig::default(),
            toolchain: ToolchainConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "linkorder", "linkorder")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the default location.
    ///
    /// A missing file yields defaults; nothing is written.
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| LinkOrderError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            Self::load_from(&config_file).await
        } else {
            info!("Config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from an explicit file
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| LinkOrderError::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file).await
    }

    /// Save configuration to an explicit file
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }
}

/// Input file formats understood by the loaders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(FileFormat::Json),
            Some("toml") => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

/// Parse `contents` as the given format
pub fn parse_structured<T: DeserializeOwned>(contents: &str, format: FileFormat) -> Result<T> {
    match format {
        FileFormat::Json => Ok(serde_json::from_str(contents)?),
        FileFormat::Toml => Ok(toml::from_str(contents)?),
    }
}

/// Read a JSON or TOML file, chosen by extension
pub async fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = FileFormat::from_path(path)
        .ok_or_else(|| LinkOrderError::UnsupportedFormat(path.to_path_buf()))?;

    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LinkOrderError::NotFound(path.display().to_string())
        } else {
            LinkOrderError::Io(e)
        }
    })?;

    parse_structured(&contents, format)
}
