//! readelf wrapper
//!
//! Runs `readelf -d` on a shared object and pulls the `NEEDED` entries out
//! of its dynamic section.

use std::path::{Path, PathBuf};
use std::time::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::ToolchainError;

/// ` 0x0000000000000001 (NEEDED)  Shared library: [libc++_shared.so]`
static NEEDED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"NEEDED.*Shared library: \[(?P<library_name>[^\]]+)\]")
        .expect("NEEDED pattern is valid")
});

/// Extract library names from `NEEDED` entries, in file order
pub fn parse_needed(dynamic_section: &str) -> Vec<String> {
    dynamic_section
        .lines()
        .filter_map(|line| NEEDED_RE.captures(line))
        .map(|caps| caps["library_name"].to_string())
        .collect()
}

/// Configured readelf binary
#[derive(Debug, Clone)]
pub struct Readelf {
    path: PathBuf,
    timeout: Duration,
    retries: u32,
}

impl Readelf {
    /// Create a wrapper around the binary at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Duration::from_secs(30),
            retries: 2,
        }
    }

    /// Give up on a single invocation after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra attempts after a spawn failure or timeout
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw `readelf -d` output for `library`.
    ///
    /// Spawn failures and timeouts are retried; a non-zero exit is not.
    pub async fn dynamic_section(&self, library: &Path) -> Result<String, ToolchainError> {
        let attempts = self.retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.run_once(library).await {
                Ok(output) => return Ok(output),
                Err(err @ ToolchainError::ReadelfFailed { .. }) => return Err(err),
                Err(err) => {
                    if attempt < attempts {
                        warn!(
                            "readelf attempt {}/{} on {:?} failed: {}",
                            attempt, attempts, library, err
                        );
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ToolchainError::Timeout {
            path: library.to_path_buf(),
            secs: self.timeout.as_secs(),
        }))
    }

    async fn run_once(&self, library: &Path) -> Result<String, ToolchainError> {
        debug!("Running: {:?} -d {:?}", self.path, library);

        let mut cmd = Command::new(&self.path);
        cmd.arg("-d").arg(library).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ToolchainError::Timeout {
                path: library.to_path_buf(),
                secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolchainError::ReadelfFailed {
                path: library.to_path_buf(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Library names `library` declares as `NEEDED`
    pub async fn needed(&self, library: &Path) -> Result<Vec<String>, ToolchainError> {
        let output = self.dynamic_section(library).await?;
        Ok(parse_needed(&output))
    }
}
