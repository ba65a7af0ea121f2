//! Ordered library manifest
//!
//! Serializes an ordered library list for packaging and classloading steps,
//! plus the depfile Ninja uses to know when to rerun the step.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::BuildError;

/// Manifest consumed by downstream packaging steps.
///
/// Lists are written verbatim in load order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrariesManifest {
    pub libraries: Vec<String>,
    pub lib_paths: Vec<String>,
    /// Names as passed to `System.loadLibrary`
    pub java_libraries_list: Vec<String>,
}

impl LibrariesManifest {
    pub fn new(libraries: Vec<String>, lib_paths: Vec<String>) -> Self {
        let java_libraries_list = libraries.iter().map(|l| java_library_name(l)).collect();
        Self {
            libraries,
            lib_paths,
            java_libraries_list,
        }
    }
}

/// `libfoo.so` -> `foo`
pub fn java_library_name(library: &str) -> String {
    let name = library.strip_prefix("lib").unwrap_or(library);
    let name = name.strip_suffix(".so").unwrap_or(name);
    name.to_string()
}

/// Write `value` as pretty JSON, leaving the file alone when the content
/// is unchanged. Returns whether the file was written.
pub async fn write_json_if_changed<T: Serialize>(path: &Path, value: &T) -> Result<bool, BuildError> {
    let mut contents = serde_json::to_string_pretty(value)?;
    contents.push('\n');

    if let Ok(existing) = tokio::fs::read_to_string(path).await {
        if existing == contents {
            debug!("{:?} is up to date", path);
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    info!("Wrote {:?}", path);
    Ok(true)
}

/// Write a Make-style depfile: `output: input input ...`
pub async fn write_depfile(depfile: &Path, output: &Path, inputs: &[PathBuf]) -> Result<(), BuildError> {
    let mut line = escape_depfile_path(output);
    line.push(':');
    for input in inputs {
        line.push(' ');
        line.push_str(&escape_depfile_path(input));
    }
    line.push('\n');

    if let Some(parent) = depfile.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(depfile, line).await?;
    debug!("Wrote depfile {:?} with {} inputs", depfile, inputs.len());
    Ok(())
}

fn escape_depfile_path(path: &Path) -> String {
    path.to_string_lossy().replace(' ', "\\ ")
}
