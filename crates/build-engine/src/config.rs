//! Build Configuration
//!
//! Settings for the native library ordering step, and GN list parsing for
//! the arguments build files hand us.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use linkorder_core::AppConfig;
use linkorder_graph::{CyclePolicy, Node};

use crate::BuildError;

/// Native library ordering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrariesConfig {
    /// Libraries to start from (names or paths)
    pub input_libraries: Vec<String>,

    /// Directories holding the libraries the build produced
    pub libraries_dirs: Vec<PathBuf>,

    /// Manifest output path
    pub output: PathBuf,

    /// Optional depfile path
    pub depfile: Option<PathBuf>,

    /// Libraries left out of the manifest even when reachable
    pub exclude_shared_libraries: Vec<String>,

    /// Cycle handling
    pub cycle_policy: CyclePolicy,

    /// Warn about cycles broken in lenient mode
    pub report_cycles: bool,

    /// Parallel readelf processes
    pub jobs: usize,
}

impl Default for LibrariesConfig {
    fn default() -> Self {
        Self {
            input_libraries: Vec::new(),
            libraries_dirs: Vec::new(),
            output: PathBuf::from("libraries.json"),
            depfile: None,
            exclude_shared_libraries: Vec::new(),
            cycle_policy: CyclePolicy::Lenient,
            report_cycles: true,
            jobs: 1,
        }
    }
}

impl LibrariesConfig {
    /// Start from application-wide defaults
    pub fn from_app_config(app: &AppConfig) -> Self {
        Self {
            cycle_policy: if app.ordering.strict_cycles {
                CyclePolicy::Error
            } else {
                CyclePolicy::Lenient
            },
            report_cycles: app.ordering.report_cycles,
            jobs: app.build.jobs(),
            ..Default::default()
        }
    }

    /// Root libraries as file names, deduplicated, in input order
    pub fn root_libraries(&self) -> Vec<Node> {
        let mut roots: Vec<Node> = Vec::new();
        for lib in &self.input_libraries {
            let name = Path::new(lib)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(lib.as_str());
            let node = Node::from(name);
            if !roots.contains(&node) {
                roots.push(node);
            }
        }
        roots
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.input_libraries.is_empty() {
            return Err(BuildError::ConfigError("no input libraries given".into()));
        }
        if self.libraries_dirs.is_empty() {
            return Err(BuildError::ConfigError("no libraries directory given".into()));
        }
        Ok(())
    }
}

/// Parse a GN list argument.
///
/// Accepts the GN literal form `["a", "b"]` and falls back to splitting on
/// whitespace for plain values. An empty string is an empty list.
pub fn parse_gn_list(value: &str) -> Result<Vec<String>, BuildError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }
    if !value.starts_with('[') {
        return Ok(value.split_whitespace().map(str::to_string).collect());
    }

    let mut chars = value[1..].chars().peekable();
    let mut items = Vec::new();
    let mut expect_item = true;

    loop {
        match chars.next() {
            None => return Err(BuildError::GnList(format!("unterminated list: {}", value))),
            Some(c) if c.is_whitespace() => continue,
            Some(']') => break,
            Some(',') if !expect_item => expect_item = true,
            Some('"') if expect_item => {
                let mut item = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(BuildError::GnList(format!(
                                "unterminated string in {}",
                                value
                            )))
                        }
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\' | '$')) => item.push(escaped),
                            Some(other) => {
                                item.push('\\');
                                item.push(other);
                            }
                            None => {
                                return Err(BuildError::GnList(format!(
                                    "dangling escape in {}",
                                    value
                                )))
                            }
                        },
                        Some(c) => item.push(c),
                    }
                }
                items.push(item);
                expect_item = false;
            }
            Some(c) => {
                return Err(BuildError::GnList(format!(
                    "unexpected {:?} in {}",
                    c, value
                )))
            }
        }
    }

    if chars.any(|c| !c.is_whitespace()) {
        return Err(BuildError::GnList(format!("trailing data after list: {}", value)));
    }

    Ok(items)
}

/// Parse several GN list arguments and concatenate them
pub fn parse_gn_lists<S: AsRef<str>>(values: &[S]) -> Result<Vec<String>, BuildError> {
    let mut all = Vec::new();
    for value in values {
        all.extend(parse_gn_list(value.as_ref())?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gn_list_literal() {
        assert_eq!(
            parse_gn_list(r#"["libchrome.so", "out/lib.unstripped/libbase.so",]"#).unwrap(),
            vec!["libchrome.so", "out/lib.unstripped/libbase.so"]
        );
        assert_eq!(parse_gn_list("[]").unwrap(), Vec::<String>::new());
        assert_eq!(parse_gn_list(r#"["a \"b\"", "c\\d"]"#).unwrap(), vec![r#"a "b""#, r"c\d"]);
    }

    #[test]
    fn test_parse_gn_list_plain() {
        assert_eq!(parse_gn_list("").unwrap(), Vec::<String>::new());
        assert_eq!(parse_gn_list("liba.so libb.so").unwrap(), vec!["liba.so", "libb.so"]);
    }

    #[test]
    fn test_parse_gn_list_errors() {
        assert!(matches!(parse_gn_list(r#"["a""#), Err(BuildError::GnList(_))));
        assert!(matches!(parse_gn_list(r#"["a" "b"]"#), Err(BuildError::GnList(_))));
        assert!(matches!(parse_gn_list(r#"["a"] x"#), Err(BuildError::GnList(_))));
        assert!(matches!(parse_gn_list("[a]"), Err(BuildError::GnList(_))));
    }

    #[test]
    fn test_parse_gn_lists_concatenates() {
        let all = parse_gn_lists(&[r#"["a"]"#, "b c"]).unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_root_libraries_are_basenames() {
        let config = LibrariesConfig {
            input_libraries: vec![
                "out/Release/libchrome.so".into(),
                "libbase.so".into(),
                "other/libchrome.so".into(),
            ],
            ..Default::default()
        };
        assert_eq!(
            config.root_libraries(),
            vec![Node::from("libchrome.so"), Node::from("libbase.so")]
        );
    }

    #[test]
    fn test_from_app_config() {
        let mut app = AppConfig::default();
        app.ordering.strict_cycles = true;
        app.build.parallel_jobs = 6;

        let config = LibrariesConfig::from_app_config(&app);
        assert_eq!(config.cycle_policy, CyclePolicy::Error);
        assert_eq!(config.jobs, 6);
        assert!(config.validate().is_err());
    }
}
