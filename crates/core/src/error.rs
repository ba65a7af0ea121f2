//! Error types for linkorder
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type shared by the linkorder crates
#[derive(Error, Debug)]
pub enum LinkOrderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for linkorder operations
pub type Result<T> = std::result::Result<T, LinkOrderError>;

impl LinkOrderError {
    /// Check if the input file itself is at fault
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LinkOrderError::TomlParse(_)
                | LinkOrderError::Json(_)
                | LinkOrderError::UnsupportedFormat(_)
                | LinkOrderError::NotFound(_)
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LinkOrderError::Io(e) => format!("File operation failed: {}", e),
            LinkOrderError::Config(msg) => format!("Configuration error: {}", msg),
            LinkOrderError::UnsupportedFormat(path) => {
                format!("Don't know how to read {:?}; use .json or .toml", path)
            }
            LinkOrderError::NotFound(msg) => format!("Not found: {}", msg),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(LinkOrderError::NotFound("graph.json".into()).is_input_error());
        assert!(LinkOrderError::UnsupportedFormat(PathBuf::from("deps.yaml")).is_input_error());
        assert!(!LinkOrderError::Config("bad".into()).is_input_error());
    }

    #[test]
    fn test_user_message() {
        let err = LinkOrderError::UnsupportedFormat(PathBuf::from("deps.yaml"));
        assert!(err.user_message().contains(".json or .toml"));
        assert_eq!(LinkOrderError::NotFound("tasks.toml".into()).user_message(), "Not found: tasks.toml");
    }
}
