//! linkorder Core - configuration, errors and events
//!
//! Shared plumbing for the resolver, ordering and scheduling crates.

pub mod config;
pub mod events;
pub mod error;

pub use config::{load_structured, parse_structured, AppConfig, FileFormat};
pub use events::{Event, EventBus, EventSubscription};
pub use error::{LinkOrderError, Result};

/// linkorder version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "linkorder";
