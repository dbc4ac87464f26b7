//! Artifactor Common Library
//!
//! Shared value model, wire protocol, configuration and error types for the
//! Artifactor master and its clients.

pub mod config;
pub mod error;
pub mod protocol;
pub mod value;

// Re-export commonly used types
pub use config::{ArtifactorConfig, PerRun, PluginConfig};
pub use error::{Error, Result, FATAL_EXIT_CODE};
pub use protocol::{Request, Response};
pub use value::{deep_merge, Map, Value};

/// Artifactor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Address the server binds to unless configured otherwise
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";

/// Default log directory
pub fn default_log_dir() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(".artifactor").join("logs"))
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
