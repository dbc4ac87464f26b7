//! Error types for Artifactor

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Artifactor Error
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code used by the master process for fatal configuration and layout errors
pub const FATAL_EXIT_CODE: i32 = 127;

/// Artifactor error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Directory {} already exists and reuse_dir is not set", .0.display())]
    DirectoryCollision(PathBuf),

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Unknown plugin type: {0}")]
    UnknownPluginType(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Missing argument '{argument}' for {callback}")]
    MissingArgument { callback: String, argument: String },

    #[error("Invalid argument '{argument}': expected {expected}")]
    InvalidArgument { argument: String, expected: String },

    #[error("Callback {callback} failed: {message}")]
    Callback { callback: String, message: String },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },
}

impl Error {
    /// Build a callback failure from any displayable cause
    pub fn callback(callback: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Callback {
            callback: callback.into(),
            message: message.to_string(),
        }
    }

    /// Fatal errors abort the run instead of being handed to the failure handler
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MissingConfig(_) | Error::DirectoryCollision(_))
    }

    /// Process exit code the master uses when this error ends the run
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            FATAL_EXIT_CODE
        } else {
            1
        }
    }
}
