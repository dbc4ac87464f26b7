//! Master process configuration

use artifactor_common::{ArtifactorConfig, Result, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the engine's own log file inside `log_dir`
pub const LOG_FILE_NAME: &str = "artifactor_log.txt";

/// Configuration of the `artifactor-server` process
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    /// Engine configuration
    pub artifactor: ArtifactorConfig,

    /// Run id for the `start_session` fired at startup
    pub run_id: Option<String>,

    /// Enable debug logging
    pub debug: bool,
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let artifactor = if path.exists() {
            ArtifactorConfig::load(path)?
        } else {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            ArtifactorConfig::default()
        };
        Ok(Self {
            artifactor,
            ..Default::default()
        })
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.artifactor.server_port = port;
        }
        self
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        if dir.is_some() {
            self.artifactor.log_dir = dir;
        }
        self
    }

    pub fn with_artifact_dir(mut self, dir: Option<PathBuf>) -> Self {
        if dir.is_some() {
            self.artifactor.artifact_dir = dir;
        }
        self
    }

    /// Resolve and create the log and artifact directories
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(self.artifactor.resolved_log_dir()?)?;
        std::fs::create_dir_all(self.artifactor.resolved_artifact_dir()?)?;
        Ok(())
    }

    /// Get the engine log file path
    pub fn log_file(&self) -> Result<PathBuf> {
        Ok(self.artifactor.resolved_log_dir()?.join(LOG_FILE_NAME))
    }

    /// Run id as a hook argument: numeric ids stay integers
    pub fn run_id_value(&self) -> Option<Value> {
        self.run_id.as_deref().map(|id| match id.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::from(id),
        })
    }
}
