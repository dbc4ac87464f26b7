//! Artifactor configuration
//!
//! The configuration is a YAML mapping, either stand-alone or nested under an
//! `artifactor:` key of a larger environment file:
//!
//! ```yaml
//! artifactor:
//!     log_dir: /home/test/workspace/artiout
//!     per_run: test # test, run, None
//!     reuse_dir: True
//!     squash_exceptions: False
//!     server_address: 127.0.0.1
//!     server_port: 21212
//!     plugins:
//!         filedump:
//!             enabled: True
//!             plugin: filedump
//! ```

use crate::value::{Map, Value};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Artifact directory grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerRun {
    /// Run id directory sits above the test tree: `root/run_id/location/name`
    Run,
    /// Run id directory is the leaf: `root/location/name/run_id`
    Test,
}

impl std::str::FromStr for PerRun {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(PerRun::Run),
            "test" => Ok(PerRun::Test),
            other => Err(Error::InvalidArgument {
                argument: "per_run".to_string(),
                expected: format!("run or test, got {}", other),
            }),
        }
    }
}

/// Configuration slice for one plugin instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Disabled plugins are never configured, so their hooks stay inert
    #[serde(default)]
    pub enabled: bool,

    /// Plugin type key, resolved against the plugin catalog
    #[serde(default)]
    pub plugin: Option<String>,

    /// Plugin-specific options
    #[serde(flatten)]
    pub options: Map,
}

impl PluginConfig {
    /// Enabled configuration for the given type key
    pub fn enabled(plugin: impl Into<String>) -> Self {
        Self {
            enabled: true,
            plugin: Some(plugin.into()),
            options: Map::new(),
        }
    }

    /// Add a plugin-specific option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn bool_option(&self, key: &str, default: bool) -> bool {
        self.option(key).and_then(Value::as_bool).unwrap_or(default)
    }
}

/// Top-level Artifactor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactorConfig {
    /// Directory for the engine's own log file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Root of the per-test artifact trees
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    /// `run`, `test`, or anything else for no run grouping
    #[serde(default)]
    pub per_run: Option<String>,

    /// Reuse existing per-test directories instead of aborting
    #[serde(default, alias = "overwrite")]
    pub reuse_dir: bool,

    /// Log and swallow callback errors instead of returning them from `fire_hook`
    #[serde(default)]
    pub squash_exceptions: bool,

    /// Loopback address the server binds to
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Server port, `0` picks a free port at startup
    #[serde(default)]
    pub server_port: u16,

    #[serde(default = "default_true")]
    pub server_enabled: bool,

    /// Plugin instances by registration name
    #[serde(default, alias = "artifacts")]
    pub plugins: BTreeMap<String, PluginConfig>,

    /// Options not interpreted by the engine, still visible to hooks
    #[serde(flatten)]
    pub extra: Map,
}

fn default_server_address() -> String {
    crate::DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ArtifactorConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            artifact_dir: None,
            per_run: None,
            reuse_dir: false,
            squash_exceptions: false,
            server_address: default_server_address(),
            server_port: 0,
            server_enabled: true,
            plugins: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl ArtifactorConfig {
    /// Configuration rooted at the given log and artifact directories
    pub fn with_dirs(log_dir: impl Into<PathBuf>, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: Some(log_dir.into()),
            artifact_dir: Some(artifact_dir.into()),
            ..Default::default()
        }
    }

    /// Parse YAML, accepting either a bare configuration or an `artifactor:` stanza
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(content)?;
        let section = match doc.get("artifactor") {
            Some(section) if section.is_mapping() => section.clone(),
            _ => doc,
        };
        if section.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(section)?)
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Artifact directory layout, `None` unless `per_run` names a known grouping
    pub fn layout(&self) -> Option<PerRun> {
        self.per_run.as_deref().and_then(|s| s.parse().ok())
    }

    /// Effective log directory
    pub fn resolved_log_dir(&self) -> Result<PathBuf> {
        self.log_dir
            .clone()
            .or_else(crate::default_log_dir)
            .ok_or_else(|| Error::MissingConfig("log_dir must be specified".to_string()))
    }

    /// Effective artifact root, `<log_dir>/artifacts` unless set
    pub fn resolved_artifact_dir(&self) -> Result<PathBuf> {
        match &self.artifact_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.resolved_log_dir()?.join("artifacts")),
        }
    }

    /// Configuration slice for a plugin instance
    pub fn plugin_slice(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.get(name)
    }

    /// Add a plugin instance
    pub fn with_plugin(mut self, name: impl Into<String>, config: PluginConfig) -> Self {
        self.plugins.insert(name.into(), config);
        self
    }

    /// `address:port` the server listens on
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_address, self.server_port)
    }

    /// The configuration as a dynamic mapping, published as the `artifactor_config` global
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self)
            .map(Value::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifactor_stanza() {
        let config = ArtifactorConfig::from_yaml_str(
            r#"
artifactor:
    log_dir: /tmp/l
    per_run: test
    reuse_dir: True
    plugins:
        filedump:
            enabled: True
            plugin: filedump
        reporter:
            enabled: False
            plugin: reporter
            only_failed: True
"#,
        )
        .unwrap();

        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/l")));
        assert_eq!(config.layout(), Some(PerRun::Test));
        assert!(config.reuse_dir);
        assert!(!config.squash_exceptions);
        assert_eq!(config.resolved_artifact_dir().unwrap(), PathBuf::from("/tmp/l/artifacts"));

        let reporter = config.plugin_slice("reporter").unwrap();
        assert!(!reporter.enabled);
        assert_eq!(reporter.plugin.as_deref(), Some("reporter"));
        assert!(reporter.bool_option("only_failed", false));
    }

    #[test]
    fn test_legacy_aliases() {
        let config = ArtifactorConfig::from_yaml_str(
            r#"
log_dir: /tmp/l
artifact_dir: /tmp/a
per_run: None
overwrite: true
artifacts:
    test:
        enabled: true
        plugin: test
"#,
        )
        .unwrap();

        assert!(config.reuse_dir);
        assert_eq!(config.layout(), None);
        assert!(config.plugin_slice("test").is_some());
        assert_eq!(config.resolved_artifact_dir().unwrap(), PathBuf::from("/tmp/a"));
    }

    #[test]
    fn test_config_value_is_published_as_map() {
        let config = ArtifactorConfig::with_dirs("/tmp/l", "/tmp/a")
            .with_plugin("filedump", PluginConfig::enabled("filedump"));
        let value = config.to_value();

        assert_eq!(value.get("log_dir").and_then(Value::as_str), Some("/tmp/l"));
        assert_eq!(value.get("server_address").and_then(Value::as_str), Some("127.0.0.1"));
        assert_eq!(
            value
                .pointer(&["plugins", "filedump", "plugin"])
                .and_then(Value::as_str),
            Some("filedump")
        );
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("artifactor.yaml");
        std::fs::write(
            &path,
            "log_dir: /tmp/l\nsquash_exceptions: true\nserver_port: 21212\n",
        )
        .unwrap();

        let config = ArtifactorConfig::load(&path).unwrap();
        assert!(config.squash_exceptions);
        assert_eq!(config.server_addr(), "127.0.0.1:21212");
    }
}
