//! Hook dispatch engine
//!
//! `fire_hook` runs, for one event: every pre-phase callback, then every
//! configured plugin handler bound to the event, then every post-phase
//! callback. Each step sees the merged view of event-local data, global data
//! and the keyword arguments; its updates are applied before the next step.

use crate::plugin::{Plugin, PluginCatalog};
use crate::policy;
use crate::registry::{CallbackFn, Phase, PluginRegistry};
use crate::store::{merge_updates, DataStore, HookContext, HookResult};
use artifactor_common::{ArtifactorConfig, Error, Map, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// The dispatch engine: configuration, registry and data store
pub struct Artifactor {
    config: ArtifactorConfig,
    log_dir: PathBuf,
    artifact_dir: PathBuf,
    registry: PluginRegistry,
    store: DataStore,
}

impl Artifactor {
    /// Create an engine. Fails with `MissingConfig` when no log directory can be resolved.
    pub fn new(config: ArtifactorConfig) -> Result<Self> {
        let log_dir = config.resolved_log_dir()?;
        let artifact_dir = config.resolved_artifact_dir()?;
        let store = DataStore::seeded(&config, &log_dir, &artifact_dir);
        Ok(Self {
            config,
            log_dir,
            artifact_dir,
            registry: PluginRegistry::new(),
            store,
        })
    }

    pub fn config(&self) -> &ArtifactorConfig {
        &self.config
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Global data
    pub fn global(&self) -> &Map {
        self.store.global()
    }

    pub fn register_plugin<P: Plugin>(&mut self, name: &str, plugin: P) -> Result<()> {
        self.registry.register_plugin(name, plugin)
    }

    /// Configure a registered plugin with its slice of the configuration
    pub fn configure_plugin(&mut self, name: &str) -> Result<()> {
        let slice = self.config.plugin_slice(name);
        self.registry.configure_plugin(name, slice)
    }

    /// Instantiate a plugin for every entry of the configuration.
    ///
    /// Entries name their type with `plugin:`, defaulting to the entry name.
    /// Disabled entries are registered too but stay inert.
    pub fn setup_plugin_instances(&mut self, catalog: &PluginCatalog) -> Result<()> {
        let entries: Vec<(String, String)> = self
            .config
            .plugins
            .iter()
            .map(|(name, slice)| {
                let key = slice.plugin.clone().unwrap_or_else(|| name.clone());
                (name.clone(), key)
            })
            .collect();

        for (name, key) in entries {
            if self.registry.has_plugin(&name) {
                debug!(plugin = %name, "Plugin already registered, skipping");
                continue;
            }
            let instance = catalog.instantiate(&key, &name)?;
            self.registry.insert(instance)?;
        }
        Ok(())
    }

    pub fn register_hook_callback(
        &mut self,
        event: impl Into<String>,
        phase: Phase,
        name: impl Into<String>,
        callback: CallbackFn,
    ) {
        self.registry.register_hook_callback(event, phase, name, callback);
    }

    pub fn unregister_hook_callback(&mut self, name: &str) -> bool {
        self.registry.unregister_hook_callback(name)
    }

    /// Create the output directories, install the built-in callbacks and
    /// configure every registered plugin.
    ///
    /// A plugin that fails to configure stays registered but inert.
    pub fn initialize(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(&self.artifact_dir)?;
        policy::install(&mut self.registry);

        for name in self.registry.plugin_names() {
            if let Err(err) = self.configure_plugin(&name) {
                self.handle_failure("configure", &name, &err);
            }
        }
        info!(
            log_dir = %self.log_dir.display(),
            artifact_dir = %self.artifact_dir.display(),
            plugins = self.registry.plugin_names().len(),
            "Artifactor initialized"
        );
        Ok(())
    }

    /// Record the address the server actually bound to
    pub fn publish_server_address(&mut self, addr: SocketAddr) {
        self.config.server_address = addr.ip().to_string();
        self.config.server_port = addr.port();
        self.store.set("artifactor_config", self.config.to_value());
    }

    /// Dispatch `event` and return its final event-local data.
    ///
    /// Fatal errors always propagate. A callback missing an argument is
    /// logged and skipped. Any other callback error is logged, then either
    /// swallowed (`squash_exceptions`) or returned, ending the dispatch.
    pub fn fire_hook(&mut self, event: &str, kwargs: Map) -> Result<Map> {
        let mut local = Map::new();
        debug!(event, "Firing hook");

        for (name, callback) in self.registry.callbacks(event, Phase::Pre) {
            let outcome = {
                let ctx = HookContext::new(event, &name, &local, self.store.global(), &kwargs);
                callback(&ctx)
            };
            self.settle(event, &name, outcome, &mut local)?;
        }

        for ident in self.registry.plugins_for(event) {
            let outcome = match self.registry.plugin_mut(&ident) {
                Some(plugin) => {
                    let ctx =
                        HookContext::new(event, &ident, &local, self.store.global(), &kwargs);
                    plugin.call(event, &ctx)
                }
                None => continue,
            };
            self.settle(event, &ident, outcome, &mut local)?;
        }

        for (name, callback) in self.registry.callbacks(event, Phase::Post) {
            let outcome = {
                let ctx = HookContext::new(event, &name, &local, self.store.global(), &kwargs);
                callback(&ctx)
            };
            self.settle(event, &name, outcome, &mut local)?;
        }

        Ok(local)
    }

    fn settle(
        &mut self,
        event: &str,
        callback: &str,
        outcome: HookResult,
        local: &mut Map,
    ) -> Result<()> {
        match outcome {
            Ok(Some(updates)) => {
                self.store.apply_global(updates.global);
                merge_updates(local, updates.local);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) if err.is_fatal() => {
                self.handle_failure(event, callback, &err);
                Err(err)
            }
            Err(err @ Error::MissingArgument { .. }) => {
                self.handle_failure(event, callback, &err);
                Ok(())
            }
            Err(err) => {
                self.handle_failure(event, callback, &err);
                if self.config.squash_exceptions {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Log a failed callback with its event and error
    pub fn handle_failure(&self, event: &str, callback: &str, err: &Error) {
        if err.is_fatal() {
            error!(event, callback, error = %err, "Fatal error in hook callback");
        } else if matches!(err, Error::MissingArgument { .. }) {
            error!(event, callback, error = %err, "Skipping hook callback");
        } else {
            error!(event, callback, error = %err, "Hook callback failed");
            debug!(event, callback, error = ?err, "Hook callback failure detail");
        }
    }
}
