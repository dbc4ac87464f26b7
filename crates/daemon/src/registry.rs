//! Plugin and callback registry

use crate::plugin::{LoadedPlugin, Plugin, PluginInstance};
use crate::store::{HookContext, HookResult};
use artifactor_common::{Error, PluginConfig, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Free-standing hook callback
pub type CallbackFn = Arc<dyn Fn(&HookContext<'_>) -> HookResult + Send + Sync>;

/// When a callback runs relative to plugin handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
}

impl std::str::FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre" => Ok(Phase::Pre),
            "post" => Ok(Phase::Post),
            other => Err(Error::InvalidArgument {
                argument: "phase".to_string(),
                expected: format!("pre or post, got {}", other),
            }),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pre => write!(f, "pre"),
            Phase::Post => write!(f, "post"),
        }
    }
}

#[derive(Default)]
struct EventCallbacks {
    pre: HashMap<String, CallbackFn>,
    post: HashMap<String, CallbackFn>,
}

impl EventCallbacks {
    fn phase(&self, phase: Phase) -> &HashMap<String, CallbackFn> {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Post => &self.post,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut HashMap<String, CallbackFn> {
        match phase {
            Phase::Pre => &mut self.pre,
            Phase::Post => &mut self.post,
        }
    }

    fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }
}

/// Registered plugins and callbacks.
///
/// Callbacks are keyed by event, phase and registration name; plugins by
/// their registration name. No ordering is kept within a phase.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn LoadedPlugin>>,
    callbacks: HashMap<String, EventCallbacks>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `name` and run its initializer
    pub fn register_plugin<P: Plugin>(&mut self, name: &str, plugin: P) -> Result<()> {
        if self.plugins.contains_key(name) {
            return Err(Error::DuplicatePlugin(name.to_string()));
        }
        self.insert(Box::new(PluginInstance::new(name, plugin)))
    }

    /// Register an already constructed plugin instance
    pub fn insert(&mut self, plugin: Box<dyn LoadedPlugin>) -> Result<()> {
        let name = plugin.ident().to_string();
        if self.plugins.contains_key(&name) {
            return Err(Error::DuplicatePlugin(name));
        }
        info!(plugin = %name, "Registered plugin");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Apply a configuration slice to a registered plugin.
    ///
    /// A missing slice leaves the plugin unconfigured.
    pub fn configure_plugin(&mut self, name: &str, config: Option<&PluginConfig>) -> Result<()> {
        let plugin = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;
        match config {
            Some(config) => {
                plugin.configure(config)?;
                debug!(plugin = %name, configured = plugin.is_configured(), "Configured plugin");
            }
            None => warn!(plugin = %name, "No configuration for plugin, leaving it inert"),
        }
        Ok(())
    }

    /// Install `callback` for `event`, replacing an existing one with the same name and phase
    pub fn register_hook_callback(
        &mut self,
        event: impl Into<String>,
        phase: Phase,
        name: impl Into<String>,
        callback: CallbackFn,
    ) {
        let event = event.into();
        let name = name.into();
        debug!(event = %event, phase = %phase, callback = %name, "Registered hook callback");
        self.callbacks
            .entry(event)
            .or_default()
            .phase_mut(phase)
            .insert(name, callback);
    }

    /// Remove every callback registered under `name`. Returns whether any existed.
    pub fn unregister_hook_callback(&mut self, name: &str) -> bool {
        let mut removed = false;
        for callbacks in self.callbacks.values_mut() {
            removed |= callbacks.pre.remove(name).is_some();
            removed |= callbacks.post.remove(name).is_some();
        }
        self.callbacks.retain(|_, callbacks| !callbacks.is_empty());
        if removed {
            debug!(callback = %name, "Unregistered hook callback");
        }
        removed
    }

    /// Snapshot of the callbacks for one event and phase
    pub fn callbacks(&self, event: &str, phase: Phase) -> Vec<(String, CallbackFn)> {
        self.callbacks
            .get(event)
            .map(|callbacks| {
                callbacks
                    .phase(phase)
                    .iter()
                    .map(|(name, callback)| (name.clone(), Arc::clone(callback)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_callback(&self, event: &str, phase: Phase, name: &str) -> bool {
        self.callbacks
            .get(event)
            .map(|callbacks| callbacks.phase(phase).contains_key(name))
            .unwrap_or(false)
    }

    /// Plugins with a handler bound to `event`
    pub fn plugins_for(&self, event: &str) -> Vec<String> {
        self.plugins
            .values()
            .filter(|plugin| plugin.handles(event))
            .map(|plugin| plugin.ident().to_string())
            .collect()
    }

    pub fn plugin_mut(&mut self, name: &str) -> Option<&mut Box<dyn LoadedPlugin>> {
        self.plugins.get_mut(name)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.plugins
            .get(name)
            .map(|plugin| plugin.is_configured())
            .unwrap_or(false)
    }
}
