//! Plugin contract
//!
//! A plugin binds handlers to event names when it is registered and receives
//! its configuration slice afterwards. Handlers only run once the plugin has
//! been configured; until then every bound event is a no-op for it.

use crate::store::{HookContext, HookResult};
use artifactor_common::{PluginConfig, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Worker id used when a hook carries no `slaveid`
pub const MASTER_WORKER: &str = "Master";

/// Hook handler bound by a plugin
pub type HookFn<P> = fn(&mut P, &HookContext<'_>) -> HookResult;

/// A plugin type
pub trait Plugin: Sized + Send + 'static {
    /// Bind hook handlers. Called once, when the plugin is registered.
    fn plugin_initialize(&mut self, hooks: &mut PluginHooks<Self>);

    /// Apply the plugin's configuration slice
    fn configure(&mut self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }
}

/// Handler bindings of one plugin instance
pub struct PluginHooks<P> {
    ident: String,
    bindings: HashMap<String, HookFn<P>>,
}

impl<P> PluginHooks<P> {
    fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            bindings: HashMap::new(),
        }
    }

    /// Registration name of the plugin being initialized
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Bind `handler` to `event`, replacing any earlier binding for it
    pub fn register_plugin_hook(&mut self, event: impl Into<String>, handler: HookFn<P>) {
        let event = event.into();
        if self.bindings.insert(event.clone(), handler).is_some() {
            debug!(plugin = %self.ident, event = %event, "Replaced hook binding");
        }
    }

    pub fn handles(&self, event: &str) -> bool {
        self.bindings.contains_key(event)
    }

    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    fn handler(&self, event: &str) -> Option<HookFn<P>> {
        self.bindings.get(event).copied()
    }
}

/// Type-erased plugin instance as held by the registry
pub trait LoadedPlugin: Send {
    fn ident(&self) -> &str;

    fn is_configured(&self) -> bool;

    fn handles(&self, event: &str) -> bool;

    /// Apply a configuration slice. Disabled slices leave the plugin unconfigured.
    fn configure(&mut self, config: &PluginConfig) -> Result<()>;

    /// Run the handler bound to `event`
    fn call(&mut self, event: &str, ctx: &HookContext<'_>) -> HookResult;
}

/// A plugin together with its bindings and configured flag
pub struct PluginInstance<P> {
    plugin: P,
    hooks: PluginHooks<P>,
    configured: bool,
}

impl<P: Plugin> PluginInstance<P> {
    pub fn new(ident: impl Into<String>, mut plugin: P) -> Self {
        let mut hooks = PluginHooks::new(ident);
        plugin.plugin_initialize(&mut hooks);
        debug!(
            plugin = %hooks.ident,
            events = hooks.bindings.len(),
            "Plugin initialized"
        );
        Self {
            plugin,
            hooks,
            configured: false,
        }
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }
}

impl<P: Plugin> LoadedPlugin for PluginInstance<P> {
    fn ident(&self) -> &str {
        &self.hooks.ident
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn handles(&self, event: &str) -> bool {
        self.hooks.handles(event)
    }

    fn configure(&mut self, config: &PluginConfig) -> Result<()> {
        self.configured = false;
        if !config.enabled {
            debug!(plugin = %self.hooks.ident, "Plugin disabled, leaving unconfigured");
            return Ok(());
        }
        self.plugin.configure(config)?;
        self.configured = true;
        Ok(())
    }

    fn call(&mut self, event: &str, ctx: &HookContext<'_>) -> HookResult {
        let Some(handler) = self.hooks.handler(event) else {
            return Ok(None);
        };
        if !self.configured {
            trace!(plugin = %self.hooks.ident, event, "Plugin not configured, skipping");
            return Ok(None);
        }
        handler(&mut self.plugin, ctx)
    }
}

/// Per-worker scratch state kept by a plugin, keyed by `slaveid`
#[derive(Debug)]
pub struct WorkerStore<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for WorkerStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> WorkerStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, worker: &str) -> Option<&T> {
        self.entries.get(worker)
    }

    pub fn get_mut(&mut self, worker: &str) -> Option<&mut T> {
        self.entries.get_mut(worker)
    }

    pub fn insert(&mut self, worker: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(worker.into(), value)
    }

    pub fn remove(&mut self, worker: &str) -> Option<T> {
        self.entries.remove(worker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Worker a hook was fired for
pub fn worker_id(ctx: &HookContext<'_>) -> Result<String> {
    Ok(ctx
        .opt_str("slaveid")?
        .unwrap_or(MASTER_WORKER)
        .to_string())
}

/// Constructor for a plugin type
pub type PluginFactory = fn(&str) -> Box<dyn LoadedPlugin>;

fn build<P: Plugin + Default>(ident: &str) -> Box<dyn LoadedPlugin> {
    Box::new(PluginInstance::new(ident, P::default()))
}

/// Plugin types by the key configuration entries name in `plugin:`
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the bundled plugins
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register::<crate::plugins::FileDump>("filedump");
        catalog.register::<crate::plugins::Logger>("logger");
        catalog.register::<crate::plugins::Reporter>("reporter");
        catalog
    }

    pub fn register<P: Plugin + Default>(&mut self, key: impl Into<String>) {
        self.factories.insert(key.into(), build::<P>);
    }

    /// Create an instance of type `key` registered as `ident`
    pub fn instantiate(&self, key: &str, ident: &str) -> Result<Box<dyn LoadedPlugin>> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| artifactor_common::Error::UnknownPluginType(key.to_string()))?;
        Ok(factory(ident))
    }
}
