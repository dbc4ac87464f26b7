//! Global and event-local data
//!
//! Global data lives for the whole run and is only changed by the dispatcher
//! between callbacks. Event-local data is created for a single `fire_hook`
//! and dropped when it returns. Callbacks never mutate either directly: they
//! return [`Updates`] which the dispatcher folds back in.

use artifactor_common::{deep_merge, ArtifactorConfig, Error, Map, Result, Value};
use std::path::{Path, PathBuf};

/// Keys whose values are artifact indexes and merge instead of being replaced
pub const MERGED_KEYS: [&str; 2] = ["artifacts", "old_artifacts"];

/// Outcome of a callback or plugin hook: `None` or the updates it produced
pub type HookResult = Result<Option<Updates>>;

/// Updates a callback hands back to the dispatcher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    /// Applied to global data after the callback returns
    pub global: Map,
    /// Applied to event-local data, visible to later callbacks of the same event
    pub local: Map,
}

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single global update
    pub fn global(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with_global(key, value)
    }

    /// A single event-local update
    pub fn local(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with_local(key, value)
    }

    pub fn with_global(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.global.insert(key.into(), value.into());
        self
    }

    pub fn with_local(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.local.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.local.is_empty()
    }
}

/// Fold `updates` into `target`, deep-merging artifact indexes
pub fn merge_updates(target: &mut Map, updates: Map) {
    for (key, value) in updates {
        match value {
            Value::Map(incoming) if MERGED_KEYS.contains(&key.as_str()) => {
                match target.get_mut(&key) {
                    Some(Value::Map(existing)) => deep_merge(existing, incoming),
                    _ => {
                        target.insert(key, Value::Map(incoming));
                    }
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

/// Process-global data
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    global: Map,
}

impl DataStore {
    /// Store seeded with the values every run starts with
    pub fn seeded(config: &ArtifactorConfig, log_dir: &Path, artifact_dir: &Path) -> Self {
        let mut global = Map::new();
        global.insert("artifactor_config".into(), config.to_value());
        global.insert("log_dir".into(), Value::from(log_dir));
        global.insert("artifact_dir".into(), Value::from(artifact_dir));
        global.insert("artifacts".into(), Value::map());
        global.insert("old_artifacts".into(), Value::map());
        Self { global }
    }

    pub fn global(&self) -> &Map {
        &self.global
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.global.get(key)
    }

    /// Replace a global value outside of dispatch (startup only)
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.global.insert(key.into(), value.into());
    }

    /// Apply a callback's global updates
    pub fn apply_global(&mut self, updates: Map) {
        merge_updates(&mut self.global, updates);
    }
}

/// Merged view handed to callbacks and plugin hooks.
///
/// Lookups resolve event-local data first, then global data, then the
/// keyword arguments the event was fired with.
pub struct HookContext<'a> {
    event: &'a str,
    caller: &'a str,
    local: &'a Map,
    global: &'a Map,
    kwargs: &'a Map,
}

impl<'a> HookContext<'a> {
    pub fn new(
        event: &'a str,
        caller: &'a str,
        local: &'a Map,
        global: &'a Map,
        kwargs: &'a Map,
    ) -> Self {
        Self {
            event,
            caller,
            local,
            global,
            kwargs,
        }
    }

    /// Event being dispatched
    pub fn event(&self) -> &'a str {
        self.event
    }

    /// Registration name of the callback or plugin being invoked
    pub fn caller(&self) -> &'a str {
        self.caller
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.local
            .get(key)
            .or_else(|| self.global.get(key))
            .or_else(|| self.kwargs.get(key))
    }

    /// Non-null value passed by the caller of `fire_hook`, ignoring local
    /// and global data
    pub fn kwarg(&self, key: &str) -> Option<&'a Value> {
        self.kwargs.get(key).filter(|v| !v.is_null())
    }

    /// Present value, `Null` included
    pub fn require(&self, key: &str) -> Result<&'a Value> {
        self.get(key).ok_or_else(|| Error::MissingArgument {
            callback: self.caller.to_string(),
            argument: key.to_string(),
        })
    }

    /// Present, non-null value
    pub fn opt(&self, key: &str) -> Option<&'a Value> {
        self.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Result<&'a str> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| self.invalid(key, "string", value))
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.opt(key) {
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "string", value)),
            None => Ok(None),
        }
    }

    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.opt(key) {
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "bool", value)),
            None => Ok(None),
        }
    }

    pub fn map(&self, key: &str) -> Result<&'a Map> {
        let value = self.require(key)?;
        value.as_map().ok_or_else(|| self.invalid(key, "map", value))
    }

    pub fn path(&self, key: &str) -> Result<PathBuf> {
        self.str(key).map(PathBuf::from)
    }

    fn invalid(&self, key: &str, expected: &str, found: &Value) -> Error {
        Error::InvalidArgument {
            argument: key.to_string(),
            expected: format!("{} for {}, got {}", expected, self.caller, found.type_name()),
        }
    }
}
