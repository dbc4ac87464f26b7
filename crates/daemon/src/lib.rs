//! Artifactor master
//!
//! Event dispatch engine, plugin registry, built-in hook policy, bundled
//! plugins and the loopback server workers talk to.

pub mod config;
pub mod dispatcher;
pub mod layout;
pub mod logging;
pub mod plugin;
pub mod plugins;
pub mod policy;
pub mod registry;
pub mod server;
pub mod store;

pub use config::DaemonConfig;
pub use dispatcher::Artifactor;
pub use plugin::{
    worker_id, HookFn, LoadedPlugin, Plugin, PluginCatalog, PluginHooks, PluginInstance,
    WorkerStore, MASTER_WORKER,
};
pub use registry::{CallbackFn, Phase, PluginRegistry};
pub use server::Server;
pub use store::{DataStore, HookContext, HookResult, Updates};
