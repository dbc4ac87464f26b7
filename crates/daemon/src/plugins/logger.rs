//! Per-test log files fed by `log_message`

use super::{file_entry, test_ident};
use crate::plugin::{worker_id, Plugin, PluginHooks, WorkerStore};
use crate::store::{HookContext, HookResult, Updates};
use artifactor_common::{PluginConfig, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, trace};

struct OpenLog {
    test: String,
    path: PathBuf,
    file: File,
}

/// `logger` plugin
#[derive(Default)]
pub struct Logger {
    ident: String,
    timestamps: bool,
    logs: WorkerStore<OpenLog>,
}

impl Plugin for Logger {
    fn plugin_initialize(&mut self, hooks: &mut PluginHooks<Self>) {
        self.ident = hooks.ident().to_string();
        hooks.register_plugin_hook("start_test", Self::start_test);
        hooks.register_plugin_hook("log_message", Self::log_message);
        hooks.register_plugin_hook("finish_test", Self::finish_test);
    }

    fn configure(&mut self, config: &PluginConfig) -> Result<()> {
        self.timestamps = config.bool_option("timestamps", true);
        Ok(())
    }
}

impl Logger {
    fn start_test(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let test = test_ident(ctx.str("test_location")?, ctx.str("test_name")?);
        let path = ctx.path("artifact_path")?.join(format!("{}.log", self.ident));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(test = %test, path = %path.display(), "Opened test log");

        let worker = worker_id(ctx)?;
        if let Some(previous) = self.logs.insert(worker, OpenLog { test, path, file }) {
            debug!(test = %previous.test, "Closed log left open by an unfinished test");
        }
        Ok(None)
    }

    fn log_message(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let message = ctx.str("message")?;
        let level = ctx.opt_str("level")?.unwrap_or("INFO").to_ascii_uppercase();
        let Some(log) = self.logs.get_mut(&worker_id(ctx)?) else {
            trace!("No open test log, dropping message");
            return Ok(None);
        };

        let line = if self.timestamps {
            format!(
                "[{}] [{}] {}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                level,
                message
            )
        } else {
            format!("[{}] {}\n", level, message)
        };
        log.file.write_all(line.as_bytes())?;
        Ok(None)
    }

    fn finish_test(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let Some(mut log) = self.logs.remove(&worker_id(ctx)?) else {
            return Ok(None);
        };
        log.file.flush()?;
        let path = log.path.to_string_lossy().into_owned();
        let artifacts = file_entry(ctx.get("artifacts"), &log.test, &self.ident, &path);
        Ok(Some(Updates::global("artifacts", artifacts)))
    }
}
