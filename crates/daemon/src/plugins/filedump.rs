//! Writes files sent by workers into a test's artifact directory

use super::{file_entry, test_ident};
use crate::layout::sanitize_test_name;
use crate::plugin::{worker_id, Plugin, PluginHooks, WorkerStore};
use crate::policy;
use crate::store::{HookContext, HookResult, Updates};
use artifactor_common::{Error, Result, Value};
use base64::Engine as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

struct CurrentTest {
    ident: String,
    artifact_path: PathBuf,
}

/// `filedump` plugin
#[derive(Default)]
pub struct FileDump {
    ident: String,
    tests: WorkerStore<CurrentTest>,
}

impl Plugin for FileDump {
    fn plugin_initialize(&mut self, hooks: &mut PluginHooks<Self>) {
        self.ident = hooks.ident().to_string();
        hooks.register_plugin_hook("pre_start_test", Self::start_test);
        hooks.register_plugin_hook("start_test", Self::start_test);
        hooks.register_plugin_hook("filedump", Self::filedump);
    }
}

impl FileDump {
    fn start_test(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let test = test_ident(ctx.str("test_location")?, ctx.str("test_name")?);
        let artifact_path = ctx.path("artifact_path")?;
        self.tests.insert(
            worker_id(ctx)?,
            CurrentTest {
                ident: test,
                artifact_path,
            },
        );
        Ok(None)
    }

    fn filedump(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let test_name = ctx.str("test_name")?;
        let test_location = ctx.str("test_location")?;
        let filename = ctx.str("filename")?;
        let contents = ctx.require("contents")?;
        let fd_ident = ctx.opt_str("fd_ident")?.unwrap_or(&self.ident).to_string();
        let append = match ctx.opt_str("mode")?.unwrap_or("w") {
            "w" => false,
            "a" => true,
            other => {
                return Err(Error::InvalidArgument {
                    argument: "mode".to_string(),
                    expected: format!("w or a, got {}", other),
                })
            }
        };
        let data = decode_contents(contents, ctx.opt_bool("contents_base64")?.unwrap_or(false))?;

        let test = test_ident(test_location, test_name);
        let artifact_path = match self.tests.get(&worker_id(ctx)?) {
            Some(current) if current.ident == test => current.artifact_path.clone(),
            _ => policy::test_artifact_dir(ctx, true)?,
        };

        let path = artifact_path.join(format!("{}-{}", self.ident, sanitize_test_name(filename)));
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        file.write_all(&data)?;
        debug!(path = %path.display(), bytes = data.len(), "Dumped file");

        let path = path.to_string_lossy().into_owned();
        let artifacts = file_entry(ctx.get("artifacts"), &test, &fd_ident, &path);
        Ok(Some(
            Updates::global("artifacts", artifacts)
                .with_local("artifact_path", artifact_path)
                .with_local("filename", path),
        ))
    }
}

fn decode_contents(contents: &Value, base64: bool) -> Result<Vec<u8>> {
    let raw: &[u8] = match contents {
        Value::String(s) => s.as_bytes(),
        Value::Bytes(b) => b,
        other => {
            return Err(Error::InvalidArgument {
                argument: "contents".to_string(),
                expected: format!("string or bytes, got {}", other.type_name()),
            })
        }
    };
    if !base64 {
        return Ok(raw.to_vec());
    }
    let trimmed: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| Error::InvalidArgument {
            argument: "contents".to_string(),
            expected: format!("base64 data ({})", e),
        })
}
