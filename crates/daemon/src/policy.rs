//! Built-in hook callbacks
//!
//! Installed by [`Artifactor::initialize`](crate::Artifactor::initialize):
//!
//! | event            | phase | callback                |
//! |------------------|-------|-------------------------|
//! | `start_session`  | pre   | `default_start_session` |
//! | `pre_start_test` | pre   | `default_start_test`    |
//! | `start_test`     | pre   | `default_start_test`    |
//! | `finish_test`    | pre   | `default_finish_test`   |
//! | `build_report`   | pre   | `merge_artifacts`       |
//! | `finish_session` | pre   | `merge_artifacts`       |

use crate::layout::{self, ArtifactLayout};
use crate::registry::{CallbackFn, Phase, PluginRegistry};
use crate::store::{HookContext, HookResult, Updates};
use artifactor_common::{deep_merge, Error, PerRun, Result, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_START_SESSION: &str = "default_start_session";
pub const DEFAULT_START_TEST: &str = "default_start_test";
pub const DEFAULT_FINISH_TEST: &str = "default_finish_test";
pub const MERGE_ARTIFACTS: &str = "merge_artifacts";

/// Register the built-in callbacks
pub fn install(registry: &mut PluginRegistry) {
    let start_session: CallbackFn = Arc::new(default_start_session);
    let start_test: CallbackFn = Arc::new(default_start_test);
    let finish_test: CallbackFn = Arc::new(default_finish_test);
    let merge: CallbackFn = Arc::new(merge_artifacts);

    let bindings = [
        ("start_session", DEFAULT_START_SESSION, start_session),
        ("pre_start_test", DEFAULT_START_TEST, start_test.clone()),
        ("start_test", DEFAULT_START_TEST, start_test),
        ("finish_test", DEFAULT_FINISH_TEST, finish_test),
        ("build_report", MERGE_ARTIFACTS, merge.clone()),
        ("finish_session", MERGE_ARTIFACTS, merge),
    ];
    for (event, name, callback) in bindings {
        registry.register_hook_callback(event, Phase::Pre, name, callback);
    }
}

/// Publish `run_id` to the event and to every later event.
///
/// The id is read from the call site only, so a new session replaces the
/// id published by the previous one.
pub fn default_start_session(ctx: &HookContext<'_>) -> HookResult {
    let run_id = ctx
        .kwarg("run_id")
        .cloned()
        .ok_or_else(|| Error::MissingArgument {
            callback: ctx.caller().to_string(),
            argument: "run_id".to_string(),
        })?;
    Ok(Some(
        Updates::local("run_id", run_id.clone()).with_global("run_id", run_id),
    ))
}

/// Create the test's artifact directory.
///
/// Requires `test_name`, `test_location`, `artifact_dir` and
/// `artifactor_config`; uses `run_id` when present.
pub fn default_start_test(ctx: &HookContext<'_>) -> HookResult {
    let path = test_artifact_dir(ctx, false)?;
    Ok(Some(Updates::local("artifact_path", path)))
}

/// Same derivation as [`default_start_test`], always reusing the directory
pub fn default_finish_test(ctx: &HookContext<'_>) -> HookResult {
    let path = test_artifact_dir(ctx, true)?;
    Ok(Some(Updates::local("artifact_path", path)))
}

/// Fold `artifacts` into `old_artifacts`.
///
/// The merged index is also published as the event's `artifacts`, so report
/// builders in the same dispatch see every test seen so far.
pub fn merge_artifacts(ctx: &HookContext<'_>) -> HookResult {
    let mut merged = match ctx.opt("old_artifacts") {
        Some(_) => ctx.map("old_artifacts")?.clone(),
        None => Default::default(),
    };
    deep_merge(&mut merged, ctx.map("artifacts")?.clone());
    Ok(Some(
        Updates::global("old_artifacts", merged.clone()).with_local("artifacts", merged),
    ))
}

/// Derive and create (or reuse) the artifact directory for the test in `ctx`
pub fn test_artifact_dir(ctx: &HookContext<'_>, force_reuse: bool) -> Result<PathBuf> {
    let test_name = ctx.str("test_name")?;
    let test_location = ctx.str("test_location")?;
    let artifact_dir = ctx.path("artifact_dir")?;
    let config = ctx.map("artifactor_config")?;

    let run_id = ctx.opt("run_id").map(Value::render);
    let per_run = config
        .get("per_run")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<PerRun>().ok());
    let reuse = force_reuse
        || config
            .get("reuse_dir")
            .and_then(Value::as_bool)
            .unwrap_or(false);

    let layout = ArtifactLayout {
        root: &artifact_dir,
        per_run,
        run_id: run_id.as_deref(),
    };
    let path = layout.test_dir(test_location, test_name);
    layout::setup_dir(&path, reuse)?;
    Ok(path)
}
