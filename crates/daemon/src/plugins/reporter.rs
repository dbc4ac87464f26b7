//! Test status collection and the JSON run report

use super::test_ident;
use crate::plugin::{worker_id, Plugin, PluginHooks};
use crate::store::{HookContext, HookResult, Updates};
use artifactor_common::{kwargs, Map, PluginConfig, Result, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// File written into the log directory
pub const REPORT_FILE: &str = "report.json";

const PHASE_ORDER: [&str; 3] = ["setup", "call", "teardown"];

/// `reporter` plugin
#[derive(Default)]
pub struct Reporter {
    only_failed: bool,
}

impl Plugin for Reporter {
    fn plugin_initialize(&mut self, hooks: &mut PluginHooks<Self>) {
        hooks.register_plugin_hook("start_test", Self::start_test);
        hooks.register_plugin_hook("finish_test", Self::finish_test);
        hooks.register_plugin_hook("report_test", Self::report_test);
        hooks.register_plugin_hook("build_report", Self::run_report);
        hooks.register_plugin_hook("finish_session", Self::run_report);
    }

    fn configure(&mut self, config: &PluginConfig) -> Result<()> {
        self.only_failed = config.bool_option("only_failed", false);
        Ok(())
    }
}

fn now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl Reporter {
    fn start_test(&mut self, ctx: &HookContext<'_>) -> HookResult {
        self.stamp(ctx, "start_time")
    }

    fn finish_test(&mut self, ctx: &HookContext<'_>) -> HookResult {
        self.stamp(ctx, "finish_time")
    }

    fn stamp(&self, ctx: &HookContext<'_>, field: &str) -> HookResult {
        let test = test_ident(ctx.str("test_location")?, ctx.str("test_name")?);
        let entry = kwargs! { field => now(), "slaveid" => worker_id(ctx)? };
        Ok(Some(Updates::global("artifacts", kwargs! { test => entry })))
    }

    fn report_test(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let test = test_ident(ctx.str("test_location")?, ctx.str("test_name")?);
        let when = ctx.str("test_when")?;
        let outcome = ctx.str("test_outcome")?;
        let xfail = ctx.opt_bool("test_xfail")?.unwrap_or(false);

        let status = Value::List(vec![Value::from(outcome), Value::from(xfail)]);
        let entry = kwargs! { "statuses" => kwargs! { when => status } };
        Ok(Some(Updates::global("artifacts", kwargs! { test => entry })))
    }

    fn run_report(&mut self, ctx: &HookContext<'_>) -> HookResult {
        let artifacts = ctx.map("artifacts")?;
        let log_dir = ctx.path("log_dir")?;

        let report = build_report(artifacts, &log_dir, self.only_failed);
        let path = log_dir.join(REPORT_FILE);
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| artifactor_common::Error::callback(ctx.caller(), e))?;
        std::fs::write(&path, body)?;
        info!(path = %path.display(), "Wrote test report");
        Ok(Some(Updates::local("report_path", path)))
    }
}

/// Overall status of one test from its per-phase `(outcome, xfail)` pairs.
///
/// The first phase (setup, call, teardown, then any other) matching a rule
/// decides: xfailed, xpassed, error, skipped, failed. Otherwise passed.
pub fn overall_status(statuses: &Map) -> &'static str {
    let mut phases: Vec<&String> = statuses.keys().filter(|k| k.as_str() != "overall").collect();
    phases.sort_by_key(|when| {
        PHASE_ORDER
            .iter()
            .position(|p| *p == when.as_str())
            .unwrap_or(PHASE_ORDER.len())
    });

    for when in phases {
        let Some(status) = statuses.get(when).and_then(Value::as_list) else {
            continue;
        };
        let outcome = status.first().and_then(Value::as_str).unwrap_or_default();
        let xfail = status.get(1).and_then(Value::as_bool).unwrap_or(false);
        let call = when == "call";

        if call && xfail && outcome == "skipped" {
            return "xfailed";
        } else if call && xfail && outcome == "failed" {
            return "xpassed";
        } else if (when == "setup" || when == "teardown") && outcome == "failed" {
            return "error";
        } else if outcome == "skipped" {
            return "skipped";
        } else if call && outcome == "failed" {
            return "failed";
        }
    }
    "passed"
}

/// Report document for an artifact index
pub fn build_report(artifacts: &Map, log_dir: &Path, only_failed: bool) -> Value {
    const STATUSES: [&str; 6] = ["passed", "failed", "skipped", "error", "xfailed", "xpassed"];
    let mut counts: BTreeMap<&str, i64> = STATUSES
        .into_iter()
        .map(|status| (status, 0))
        .collect();
    let prefix = format!("{}/", log_dir.to_string_lossy());
    let mut tests = Vec::new();

    // BTreeMap iteration keeps tests sorted by name
    for (name, test) in artifacts {
        let Some(statuses) = test.get("statuses").and_then(Value::as_map) else {
            continue;
        };
        if statuses.is_empty() {
            continue;
        }
        let overall = overall_status(statuses);
        *counts.entry(overall).or_default() += 1;

        let mut outcomes = statuses.clone();
        outcomes.insert("overall".into(), Value::from(overall));
        let mut entry = kwargs! {
            "name" => name,
            "outcomes" => outcomes,
            "slaveid" => test.get("slaveid").cloned().unwrap_or_else(|| Value::from("Unknown")),
        };

        if let Some(start) = test.get("start_time").and_then(Value::as_f64) {
            match test.get("finish_time").and_then(Value::as_f64) {
                Some(finish) => {
                    entry.insert("duration".into(), Value::from(finish - start));
                    entry.insert("in_progress".into(), Value::from(false));
                }
                None => {
                    entry.insert("duration".into(), Value::from(now() - start));
                    entry.insert("in_progress".into(), Value::from(true));
                }
            }
        }

        if let Some(files) = test.get("files").and_then(Value::as_map) {
            let relative: Map = files
                .iter()
                .map(|(ident, paths)| {
                    let paths = paths
                        .as_list()
                        .unwrap_or_default()
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|p| Value::from(p.strip_prefix(prefix.as_str()).unwrap_or(p)))
                        .collect::<Vec<_>>();
                    (ident.clone(), Value::List(paths))
                })
                .collect();
            entry.insert("files".into(), Value::Map(relative));
        }

        if only_failed && matches!(overall, "passed" | "skipped") {
            continue;
        }
        tests.push(Value::Map(entry));
    }

    let counts: Map = counts
        .into_iter()
        .map(|(status, n)| (status.to_string(), Value::Int(n)))
        .collect();
    Value::Map(kwargs! { "tests" => tests, "counts" => counts })
}
