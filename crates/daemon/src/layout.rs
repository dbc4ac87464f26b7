//! Per-test artifact directory layout

use artifactor_common::{Error, PerRun, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-\[\]]").expect("valid regex"));
static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").expect("valid regex"));

/// Make a test name safe to use as a single path component.
///
/// Every character outside `[A-Za-z0-9_.-[]]` (path separators included)
/// becomes `_`, then runs of `_` collapse to one. Names that would still
/// refer to the current or parent directory become `_`.
pub fn sanitize_test_name(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    match collapsed.as_ref() {
        "" | "." | ".." => "_".to_string(),
        _ => collapsed.into_owned(),
    }
}

/// Where artifacts of one test live under an artifact root
#[derive(Debug, Clone)]
pub struct ArtifactLayout<'a> {
    pub root: &'a Path,
    pub per_run: Option<PerRun>,
    pub run_id: Option<&'a str>,
}

impl<'a> ArtifactLayout<'a> {
    /// Directory for `test_name` at `test_location`.
    ///
    /// * `per_run: run`  -> `root/run_id/location/name`
    /// * `per_run: test` -> `root/location/name/run_id`
    /// * otherwise       -> `root/location/name`
    ///
    /// The run id level is left out when no run id is known. The run id and
    /// the name are sanitized to single components. The location keeps its
    /// `/` separators but only its normal components are used. The result
    /// always stays under the root.
    pub fn test_dir(&self, test_location: &str, test_name: &str) -> PathBuf {
        let name = sanitize_test_name(test_name);
        let run_id = self.run_id.map(sanitize_test_name);
        let mut path = self.root.to_path_buf();

        if let (Some(PerRun::Run), Some(run_id)) = (self.per_run, &run_id) {
            path.push(run_id);
        }
        for component in Path::new(test_location).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path.push(name);
        if let (Some(PerRun::Test), Some(run_id)) = (self.per_run, &run_id) {
            path.push(run_id);
        }
        path
    }
}

/// Create a test directory.
///
/// An existing directory is a collision unless `reuse` is set.
pub fn setup_dir(path: &Path, reuse: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::create_dir(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Created artifact directory");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            if reuse && path.is_dir() {
                debug!(path = %path.display(), "Reusing artifact directory");
                Ok(())
            } else {
                Err(Error::DirectoryCollision(path.to_path_buf()))
            }
        }
        Err(err) => Err(err.into()),
    }
}
