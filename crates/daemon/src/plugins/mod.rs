//! Bundled plugins

mod filedump;
mod logger;
mod reporter;

pub use filedump::FileDump;
pub use logger::Logger;
pub use reporter::{overall_status, Reporter};

use artifactor_common::{Map, Value};

/// Key of a test in the artifact index
pub fn test_ident(test_location: &str, test_name: &str) -> String {
    format!("{}/{}", test_location, test_name)
}

/// `artifacts` update recording `path` under `artifacts[test]["files"][ident]`.
///
/// `current` is the artifact index visible to the hook; the path is appended
/// to the list already recorded there.
pub(crate) fn file_entry(current: Option<&Value>, test: &str, ident: &str, path: &str) -> Map {
    let mut files: Vec<Value> = current
        .and_then(|artifacts| artifacts.pointer(&[test, "files", ident]))
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    let path = Value::from(path);
    if !files.contains(&path) {
        files.push(path);
    }

    let mut by_ident = Map::new();
    by_ident.insert(ident.to_string(), Value::List(files));
    let mut entry = Map::new();
    entry.insert("files".to_string(), Value::Map(by_ident));
    let mut artifacts = Map::new();
    artifacts.insert(test.to_string(), Value::Map(entry));
    artifacts
}
