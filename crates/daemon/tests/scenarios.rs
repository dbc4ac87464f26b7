//! End-to-end runs against the in-process engine with the bundled plugins

use artifactor_common::{kwargs, ArtifactorConfig, Error, PluginConfig, Value, FATAL_EXIT_CODE};
use artifactor_daemon::{Artifactor, PluginCatalog};
use std::path::PathBuf;
use tempfile::TempDir;

fn artifactor(tmp: &TempDir, configure: impl FnOnce(&mut ArtifactorConfig)) -> Artifactor {
    let mut config = ArtifactorConfig::with_dirs(tmp.path().join("l"), tmp.path().join("a"));
    configure(&mut config);
    let mut engine = Artifactor::new(config).unwrap();
    engine.setup_plugin_instances(&PluginCatalog::builtin()).unwrap();
    engine.initialize().unwrap();
    engine
}

fn with_filedump(config: &mut ArtifactorConfig) {
    config
        .plugins
        .insert("filedump".into(), PluginConfig::enabled("filedump"));
}

fn artifact_root(tmp: &TempDir) -> PathBuf {
    tmp.path().join("a")
}

#[test]
fn empty_run_creates_only_the_artifact_root() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |_| {});

    engine.fire_hook("start_session", kwargs! { "run_id" => 7 }).unwrap();
    engine.fire_hook("finish_session", kwargs! {}).unwrap();

    let root = artifact_root(&tmp);
    assert!(root.is_dir());
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    assert_eq!(engine.global().get("old_artifacts"), Some(&Value::map()));
    assert_eq!(engine.global().get("run_id"), Some(&Value::Int(7)));
}

#[test]
fn single_test_with_filedump() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, with_filedump);
    let test = kwargs! { "test_name" => "t1", "test_location" => "mod/sub" };

    engine.fire_hook("start_session", kwargs! { "run_id" => 3 }).unwrap();
    engine.fire_hook("start_test", test.clone()).unwrap();
    let local = engine
        .fire_hook(
            "filedump",
            kwargs! {
                "test_name" => "t1",
                "test_location" => "mod/sub",
                "filename" => "out.txt",
                "contents" => "hello",
                "fd_ident" => "k",
                "mode" => "w",
            },
        )
        .unwrap();
    engine.fire_hook("finish_test", test).unwrap();

    let path = artifact_root(&tmp).join("mod/sub/t1/filedump-out.txt");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    assert_eq!(local.get("filename"), Some(&Value::from(path.as_path())));

    let files = engine
        .global()
        .get("artifacts")
        .and_then(|a| a.pointer(&["mod/sub/t1", "files", "k"]))
        .and_then(Value::as_list)
        .unwrap();
    assert_eq!(files, &[Value::from(path.as_path())]);
}

#[test]
fn base64_payload_is_decoded() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, with_filedump);

    engine
        .fire_hook("start_test", kwargs! { "test_name" => "t1", "test_location" => "mod/sub" })
        .unwrap();
    engine
        .fire_hook(
            "filedump",
            kwargs! {
                "test_name" => "t1",
                "test_location" => "mod/sub",
                "filename" => "blob.bin",
                "contents" => "AAEC",
                "contents_base64" => true,
            },
        )
        .unwrap();

    let path = artifact_root(&tmp).join("mod/sub/t1/filedump-blob.bin");
    assert_eq!(std::fs::read(path).unwrap(), vec![0u8, 1, 2]);
}

#[test]
fn append_mode_extends_the_file() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, with_filedump);
    let dump = |mode: &str, contents: &str| {
        kwargs! {
            "test_name" => "t1",
            "test_location" => "mod",
            "filename" => "log.txt",
            "contents" => contents,
            "mode" => mode,
        }
    };

    engine.fire_hook("filedump", dump("w", "one\n")).unwrap();
    engine.fire_hook("filedump", dump("a", "two\n")).unwrap();

    let path = artifact_root(&tmp).join("mod/t1/filedump-log.txt");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    let files = engine
        .global()
        .get("artifacts")
        .and_then(|a| a.pointer(&["mod/t1", "files", "filedump"]))
        .and_then(Value::as_list)
        .unwrap();
    assert_eq!(files.len(), 1);
}

#[test]
fn per_run_layout_nests_under_run_id() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| config.per_run = Some("run".into()));

    engine.fire_hook("start_session", kwargs! { "run_id" => 99 }).unwrap();
    let local = engine
        .fire_hook("start_test", kwargs! { "test_name" => "z", "test_location" => "x/y" })
        .unwrap();

    let expected = artifact_root(&tmp).join("99/x/y/z");
    assert_eq!(local.get("artifact_path"), Some(&Value::from(expected.as_path())));
    assert!(expected.is_dir());
}

#[test]
fn per_test_layout_puts_run_id_last() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| config.per_run = Some("test".into()));

    engine.fire_hook("start_session", kwargs! { "run_id" => 99 }).unwrap();
    let local = engine
        .fire_hook("start_test", kwargs! { "test_name" => "z", "test_location" => "x/y" })
        .unwrap();

    let expected = artifact_root(&tmp).join("x/y/z/99");
    assert_eq!(local.get("artifact_path"), Some(&Value::from(expected.as_path())));
}

#[test]
fn new_session_moves_later_tests_under_its_run_id() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| config.per_run = Some("run".into()));

    engine.fire_hook("start_session", kwargs! { "run_id" => 3 }).unwrap();
    let local = engine.fire_hook("start_session", kwargs! { "run_id" => 5 }).unwrap();
    assert_eq!(local.get("run_id"), Some(&Value::Int(5)));
    assert_eq!(engine.global().get("run_id"), Some(&Value::Int(5)));

    let local = engine
        .fire_hook("start_test", kwargs! { "test_name" => "t", "test_location" => "m" })
        .unwrap();
    let expected = artifact_root(&tmp).join("5/m/t");
    assert_eq!(local.get("artifact_path"), Some(&Value::from(expected.as_path())));
}

#[test]
fn worker_supplied_segments_stay_under_the_artifact_root() {
    let tmp = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| {
        config.per_run = Some("run".into());
        config.reuse_dir = true;
    });
    let root = artifact_root(&tmp);

    let run_id = elsewhere.path().display().to_string();
    engine.fire_hook("start_session", kwargs! { "run_id" => run_id }).unwrap();
    for name in ["t1", "..", "."] {
        let local = engine
            .fire_hook("start_test", kwargs! { "test_name" => name, "test_location" => "mod" })
            .unwrap();
        let path = PathBuf::from(local.get("artifact_path").and_then(Value::as_str).unwrap());
        assert!(path.starts_with(&root), "{}", path.display());
        assert!(path.components().all(|c| c != std::path::Component::ParentDir));
        assert!(path.is_dir());
    }
    assert_eq!(std::fs::read_dir(elsewhere.path()).unwrap().count(), 0);
}

#[test]
fn test_names_are_sanitized() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |_| {});

    engine
        .fire_hook(
            "start_test",
            kwargs! { "test_name" => "te st/na__me[1]", "test_location" => "mod" },
        )
        .unwrap();

    assert!(artifact_root(&tmp).join("mod").join("te_st_na_me[1]").is_dir());
}

#[test]
fn collision_without_reuse_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| config.reuse_dir = false);
    let test = kwargs! { "test_name" => "t1", "test_location" => "mod" };

    engine.fire_hook("start_test", test.clone()).unwrap();
    let err = engine.fire_hook("start_test", test).unwrap_err();

    assert!(matches!(err, Error::DirectoryCollision(_)));
    assert_eq!(err.exit_code(), FATAL_EXIT_CODE);
}

#[test]
fn collision_with_reuse_continues() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| config.reuse_dir = true);
    let test = kwargs! { "test_name" => "t1", "test_location" => "mod" };

    engine.fire_hook("pre_start_test", test.clone()).unwrap();
    engine.fire_hook("start_test", test.clone()).unwrap();
    engine.fire_hook("finish_test", test).unwrap();
}

#[test]
fn full_lifecycle_with_logger_and_reporter() {
    let tmp = TempDir::new().unwrap();
    let mut engine = artifactor(&tmp, |config| {
        config.reuse_dir = true;
        let logger = PluginConfig::enabled("logger").with_option("timestamps", false);
        config.plugins.insert("logger".into(), logger);
        config.plugins.insert("reporter".into(), PluginConfig::enabled("reporter"));
    });
    let test = |name: &str| {
        kwargs! { "test_name" => name, "test_location" => "mod", "slaveid" => "gw0" }
    };
    let report = |name: &str, when: &str, outcome: &str| {
        kwargs! {
            "test_name" => name,
            "test_location" => "mod",
            "test_when" => when,
            "test_outcome" => outcome,
            "test_xfail" => false,
        }
    };

    engine.fire_hook("start_session", kwargs! { "run_id" => 1 }).unwrap();

    engine.fire_hook("start_test", test("t1")).unwrap();
    engine
        .fire_hook(
            "log_message",
            kwargs! { "message" => "logging in", "level" => "info", "slaveid" => "gw0" },
        )
        .unwrap();
    engine.fire_hook("report_test", report("t1", "call", "passed")).unwrap();
    engine.fire_hook("finish_test", test("t1")).unwrap();

    engine.fire_hook("start_test", test("t2")).unwrap();
    engine.fire_hook("report_test", report("t2", "setup", "failed")).unwrap();
    engine.fire_hook("finish_test", test("t2")).unwrap();

    let local = engine.fire_hook("finish_session", kwargs! {}).unwrap();

    let log = artifact_root(&tmp).join("mod/t1/logger.log");
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "[INFO] logging in\n");
    let artifacts = engine.global().get("artifacts").unwrap();
    assert_eq!(
        artifacts.pointer(&["mod/t1", "files", "logger"]),
        Some(&Value::List(vec![Value::from(log.as_path())]))
    );
    assert_eq!(
        artifacts.pointer(&["mod/t1", "slaveid"]),
        Some(&Value::from("gw0"))
    );

    let report_path = tmp.path().join("l").join("report.json");
    assert_eq!(local.get("report_path"), Some(&Value::from(report_path.as_path())));
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["counts"]["passed"], 1);
    assert_eq!(report["counts"]["error"], 1);
    assert_eq!(report["tests"][0]["name"], "mod/t1");
    assert_eq!(report["tests"][0]["in_progress"], false);
    assert_eq!(report["tests"][1]["outcomes"]["overall"], "error");

    let old = engine.global().get("old_artifacts").unwrap();
    assert!(old.get("mod/t1").is_some());
    assert!(old.get("mod/t2").is_some());
}
