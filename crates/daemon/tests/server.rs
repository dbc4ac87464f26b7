//! Loopback server driven through the client

use artifactor_cli::ArtifactorClient;
use artifactor_common::protocol::{self, Request, Response};
use artifactor_common::{kwargs, ArtifactorConfig, Error, PluginConfig, Value, FATAL_EXIT_CODE};
use artifactor_daemon::{Artifactor, PluginCatalog, Server};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

async fn start(tmp: &TempDir) -> (SocketAddr, JoinHandle<artifactor_common::Result<()>>) {
    let config = ArtifactorConfig::with_dirs(tmp.path().join("l"), tmp.path().join("a"))
        .with_plugin("filedump", PluginConfig::enabled("filedump"));
    let mut engine = Artifactor::new(config).unwrap();
    engine.setup_plugin_instances(&PluginCatalog::builtin()).unwrap();
    engine.initialize().unwrap();

    let server = Server::bind(engine).await.unwrap();
    let addr = server.local_addr();
    (addr, tokio::spawn(server.run()))
}

#[tokio::test]
async fn client_round_trip_and_shutdown() {
    let tmp = TempDir::new().unwrap();
    let (addr, handle) = start(&tmp).await;
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);

    let client = ArtifactorClient::connect(&addr.to_string()).await.unwrap();
    client.ping().await.unwrap();

    let test = kwargs! { "test_name" => "t1", "test_location" => "mod" };
    let local = client.fire_hook_with_result("start_test", test).await.unwrap();
    let test_dir = tmp.path().join("a/mod/t1");
    assert_eq!(local.get("artifact_path"), Some(&Value::from(test_dir.as_path())));

    client
        .fire_hook(
            "filedump",
            kwargs! {
                "test_name" => "t1",
                "test_location" => "mod",
                "filename" => "out.txt",
                "contents" => "over the wire",
            },
        )
        .await
        .unwrap();
    // Dispatches run in arrival order, so this returns after the filedump
    client.fire_hook_with_result("sync", kwargs! {}).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(test_dir.join("filedump-out.txt")).unwrap(),
        "over the wire"
    );

    client.terminate().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn callback_errors_are_reported_and_serving_continues() {
    let tmp = TempDir::new().unwrap();
    let (addr, handle) = start(&tmp).await;
    let client = ArtifactorClient::connect(&addr.to_string()).await.unwrap();

    let err = client
        .fire_hook_with_result(
            "filedump",
            kwargs! {
                "test_name" => "t1",
                "test_location" => "mod",
                "filename" => "out.txt",
                "contents" => "x",
                "mode" => "rw",
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote(_)), "{:?}", err);

    assert!(client.health_check().await);
    client.terminate().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_frame_keeps_the_connection() {
    let tmp = TempDir::new().unwrap();
    let (addr, handle) = start(&tmp).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, protocol::codec());

    framed.send(Bytes::from_static(b"\xc1\xc1\xc1")).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    match protocol::decode::<Response>(&frame).unwrap() {
        Response::Error(message) => assert!(message.starts_with("malformed request")),
        other => panic!("unexpected response: {:?}", other),
    }

    framed.send(protocol::encode(&Request::Ping).unwrap()).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    assert!(matches!(protocol::decode::<Response>(&frame).unwrap(), Response::Pong));

    drop(framed);
    ArtifactorClient::connect(&addr.to_string())
        .await
        .unwrap()
        .terminate()
        .await
        .unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_clients_are_serialized() {
    let tmp = TempDir::new().unwrap();
    let (addr, handle) = start(&tmp).await;

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let addr = addr.to_string();
        tasks.push(tokio::spawn(async move {
            let client = Arc::new(ArtifactorClient::connect(&addr).await.unwrap());
            for n in 0..4 {
                let name = format!("t{}_{}", worker, n);
                client
                    .fire_hook_with_result(
                        "start_test",
                        kwargs! {
                            "test_name" => name,
                            "test_location" => "mod",
                            "slaveid" => format!("gw{}", worker),
                        },
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(std::fs::read_dir(tmp.path().join("a/mod")).unwrap().count(), 32);
    ArtifactorClient::connect(&addr.to_string())
        .await
        .unwrap()
        .terminate()
        .await
        .unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn non_loopback_address_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut config = ArtifactorConfig::with_dirs(tmp.path().join("l"), tmp.path().join("a"));
    config.server_address = "0.0.0.0".to_string();
    let engine = Artifactor::new(config).unwrap();

    let err = Server::bind(engine).await.err().unwrap();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn server_binary_exits_on_directory_collision() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("artifactor.yaml");
    std::fs::write(
        &config,
        format!(
            "artifactor:\n  log_dir: {}\n  artifact_dir: {}\n  reuse_dir: false\n",
            tmp.path().join("l").display(),
            tmp.path().join("a").display()
        ),
    )
    .unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_artifactor-server"))
        .arg("--config")
        .arg(&config)
        .args(["--port", "0"])
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // The bound address is the first line that parses as one
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let addr: SocketAddr = loop {
        let line = lines.next().expect("server exited before binding").unwrap();
        if let Ok(addr) = line.trim().parse() {
            break addr;
        }
    };
    std::thread::spawn(move || lines.for_each(drop));

    let client = ArtifactorClient::connect(&addr.to_string()).await.unwrap();
    let test = kwargs! { "test_name" => "t1", "test_location" => "mod" };
    client.fire_hook_with_result("start_test", test.clone()).await.unwrap();
    // The reply may lose the race with process exit, any failure will do
    assert!(client.fire_hook_with_result("start_test", test).await.is_err());

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(FATAL_EXIT_CODE));
}
