//! Artifactor master
//!
//! Loads the configuration, builds the engine with the bundled plugins and
//! serves worker requests on a loopback port until told to stop.

use artifactor_common::{kwargs, Error};
use artifactor_daemon::{logging, Artifactor, DaemonConfig, PluginCatalog, Server};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "artifactor-server")]
#[command(about = "Artifactor master - collects per-test artifacts from test workers")]
#[command(version)]
struct Cli {
    /// Configuration file path (bare or with an `artifactor:` stanza)
    #[arg(short, long, default_value = "artifactor.yaml")]
    config: PathBuf,

    /// Server port, 0 picks a free one
    #[arg(short, long)]
    port: Option<u16>,

    /// Run id passed to start_session
    #[arg(long)]
    run_id: Option<String>,

    /// Log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Artifact root directory
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<Error>() {
            Some(fatal) if fatal.is_fatal() => {
                eprintln!("artifactor: {}", fatal);
                std::process::exit(fatal.exit_code());
            }
            _ => Err(err),
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = DaemonConfig::load(&cli.config)?
        .with_port(cli.port)
        .with_log_dir(cli.log_dir)
        .with_artifact_dir(cli.artifact_dir);
    config.run_id = cli.run_id;
    config.debug = cli.debug;

    config.prepare()?;
    logging::init(&config.log_file()?, config.debug)?;
    info!("Artifactor server v{}", env!("CARGO_PKG_VERSION"));

    let mut engine = Artifactor::new(config.artifactor.clone())?;
    engine.setup_plugin_instances(&PluginCatalog::builtin())?;
    engine.initialize()?;

    if !config.artifactor.server_enabled {
        if let Some(run_id) = config.run_id_value() {
            engine.fire_hook("start_session", kwargs! { "run_id" => run_id })?;
        }
        info!("Server disabled in configuration, nothing to serve");
        return Ok(());
    }

    let mut server = Server::bind(engine).await?;
    println!("{}", server.local_addr());

    if let Some(run_id) = config.run_id_value() {
        server
            .engine_mut()
            .fire_hook("start_session", kwargs! { "run_id" => run_id })?;
    }

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Artifactor server shutdown complete");
    Ok(())
}
