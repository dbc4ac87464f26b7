//! Artifactor CLI - Main Entry Point
//!
//! Fires hooks on a running master, checks that it is up, or stops it.

use artifactor_cli::{client::ArtifactorClient, output, parse_kwarg};
use artifactor_common::{ArtifactorConfig, Map, Value};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Artifactor CLI - talk to an Artifactor master
#[derive(Parser)]
#[command(name = "artifactor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Master address (host:port)
    #[arg(long, env = "ARTIFACTOR_ADDR", global = true)]
    addr: Option<String>,

    /// Read the master address from this configuration file instead
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    timeout: u64,

    /// Output format
    #[arg(long, default_value = "plain", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fire a hook
    Fire {
        /// Event name
        event: String,

        /// Keyword argument as key=value (repeatable)
        #[arg(short = 'a', long = "arg", value_parser = parse_kwarg)]
        args: Vec<(String, Value)>,

        /// Wait for the dispatch and print its event-local data
        #[arg(short, long)]
        wait: bool,
    },

    /// Check that the master is answering
    Ping,

    /// Stop the master
    Stop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let client = match (&cli.addr, &cli.config) {
        (Some(addr), _) => ArtifactorClient::connect(addr).await,
        (None, Some(path)) => ArtifactorClient::from_config(&ArtifactorConfig::load(path)?).await,
        (None, None) => anyhow::bail!("either --addr or --config is required"),
    };
    let client = match client {
        Ok(client) => client.with_timeout(Duration::from_secs(cli.timeout)),
        Err(e) => {
            output::print_error(&format!("Cannot connect to artifactor: {}", e));
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Fire { event, args, wait } => {
            let kwargs: Map = args.into_iter().collect();
            if wait {
                let local = client.fire_hook_with_result(&event, kwargs).await?;
                output::print_value(&Value::Map(local), cli.format);
            } else {
                client.fire_hook(&event, kwargs).await?;
            }
        }
        Commands::Ping => {
            if client.health_check().await {
                output::print_success(&format!("Artifactor is running at {}", client.addr()));
            } else {
                output::print_error(&format!("Artifactor is not responding at {}", client.addr()));
                std::process::exit(1);
            }
        }
        Commands::Stop => {
            client.terminate().await?;
            output::print_success("Artifactor stopped");
        }
    }

    Ok(())
}
