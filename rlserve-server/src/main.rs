// rlserve: policy server command-line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rlserve_server::config::{RuntimeConfig, ServerConfig, DEFAULT_CONFIG_PATH};
use rlserve_server::{clients, openapi, serve, AppState};

#[derive(Parser)]
#[command(name = "rlserve")]
#[command(about = "Serve reinforcement-learning policies over HTTP", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "RLSERVE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the API document, generate clients and start the server
    Serve,

    /// Only write the OpenAPI document
    Openapi,

    /// Write the API document, then generate and package client libraries
    Clients,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rlserve=info,warp=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn write_openapi(runtime: &RuntimeConfig) -> Result<()> {
    let doc = openapi::generate(runtime);
    openapi::write(&runtime.settings.output.openapi_path, &doc)
}

async fn build_clients(runtime: &RuntimeConfig) -> Result<()> {
    let output = &runtime.settings.output;
    clients::generate_clients(&runtime.settings.clients, &output.openapi_path, &output.clients_dir)
        .await?;
    let bytes = clients::package_clients(&output.clients_dir, &output.clients_archive)?;
    info!(
        archive = %output.clients_archive.display(),
        bytes = bytes.len(),
        "client libraries packaged"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let runtime = ServerConfig::load(&cli.config)?
        .compile()
        .context("Invalid server configuration")?;
    info!(
        config = %cli.config.display(),
        width = runtime.schema.width(),
        "configuration loaded"
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Openapi => write_openapi(&runtime),
        Commands::Clients => {
            write_openapi(&runtime)?;
            build_clients(&runtime).await
        }
        Commands::Serve => {
            write_openapi(&runtime)?;
            clients::generate_clients(
                &runtime.settings.clients,
                &runtime.settings.output.openapi_path,
                &runtime.settings.output.clients_dir,
            )
            .await?;

            let server = &runtime.settings.server;
            let addr: SocketAddr = format!("{}:{}", server.host, server.port)
                .parse()
                .with_context(|| format!("Invalid listen address {}:{}", server.host, server.port))?;

            let state = Arc::new(AppState::from_config(&runtime)?);
            serve(state, addr).await
        }
    }
}
