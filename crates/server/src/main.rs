//! DEEPWELL server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deepwell_core::config::ServerConfig;
use deepwell_server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "deepwelld")]
#[command(about = "deepwelld is the DEEPWELL file server program")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start serving the DEEPWELL server.
    Serve {
        /// The server config TOML file.
        #[arg(short, long, default_value = ".deepwell.toml")]
        config: PathBuf,
    },
    /// Display the deepwelld version.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!(
                "deepwelld {} {}",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            );
            Ok(())
        }
        Commands::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = ServerConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    init_logging(&config)?;

    tracing::info!("deepwelld v{}", env!("CARGO_PKG_VERSION"));

    let server = Arc::new(
        Server::bind(&config)
            .await
            .context("failed to start server")?,
    );
    tracing::info!(addr = %server.local_addr(), "listening");

    let accept = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve().await })
    };

    shutdown_signal().await;
    server.stop();
    accept.await?.context("accept loop failed")?;
    Ok(())
}

/// Initialize tracing from the `[Logging]` section. `Level = "none"`
/// silences everything, `"error"` keeps errors only, anything else enables
/// full informational logging. `RUST_LOG` still overrides.
fn init_logging(config: &ServerConfig) -> Result<()> {
    let default_filter = match config.logging.level.as_str() {
        "none" => "off",
        "error" => "error",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Wait for any of the shutdown signals.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        let mut hangup = signal(SignalKind::hangup()).expect("failed to install signal handler");
        let mut quit = signal(SignalKind::quit()).expect("failed to install signal handler");
        tokio::select! {
            _ = terminate.recv() => {}
            _ = hangup.recv() => {}
            _ = quit.recv() => {}
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("received termination signal, shutting down");
}
