//! lobit-ingest - release archive ingestion service
//!
//! Downloads release archives, previews their metadata, publishes the files,
//! commits the release to the site database and mirrors it to archive.org.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lobit_common::config::{self as common_config, TomlConfig};
use lobit_ingest::config::IngestConfig;
use lobit_ingest::services::{PipelineComponents, ReleaseService};
use lobit_ingest::AppState;

/// Command-line arguments for lobit-ingest
#[derive(Parser, Debug)]
#[command(name = "lobit-ingest")]
#[command(about = "Release archive ingestion service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LOBIT_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and scratch area
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "LOBIT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("lobit_ingest={0},lobit_common={0},tower_http=info", toml_config.logging.level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lobit-ingest (release ingestion)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = common_config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    common_config::ensure_root_folder(&root_folder)
        .with_context(|| format!("Failed to initialize root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let config = IngestConfig::resolve(&root_folder, &toml_config, args.port);
    std::fs::create_dir_all(&config.tmp_directory)
        .with_context(|| format!("Failed to create {}", config.tmp_directory.display()))?;
    info!("Scratch directory: {}", config.tmp_directory.display());
    info!("Public root: {}", config.public_root.display());
    if config.archive_org.is_none() {
        warn!("archive.org submission disabled");
    }

    let db_path = common_config::database_path(&root_folder);
    let db_pool = lobit_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database: {}", db_path.display());

    let components =
        PipelineComponents::from_config(&config).context("Failed to set up pipeline")?;
    let service = Arc::new(ReleaseService::start(db_pool.clone(), components));

    let app = lobit_ingest::build_router(AppState::new(db_pool, service));

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
