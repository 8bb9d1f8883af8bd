//! songid-listener - "what song is playing?" service
//!
//! **Subcommands:**
//! - `serve`: replay a file as the live stream, identify periodically, serve HTTP + SSE
//! - `identify`: capture one clip from a file and run it through the pipeline
//! - `cache list` / `cache clear`: inspect or reset the local match cache

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use songid_common::config::{
    default_config_path, RootFolderInitializer, RootFolderResolver, DATABASE_FILE_NAME,
};
use songid_listener::config::{ListenerConfig, MODULE_NAME};
use songid_listener::pipeline::{open_cache, Pipeline};
use songid_listener::services::{AutoListener, CaptureController, FileAudioSource, SettingsUpdate};
use songid_listener::{build_router, AppState};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line arguments for songid-listener
#[derive(Parser, Debug)]
#[command(name = "songid-listener")]
#[command(about = "Identifies the song playing on a live audio stream")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to the per-user config directory)
    #[arg(short, long, env = "SONGID_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and file cache
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an audio file as the live stream and serve the HTTP API
    Serve {
        /// Audio file standing in for the microphone (looped)
        #[arg(short, long)]
        source: PathBuf,

        /// Port to listen on (overrides [server] port)
        #[arg(short, long, env = "SONGID_PORT")]
        port: Option<u16>,
    },

    /// Identify the song at the start of an audio file
    Identify {
        file: PathBuf,
    },

    /// Inspect or reset the local match cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print every entry as JSON, most recent first
    List,
    /// Remove every entry
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(MODULE_NAME));
    let config = ListenerConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    songid_common::logging::init_tracing(&config.logging)?;

    info!("Starting songid-listener v{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    info!("Config: {}", config_path.display());

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(cli.root_folder.clone())
        .with_toml_root(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", initializer.root_folder().display());

    match cli.command {
        Command::Serve { source, port } => {
            serve(&config, initializer.root_folder(), &source, port).await
        }
        Command::Identify { file } => identify(&config, initializer.root_folder(), &file).await,
        Command::Cache { action } => cache(&config, initializer.root_folder(), action).await,
    }
}

async fn serve(
    config: &ListenerConfig,
    root_folder: &Path,
    source_path: &Path,
    port: Option<u16>,
) -> Result<()> {
    let source = FileAudioSource::open(source_path, true)?;
    let capture = CaptureController::new(source.stream(), config.identify.capture_duration_ms);
    let pipeline = Pipeline::build(config, root_folder, Arc::new(capture)).await?;

    let cancel = CancellationToken::new();
    let source_task = source.spawn(cancel.clone());
    let listener_task = AutoListener::new(
        pipeline.orchestrator.clone(),
        Duration::from_secs(config.identify.listen_interval_secs),
    )
    .spawn(cancel.clone());

    let app = build_router(AppState::from_pipeline(&pipeline));

    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pipeline.orchestrator.shutdown();
    cancel.cancel();
    let _ = tokio::join!(source_task, listener_task);

    info!("Server shutdown complete");
    Ok(())
}

async fn identify(config: &ListenerConfig, root_folder: &Path, file: &Path) -> Result<()> {
    let source = FileAudioSource::open(file, false)?.wait_for_listener(true);
    let capture = CaptureController::new(source.stream(), config.identify.capture_duration_ms);
    let pipeline = Pipeline::build(config, root_folder, Arc::new(capture)).await?;

    // One-shot identification ignores a persisted "disabled" flag
    pipeline.orchestrator.update_settings(SettingsUpdate {
        enabled: Some(true),
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let source_task = source.spawn(cancel.clone());

    let result = pipeline.orchestrator.identify_now().await?;
    pipeline.orchestrator.shutdown();
    cancel.cancel();
    let _ = source_task.await;

    match result {
        Some(song) => println!("{}", serde_json::to_string_pretty(&song)?),
        None => println!("not identified"),
    }
    Ok(())
}

async fn cache(config: &ListenerConfig, root_folder: &Path, action: CacheAction) -> Result<()> {
    let db = songid_listener::db::init_database_pool(&root_folder.join(DATABASE_FILE_NAME)).await?;
    let cache = open_cache(config, root_folder, &db);

    match action {
        CacheAction::List => {
            let entries = cache.entries().await;
            for entry in &entries {
                println!("{}", serde_json::to_string(entry)?);
            }
            info!(size = entries.len(), "Listed match cache");
        }
        CacheAction::Clear => cache.clear().await?,
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
