//! tagbox server - main entry point
//!
//! NFC-triggered music box with a synchronized browser control surface:
//! HTTP commands in, SSE event stream out, everything stamped and fanned out
//! through the synchronization core.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagbox_server::api;
use tagbox_server::config::ServerConfig;
use tagbox_server::state::AppContext;
use tagbox_server::tasks;

/// Command-line arguments for tagbox-server
#[derive(Parser, Debug)]
#[command(name = "tagbox-server")]
#[command(about = "NFC music box server with synchronized browser control")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "TAGBOX_PORT")]
    port: Option<u16>,

    /// Root folder for music files (overrides the config file)
    #[arg(short, long, env = "TAGBOX_MUSIC_ROOT")]
    music_root: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "TAGBOX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagbox_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(music_root) = args.music_root {
        config.music_root = music_root;
    }

    info!("Starting tagbox server on port {}", config.port);
    info!("Music root: {}", config.music_root.display());

    let port = config.port;
    let ctx = AppContext::initialize(config)
        .await
        .context("Failed to initialize server components")?;

    tasks::spawn_sweepers(ctx.clone());

    let app = api::create_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
