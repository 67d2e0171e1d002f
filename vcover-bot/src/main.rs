//! vcover-bot - voice cover chat bot
//!
//! Turns `rvc`/`svc` chat commands into voice-converted song clips. A chat
//! adapter posts inbound messages to `/messages` and relays the replies
//! published on `/events`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcover_bot::services::{build_song_search, GradioClient};
use vcover_bot::transport::EventBusTransport;
use vcover_bot::BotState;
use vcover_common::config::{resolve_config_path, TomlConfigStore};
use vcover_common::events::EventBus;
use vcover_common::ConfigStore;

/// Command-line arguments for vcover-bot
#[derive(Parser, Debug)]
#[command(name = "vcover-bot")]
#[command(about = "RVC/SVC voice cover chat bot")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "VCOVER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1", env = "VCOVER_BIND")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "VCOVER_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let store = Arc::new(
        TomlConfigStore::open(&config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?,
    );
    let config = store.current();

    // RUST_LOG wins over the configured level
    let default_filter = format!(
        "vcover_bot={0},vcover_common={0},tower_http=info",
        config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vcover-bot {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", store.path().display());
    info!("RVC backend: {}", config.base_url(vcover_common::BackendKind::Rvc));
    info!("SVC backend: {}", config.base_url(vcover_common::BackendKind::Svc));

    let search = build_song_search(&config).context("Failed to build song search client")?;
    let backend = Arc::new(GradioClient::new().context("Failed to build backend client")?);

    let event_bus = EventBus::new(256);
    let transport = Arc::new(EventBusTransport::new(event_bus.clone()));
    let state = BotState::new(store, search, backend, transport, event_bus);

    let app = vcover_bot::build_router(state);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
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
