use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mp4forge_core::{
    load_config, load_default_config, validate_config, ConversionSession, FfmpegEngine,
    TranscodeEngine,
};
use mp4forge_server::api::{create_router, spawn_progress_forwarder, WsBroadcaster};
use mp4forge_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("MP4FORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration, falling back to defaults when there is no file
    let config = if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        warn!("No config file at {:?}, using defaults", config_path);
        load_default_config().context("Failed to load default config")?
    };

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Engine core: {:?}", config.engine.core_path);

    // The engine is owned here and injected into the session
    let engine: Arc<dyn TranscodeEngine> = Arc::new(FfmpegEngine::new(config.engine.clone()));
    let session = Arc::new(ConversionSession::new(
        Arc::clone(&engine),
        config.progress.clone(),
    ));

    let ws_broadcaster = WsBroadcaster::default();
    info!("WebSocket broadcaster initialized");

    let forwarder = spawn_progress_forwarder(
        Arc::clone(&session),
        ws_broadcaster.clone(),
        config.progress.tick(),
    )
    .await;

    // Load the engine in the background; the API reports engine_loading meanwhile
    let loader = {
        let session = Arc::clone(&session);
        let broadcaster = ws_broadcaster.clone();
        tokio::spawn(async move {
            if let Err(e) = session.load_engine().await {
                error!("Engine unavailable, conversions are disabled: {}", e);
            }
            broadcaster.session_changed(&session.snapshot().await);
        })
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&session),
        ws_broadcaster,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    if !addr.ip().is_loopback() {
        warn!("Listening on non-loopback address {}", addr);
    }
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    loader.abort();
    session.dispose().await;
    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }

    engine.dispose().await;
    info!("Engine disposed");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
