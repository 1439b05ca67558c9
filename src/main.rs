//! Audio Extraction Server
//!
//! A Rust-based HTTP service that accepts a video upload, extracts its audio
//! track with FFmpeg and sends it back as an MP3 download.

mod config;
mod config_file;
mod error;
mod ffmpeg;
mod http;
mod integration;
mod job;
mod state;
mod transcode;
mod workspace;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "audio-extract-server";

/// Config file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let mut args = std::env::args().skip(1);
    let first = args.next();

    // `--init-config [path]` writes the default configuration and exits
    if first.as_deref() == Some("--init-config") {
        let path = args
            .next()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        crate::config_file::generate_default_config(&path)
            .map_err(|e| ServerError::Config(format!("cannot write {}: {}", path, e)))?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    // Load configuration
    let config_path = first.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, config_warning) = crate::config_file::load_server_config(&config_path);

    // Initialize logging
    init_logging(&config);
    if let Some(warning) = config_warning {
        tracing::warn!("{}", warning);
    }

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", ffmpeg::version_info());

    // Initialize FFmpeg
    ffmpeg::init()?;
    ffmpeg::install_log_filter();
    if !transcode::encoder::is_mp3_encoder_available() {
        tracing::warn!("This FFmpeg build has no MP3 encoder; every conversion will fail");
    }
    tracing::info!("FFmpeg initialized successfully");
    tracing::info!("Configuration loaded: {:?}", config);

    workspace::ensure_work_dir(&config.upload.work_dir)?;

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));
    spawn_sweeper(state.clone());

    // Build router
    let app = create_router(state);

    // Start server
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Config(format!("cannot bind {}: {}", addr, e)))?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodically remove finished job directories older than the retention period.
fn spawn_sweeper(state: Arc<AppState>) {
    let ttl = state.config.upload.retain_output();
    let period = state.config.upload.sweep_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let state = state.clone();
            let sweep = move || {
                workspace::sweep_expired(&state.config.upload.work_dir, ttl, &state.live_jobs)
            };
            match tokio::task::spawn_blocking(sweep).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => {
                    tracing::info!(removed, "Swept expired job directories");
                }
                Ok(Err(e)) => {
                    tracing::warn!("Workspace sweep failed: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Workspace sweep task failed: {}", e);
                }
            }
        }
    });
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_app_name_matches_package() {
        assert_eq!(APP_NAME, env!("CARGO_PKG_NAME"));
    }
}
