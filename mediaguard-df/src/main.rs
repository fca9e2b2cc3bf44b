//! mediaguard-df - Deepfake Detection Microservice
//!
//! Serves audio and video deepfake detection over HTTP. Each upload runs
//! the multi-signal fusion pipeline on the blocking pool, with a small
//! bound on detections in flight.

use anyhow::{Context, Result};
use clap::Parser;
use mediaguard_common::{LoggingConfig, TomlConfig};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mediaguard_df::{build_info, AppState};

/// Command-line arguments for mediaguard-df
#[derive(Parser, Debug)]
#[command(name = "mediaguard-df")]
#[command(about = "Deepfake detection microservice")]
#[command(version)]
struct Args {
    /// Path to configuration file; must exist
    ///
    /// Without it the config is discovered, starting with $MEDIAGUARD_CONFIG,
    /// which is ignored with a warning when it names a missing file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "MEDIAGUARD_HOST")]
    host: Option<String>,

    /// HTTP server port
    #[arg(short, long, env = "MEDIAGUARD_PORT")]
    port: Option<u16>,

    /// Classification threshold applied to the fused confidence
    #[arg(long, env = "MEDIAGUARD_THRESHOLD")]
    threshold: Option<f64>,

    /// Learned audio model artifact
    #[arg(long, env = "MEDIAGUARD_AUDIO_MODEL")]
    audio_model: Option<PathBuf>,

    /// Learned per-frame video model artifact
    #[arg(long, env = "MEDIAGUARD_VIDEO_MODEL")]
    video_model: Option<PathBuf>,

    /// Maximum detections running at the same time
    #[arg(long, env = "MEDIAGUARD_DF_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| "mediaguard_df=info,tower_http=info".into());

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(threshold) = args.threshold {
        config.detection.threshold = threshold;
    }
    if args.audio_model.is_some() {
        config.detection.audio_model_path = args.audio_model;
    }
    if args.video_model.is_some() {
        config.detection.video_model_path = args.video_model;
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config.detection.max_concurrency = max_concurrency;
    }
    config
        .detection
        .validate()
        .context("Invalid detection settings")?;

    init_tracing(&config.logging)?;

    info!("Starting mediaguard-df (Deepfake Detection) microservice");
    info!("Version: {}", build_info::BUILD);

    let state = AppState::from_settings(&config.detection);
    state.warm_models().await;
    info!(
        audio_model = state.audio_model.status().as_str(),
        video_model = state.video_model.status().as_str(),
        "Model handles initialized"
    );

    let app = mediaguard_df::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("mediaguard-df stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_config_flag_is_not_read_from_env() {
        let command = Args::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert!(config.get_env().is_none());

        let port = command
            .get_arguments()
            .find(|arg| arg.get_id() == "port")
            .unwrap();
        assert_eq!(port.get_env(), Some(std::ffi::OsStr::new("MEDIAGUARD_PORT")));
    }

    #[test]
    fn test_explicit_config_flag() {
        let args = Args::try_parse_from(["mediaguard-df", "--config", "/etc/mediaguard/df.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/mediaguard/df.toml")));
    }
}
