//! mediaguard-analyze - offline deepfake analysis
//!
//! Runs one detector over a local file and prints the detection result as
//! JSON. Fallback results are valid outcomes and still exit 0.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mediaguard_common::TomlConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mediaguard_df::AppState;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Modality {
    Audio,
    Video,
}

#[derive(Parser, Debug)]
#[command(name = "mediaguard-analyze")]
#[command(about = "Analyze a local media file for deepfake manipulation")]
#[command(version, long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (git ",
    env!("MEDIAGUARD_GIT_COMMIT"),
    ")"
))]
struct Args {
    /// Detector to run
    #[arg(value_enum)]
    modality: Modality,

    /// Media file to analyze
    path: PathBuf,

    /// Classification threshold applied to the fused confidence
    #[arg(long)]
    threshold: Option<f64>,

    /// Learned audio model artifact
    #[arg(long, env = "MEDIAGUARD_AUDIO_MODEL")]
    audio_model: Option<PathBuf>,

    /// Learned per-frame video model artifact
    #[arg(long, env = "MEDIAGUARD_VIDEO_MODEL")]
    video_model: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    let settings = &mut config.detection;
    if let Some(threshold) = args.threshold {
        settings.threshold = threshold;
    }
    if args.audio_model.is_some() {
        settings.audio_model_path = args.audio_model;
    }
    if args.video_model.is_some() {
        settings.video_model_path = args.video_model;
    }
    settings.validate().context("Invalid detection settings")?;

    let state = AppState::from_settings(settings);
    let result = match args.modality {
        Modality::Audio => state.audio.detect(&args.path),
        Modality::Video => {
            let detector = state
                .video
                .as_ref()
                .context("Video detection needs ffmpeg and ffprobe on this host")?;
            detector.detect(&args.path)
        }
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);
    Ok(())
}
