//! Configuration loading and config file discovery
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Command-line and environment handling lives in the binaries (clap `env`
//! attributes). This module owns the TOML layer and the defaults beneath it.
//! A missing TOML file is not an error: the service starts on defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MEDIAGUARD_CONFIG";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change while the service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Detection pipeline settings (optional)
    #[serde(default)]
    pub detection: DetectionSettings,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logging: LoggingConfig::default(),
            detection: DetectionSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Detection pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Classification threshold applied to the fused confidence
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Maximum number of detections running at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upload size limit in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Learned audio model artifact (optional)
    #[serde(default)]
    pub audio_model_path: Option<PathBuf>,

    /// Learned per-frame video model artifact (optional)
    #[serde(default)]
    pub video_model_path: Option<PathBuf>,

    /// Directory of per-video landmark sidecar files (optional)
    #[serde(default)]
    pub landmarks_path: Option<PathBuf>,

    /// Sample rate every decoded audio stream is resampled to
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,

    /// Longest audio span analyzed (centered segment beyond this)
    #[serde(default = "default_max_audio_seconds")]
    pub max_audio_seconds: f64,

    /// Longest video span analyzed (centered segment beyond this)
    #[serde(default = "default_max_video_seconds")]
    pub max_video_seconds: f64,

    /// Video frame sampling rate for landmark analysis
    #[serde(default = "default_video_sample_fps")]
    pub video_sample_fps: f64,

    /// ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_concurrency: default_max_concurrency(),
            max_upload_mb: default_max_upload_mb(),
            audio_model_path: None,
            video_model_path: None,
            landmarks_path: None,
            target_sample_rate: default_target_sample_rate(),
            max_audio_seconds: default_max_audio_seconds(),
            max_video_seconds: default_max_video_seconds(),
            video_sample_fps: default_video_sample_fps(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

impl DetectionSettings {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "detection.threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config(
                "detection.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_upload_mb == 0 {
            return Err(Error::Config(
                "detection.max_upload_mb must be at least 1".to_string(),
            ));
        }
        if self.target_sample_rate == 0 {
            return Err(Error::Config(
                "detection.target_sample_rate must be positive".to_string(),
            ));
        }
        if !(self.max_audio_seconds > 0.0) || !(self.max_video_seconds > 0.0) {
            return Err(Error::Config(
                "detection.max_audio_seconds and detection.max_video_seconds must be positive"
                    .to_string(),
            ));
        }
        if !(self.video_sample_fps > 0.0) {
            return Err(Error::Config(
                "detection.video_sample_fps must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload size limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

fn default_max_concurrency() -> usize {
    2
}

fn default_max_upload_mb() -> usize {
    200
}

fn default_target_sample_rate() -> u32 {
    16_000
}

fn default_max_audio_seconds() -> f64 {
    60.0
}

fn default_max_video_seconds() -> f64 {
    60.0
}

fn default_video_sample_fps() -> f64 {
    10.0
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl TomlConfig {
    /// Parse and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.detection.validate()?;
        Ok(config)
    }

    /// Load configuration with graceful degradation
    ///
    /// An explicit path must exist and parse. Without one, the discovered
    /// config file is used when present; otherwise defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        match discover_config_file() {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Locate the config file for the platform
///
/// Order: `$MEDIAGUARD_CONFIG`, `<config_dir>/mediaguard/config.toml`,
/// then `/etc/mediaguard/config.toml` on Linux.
pub fn discover_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!(
            "{} points to missing file {}, ignoring",
            CONFIG_ENV_VAR,
            path.display()
        );
    }

    let user_config = dirs::config_dir().map(|d| d.join("mediaguard").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mediaguard/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
