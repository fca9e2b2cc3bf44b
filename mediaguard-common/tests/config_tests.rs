//! Unit tests for configuration loading and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate MEDIAGUARD_CONFIG are marked with #[serial].

use mediaguard_common::config::{discover_config_file, TomlConfig, CONFIG_ENV_VAR};
use mediaguard_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_env_var_points_at_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("mediaguard.toml");
    std::fs::write(&config_path, "port = 9001\n[detection]\nthreshold = 0.7\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &config_path);
    let discovered = discover_config_file();
    let loaded = TomlConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(discovered, Some(config_path));
    let config = loaded.unwrap();
    assert_eq!(config.port, 9001);
    assert_eq!(config.detection.threshold, 0.7);
}

#[test]
#[serial]
fn test_env_var_to_missing_file_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/mediaguard/config.toml");
    let discovered = discover_config_file();
    let loaded = TomlConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_ne!(
        discovered,
        Some(PathBuf::from("/nonexistent/mediaguard/config.toml"))
    );
    // startup continues on whatever else is found, or defaults
    assert!(loaded.is_ok());
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let result = TomlConfig::load(Some(std::path::Path::new(
        "/nonexistent/mediaguard/explicit.toml",
    )));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.toml");
    std::fs::write(&config_path, "port = \"not a number\"").unwrap();

    let err = TomlConfig::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}

#[test]
fn test_full_config_round_trips_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("full.toml");
    std::fs::write(
        &config_path,
        r#"
host = "127.0.0.1"
port = 8100

[logging]
level = "debug"

[detection]
threshold = 0.55
max_concurrency = 4
max_upload_mb = 50
video_model_path = "/opt/models/frames.json"
video_sample_fps = 5.0
ffmpeg_path = "/usr/local/bin/ffmpeg"
"#,
    )
    .unwrap();

    let config = TomlConfig::from_file(&config_path).unwrap();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.detection.max_concurrency, 4);
    assert_eq!(config.detection.max_upload_bytes(), 50 * 1024 * 1024);
    assert_eq!(config.detection.video_sample_fps, 5.0);
    assert_eq!(
        config.detection.ffmpeg_path,
        PathBuf::from("/usr/local/bin/ffmpeg")
    );
    assert_eq!(config.detection.ffprobe_path, PathBuf::from("ffprobe"));
}
