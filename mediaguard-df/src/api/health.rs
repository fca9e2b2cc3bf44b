//! Health and readiness endpoints
//!
//! `/health` answers as long as the process is up. `/ready` tells which
//! detectors and models this instance can actually serve.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::build_info::{BuildInfo, BUILD};
use crate::model::ModelStatus;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("mediaguard-df")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Commit, profile and target this binary was built from
    pub build: BuildInfo,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectorReadiness {
    pub audio: &'static str,
    pub video: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelReadiness {
    pub audio_model: &'static str,
    pub video_model: &'static str,
}

/// Readiness response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// "ready" when every detector can run, else "partial"
    pub status: &'static str,
    pub detectors: DetectorReadiness,
    pub models: ModelReadiness,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub model_errors: Vec<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "mediaguard-df".to_string(),
        version: BUILD.version.to_string(),
        build: BUILD,
        uptime_seconds,
        last_error,
    })
}

/// GET /ready
///
/// Reports without triggering a model load.
pub async fn readiness(State(state): State<AppState>) -> Json<ReadyResponse> {
    let audio_status = state.audio_model.status();
    let video_status = state.video_model.status();

    let model_errors = [("audio_model", &audio_status), ("video_model", &video_status)]
        .into_iter()
        .filter_map(|(name, status)| match status {
            ModelStatus::Failed(reason) => Some(format!("{}: {}", name, reason)),
            _ => None,
        })
        .collect();

    let video = if state.video.is_some() {
        "ready"
    } else {
        "not_configured"
    };

    Json(ReadyResponse {
        status: if state.video.is_some() { "ready" } else { "partial" },
        detectors: DetectorReadiness {
            audio: "ready",
            video,
        },
        models: ModelReadiness {
            audio_model: audio_status.as_str(),
            video_model: video_status.as_str(),
        },
        model_errors,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
}
