//! mediaguard-df library interface
//!
//! Audio and video deepfake detection by multi-signal fusion, plus the thin
//! HTTP surface the service binary exposes. Exposed as a library for the
//! integration tests and the offline CLI.

pub mod api;
pub mod build_info;
pub mod detection;
pub mod error;
pub mod features;
pub mod media;
pub mod model;
pub mod scorers;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use detection::video::VideoSampling;
use detection::{AudioDetector, VideoDetector};
use media::{
    AudioBackend, AudioLoaderChain, FfmpegAudioBackend, FfmpegTools, FfmpegVideoDecoder,
    SidecarLandmarks, SymphoniaBackend,
};
use mediaguard_common::DetectionSettings;
use model::{LinearProbeLoader, ModelHandle, ModelLoader};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub audio: Arc<AudioDetector>,
    /// `None` when no video decoder is available on this host
    pub video: Option<Arc<VideoDetector>>,
    pub audio_model: Arc<ModelHandle>,
    pub video_model: Arc<ModelHandle>,
    /// Bounds detections in flight
    pub limiter: Arc<Semaphore>,
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        audio: Arc<AudioDetector>,
        video: Option<Arc<VideoDetector>>,
        audio_model: Arc<ModelHandle>,
        video_model: Arc<ModelHandle>,
        max_concurrency: usize,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            audio,
            video,
            audio_model,
            video_model,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
            max_upload_bytes,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Wire detectors, loaders and model handles from settings
    ///
    /// The video detector is only built when ffmpeg and ffprobe run. Models
    /// are not loaded here; see [`AppState::warm_models`].
    pub fn from_settings(settings: &DetectionSettings) -> Self {
        let tools = FfmpegTools::new(settings.ffmpeg_path.clone(), settings.ffprobe_path.clone());
        let ffmpeg_available = tools.is_available();

        let mut backends: Vec<Arc<dyn AudioBackend>> = vec![Arc::new(SymphoniaBackend::new())];
        if ffmpeg_available {
            backends.push(Arc::new(FfmpegAudioBackend::new(tools.clone())));
        } else {
            warn!(
                ffmpeg = %settings.ffmpeg_path.display(),
                ffprobe = %settings.ffprobe_path.display(),
                "ffmpeg not available: audio falls back to native decoding only, video detection disabled"
            );
        }
        let loader = AudioLoaderChain::new(backends, settings.target_sample_rate);

        let model_loader: Arc<dyn ModelLoader> = Arc::new(LinearProbeLoader);
        let audio_model = Arc::new(ModelHandle::new(
            settings.audio_model_path.clone(),
            model_loader.clone(),
        ));
        let video_model = Arc::new(ModelHandle::new(
            settings.video_model_path.clone(),
            model_loader,
        ));

        let audio = Arc::new(AudioDetector::new(
            loader,
            audio_model.clone(),
            settings.threshold,
            settings.max_audio_seconds,
        ));

        let video = ffmpeg_available.then(|| {
            Arc::new(VideoDetector::new(
                Arc::new(FfmpegVideoDecoder::new(tools)),
                Arc::new(SidecarLandmarks::new(settings.landmarks_path.clone())),
                video_model.clone(),
                settings.threshold,
                VideoSampling {
                    sample_fps: settings.video_sample_fps,
                    max_duration_seconds: settings.max_video_seconds,
                    audio_sample_rate: settings.target_sample_rate,
                    ..Default::default()
                },
            ))
        });

        info!(
            audio_backends = ?audio.loader().backend_names(),
            video = video.is_some(),
            threshold = settings.threshold,
            max_concurrency = settings.max_concurrency,
            "Detectors configured"
        );

        Self::new(
            audio,
            video,
            audio_model,
            video_model,
            settings.max_concurrency,
            settings.max_upload_bytes(),
        )
    }

    /// Load configured models now instead of on the first request
    pub async fn warm_models(&self) {
        let handles = [self.audio_model.clone(), self.video_model.clone()];
        let result = tokio::task::spawn_blocking(move || {
            for handle in &handles {
                if handle.path().is_some() {
                    handle.get();
                }
            }
        })
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Model warm-up task failed");
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .merge(api::health_routes())
        .merge(api::detect_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
