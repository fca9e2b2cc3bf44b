//! Deepfake detection endpoints
//!
//! Thin adapter over the detectors: take a multipart upload, park it in a
//! per-request temp directory under a name that keeps a usable extension,
//! run the synchronous pipeline on the blocking pool under the concurrency
//! limit, serialize the result.
//!
//! Video uploads may add a `landmarks` part holding a landmark sidecar. It is
//! staged beside the upload, where [`crate::media::SidecarLandmarks`] finds
//! it. The upload keeps its original stem, so sidecars in a configured
//! landmarks directory match as well.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::detection::{DetectionResult, MethodScores, QualityMetadata};
use crate::media::sidecar_path_beside;
use crate::{ApiError, ApiResult, AppState};

/// Multipart field carrying the media file
pub const UPLOAD_FIELD: &str = "file";
/// Optional multipart field carrying a landmark sidecar (video only)
pub const LANDMARKS_FIELD: &str = "landmarks";

const MAX_STEM_CHARS: usize = 64;

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "aac", "ogg", "m4a"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Audio,
    Video,
}

impl Modality {
    fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }

    fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            Modality::Audio => AUDIO_EXTENSIONS,
            Modality::Video => VIDEO_EXTENSIONS,
        }
    }

    fn default_extension(&self) -> &'static str {
        match self {
            Modality::Audio => "wav",
            Modality::Video => "mp4",
        }
    }

    fn matcher(&self) -> infer::MatcherType {
        match self {
            Modality::Audio => infer::MatcherType::Audio,
            Modality::Video => infer::MatcherType::Video,
        }
    }

    fn model_name(&self) -> &'static str {
        match self {
            Modality::Audio => "mediaguard/audio-fusion",
            Modality::Video => "mediaguard/video-fusion",
        }
    }
}

/// Extension the temp file gets, so decoders can probe by name
///
/// Filename extension when allowed, else sniffed from the content, else the
/// modality default.
pub fn resolve_extension(modality: Modality, file_name: &str, data: &[u8]) -> String {
    let from_name = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| modality.allowed_extensions().contains(&e.as_str()));
    if let Some(ext) = from_name {
        return ext;
    }

    infer::get(data)
        .filter(|kind| kind.matcher_type() == modality.matcher())
        .map(|kind| kind.extension().to_string())
        .unwrap_or_else(|| modality.default_extension().to_string())
}

/// Detection response body
#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub request_id: Uuid,
    pub is_fake: bool,
    /// Same as `is_fake`
    pub is_deepfake: bool,
    pub confidence: f64,
    /// Same as `confidence`: higher means more likely fake
    pub fake_score: f64,
    pub model: &'static str,
    pub method_scores: MethodScores,
    pub quality: QualityMetadata,
    pub details: Map<String, Value>,
    pub processing_seconds: f64,
}

impl DetectResponse {
    fn new(
        request_id: Uuid,
        modality: Modality,
        result: DetectionResult,
        processing_seconds: f64,
    ) -> Self {
        Self {
            request_id,
            is_fake: result.is_fake,
            is_deepfake: result.is_fake,
            confidence: result.confidence,
            fake_score: result.confidence,
            model: modality.model_name(),
            method_scores: result.method_scores,
            quality: result.quality,
            details: result.details,
            processing_seconds,
        }
    }
}

struct Upload {
    file_name: String,
    data: Vec<u8>,
    /// Landmark sidecar JSON sent with a video
    landmarks: Option<Vec<u8>>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn read_upload(
    mut multipart: Multipart,
    modality: Modality,
    max_bytes: usize,
) -> ApiResult<Upload> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut landmarks = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(UPLOAD_FIELD) if file.is_none() => {
                let file_name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;

                let data = field.bytes().await.map_err(multipart_error)?;
                if data.is_empty() {
                    return Err(ApiError::BadRequest(format!("Uploaded file {} is empty", file_name)));
                }
                if data.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "Uploaded file is {} bytes, limit is {}",
                        data.len(),
                        max_bytes
                    )));
                }
                file = Some((file_name, data.to_vec()));
            }
            Some(LANDMARKS_FIELD) if modality == Modality::Video => {
                let data = field.bytes().await.map_err(multipart_error)?;
                if serde_json::from_slice::<Value>(&data).is_err() {
                    return Err(ApiError::BadRequest(format!(
                        "Multipart field '{}' is not valid JSON",
                        LANDMARKS_FIELD
                    )));
                }
                landmarks = Some(data.to_vec());
            }
            _ => continue,
        }
    }

    let (file_name, data) = file.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing multipart field '{}'", UPLOAD_FIELD))
    })?;
    Ok(Upload {
        file_name,
        data,
        landmarks,
    })
}

/// Filesystem-safe stem of the client's file name
fn upload_stem(file_name: &str) -> String {
    let stem: String = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(MAX_STEM_CHARS)
        .collect();
    if stem.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        stem
    }
}

/// Upload written into its own temp directory, removed on drop
struct StagedUpload {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

fn stage_upload(upload: &Upload, extension: &str) -> std::io::Result<StagedUpload> {
    let dir = tempfile::Builder::new().prefix("mediaguard-upload-").tempdir()?;
    let path = dir
        .path()
        .join(format!("{}.{}", upload_stem(&upload.file_name), extension));

    let mut file = std::fs::File::create(&path)?;
    file.write_all(&upload.data)?;
    file.flush()?;

    if let Some(landmarks) = &upload.landmarks {
        std::fs::write(sidecar_path_beside(&path), landmarks)?;
    }

    Ok(StagedUpload { _dir: dir, path })
}

async fn run_detection<F>(
    state: &AppState,
    modality: Modality,
    multipart: Multipart,
    detect: F,
) -> ApiResult<Json<DetectResponse>>
where
    F: FnOnce(&Path) -> DetectionResult + Send + 'static,
{
    let request_id = Uuid::new_v4();
    let upload = read_upload(multipart, modality, state.max_upload_bytes).await?;
    let extension = resolve_extension(modality, &upload.file_name, &upload.data);

    info!(
        request_id = %request_id,
        modality = modality.as_str(),
        file_name = %upload.file_name,
        bytes = upload.data.len(),
        extension = %extension,
        landmarks = upload.landmarks.is_some(),
        "Detection request received"
    );

    let _permit = state
        .limiter
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::ServiceUnavailable("Detection limiter closed".to_string()))?;

    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<(PathBuf, DetectionResult)> {
        let staged = stage_upload(&upload, &extension)?;
        let result = detect(&staged.path);
        // the staging directory is deleted when `staged` drops here
        Ok((staged.path.clone(), result))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Detection task failed: {}", e)))?;

    let (path, result) = result?;
    let elapsed = started.elapsed().as_secs_f64();

    if let Some(reason) = result.error() {
        warn!(
            request_id = %request_id,
            modality = modality.as_str(),
            path = %path.display(),
            error = %reason,
            "Detection fell back"
        );
        state
            .record_error(format!("{} detection: {}", modality.as_str(), reason))
            .await;
    }

    info!(
        request_id = %request_id,
        modality = modality.as_str(),
        is_fake = result.is_fake,
        confidence = result.confidence,
        elapsed_seconds = elapsed,
        "Detection complete"
    );

    Ok(Json(DetectResponse::new(request_id, modality, result, elapsed)))
}

/// POST /df/detect_deepfake_audio
pub async fn detect_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let detector = state.audio.clone();
    run_detection(&state, Modality::Audio, multipart, move |path| {
        detector.detect(path)
    })
    .await
}

/// POST /df/detect_deepfake_video
///
/// 503 when this instance has no video decoder.
pub async fn detect_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let detector = state.video.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "Video detection is not configured on this instance".to_string(),
        )
    })?;
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_detection(&state, Modality::Video, multipart, move |path| {
        detector.detect(path)
    })
    .await
}

/// Build detection routes
pub fn detect_routes() -> Router<AppState> {
    Router::new()
        .route("/df/detect_deepfake_audio", post(detect_audio))
        .route("/df/detect_deepfake_video", post(detect_video))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extension_is_kept() {
        assert_eq!(resolve_extension(Modality::Audio, "voice.FLAC", b""), "flac");
        assert_eq!(resolve_extension(Modality::Video, "clip.mov", b""), "mov");
    }

    #[test]
    fn test_extension_sniffed_from_content() {
        let mut wav = b"RIFF".to_vec();
        wav.extend_from_slice(&36u32.to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&[0u8; 16]);
        assert_eq!(resolve_extension(Modality::Audio, "upload.bin", &wav), "wav");
    }

    #[test]
    fn test_upload_stem_is_filesystem_safe() {
        assert_eq!(upload_stem("interview.mp4"), "interview");
        assert_eq!(upload_stem("../../etc/passwd"), "passwd");
        assert_eq!(upload_stem("my clip (1).mov"), "myclip1");
        assert_eq!(upload_stem(".."), "upload");
        assert_eq!(upload_stem(""), "upload");
    }

    #[test]
    fn test_staged_upload_carries_landmarks_beside_it() {
        let upload = Upload {
            file_name: "speaker.mp4".to_string(),
            data: b"video bytes".to_vec(),
            landmarks: Some(br#"{"frames": []}"#.to_vec()),
        };

        let staged = stage_upload(&upload, "mp4").unwrap();
        assert_eq!(staged.path.file_name().unwrap(), "speaker.mp4");
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"video bytes");
        let sidecar = sidecar_path_beside(&staged.path);
        assert_eq!(std::fs::read(&sidecar).unwrap(), br#"{"frames": []}"#);

        let dir = staged.path.parent().unwrap().to_path_buf();
        drop(staged);
        assert!(!dir.exists());
    }

    #[test]
    fn test_default_extension() {
        assert_eq!(resolve_extension(Modality::Audio, "noext", b"garbage"), "wav");
        assert_eq!(resolve_extension(Modality::Video, "clip.wav", b"garbage"), "mp4");
    }
}
