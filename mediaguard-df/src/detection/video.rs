//! Video deepfake detector
//!
//! One streaming pass over frames sampled at 10 fps collects the EAR and
//! mouth-opening series; every tenth frame with a face also yields a crop
//! for the frame classifier. The audio track, when present, becomes an RMS
//! envelope for lip-sync correlation.

use super::engine::{FusionEngine, FusionInput};
use super::weighting::WeightingPolicy;
use super::{DetectionResult, QualityMetadata};
use crate::features::face::{blink_statistics, crop_face, FaceCrop, FACE_CROP_SIZE};
use crate::features::rhythm::rms_envelope;
use crate::media::{LandmarkDetector, LandmarkSource, MediaError, NoLandmarks, TimeWindow, VideoDecoder};
use crate::model::ModelHandle;
use crate::scorers::{BlinkScorer, FacialScorer, LipSyncScorer};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Videos shorter than this are flagged too short
pub const SHORT_VIDEO_SECONDS: f64 = 3.0;

/// Audio track state for lip-sync
#[derive(Debug, Clone, PartialEq)]
pub enum AudioTrack {
    /// Container has no audio stream
    Missing,
    /// Normalized RMS envelope of the track
    Present(Vec<f64>),
    /// Stream exists but could not be decoded
    Failed(String),
}

/// Everything the video scorers look at
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEvidence {
    /// Rate the EAR and mouth series were sampled at
    pub sample_fps: f64,
    pub source_fps: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub frames_sampled: usize,
    pub ear_series: Vec<f64>,
    pub mouth_series: Vec<f64>,
    /// Face crops at the classifier cadence
    pub face_crops: Vec<FaceCrop>,
    pub audio: AudioTrack,
}

impl FusionInput for VideoEvidence {
    fn quality(&self) -> anyhow::Result<QualityMetadata> {
        Ok(QualityMetadata {
            duration_seconds: self.duration_seconds,
            frame_rate: self.source_fps,
            face_count: Some(self.face_crops.len()),
            frames_sampled: Some(self.frames_sampled),
            has_audio_track: Some(!matches!(self.audio, AudioTrack::Missing)),
            is_too_short: self.duration_seconds.map(|d| d < SHORT_VIDEO_SECONDS),
            ..Default::default()
        })
    }

    fn describe(&self, details: &mut Map<String, Value>) {
        let blink_rate = blink_statistics(&self.ear_series, self.sample_fps)
            .map(|s| s.rate_per_minute)
            .unwrap_or(0.0);
        details.insert("faces_analyzed".to_string(), json!(self.face_crops.len()));
        details.insert("frames_scored".to_string(), json!(self.ear_series.len()));
        details.insert("frames_sampled".to_string(), json!(self.frames_sampled));
        details.insert("blink_rate".to_string(), json!(blink_rate));
        details.insert(
            "has_audio".to_string(),
            json!(!matches!(self.audio, AudioTrack::Missing)),
        );
    }
}

/// Frame and audio sampling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSampling {
    /// Landmark sampling rate
    pub sample_fps: f64,
    /// Face-crop rate for the frame classifier
    pub classifier_fps: f64,
    pub max_duration_seconds: f64,
    pub audio_sample_rate: u32,
}

impl Default for VideoSampling {
    fn default() -> Self {
        Self {
            sample_fps: 10.0,
            classifier_fps: 1.0,
            max_duration_seconds: 60.0,
            audio_sample_rate: 16_000,
        }
    }
}

/// Video detection entry point
pub struct VideoDetector {
    decoder: Arc<dyn VideoDecoder>,
    landmarks: Arc<dyn LandmarkSource>,
    engine: FusionEngine<VideoEvidence>,
    sampling: VideoSampling,
}

impl VideoDetector {
    pub fn new(
        decoder: Arc<dyn VideoDecoder>,
        landmarks: Arc<dyn LandmarkSource>,
        model: Arc<ModelHandle>,
        threshold: f64,
        sampling: VideoSampling,
    ) -> Self {
        let engine = FusionEngine::new(WeightingPolicy::video(), threshold)
            .with_scorer(FacialScorer::new(model))
            .with_scorer(LipSyncScorer)
            .with_scorer(BlinkScorer);
        Self {
            decoder,
            landmarks,
            engine,
            sampling,
        }
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    pub fn threshold(&self) -> f64 {
        self.engine.threshold()
    }

    /// Sample `path` and fuse every video method
    ///
    /// Never fails: an unreadable input yields [`DetectionResult::fallback`].
    pub fn detect(&self, path: &Path) -> DetectionResult {
        info!(path = %path.display(), "Starting video deepfake analysis");
        self.engine.detect(|| self.collect(path))
    }

    pub fn detect_evidence(&self, evidence: &VideoEvidence) -> DetectionResult {
        self.engine.fuse(evidence)
    }

    /// Decode frames and audio into [`VideoEvidence`]
    pub fn collect(&self, path: &Path) -> Result<VideoEvidence, MediaError> {
        if !path.exists() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }

        let probe = self.decoder.probe(path)?;
        let window = TimeWindow::centered(probe.duration_seconds, self.sampling.max_duration_seconds);
        debug!(path = %path.display(), probe = ?probe, window = ?window, "Video probed");

        let session: Box<dyn LandmarkDetector> = match self.landmarks.session(path) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Landmarks unavailable, continuing without faces");
                Box::new(NoLandmarks)
            }
        };

        let crop_stride = ((self.sampling.sample_fps / self.sampling.classifier_fps).round() as usize).max(1);
        let mut frames_sampled = 0usize;
        let mut ear_series = Vec::new();
        let mut mouth_series = Vec::new();
        let mut face_crops = Vec::new();

        for (index, frame) in self
            .decoder
            .frames(path, &probe, self.sampling.sample_fps, window)?
            .enumerate()
        {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) if frames_sampled == 0 => return Err(e),
                Err(e) => {
                    warn!(path = %path.display(), frames_sampled, error = %e, "Frame stream ended early");
                    break;
                }
            };
            frames_sampled += 1;

            let Some(landmarks) = session.detect(&frame) else {
                continue;
            };
            ear_series.push(landmarks.eye_aspect_ratio());
            mouth_series.push(landmarks.mouth_opening(frame.height));
            if index % crop_stride == 0 {
                if let Some(crop) = crop_face(&frame, &landmarks, FACE_CROP_SIZE) {
                    face_crops.push(crop);
                }
            }
        }

        let audio = if probe.has_audio {
            match self
                .decoder
                .extract_audio(path, &probe, self.sampling.audio_sample_rate, window)
            {
                Ok(Some(track)) => AudioTrack::Present(rms_envelope(&track.samples)),
                Ok(None) => AudioTrack::Missing,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Audio track extraction failed");
                    AudioTrack::Failed(e.to_string())
                }
            }
        } else {
            AudioTrack::Missing
        };

        let duration_seconds = probe
            .duration_seconds
            .or_else(|| (frames_sampled > 0).then(|| frames_sampled as f64 / self.sampling.sample_fps));

        info!(
            path = %path.display(),
            frames_sampled,
            faces = ear_series.len(),
            crops = face_crops.len(),
            has_audio = probe.has_audio,
            "Video evidence collected"
        );

        Ok(VideoEvidence {
            sample_fps: self.sampling.sample_fps,
            source_fps: probe.frame_rate,
            duration_seconds,
            frames_sampled,
            ear_series,
            mouth_series,
            face_crops,
            audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionMethod, FALLBACK_CONFIDENCE};
    use crate::features::face::{FaceLandmarks, Point};
    use crate::media::video::{Frame, FrameStream, VideoProbe};
    use crate::media::DecodedAudio;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubDecoder {
        seconds: f64,
        has_audio: bool,
        probes: Arc<AtomicUsize>,
    }

    impl VideoDecoder for StubDecoder {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn probe(&self, _path: &Path) -> Result<VideoProbe, MediaError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(VideoProbe {
                width: 64,
                height: 48,
                frame_rate: Some(25.0),
                frame_count: Some((self.seconds * 25.0) as u64),
                duration_seconds: Some(self.seconds),
                has_audio: self.has_audio,
                audio_channels: self.has_audio.then_some(1),
            })
        }

        fn frames(
            &self,
            _path: &Path,
            probe: &VideoProbe,
            fps: f64,
            _window: TimeWindow,
        ) -> Result<FrameStream, MediaError> {
            let count = (probe.duration_seconds.unwrap_or(0.0) * fps) as usize;
            Ok(Box::new((0..count).map(move |i| {
                Ok(Frame {
                    timestamp: i as f64 / fps,
                    width: 64,
                    height: 48,
                    rgb: vec![128; 64 * 48 * 3],
                })
            })))
        }

        fn extract_audio(
            &self,
            _path: &Path,
            probe: &VideoProbe,
            sample_rate: u32,
            _window: TimeWindow,
        ) -> Result<Option<DecodedAudio>, MediaError> {
            if !probe.has_audio {
                return Ok(None);
            }
            let samples = (0..(self.seconds * sample_rate as f64) as usize)
                .map(|i| (i as f32 * 0.01).sin() * 0.5)
                .collect();
            Ok(Some(DecodedAudio::from_samples(samples, sample_rate)))
        }
    }

    /// Same open-eyed face in every frame
    struct StillFace;

    impl LandmarkDetector for StillFace {
        fn detect(&self, _frame: &Frame) -> Option<FaceLandmarks> {
            let eye = |cx: f64| {
                [
                    Point::new(cx - 5.0, 20.0),
                    Point::new(cx - 2.0, 18.5),
                    Point::new(cx + 2.0, 18.5),
                    Point::new(cx + 5.0, 20.0),
                    Point::new(cx + 2.0, 21.5),
                    Point::new(cx - 2.0, 21.5),
                ]
            };
            Some(FaceLandmarks {
                left_eye: eye(24.0),
                right_eye: eye(40.0),
                upper_lip: Point::new(32.0, 32.0),
                lower_lip: Point::new(32.0, 34.0),
                outline: vec![Point::new(14.0, 8.0), Point::new(50.0, 44.0)],
            })
        }
    }

    impl LandmarkSource for StillFace {
        fn name(&self) -> &'static str {
            "still"
        }

        fn session(&self, _video: &Path) -> Result<Box<dyn LandmarkDetector>, MediaError> {
            Ok(Box::new(StillFace))
        }
    }

    fn detector(decoder: StubDecoder, landmarks: Arc<dyn LandmarkSource>) -> VideoDetector {
        VideoDetector::new(
            Arc::new(decoder),
            landmarks,
            Arc::new(ModelHandle::disabled()),
            0.5,
            VideoSampling::default(),
        )
    }

    fn input_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"stub").unwrap();
        path
    }

    #[test]
    fn test_collect_samples_series_and_crops() {
        let dir = TempDir::new().unwrap();
        let detector = detector(
            StubDecoder {
                seconds: 10.0,
                has_audio: true,
                ..Default::default()
            },
            Arc::new(StillFace),
        );

        let evidence = detector.collect(&input_file(&dir)).unwrap();
        assert_eq!(evidence.frames_sampled, 100);
        assert_eq!(evidence.ear_series.len(), 100);
        assert_eq!(evidence.face_crops.len(), 10);
        assert!((evidence.ear_series[0] - 0.3).abs() < 1e-3);
        assert!(matches!(evidence.audio, AudioTrack::Present(ref env) if !env.is_empty()));
    }

    #[test]
    fn test_video_without_audio_track() {
        let dir = TempDir::new().unwrap();
        let detector = detector(
            StubDecoder {
                seconds: 10.0,
                has_audio: false,
                ..Default::default()
            },
            Arc::new(StillFace),
        );

        let result = detector.detect(&input_file(&dir));
        assert_eq!(result.method_scores.get(DetectionMethod::LipSync), Some(0.6));
        // constant EAR: low rate + static eyes
        assert!((result.method_scores.get(DetectionMethod::BlinkAnalysis).unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(result.method_scores.get(DetectionMethod::FacialAnalysis), Some(0.35));
        assert!((result.confidence - (0.6 * 0.6 + 0.4 * 0.7)).abs() < 1e-9);
        assert!(result.is_fake);
        assert_eq!(result.details["has_audio"], json!(false));
    }

    #[test]
    fn test_video_without_faces() {
        let dir = TempDir::new().unwrap();
        let detector = detector(
            StubDecoder {
                seconds: 10.0,
                has_audio: true,
                ..Default::default()
            },
            Arc::new(NoLandmarks),
        );

        let result = detector.detect(&input_file(&dir));
        assert_eq!(result.method_scores.get(DetectionMethod::LipSync), Some(0.5));
        assert_eq!(result.method_scores.get(DetectionMethod::BlinkAnalysis), Some(0.6));
        assert!((result.confidence - 0.54).abs() < 1e-9);
        assert!((result.details["total_weight"].as_f64().unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(result.details["faces_analyzed"], json!(0));
    }

    #[test]
    fn test_missing_video_is_fallback() {
        let detector = detector(
            StubDecoder {
                seconds: 1.0,
                has_audio: false,
                ..Default::default()
            },
            Arc::new(NoLandmarks),
        );
        let result = detector.detect(Path::new("/nonexistent/clip.mp4"));
        assert!(result.is_fallback());
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_container_is_probed_once_per_detection() {
        let dir = TempDir::new().unwrap();
        let probes = Arc::new(AtomicUsize::new(0));
        let detector = detector(
            StubDecoder {
                seconds: 5.0,
                has_audio: true,
                probes: probes.clone(),
            },
            Arc::new(StillFace),
        );

        let result = detector.detect(&input_file(&dir));
        assert!(!result.is_fallback());
        assert_eq!(result.details["has_audio"], json!(true));
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_video_without_faces_or_audio() {
        let dir = TempDir::new().unwrap();
        let detector = detector(
            StubDecoder {
                seconds: 10.0,
                has_audio: false,
                ..Default::default()
            },
            Arc::new(NoLandmarks),
        );

        let result = detector.detect(&input_file(&dir));
        assert_eq!(result.method_scores.get(DetectionMethod::LipSync), Some(0.6));
        assert_eq!(result.method_scores.get(DetectionMethod::BlinkAnalysis), Some(0.6));
        // both methods sit at 0.6, so damping changes only the total weight
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert!((result.details["total_weight"].as_f64().unwrap() - 0.7).abs() < 1e-9);
        assert!(result.is_fake);
    }
}
