//! Face landmark collaborators
//!
//! Landmark detection runs outside this process. A face-mesh tool writes a
//! sidecar JSON next to the video (or into a configured directory) and
//! [`SidecarLandmarks`] replays it frame by frame:
//!
//! ```json
//! {"normalized": true,
//!  "frames": [{"timestamp": 0.1, "points": [[0.41, 0.37], ...]}]}
//! ```
//!
//! Frames without a face either carry an empty `points` list or are omitted.
//! Uploads to the video endpoint may carry the sidecar as a second multipart
//! part; it is staged at [`sidecar_path_beside`] the uploaded file.

use super::video::Frame;
use super::MediaError;
use crate::features::face::{FaceLandmarks, Point};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Largest gap between a frame and a sidecar timestamp that still matches
pub const MATCH_TOLERANCE_SECONDS: f64 = 0.05;
const SIDECAR_SUFFIX: &str = "landmarks.json";

/// Per-frame landmark lookup for one video
pub trait LandmarkDetector: Send {
    /// Landmarks of the most prominent face, `None` when no face is found
    fn detect(&self, frame: &Frame) -> Option<FaceLandmarks>;
}

/// Opens a [`LandmarkDetector`] for a video file
pub trait LandmarkSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn session(&self, video: &Path) -> Result<Box<dyn LandmarkDetector>, MediaError>;
}

/// Never finds a face
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLandmarks;

impl LandmarkDetector for NoLandmarks {
    fn detect(&self, _frame: &Frame) -> Option<FaceLandmarks> {
        None
    }
}

impl LandmarkSource for NoLandmarks {
    fn name(&self) -> &'static str {
        "none"
    }

    fn session(&self, _video: &Path) -> Result<Box<dyn LandmarkDetector>, MediaError> {
        Ok(Box::new(NoLandmarks))
    }
}

#[derive(Debug, Deserialize)]
struct SidecarFile {
    #[serde(default)]
    normalized: bool,
    #[serde(default)]
    frames: Vec<SidecarFrame>,
}

#[derive(Debug, Deserialize)]
struct SidecarFrame {
    timestamp: f64,
    #[serde(default)]
    points: Vec<[f64; 2]>,
}

/// `<video path>.landmarks.json`
pub fn sidecar_path_beside(video: &Path) -> PathBuf {
    let mut beside = video.as_os_str().to_owned();
    beside.push(format!(".{}", SIDECAR_SUFFIX));
    PathBuf::from(beside)
}

/// Landmarks replayed from `<stem>.landmarks.json` sidecar files
#[derive(Debug, Clone, Default)]
pub struct SidecarLandmarks {
    directory: Option<PathBuf>,
    tolerance_seconds: f64,
}

impl SidecarLandmarks {
    /// Look in `directory` first, then next to the video
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            tolerance_seconds: MATCH_TOLERANCE_SECONDS,
        }
    }

    pub fn with_tolerance(mut self, seconds: f64) -> Self {
        self.tolerance_seconds = seconds;
        self
    }

    /// Candidate sidecar paths for `video`, in lookup order
    pub fn candidates(&self, video: &Path) -> Vec<PathBuf> {
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sidecar_name = format!("{}.{}", stem, SIDECAR_SUFFIX);

        let mut paths = Vec::new();
        if let Some(dir) = &self.directory {
            paths.push(dir.join(&sidecar_name));
        }
        paths.push(sidecar_path_beside(video));
        if let Some(parent) = video.parent() {
            paths.push(parent.join(&sidecar_name));
        }
        paths
    }

    fn read(&self, path: &Path) -> Result<SidecarSession, MediaError> {
        let invalid = |reason: String| MediaError::InvalidLandmarks {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path)?;
        let file: SidecarFile = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;

        let mut frames: Vec<(f64, Vec<Point>)> = file
            .frames
            .into_iter()
            .filter(|f| f.timestamp.is_finite())
            .map(|f| {
                let points = f.points.iter().map(|&[x, y]| Point::new(x, y)).collect();
                (f.timestamp, points)
            })
            .collect();
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(SidecarSession {
            frames,
            normalized: file.normalized,
            tolerance_seconds: self.tolerance_seconds,
        })
    }
}

impl LandmarkSource for SidecarLandmarks {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn session(&self, video: &Path) -> Result<Box<dyn LandmarkDetector>, MediaError> {
        match self.candidates(video).into_iter().find(|p| p.is_file()) {
            Some(path) => {
                let session = self.read(&path)?;
                info!(
                    video = %video.display(),
                    sidecar = %path.display(),
                    frames = session.frames.len(),
                    "Loaded landmark sidecar"
                );
                Ok(Box::new(session))
            }
            None => {
                debug!(video = %video.display(), "No landmark sidecar found");
                Ok(Box::new(NoLandmarks))
            }
        }
    }
}

/// Sidecar frames for one video, sorted by timestamp
struct SidecarSession {
    frames: Vec<(f64, Vec<Point>)>,
    normalized: bool,
    tolerance_seconds: f64,
}

impl SidecarSession {
    fn nearest(&self, timestamp: f64) -> Option<&[Point]> {
        let index = self.frames.partition_point(|(t, _)| *t < timestamp);
        let before = index.checked_sub(1).and_then(|i| self.frames.get(i));
        let after = self.frames.get(index);

        let (t, points) = match (before, after) {
            (Some(b), Some(a)) => {
                if (timestamp - b.0) <= (a.0 - timestamp) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        ((t - timestamp).abs() <= self.tolerance_seconds).then_some(points.as_slice())
    }
}

impl LandmarkDetector for SidecarSession {
    fn detect(&self, frame: &Frame) -> Option<FaceLandmarks> {
        let points = self.nearest(frame.timestamp)?;
        if points.is_empty() {
            return None;
        }

        if self.normalized {
            let (w, h) = (frame.width as f64, frame.height as f64);
            let scaled: Vec<Point> = points.iter().map(|p| Point::new(p.x * w, p.y * h)).collect();
            FaceLandmarks::from_face_mesh(&scaled)
        } else {
            FaceLandmarks::from_face_mesh(points)
        }
    }
}
