//! Media loading collaborators
//!
//! Turns a file on disk into what the detectors analyze: mono PCM at a
//! fixed rate for audio, sampled RGB frames plus landmarks for video.
//! Every loader caps the analyzed span with a centered window.

pub mod audio;
pub mod ffmpeg;
pub mod landmarks;
pub mod symphonia_backend;
pub mod video;

pub use audio::{AudioBackend, AudioLoaderChain, DecodedAudio};
pub use ffmpeg::{FfmpegAudioBackend, FfmpegTools, FfmpegVideoDecoder};
pub use landmarks::{sidecar_path_beside, LandmarkDetector, LandmarkSource, NoLandmarks, SidecarLandmarks};
pub use symphonia_backend::SymphoniaBackend;
pub use video::{Frame, FrameStream, VideoDecoder, VideoProbe};

use std::path::PathBuf;
use thiserror::Error;

/// Media loading errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Input path does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Every backend failed to decode the input
    #[error("Decode failed for {path}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    /// Container has no stream of the requested kind
    #[error("No {0} stream found")]
    NoStream(&'static str),

    /// External tool missing from the system
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// External tool ran and reported failure
    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    /// Landmark sidecar could not be read
    #[error("Invalid landmarks file {path}: {reason}")]
    InvalidLandmarks { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Span of a media file to analyze, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start_seconds: f64,
    /// `None` reads to the end of the stream
    pub duration_seconds: Option<f64>,
}

impl TimeWindow {
    pub fn full() -> Self {
        Self {
            start_seconds: 0.0,
            duration_seconds: None,
        }
    }

    /// Centered window of at most `max_seconds` within `total_seconds`
    ///
    /// An unknown or short total yields the full stream.
    pub fn centered(total_seconds: Option<f64>, max_seconds: f64) -> Self {
        match total_seconds {
            Some(total) if total > max_seconds => Self {
                start_seconds: (total - max_seconds) / 2.0,
                duration_seconds: Some(max_seconds),
            },
            _ => Self::full(),
        }
    }
}

/// Start index of the centered `max_len` sub-slice of a `len` slice
pub fn centered_start(len: usize, max_len: usize) -> usize {
    len.saturating_sub(max_len) / 2
}

/// Centered sub-slice of at most `max_len` items
pub fn centered<T>(items: &[T], max_len: usize) -> &[T] {
    let start = centered_start(items.len(), max_len);
    &items[start..start + items.len().min(max_len)]
}
