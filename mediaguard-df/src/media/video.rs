//! Video decoding contract

use super::audio::DecodedAudio;
use super::{MediaError, TimeWindow};
use serde::Serialize;
use std::path::Path;

/// One decoded RGB24 frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Seconds from the start of the source
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Row-major RGB24, `width * height * 3` bytes
    pub rgb: Vec<u8>,
}

/// Container facts read before decoding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    /// Native frame rate, when the container reports one
    pub frame_rate: Option<f64>,
    pub frame_count: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub has_audio: bool,
    pub audio_channels: Option<usize>,
}

/// Frame stream returned by a decoder
pub type FrameStream = Box<dyn Iterator<Item = Result<Frame, MediaError>> + Send>;

/// Source of sampled frames and the accompanying audio track
pub trait VideoDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read container facts once per detection
    ///
    /// The result is handed back to [`VideoDecoder::frames`] and
    /// [`VideoDecoder::extract_audio`], which must not probe again.
    fn probe(&self, path: &Path) -> Result<VideoProbe, MediaError>;

    /// Frames sampled at `target_fps` within `window`
    fn frames(
        &self,
        path: &Path,
        probe: &VideoProbe,
        target_fps: f64,
        window: TimeWindow,
    ) -> Result<FrameStream, MediaError>;

    /// Mono audio track for `window`, or `None` when the container has none
    ///
    /// Any temporary files are removed before this returns, on success and
    /// on failure.
    fn extract_audio(
        &self,
        path: &Path,
        probe: &VideoProbe,
        sample_rate: u32,
        window: TimeWindow,
    ) -> Result<Option<DecodedAudio>, MediaError>;
}
