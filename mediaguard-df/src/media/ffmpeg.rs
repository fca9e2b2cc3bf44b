//! ffmpeg / ffprobe collaborators
//!
//! Probing goes through `ffprobe -print_format json`. Audio is transcoded to
//! a 16-bit mono WAV in a scoped temp file; video frames are streamed from an
//! `ffmpeg` rawvideo pipe so only one frame is held at a time.

use super::audio::{read_wav_mono, sanitize, AudioBackend, DecodedAudio};
use super::video::{Frame, FrameStream, VideoDecoder, VideoProbe};
use super::{MediaError, TimeWindow};
use serde::Deserialize;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Frames wider than this are scaled down before analysis
pub const MAX_FRAME_WIDTH: u32 = 640;

/// Paths to the ffmpeg and ffprobe executables
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

/// Stream summary from ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_seconds: Option<f64>,
    pub has_audio: bool,
    pub audio_channels: Option<usize>,
    pub video: Option<VideoStreamInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
    pub frame_count: Option<u64>,
}

impl MediaInfo {
    pub fn into_video_probe(self) -> Result<VideoProbe, MediaError> {
        let video = self.video.ok_or(MediaError::NoStream("video"))?;
        let duration_seconds = self.duration_seconds.or_else(|| {
            match (video.frame_count, video.frame_rate) {
                (Some(count), Some(rate)) if rate > 0.0 => Some(count as f64 / rate),
                _ => None,
            }
        });
        Ok(VideoProbe {
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate,
            frame_count: video.frame_count,
            duration_seconds,
            has_audio: self.has_audio,
            audio_channels: self.audio_channels,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<usize>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational such as `30000/1001`
fn parse_rational(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_seconds(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Summarize `ffprobe -show_streams -show_format` JSON
pub fn parse_probe_json(json: &str) -> Result<MediaInfo, MediaError> {
    let output: ProbeOutput = serde_json::from_str(json).map_err(|e| MediaError::ToolFailed {
        tool: "ffprobe".to_string(),
        reason: format!("unreadable output: {}", e),
    })?;

    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration_seconds = parse_seconds(output.format.as_ref().and_then(|f| f.duration.as_ref()))
        .or_else(|| video.and_then(|v| parse_seconds(v.duration.as_ref())))
        .or_else(|| audio.and_then(|a| parse_seconds(a.duration.as_ref())));

    let video = video.and_then(|v| {
        Some(VideoStreamInfo {
            width: v.width?,
            height: v.height?,
            frame_rate: v
                .avg_frame_rate
                .as_deref()
                .and_then(parse_rational)
                .or_else(|| v.r_frame_rate.as_deref().and_then(parse_rational)),
            frame_count: v.nb_frames.as_deref().and_then(|n| n.trim().parse().ok()),
        })
    });

    Ok(MediaInfo {
        duration_seconds,
        has_audio: audio.is_some(),
        audio_channels: audio.and_then(|a| a.channels),
        video,
    })
}

/// Output size for a frame scaled to at most `max_width` wide
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled_height = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled_height.max(1))
}

fn window_args(window: TimeWindow) -> Vec<String> {
    let mut args = Vec::new();
    if window.start_seconds > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{:.3}", window.start_seconds));
    }
    if let Some(duration) = window.duration_seconds {
        args.push("-t".to_string());
        args.push(format!("{:.3}", duration));
    }
    args
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Both executables run and report success for `-version`
    pub fn is_available(&self) -> bool {
        let runs = |binary: &Path| {
            Command::new(binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        };
        runs(&self.ffmpeg) && runs(&self.ffprobe)
    }

    fn tool_error(binary: &Path, e: std::io::Error) -> MediaError {
        if e.kind() == std::io::ErrorKind::NotFound {
            MediaError::ToolUnavailable {
                tool: binary.display().to_string(),
                reason: "executable not found".to_string(),
            }
        } else {
            MediaError::ToolFailed {
                tool: binary.display().to_string(),
                reason: e.to_string(),
            }
        }
    }

    pub fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        if !path.exists() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .output()
            .map_err(|e| Self::tool_error(&self.ffprobe, e))?;

        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool: "ffprobe".to_string(),
                reason: format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout))
    }

    /// Transcode the audio of `window` to a mono 16-bit WAV temp file
    ///
    /// The file is deleted when the returned handle drops.
    pub fn extract_wav(
        &self,
        path: &Path,
        sample_rate: u32,
        window: TimeWindow,
    ) -> Result<NamedTempFile, MediaError> {
        let temp = tempfile::Builder::new()
            .prefix("mediaguard-audio-")
            .suffix(".wav")
            .tempfile()?;

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-y"])
            .args(window_args(window))
            .arg("-i")
            .arg(path)
            .args(["-vn", "-ac", "1", "-ar"])
            .arg(sample_rate.to_string())
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(temp.path())
            .output()
            .map_err(|e| Self::tool_error(&self.ffmpeg, e))?;

        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(path = %path.display(), temp = %temp.path().display(), "Extracted audio track");
        Ok(temp)
    }
}

/// Audio backend that lets ffmpeg decode and resample
#[derive(Debug, Clone)]
pub struct FfmpegAudioBackend {
    tools: FfmpegTools,
}

impl FfmpegAudioBackend {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl AudioBackend for FfmpegAudioBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn decode(
        &self,
        path: &Path,
        target_sample_rate: u32,
        max_duration_seconds: f64,
    ) -> Result<DecodedAudio, MediaError> {
        let info = self.tools.probe(path)?;
        if !info.has_audio {
            return Err(MediaError::NoStream("audio"));
        }

        let window = TimeWindow::centered(info.duration_seconds, max_duration_seconds);
        let wav = self.tools.extract_wav(path, target_sample_rate, window)?;
        let (samples, sample_rate, _) = read_wav_mono(wav.path())?;
        let decoded_seconds = samples.len() as f64 / sample_rate.max(1) as f64;

        Ok(DecodedAudio {
            samples,
            sample_rate,
            channels: info.audio_channels.unwrap_or(1),
            source_duration_seconds: info.duration_seconds.unwrap_or(decoded_seconds),
            backend: self.name(),
        })
    }
}

/// Video decoder backed by ffprobe + an ffmpeg rawvideo pipe
#[derive(Debug, Clone)]
pub struct FfmpegVideoDecoder {
    tools: FfmpegTools,
    max_width: u32,
}

impl FfmpegVideoDecoder {
    pub fn new(tools: FfmpegTools) -> Self {
        Self {
            tools,
            max_width: MAX_FRAME_WIDTH,
        }
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn probe(&self, path: &Path) -> Result<VideoProbe, MediaError> {
        self.tools.probe(path)?.into_video_probe()
    }

    fn frames(
        &self,
        path: &Path,
        probe: &VideoProbe,
        target_fps: f64,
        window: TimeWindow,
    ) -> Result<FrameStream, MediaError> {
        let (width, height) = scaled_dimensions(probe.width, probe.height, self.max_width);
        if width == 0 || height == 0 {
            return Err(MediaError::DecodeFailed {
                path: path.to_path_buf(),
                reason: "video stream reports zero size".to_string(),
            });
        }

        let mut child = Command::new(&self.tools.ffmpeg)
            .args(["-v", "error"])
            .args(window_args(window))
            .arg("-i")
            .arg(path)
            .arg("-an")
            .arg("-vf")
            .arg(format!("fps={},scale={}:{}", target_fps, width, height))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FfmpegTools::tool_error(&self.tools.ffmpeg, e))?;

        let stdout = child.stdout.take().ok_or_else(|| MediaError::ToolFailed {
            tool: "ffmpeg".to_string(),
            reason: "stdout not captured".to_string(),
        })?;

        debug!(
            path = %path.display(),
            width,
            height,
            target_fps,
            start = window.start_seconds,
            "Streaming video frames"
        );

        Ok(Box::new(RawFrameStream {
            child,
            stdout: BufReader::new(stdout),
            width,
            height,
            fps: target_fps,
            start: window.start_seconds,
            index: 0,
            finished: false,
        }))
    }

    fn extract_audio(
        &self,
        path: &Path,
        probe: &VideoProbe,
        sample_rate: u32,
        window: TimeWindow,
    ) -> Result<Option<DecodedAudio>, MediaError> {
        if !probe.has_audio {
            return Ok(None);
        }

        let wav = self.tools.extract_wav(path, sample_rate, window)?;
        let (mut samples, rate, _) = read_wav_mono(wav.path())?;
        sanitize(&mut samples);
        let decoded_seconds = samples.len() as f64 / rate.max(1) as f64;

        Ok(Some(DecodedAudio {
            samples,
            sample_rate: rate,
            channels: probe.audio_channels.unwrap_or(1),
            source_duration_seconds: probe.duration_seconds.unwrap_or(decoded_seconds),
            backend: "ffmpeg",
        }))
    }
}

/// Fixed-size RGB24 frames read from an ffmpeg pipe
struct RawFrameStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    fps: f64,
    start: f64,
    index: u64,
    finished: bool,
}

impl Iterator for RawFrameStream {
    type Item = Result<Frame, MediaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];
        match self.stdout.read_exact(&mut rgb) {
            Ok(()) => {
                let frame = Frame {
                    timestamp: self.start + self.index as f64 / self.fps,
                    width: self.width,
                    height: self.height,
                    rgb,
                };
                self.index += 1;
                Some(Ok(frame))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finished = true;
                match self.child.wait() {
                    Ok(status) if !status.success() && self.index == 0 => {
                        Some(Err(MediaError::ToolFailed {
                            tool: "ffmpeg".to_string(),
                            reason: format!("exit code {:?} before any frame", status.code()),
                        }))
                    }
                    _ => None,
                }
            }
            Err(e) => {
                self.finished = true;
                Some(Err(MediaError::Io(e)))
            }
        }
    }
}

impl Drop for RawFrameStream {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!(error = %e, "Failed to stop ffmpeg frame pipe");
            }
            let _ = self.child.wait();
        }
    }
}
