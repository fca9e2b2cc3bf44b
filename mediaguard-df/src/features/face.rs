//! Facial landmark geometry
//!
//! Eye-aspect ratio, mouth opening, blink statistics and face cropping.
//! Landmark coordinates are in frame pixels.

use super::{percentile, std_dev};
use crate::media::video::Frame;
use serde::{Deserialize, Serialize};

/// Guards the EAR denominator against degenerate eye outlines
pub const EAR_EPSILON: f64 = 1e-6;
/// Lowest blink threshold regardless of the clip's EAR distribution
pub const MIN_BLINK_THRESHOLD: f64 = 0.15;
/// Side length of face crops handed to the frame classifier
pub const FACE_CROP_SIZE: u32 = 224;

const BLINK_PERCENTILE: f64 = 20.0;
const BLINK_PERCENTILE_SCALE: f64 = 0.85;
const CROP_PADDING: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Landmarks for one detected face
///
/// Eye points follow the usual p1..p6 order: p1/p4 are the corners, p2/p3
/// the upper lid, p5/p6 the lower lid.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub upper_lip: Point,
    pub lower_lip: Point,
    /// Every landmark available for the face, used for the bounding box
    pub outline: Vec<Point>,
}

impl FaceLandmarks {
    /// Face-mesh indices for the left eye, p1..p6
    pub const LEFT_EYE_MESH: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Face-mesh indices for the right eye, p1..p6
    pub const RIGHT_EYE_MESH: [usize; 6] = [362, 385, 387, 263, 373, 380];
    pub const UPPER_LIP_MESH: usize = 13;
    pub const LOWER_LIP_MESH: usize = 14;

    /// Build from a dense face mesh (468 points, pixel coordinates)
    ///
    /// Returns `None` if the mesh is too small to contain every index used.
    pub fn from_face_mesh(points: &[Point]) -> Option<Self> {
        let pick = |indices: [usize; 6]| -> Option<[Point; 6]> {
            let mut eye = [Point::new(0.0, 0.0); 6];
            for (slot, &index) in eye.iter_mut().zip(&indices) {
                *slot = *points.get(index)?;
            }
            Some(eye)
        };

        Some(Self {
            left_eye: pick(Self::LEFT_EYE_MESH)?,
            right_eye: pick(Self::RIGHT_EYE_MESH)?,
            upper_lip: *points.get(Self::UPPER_LIP_MESH)?,
            lower_lip: *points.get(Self::LOWER_LIP_MESH)?,
            outline: points.to_vec(),
        })
    }

    /// Mean eye-aspect ratio across both eyes
    pub fn eye_aspect_ratio(&self) -> f64 {
        (eye_aspect_ratio(&self.left_eye) + eye_aspect_ratio(&self.right_eye)) / 2.0
    }

    /// Vertical lip distance normalized by frame height
    pub fn mouth_opening(&self, frame_height: u32) -> f64 {
        if frame_height == 0 {
            return 0.0;
        }
        (self.upper_lip.y - self.lower_lip.y).abs() / frame_height as f64
    }

    /// Axis-aligned bounds over every landmark: (x1, y1, x2, y2)
    fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let points = self
            .outline
            .iter()
            .chain(&self.left_eye)
            .chain(&self.right_eye)
            .chain([&self.upper_lip, &self.lower_lip]);

        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for p in points {
            bounds = Some(match bounds {
                None => (p.x, p.y, p.x, p.y),
                Some((x1, y1, x2, y2)) => (x1.min(p.x), y1.min(p.y), x2.max(p.x), y2.max(p.y)),
            });
        }
        bounds
    }
}

/// `(‖p2−p6‖ + ‖p3−p5‖) / (2‖p1−p4‖ + ε)`
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f64 {
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    vertical / (2.0 * horizontal + EAR_EPSILON)
}

/// Blink statistics over an EAR series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlinkStatistics {
    /// Adaptive closed-eye threshold
    pub threshold: f64,
    pub blinks: usize,
    pub rate_per_minute: f64,
    pub ear_std: f64,
}

/// Count open-to-closed transitions and derive a per-minute rate
///
/// `sample_fps` is the rate the series was sampled at. The duration used for
/// the rate is floored at one second.
pub fn blink_statistics(ear: &[f64], sample_fps: f64) -> Option<BlinkStatistics> {
    if ear.is_empty() || !(sample_fps > 0.0) {
        return None;
    }

    let threshold =
        MIN_BLINK_THRESHOLD.max(percentile(ear, BLINK_PERCENTILE)? * BLINK_PERCENTILE_SCALE);
    let blinks = ear
        .windows(2)
        .filter(|pair| pair[0] >= threshold && pair[1] < threshold)
        .count();
    let duration = ear.len() as f64 / sample_fps;
    let rate_per_minute = blinks as f64 * 60.0 / duration.max(1.0);

    Some(BlinkStatistics {
        threshold,
        blinks,
        rate_per_minute,
        ear_std: std_dev(ear)?,
    })
}

/// Square RGB face crop
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCrop {
    pub size: u32,
    /// Row-major RGB24
    pub rgb: Vec<u8>,
}

impl FaceCrop {
    /// Channel-first (3 x size x size) floats in [0, 1]
    pub fn to_chw(&self) -> Vec<f32> {
        let plane = (self.size * self.size) as usize;
        let mut out = vec![0.0f32; plane * 3];
        for (i, pixel) in self.rgb.chunks_exact(3).enumerate() {
            for c in 0..3 {
                out[c * plane + i] = pixel[c] as f32 / 255.0;
            }
        }
        out
    }
}

/// Crop the face (10% padding on each side) and resize it to `size` x `size`
///
/// Nearest-neighbour sampling. Returns `None` when the padded box is empty
/// after clamping to the frame.
pub fn crop_face(frame: &Frame, landmarks: &FaceLandmarks, size: u32) -> Option<FaceCrop> {
    if size == 0 || frame.width == 0 || frame.height == 0 {
        return None;
    }
    let (bx1, by1, bx2, by2) = landmarks.bounds()?;
    let (w, h) = (frame.width as f64, frame.height as f64);

    let x1 = bx1.max(0.0).floor();
    let y1 = by1.max(0.0).floor();
    let x2 = bx2.min(w).floor();
    let y2 = by2.min(h).floor();
    let pad_x = ((x2 - x1) * CROP_PADDING).floor();
    let pad_y = ((y2 - y1) * CROP_PADDING).floor();

    let x1 = (x1 - pad_x).max(0.0) as u32;
    let y1 = (y1 - pad_y).max(0.0) as u32;
    let x2 = (x2 + pad_x).min(w) as u32;
    let y2 = (y2 + pad_y).min(h) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let (crop_w, crop_h) = (x2 - x1, y2 - y1);
    let mut rgb = Vec::with_capacity((size * size * 3) as usize);
    for row in 0..size {
        let sy = y1 + (row as u64 * crop_h as u64 / size as u64) as u32;
        for col in 0..size {
            let sx = x1 + (col as u64 * crop_w as u64 / size as u64) as u32;
            let offset = ((sy * frame.width + sx) * 3) as usize;
            rgb.extend_from_slice(frame.rgb.get(offset..offset + 3)?);
        }
    }

    Some(FaceCrop { size, rgb })
}
