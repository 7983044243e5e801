//! Typed records passed from the detector to the decision engine.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
///
/// Precondition (the detector's contract, not checked here): `x2 >= x1`,
/// `y2 >= y1` and all coordinates are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Horizontal center, used for zone classification.
    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    /// Box area in px², used for proximity classification.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// One detected object in one frame. Lives for a single decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Model vocabulary label, e.g. `"person"` or `"traffic_light"`.
    pub label: String,
    /// Detector confidence in [0.0, 1.0].
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// A single RGB camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing frame number assigned by the source.
    pub seq: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self { seq, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Copy out the pixels under `bbox`.
    ///
    /// Coordinates are truncated to whole pixels and clamped to the frame.
    /// Returns `None` when nothing is left after clamping.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<RgbImage> {
        let clamp_x = |v: f32| (v.max(0.0) as u32).min(self.width());
        let clamp_y = |v: f32| (v.max(0.0) as u32).min(self.height());

        let (x1, x2) = (clamp_x(bbox.x1), clamp_x(bbox.x2));
        let (y1, y2) = (clamp_y(bbox.y1), clamp_y(bbox.y2));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(image::imageops::crop_imm(&self.image, x1, y1, x2 - x1, y2 - y1).to_image())
    }
}
