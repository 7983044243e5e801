//! Traffic signal interpretation.
//!
//! The `TrafficSignalInterpreter` trait is the extensibility point: the
//! engine ships with `HsvSignalInterpreter` (pixel counting in HSV space) and
//! tests can swap in a fixed answer without building synthetic crops.

pub mod hsv;

pub use hsv::{HsvBand, HsvSignalInterpreter, SignalConfig};

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// State of a traffic light as seen in one crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalColor {
    Red,
    Green,
    /// Neither color is dominant enough to act on, or the crop was empty.
    Unknown,
}

/// Trait for all traffic light classifiers.
pub trait TrafficSignalInterpreter: Send + 'static {
    /// Classify a cropped region believed to contain a traffic light.
    fn classify(&self, region: &RgbImage) -> SignalColor;
}
