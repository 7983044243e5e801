//! Traffic light color by HSV pixel counting.
//!
//! ## Algorithm
//!
//! 1. Convert each RGB pixel to 8-bit HSV (H in 0..=179, S/V in 0..=255).
//! 2. Count pixels inside the red band and inside the green band.
//! 3. Red count > threshold → `Red`; else green count > threshold → `Green`;
//!    else `Unknown`.
//!
//! Thresholds are absolute pixel counts and are not normalised by crop size,
//! so a distant (small) light never reaches them at default settings.

use image::{Rgb, RgbImage};
use tracing::trace;

use super::{SignalColor, TrafficSignalInterpreter};

/// Inclusive HSV box on the 8-bit scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvBand {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvBand {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

/// Tunables for `HsvSignalInterpreter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalConfig {
    /// Narrow hue range near 0°, high saturation and value.
    pub red_band: HsvBand,
    /// Broader hue range, moderate saturation and value.
    pub green_band: HsvBand,
    /// Red pixels required (strictly more than). Default: 1000.
    pub red_pixel_threshold: usize,
    /// Green pixels required (strictly more than). Default: 1000.
    pub green_pixel_threshold: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            red_band: HsvBand::new([0, 100, 100], [10, 255, 255]),
            green_band: HsvBand::new([40, 40, 40], [90, 255, 255]),
            red_pixel_threshold: 1_000,
            green_pixel_threshold: 1_000,
        }
    }
}

/// Stateless pixel-counting traffic light classifier.
#[derive(Debug, Clone, Default)]
pub struct HsvSignalInterpreter {
    config: SignalConfig,
}

impl HsvSignalInterpreter {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Count (red, green) pixels in `region`.
    pub fn count_pixels(&self, region: &RgbImage) -> (usize, usize) {
        region.pixels().fold((0, 0), |(red, green), px| {
            let hsv = rgb_to_hsv(px);
            (
                red + usize::from(self.config.red_band.contains(hsv)),
                green + usize::from(self.config.green_band.contains(hsv)),
            )
        })
    }
}

impl TrafficSignalInterpreter for HsvSignalInterpreter {
    fn classify(&self, region: &RgbImage) -> SignalColor {
        let (red, green) = self.count_pixels(region);
        trace!(red, green, w = region.width(), h = region.height(), "signal pixel counts");

        if red > self.config.red_pixel_threshold {
            SignalColor::Red
        } else if green > self.config.green_pixel_threshold {
            SignalColor::Green
        } else {
            SignalColor::Unknown
        }
    }
}

/// RGB → HSV on the 8-bit scale used by most vision toolkits:
/// hue is halved to fit 0..=179.
pub fn rgb_to_hsv(px: &Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = px.0.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        (h / 2.0).round().min(179.0) as u8,
        s.round() as u8,
        max as u8,
    ]
}
