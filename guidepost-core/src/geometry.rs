//! Bounding box → spatial zone and proximity bucket.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Horizontal third of the frame a detection's center falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Left,
    Center,
    Right,
}

impl Zone {
    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Left => "left",
            Zone::Center => "center",
            Zone::Right => "right",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse distance bucket derived from bounding-box area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Proximity {
    Far,
    Close,
    VeryClose,
}

impl Proximity {
    pub fn as_str(self) -> &'static str {
        match self {
            Proximity::Far => "far",
            Proximity::Close => "close",
            Proximity::VeryClose => "very close",
        }
    }

    /// Whether this bucket should drive the vibration motor.
    pub fn is_near(self) -> bool {
        matches!(self, Proximity::Close | Proximity::VeryClose)
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Area thresholds (px²) separating the proximity buckets.
///
/// Absolute pixel areas, so they only make sense for a given camera
/// resolution. Defaults were tuned on 640×480 input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityThresholds {
    /// Areas strictly above this are at least `Close`. Default: 20 000.
    pub close_area: f32,
    /// Areas strictly above this are `VeryClose`. Default: 50 000.
    pub very_close_area: f32,
}

impl Default for ProximityThresholds {
    fn default() -> Self {
        Self {
            close_area: 20_000.0,
            very_close_area: 50_000.0,
        }
    }
}

/// Split the frame width into three equal thirds. A center exactly on a
/// boundary belongs to the zone on its right.
pub fn classify_zone(center_x: f32, frame_width: u32) -> Zone {
    let width = frame_width as f32;
    if center_x < width / 3.0 {
        Zone::Left
    } else if center_x < 2.0 * width / 3.0 {
        Zone::Center
    } else {
        Zone::Right
    }
}

pub fn classify_proximity(box_area: f32, thresholds: &ProximityThresholds) -> Proximity {
    if box_area > thresholds.very_close_area {
        Proximity::VeryClose
    } else if box_area > thresholds.close_area {
        Proximity::Close
    } else {
        Proximity::Far
    }
}
