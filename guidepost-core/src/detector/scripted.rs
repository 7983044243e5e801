//! `ScriptedDetector`: replays pre-recorded detections.
//!
//! Used to drive the full pipeline without a model: each frame gets the
//! detections stored at index `frame.seq` in the script. Frames past the end
//! of the script see no detections.
//!
//! Script format (JSON, one array per frame):
//!
//! ```json
//! [
//!   [{"label": "person", "confidence": 0.9, "box": {"x1": 0, "y1": 0, "x2": 50, "y2": 50}}],
//!   []
//! ]
//! ```

use std::path::Path;

use tracing::debug;

use crate::detection::{Detection, Frame};
use crate::detector::ObjectDetector;
use crate::error::Result;

pub struct ScriptedDetector {
    frames: Vec<Vec<Detection>>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ObjectDetector for ScriptedDetector {
    fn warm_up(&mut self) -> Result<()> {
        debug!(frames = self.frames.len(), "scripted detector ready");
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let detections = usize::try_from(frame.seq)
            .ok()
            .and_then(|i| self.frames.get(i))
            .cloned()
            .unwrap_or_default();
        Ok(detections)
    }

    fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .frames
            .iter()
            .flatten()
            .map(|d| d.label.clone())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}
