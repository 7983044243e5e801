//! Object detector abstraction.
//!
//! The `ObjectDetector` trait decouples the pipeline from any specific
//! backend (scripted replay, ONNX YOLO, a remote service, ...).
//!
//! `detect` takes `&mut self` because real backends keep session state and
//! scratch buffers. All access is serialised through `DetectorHandle`'s
//! `parking_lot::Mutex`.

pub mod scripted;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{YoloDetector, YoloDetectorConfig};

pub use scripted::ScriptedDetector;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::detection::{Detection, Frame};
use crate::error::Result;

/// Contract for detection backends.
pub trait ObjectDetector: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference. Called once
    /// before the first frame.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Detect objects in `frame`. Box coordinates are in the frame's pixel
    /// space with `x2 >= x1` and `y2 >= y1`.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Labels this backend can emit. The traffic light rule only fires if
    /// the configured traffic light label is in this set.
    fn labels(&self) -> Vec<String>;
}

/// Thread-safe reference-counted handle to any `ObjectDetector` implementor.
#[derive(Clone)]
pub struct DetectorHandle(pub Arc<Mutex<dyn ObjectDetector>>);

impl DetectorHandle {
    /// Wrap any `ObjectDetector` in a `DetectorHandle`.
    pub fn new<D: ObjectDetector>(detector: D) -> Self {
        Self(Arc::new(Mutex::new(detector)))
    }

    /// Whether `label` is part of the wrapped detector's vocabulary.
    pub fn recognizes(&self, label: &str) -> bool {
        self.0.lock().labels().iter().any(|l| l == label)
    }
}

impl std::fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorHandle").finish_non_exhaustive()
    }
}
