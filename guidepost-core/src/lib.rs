//! # guidepost-core
//!
//! Turns per-frame object detections into spoken guidance and vibration cues
//! for a visually impaired pedestrian.
//!
//! ## Architecture
//!
//! ```text
//! FrameSource → ObjectDetector::detect → DecisionEngine::process_frame
//!                                              │
//!                        geometry · signal · dedup · debounce
//!                                              │
//!                                   Vec<GuidanceAction>
//!                                   │                 │
//!                          SpeechRenderer     ActuatorLink (optional)
//!                                   │
//!                      broadcast::Sender<GuidanceEvent>
//! ```
//!
//! The decision engine is plain synchronous code with no I/O; everything that
//! touches a device lives behind a trait in `detector`, `feedback` or `frames`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod detection;
pub mod detector;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod frames;
pub mod geometry;
pub mod ipc;
pub mod service;
pub mod signal;

// Convenience re-exports for downstream crates
pub use detection::{BoundingBox, Detection, Frame};
pub use detector::{DetectorHandle, ObjectDetector};
pub use engine::{DecisionEngine, EngineConfig};
pub use error::GuidanceError;
pub use geometry::{Proximity, Zone};
pub use ipc::events::{
    ActuatorCommand, EngineStatus, EngineStatusEvent, GuidanceAction, GuidanceEvent,
    UtteranceKind,
};
pub use service::GuidanceService;
pub use signal::{SignalColor, TrafficSignalInterpreter};

#[cfg(feature = "onnx")]
pub use detector::{YoloDetector, YoloDetectorConfig};
