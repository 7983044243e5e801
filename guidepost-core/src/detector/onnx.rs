//! YOLOv8 object detector on ONNX Runtime.
//!
//! ## Model I/O
//!
//! | Name      | Shape              | DType | Direction |
//! |-----------|--------------------|-------|-----------|
//! | `images`  | `[1, 3, 640, 640]` | f32   | in        |
//! | `output0` | `[1, 4 + C, N]`    | f32   | out       |
//!
//! Each of the `N` candidate columns holds `cx, cy, w, h` in input pixels
//! followed by `C` class scores (no separate objectness). Frames are stretched
//! to the square input, so boxes are scaled back per axis.
//!
//! Candidates under `min_score` are dropped before per-class NMS. The decision
//! engine applies its own confidence threshold on top.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use crate::{
    detection::{BoundingBox, Detection, Frame},
    detector::ObjectDetector,
    error::{GuidanceError, Result},
};

/// COCO class names in model output order. Index 9 is reported as
/// `traffic_light` so it matches the engine's default traffic light label.
pub const COCO_LABELS: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic_light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Configuration for `YoloDetector`.
#[derive(Debug, Clone)]
pub struct YoloDetectorConfig {
    pub model_path: PathBuf,
    /// Square model input size. Default: 640.
    pub input_size: u32,
    /// Candidates below this score are discarded before NMS. Default: 0.25.
    pub min_score: f32,
    /// IoU above which a lower-scored box of the same class is suppressed.
    /// Default: 0.45.
    pub iou_threshold: f32,
    /// Upper bound on detections returned per frame. Default: 100.
    pub max_detections: usize,
    pub labels: Vec<String>,
}

impl Default for YoloDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_models_dir().join("yolov8m.onnx"),
            input_size: 640,
            min_score: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
            labels: COCO_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("Guidepost").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
            .map(|p| p.join("guidepost").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
}

pub struct YoloDetector {
    config: YoloDetectorConfig,
    session: Option<Session>,
    input_name: String,
}

impl YoloDetector {
    /// Create a detector. The session is opened lazily in `warm_up()`.
    pub fn new(config: YoloDetectorConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: "images".into(),
        }
    }

    fn create_session(model_path: &Path) -> Result<Session> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(1, 8);

        SessionBuilder::new()
            .map_err(|e| GuidanceError::OnnxSession(e.to_string()))?
            .with_intra_threads(intra_threads)
            .map_err(|e| GuidanceError::OnnxSession(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::All)
            .map_err(|e| GuidanceError::OnnxSession(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| GuidanceError::OnnxSession(e.to_string()))
    }

    /// Stretch the frame to the model input and lay it out as NCHW in [0, 1].
    fn preprocess(&self, frame: &Frame) -> Array4<f32> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(&frame.image, size, size, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, px) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = f32::from(px.0[c]) / 255.0;
            }
        }
        tensor
    }

    /// Decode a `[1, 4 + C, N]` output into frame-space detections.
    fn postprocess(&self, shape: &[i64], data: &[f32], frame: &Frame) -> Vec<Detection> {
        if shape.len() != 3 || shape[1] < 5 {
            debug!(?shape, "unexpected YOLO output shape");
            return Vec::new();
        }
        let rows = shape[1] as usize;
        let cols = shape[2] as usize;
        if data.len() < rows * cols {
            return Vec::new();
        }

        let scale_x = frame.width() as f32 / self.config.input_size as f32;
        let scale_y = frame.height() as f32 / self.config.input_size as f32;
        let max_x = frame.width() as f32;
        let max_y = frame.height() as f32;
        let at = |row: usize, col: usize| data[row * cols + col];

        let mut candidates: Vec<(usize, Detection)> = Vec::new();
        for col in 0..cols {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, at(row, col)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < self.config.min_score {
                continue;
            }
            let Some(label) = self.config.labels.get(class_id) else {
                continue;
            };

            let (cx, cy, w, h) = (at(0, col), at(1, col), at(2, col), at(3, col));
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) * scale_x).clamp(0.0, max_x),
                ((cy - h / 2.0) * scale_y).clamp(0.0, max_y),
                ((cx + w / 2.0) * scale_x).clamp(0.0, max_x),
                ((cy + h / 2.0) * scale_y).clamp(0.0, max_y),
            );
            candidates.push((class_id, Detection::new(label.clone(), score.min(1.0), bbox)));
        }

        non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.max_detections,
        )
    }
}

impl ObjectDetector for YoloDetector {
    fn warm_up(&mut self) -> Result<()> {
        let path = &self.config.model_path;
        if !path.exists() {
            return Err(GuidanceError::ModelNotFound { path: path.clone() });
        }

        info!("=== YoloDetector Startup Report ===");
        info!("  path: {:?}", path);
        info!("  input_size: {}", self.config.input_size);
        info!("  labels: {}", self.config.labels.len());

        let session = Self::create_session(path)?;
        if let Some(input) = session.inputs().first() {
            self.input_name = input.name().to_string();
        }
        info!("  input: {}", self.input_name);
        self.session = Some(session);

        // Dummy forward pass to populate caches.
        let size = self.config.input_size;
        let dummy = Frame::new(0, image::RgbImage::new(size, size));
        self.detect(&dummy)?;

        info!("=== YoloDetector ready ===");
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = Value::from_array(self.preprocess(frame))
            .map_err(|e: ort::Error| GuidanceError::OnnxSession(e.to_string()))?;

        let session = self.session.as_mut().ok_or_else(|| {
            GuidanceError::OnnxSession("model not loaded; call warm_up() first".into())
        })?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| GuidanceError::OnnxSession(e.to_string()))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| GuidanceError::OnnxSession(e.to_string()))?;
        let shape: Vec<i64> = shape.iter().copied().collect();
        let data = data.to_vec();
        drop(outputs);

        let detections = self.postprocess(&shape, &data, frame);
        debug!(count = detections.len(), seq = frame.seq, "YOLO detections");
        Ok(detections)
    }

    fn labels(&self) -> Vec<String> {
        self.config.labels.clone()
    }
}

/// Greedy per-class NMS, highest score first.
fn non_max_suppression(
    mut candidates: Vec<(usize, Detection)>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));

    let mut keep: Vec<(usize, Detection)> = Vec::new();
    for (class_id, det) in candidates {
        if keep.len() >= max_detections {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|(k, kept)| *k == class_id && iou(&kept.bbox, &det.bbox) > iou_threshold);
        if !suppressed {
            keep.push((class_id, det));
        }
    }
    keep.into_iter().map(|(_, d)| d).collect()
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
