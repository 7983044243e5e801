//! Live webcam capture through OpenCV.
//!
//! A dedicated thread reads BGR frames from the device, converts them to
//! RGB and offers them to a `frame_channel`. When the consumer falls behind,
//! frames are dropped at the channel. A failed or empty read ends the capture
//! thread; the channel then disconnects and the source reports
//! `FrameRead::EndOfStream`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY},
};
use tracing::{debug, info, warn};

use super::{frame_channel, ChannelFrameSource, FrameRead, FrameSender, FrameSource};
use crate::error::{GuidanceError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// OpenCV device index. Default: 0 (first webcam).
    pub device: i32,
    /// Frames buffered between the capture thread and the pipeline.
    pub capacity: usize,
    /// How long `next_frame` waits before reporting `Idle`.
    pub poll: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            capacity: 2,
            poll: Duration::from_millis(100),
        }
    }
}

pub struct CameraFrameSource {
    frames: ChannelFrameSource,
    stop: Arc<AtomicBool>,
}

impl CameraFrameSource {
    /// Open the device and start the capture thread.
    ///
    /// # Errors
    /// `GuidanceError::FrameSource` if the device cannot be opened.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let device = config.device;
        let capture = open_capture(device)?;
        let (tx, frames) = frame_channel(config.capacity, config.poll);
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("guidepost-camera".into())
            .spawn(move || capture_loop(capture, tx, stop_flag, device))?;

        info!(device, "camera opened");
        Ok(Self { frames, stop })
    }
}

impl FrameSource for CameraFrameSource {
    fn next_frame(&mut self) -> Result<FrameRead> {
        self.frames.next_frame()
    }
}

impl Drop for CameraFrameSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn open_capture(device: i32) -> Result<VideoCapture> {
    let capture = VideoCapture::new(device, CAP_ANY)
        .map_err(|e| GuidanceError::FrameSource(format!("failed to open camera {device}: {e}")))?;
    let opened = capture
        .is_opened()
        .map_err(|e| GuidanceError::FrameSource(format!("camera {device} not opened: {e}")))?;
    if !opened {
        return Err(GuidanceError::FrameSource(format!(
            "camera {device} failed to open"
        )));
    }
    Ok(capture)
}

fn capture_loop(mut capture: VideoCapture, tx: FrameSender, stop: Arc<AtomicBool>, device: i32) {
    let mut bgr = Mat::default();

    while !stop.load(Ordering::Relaxed) {
        match capture.read(&mut bgr) {
            Ok(true) if bgr.rows() > 0 && bgr.cols() > 0 => {}
            Ok(_) => {
                info!(device, "camera returned no frame; ending stream");
                break;
            }
            Err(e) => {
                warn!(device, "camera read failed, ending stream: {e}");
                break;
            }
        }

        match bgr_to_rgb(&bgr) {
            Ok(image) => {
                tx.offer(image);
            }
            Err(e) => {
                warn!(device, "frame conversion failed, ending stream: {e}");
                break;
            }
        }
    }
    debug!(device, "camera thread exiting");
}

fn bgr_to_rgb(bgr: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
        .map_err(|e| GuidanceError::FrameSource(format!("color conversion: {e}")))?;

    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb
        .data_bytes()
        .map_err(|e| GuidanceError::FrameSource(format!("frame data: {e}")))?
        .to_vec();
    RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
        GuidanceError::FrameSource(format!("unexpected {width}x{height} frame layout"))
    })
}
