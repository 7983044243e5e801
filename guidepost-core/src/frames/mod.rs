//! Frame acquisition.
//!
//! # Sources
//!
//! - `DirectoryFrameSource` replays image files from disk in name order.
//! - `ChannelFrameSource` receives frames pushed by another thread (a camera
//!   driver, a network decoder) through a bounded crossbeam channel.
//! - `CameraFrameSource` (feature `camera`) captures a webcam through OpenCV
//!   and feeds a `ChannelFrameSource`.
//!
//! All sources number frames from 0 in arrival order. A source signals the end of
//! the stream with `FrameRead::EndOfStream`; the pipeline stops there.

#[cfg(feature = "camera")]
pub mod camera;

#[cfg(feature = "camera")]
pub use camera::{CameraConfig, CameraFrameSource};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbImage;
use tracing::{debug, info};

use crate::detection::Frame;
use crate::error::{GuidanceError, Result};

/// Outcome of one poll of a frame source.
#[derive(Debug)]
pub enum FrameRead {
    Frame(Frame),
    /// Nothing available yet; poll again.
    Idle,
    EndOfStream,
}

/// Supplies frames to the pipeline. Called from the pipeline thread only.
pub trait FrameSource: Send + 'static {
    /// Fetch the next frame. Implementations should not block for much
    /// longer than a frame interval so the pipeline can notice a stop request.
    fn next_frame(&mut self) -> Result<FrameRead>;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Reads `*.png` / `*.jpg` files from a directory, sorted by file name.
pub struct DirectoryFrameSource {
    paths: Vec<PathBuf>,
    next: usize,
    interval: Duration,
}

impl DirectoryFrameSource {
    /// List image files in `dir`. `interval` is slept before every frame
    /// after the first to approximate camera pacing.
    pub fn open(dir: impl AsRef<Path>, interval: Duration) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(GuidanceError::FrameSource(format!(
                "no image files in {}",
                dir.display()
            )));
        }
        info!(dir = %dir.display(), frames = paths.len(), "directory frame source opened");

        Ok(Self {
            paths,
            next: 0,
            interval,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<FrameRead> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(FrameRead::EndOfStream);
        };
        if self.next > 0 && !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }

        let image = image::open(path)?.to_rgb8();
        debug!(path = %path.display(), "loaded frame");
        let frame = Frame::new(self.next as u64, image);
        self.next += 1;
        Ok(FrameRead::Frame(frame))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Producer half of a frame channel.
#[derive(Clone)]
pub struct FrameSender(Sender<RgbImage>);

impl FrameSender {
    /// Queue a frame without blocking. Returns `false` (and drops the frame)
    /// when the pipeline is behind or gone; a stale frame is worth less than
    /// a fresh one.
    pub fn offer(&self, image: RgbImage) -> bool {
        match self.0.try_send(image) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("frame channel full, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half of a frame channel. Ends when every `FrameSender` is dropped.
pub struct ChannelFrameSource {
    rx: Receiver<RgbImage>,
    poll: Duration,
    next_seq: u64,
}

impl FrameSource for ChannelFrameSource {
    fn next_frame(&mut self) -> Result<FrameRead> {
        match self.rx.recv_timeout(self.poll) {
            Ok(image) => {
                let frame = Frame::new(self.next_seq, image);
                self.next_seq += 1;
                Ok(FrameRead::Frame(frame))
            }
            Err(RecvTimeoutError::Timeout) => Ok(FrameRead::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(FrameRead::EndOfStream),
        }
    }
}

/// Create a bounded frame channel. `poll` bounds how long the pipeline waits
/// for a frame before re-checking its running flag.
pub fn frame_channel(capacity: usize, poll: Duration) -> (FrameSender, ChannelFrameSource) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        FrameSender(tx),
        ChannelFrameSource {
            rx,
            poll,
            next_seq: 0,
        },
    )
}
