//! Guidepost host entry point.
//!
//! Wires a frame source, a detector and the feedback adapters into a
//! `GuidanceService`, then runs until the frames run out (or the camera stops
//! delivering), Ctrl-C arrives or the user types `q` on stdin.

mod settings;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use guidepost_core::{
    detector::{DetectorHandle, ScriptedDetector},
    feedback::{open_actuator, CommandSpeech, LogSpeech, SpeechRenderer},
    frames::{DirectoryFrameSource, FrameSource},
    GuidanceService,
};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const FRAME_INTERVAL_ENV: &str = "GUIDEPOST_FRAME_INTERVAL_MS";
const DEFAULT_FRAME_INTERVAL_MS: u64 = 100;

/// Spoken obstacle and traffic light guidance from camera frames.
#[derive(Debug, Parser)]
#[command(name = "guidepost", version, about)]
struct Args {
    /// Settings file (created with defaults if missing).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory of frames (png/jpg) replayed in name order.
    #[arg(long, conflicts_with = "camera")]
    frames: Option<PathBuf>,

    /// Webcam device index to capture from (needs the `camera` feature).
    #[arg(long, value_name = "ID")]
    camera: Option<i32>,

    /// JSON file with one detection list per frame; replaces the model.
    #[arg(long)]
    detections: Option<PathBuf>,

    /// ONNX detector weights (overrides the settings file).
    #[cfg(feature = "onnx")]
    #[arg(long)]
    model: Option<PathBuf>,

    /// Run without the vibration device.
    #[arg(long)]
    no_actuator: bool,

    /// Speech command to use instead of the configured one.
    #[arg(long, value_name = "COMMAND")]
    say: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("guidepost=info")),
        )
        .init();

    let args = Args::parse();
    info!("Guidepost starting");

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        match save_settings(&settings_path, &settings) {
            Ok(()) => info!(path = %settings_path.display(), "wrote default settings"),
            Err(e) => warn!("could not write default settings: {e}"),
        }
    }
    if args.no_actuator {
        settings.actuator_enabled = false;
    }
    if let Some(program) = &args.say {
        settings.speech_program = program.clone();
        settings.normalize();
    }

    let detector = build_detector(&args, &settings)?;
    let service = Arc::new(GuidanceService::new(settings.engine_config(), detector));
    service.warm_up().context("detector warm-up failed")?;

    let source = build_source(&args)?;
    let speech = build_speech(&settings);
    let actuator = open_actuator(&settings.actuator_config());

    let mut actions = service.subscribe_actions();
    tokio::spawn(async move {
        while let Ok(event) = actions.recv().await {
            debug!(seq = event.seq, frame = event.frame_seq, actions = event.actions.len(), "guidance");
        }
    });

    let mut pipeline = service.start(source, speech, actuator)?;
    let mut quit = spawn_stdin_watcher();
    info!("running; press q then Enter (or Ctrl-C) to stop");

    tokio::select! {
        res = &mut pipeline => {
            res.context("pipeline task panicked")?;
            info!(diagnostics = ?service.diagnostics_snapshot(), "frames exhausted");
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
        Some(()) = quit.recv() => info!("quit requested"),
    }

    if let Err(e) = service.stop() {
        debug!("stop: {e}");
    }
    pipeline.await.context("pipeline task panicked")?;
    info!(diagnostics = ?service.diagnostics_snapshot(), "Guidepost stopped");
    Ok(())
}

fn build_detector(args: &Args, settings: &AppSettings) -> anyhow::Result<DetectorHandle> {
    if let Some(path) = &args.detections {
        let scripted = ScriptedDetector::from_json_file(path)
            .with_context(|| format!("cannot load detections from {}", path.display()))?;
        info!(frames = scripted.len(), "using scripted detections");
        return Ok(DetectorHandle::new(scripted));
    }

    #[cfg(feature = "onnx")]
    {
        use guidepost_core::detector::{YoloDetector, YoloDetectorConfig};

        let mut config = YoloDetectorConfig::default();
        if let Some(path) = args.model.clone().or_else(|| settings.model_path.clone()) {
            config.model_path = path;
        }
        info!(model = %config.model_path.display(), "using ONNX detector");
        Ok(DetectorHandle::new(YoloDetector::new(config)))
    }

    #[cfg(not(feature = "onnx"))]
    {
        if settings.model_path.is_some() {
            warn!("modelPath is set but this build has no ONNX support");
        }
        anyhow::bail!("no detector: pass --detections or build with the `onnx` feature")
    }
}

fn build_source(args: &Args) -> anyhow::Result<Box<dyn FrameSource>> {
    if let Some(device) = args.camera {
        return open_camera(device);
    }
    let Some(dir) = &args.frames else {
        anyhow::bail!("no frame source: pass --frames <dir> or --camera <id>");
    };
    let source = DirectoryFrameSource::open(dir, frame_interval())
        .with_context(|| format!("cannot read frames from {}", dir.display()))?;
    Ok(Box::new(source))
}

#[cfg(feature = "camera")]
fn open_camera(device: i32) -> anyhow::Result<Box<dyn FrameSource>> {
    use guidepost_core::frames::{CameraConfig, CameraFrameSource};

    let config = CameraConfig {
        device,
        ..CameraConfig::default()
    };
    let source = CameraFrameSource::open(&config)
        .with_context(|| format!("cannot open camera {device}"))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "camera"))]
fn open_camera(device: i32) -> anyhow::Result<Box<dyn FrameSource>> {
    anyhow::bail!("camera {device} requested but this build has no `camera` feature")
}

fn build_speech(settings: &AppSettings) -> Box<dyn SpeechRenderer> {
    let speech = CommandSpeech::new(settings.speech_config());
    if speech.is_available() {
        info!(program = %settings.speech_program, "speech ready");
        Box::new(speech)
    } else {
        warn!(
            program = %settings.speech_program,
            "speech program not found; sentences will only be logged"
        );
        Box::new(LogSpeech)
    }
}

fn frame_interval() -> Duration {
    let ms = std::env::var(FRAME_INTERVAL_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_FRAME_INTERVAL_MS);
    Duration::from_millis(ms)
}

/// Signals once when a line reading `q` arrives on stdin.
fn spawn_stdin_watcher() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("q") {
                let _ = tx.blocking_send(());
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_alone_is_a_valid_source() {
        let args = Args::try_parse_from(["guidepost", "--camera", "0", "--detections", "d.json"])
            .expect("camera without frames parses");
        assert_eq!(args.camera, Some(0));
        assert!(args.frames.is_none());
    }

    #[test]
    fn frames_and_camera_are_exclusive() {
        assert!(Args::try_parse_from(["guidepost", "--frames", "walk", "--camera", "0"]).is_err());
    }

    #[test]
    fn missing_source_is_reported() {
        let args = Args::try_parse_from(["guidepost"]).expect("no flags parse");
        let err = build_source(&args).err().expect("no source configured");
        assert!(err.to_string().contains("--frames"));
    }
}
