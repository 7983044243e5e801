use std::sync::Arc;
use std::time::Duration;

use guidepost_core::detector::ScriptedDetector;
use guidepost_core::error::Result;
use guidepost_core::feedback::{LogSpeech, SpeechRenderer};
use guidepost_core::frames::frame_channel;
use guidepost_core::{
    BoundingBox, Detection, DetectorHandle, EngineConfig, EngineStatus, GuidanceError,
    GuidanceService,
};
use image::RgbImage;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;

const POLL: Duration = Duration::from_millis(10);

#[derive(Clone, Default)]
struct RecordingSpeech(Arc<Mutex<Vec<String>>>);

impl SpeechRenderer for RecordingSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.0.lock().push(text.to_string());
        Ok(())
    }
}

fn person_close() -> Detection {
    Detection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 200.0, 150.0))
}

fn service_with(script: Vec<Vec<Detection>>) -> GuidanceService {
    let service = GuidanceService::new(
        EngineConfig::default(),
        DetectorHandle::new(ScriptedDetector::new(script)),
    );
    service.warm_up().expect("scripted detector warms up");
    service
}

async fn join(handle: JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline exits")
        .expect("pipeline does not panic");
}

#[tokio::test]
async fn start_stop_lifecycle() {
    let service = service_with(Vec::new());
    assert_eq!(service.status(), EngineStatus::Idle);
    assert!(!service.is_running());

    let (_tx, source) = frame_channel(4, POLL);
    let handle = service
        .start(Box::new(source), Box::new(LogSpeech), None)
        .expect("first start");
    assert!(service.is_running());
    assert_eq!(service.status(), EngineStatus::Running);

    let (_tx2, source2) = frame_channel(4, POLL);
    assert!(matches!(
        service.start(Box::new(source2), Box::new(LogSpeech), None),
        Err(GuidanceError::AlreadyRunning)
    ));

    service.stop().expect("stop");
    assert!(matches!(service.stop(), Err(GuidanceError::NotRunning)));
    join(handle).await;

    assert!(!service.is_running());
    assert_eq!(service.status(), EngineStatus::Stopped);
}

#[tokio::test]
async fn end_of_stream_stops_the_service() {
    let service = service_with(vec![vec![person_close()]; 3]);
    let mut status = service.subscribe_status();

    let (tx, source) = frame_channel(8, POLL);
    let speech = RecordingSpeech::default();
    let handle = service
        .start(Box::new(source), Box::new(speech.clone()), None)
        .expect("start");

    for _ in 0..3 {
        assert!(tx.offer(RgbImage::new(640, 480)));
    }
    drop(tx);
    join(handle).await;

    assert!(!service.is_running());
    assert_eq!(service.status(), EngineStatus::Stopped);
    assert!(matches!(service.stop(), Err(GuidanceError::NotRunning)));

    assert_eq!(status.try_recv().expect("running event").status, EngineStatus::Running);
    assert_eq!(status.try_recv().expect("stopped event").status, EngineStatus::Stopped);
    assert!(matches!(status.try_recv(), Err(TryRecvError::Empty)));

    let snap = service.diagnostics_snapshot();
    assert_eq!(snap.frames_in, 3);
    assert_eq!(snap.detections_seen, 3);
    // Vibration cues flow from the first frame even while speech is still
    // inside the startup cooldown; with no actuator they are all dropped.
    assert_eq!(snap.actuator_dropped, 3);
    assert_eq!(snap.actuator_sent, 0);
    assert_eq!(snap.utterances_spoken, 0);
    assert!(speech.0.lock().is_empty());
}

#[tokio::test]
async fn restart_resets_diagnostics() {
    let service = service_with(vec![vec![person_close()]]);

    let (tx, source) = frame_channel(4, POLL);
    let handle = service
        .start(Box::new(source), Box::new(LogSpeech), None)
        .expect("start");
    assert!(tx.offer(RgbImage::new(64, 64)));
    drop(tx);
    join(handle).await;
    assert_eq!(service.diagnostics_snapshot().frames_in, 1);

    let (tx, source) = frame_channel(4, POLL);
    let handle = service
        .start(Box::new(source), Box::new(LogSpeech), None)
        .expect("restart after end of stream");
    drop(tx);
    join(handle).await;
    assert_eq!(service.diagnostics_snapshot().frames_in, 0);
}

#[tokio::test]
async fn actions_are_broadcast_per_frame() {
    let service = service_with(vec![vec![person_close()], Vec::new()]);
    let mut actions = service.subscribe_actions();

    let (tx, source) = frame_channel(4, POLL);
    let handle = service
        .start(Box::new(source), Box::new(LogSpeech), None)
        .expect("start");
    assert!(tx.offer(RgbImage::new(640, 480)));
    assert!(tx.offer(RgbImage::new(640, 480)));
    drop(tx);
    join(handle).await;

    // Frame 0 carries a vibration cue; frame 1 is empty and inside the
    // clear-path cooldown, so it produces no event.
    let event = actions.try_recv().expect("event for frame 0");
    assert_eq!(event.frame_seq, 0);
    assert_eq!(event.actions.len(), 1);
    assert!(event.actions[0].command().is_some());
    assert!(matches!(actions.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn restart_before_previous_run_exits_keeps_new_run_alive() {
    let service = service_with(Vec::new());

    // Long poll keeps the first run parked inside `next_frame()` across stop.
    let (old_tx, old_source) = frame_channel(4, Duration::from_millis(300));
    let old = service
        .start(Box::new(old_source), Box::new(LogSpeech), None)
        .expect("first start");
    service.stop().expect("stop");

    let (new_tx, new_source) = frame_channel(4, POLL);
    let new = service
        .start(Box::new(new_source), Box::new(LogSpeech), None)
        .expect("restart while the old task is still polling");

    // The old run reaches end of stream after the restart.
    drop(old_tx);
    join(old).await;

    assert!(service.is_running());
    assert_eq!(service.status(), EngineStatus::Running);
    assert!(!new.is_finished());

    service.stop().expect("stop new run");
    join(new).await;
    drop(new_tx);
    assert!(!service.is_running());
    assert_eq!(service.status(), EngineStatus::Stopped);
}
