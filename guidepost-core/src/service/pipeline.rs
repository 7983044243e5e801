//! Blocking guidance loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Check running flag
//! 2. Poll frame source → Frame | Idle | EndOfStream
//! 3. ObjectDetector::detect → Vec<Detection>   (error → skip frame)
//! 4. DecisionEngine::process_frame(now)        → Vec<GuidanceAction>
//! 5. Dispatch in order: Speak → SpeechRenderer, Actuate → ActuatorLink
//! 6. Broadcast GuidanceEvent when the frame produced any action
//! ```
//!
//! This loop runs in `spawn_blocking`. Speech is rendered synchronously on
//! this thread, so utterances never overlap; a long utterance simply delays
//! the next frame.
//!
//! Every run owns its `running` flag and carries the generation it was
//! started under. A run that ends after the service has moved on to a newer
//! generation leaves the shared status alone.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, debug_span, error, info, warn};

use crate::{
    detector::DetectorHandle,
    engine::DecisionEngine,
    feedback::{ActuatorLink, SpeechRenderer},
    frames::{FrameRead, FrameSource},
    ipc::events::{EngineStatus, EngineStatusEvent, GuidanceAction, GuidanceEvent},
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub detections_seen: AtomicUsize,
    pub low_confidence_dropped: AtomicUsize,
    pub detector_errors: AtomicUsize,
    pub utterances_spoken: AtomicUsize,
    pub speech_errors: AtomicUsize,
    pub actuator_sent: AtomicUsize,
    pub actuator_dropped: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            detections_seen: self.detections_seen.load(Ordering::Relaxed),
            low_confidence_dropped: self.low_confidence_dropped.load(Ordering::Relaxed),
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            utterances_spoken: self.utterances_spoken.load(Ordering::Relaxed),
            speech_errors: self.speech_errors.load(Ordering::Relaxed),
            actuator_sent: self.actuator_sent.load(Ordering::Relaxed),
            actuator_dropped: self.actuator_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub detections_seen: usize,
    pub low_confidence_dropped: usize,
    pub detector_errors: usize,
    pub utterances_spoken: usize,
    pub speech_errors: usize,
    pub actuator_sent: usize,
    pub actuator_dropped: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub engine: DecisionEngine,
    pub detector: DetectorHandle,
    pub source: Box<dyn FrameSource>,
    pub speech: Box<dyn SpeechRenderer>,
    /// `None` when no vibration device is connected.
    pub actuator: Option<Box<dyn ActuatorLink>>,
    /// This run's flag. Cleared by `stop()` or when the loop ends.
    pub running: Arc<AtomicBool>,
    /// Generation of the newest run, shared with the service.
    pub generation: Arc<AtomicU64>,
    /// Generation this run was started under.
    pub run_id: u64,
    pub action_tx: broadcast::Sender<GuidanceEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking pipeline until `ctx.running` becomes false or the frame
/// source ends.
pub fn run(mut ctx: PipelineContext) {
    info!("pipeline started");

    loop {
        // ── 1. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 2. Next frame ─────────────────────────────────────────────────
        let frame = match ctx.source.next_frame() {
            Ok(FrameRead::Frame(frame)) => frame,
            Ok(FrameRead::Idle) => continue,
            Ok(FrameRead::EndOfStream) => {
                info!("frame source ended");
                finish(&ctx, EngineStatus::Stopped, None);
                break;
            }
            Err(e) => {
                error!("frame acquisition failed: {e}");
                finish(&ctx, EngineStatus::Stopped, Some(e.to_string()));
                break;
            }
        };
        ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        let span = debug_span!("frame", seq = frame.seq, w = frame.width(), h = frame.height());
        let _enter = span.enter();

        // ── 3. Detect ─────────────────────────────────────────────────────
        let detections = match ctx.detector.0.lock().detect(&frame) {
            Ok(d) => d,
            Err(e) => {
                ctx.diagnostics
                    .detector_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!("detector failed, skipping frame: {e}");
                continue;
            }
        };
        let threshold = ctx.engine.config().confidence_threshold;
        let low_confidence = detections
            .iter()
            .filter(|d| d.confidence < threshold)
            .count();
        ctx.diagnostics
            .detections_seen
            .fetch_add(detections.len(), Ordering::Relaxed);
        ctx.diagnostics
            .low_confidence_dropped
            .fetch_add(low_confidence, Ordering::Relaxed);
        debug!(detections = detections.len(), low_confidence, "detected");

        // ── 4. Decide ─────────────────────────────────────────────────────
        let actions = ctx
            .engine
            .process_frame(&frame, &detections, Instant::now());
        if actions.is_empty() {
            continue;
        }

        // A stop request that arrived while detecting discards the frame.
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 5. Dispatch ───────────────────────────────────────────────────
        dispatch(&mut ctx, &actions);

        // ── 6. Broadcast ──────────────────────────────────────────────────
        let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
        let _ = ctx.action_tx.send(GuidanceEvent {
            seq,
            frame_seq: frame.seq,
            actions,
        });
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        frames_in = snap.frames_in,
        detections_seen = snap.detections_seen,
        low_confidence_dropped = snap.low_confidence_dropped,
        detector_errors = snap.detector_errors,
        utterances_spoken = snap.utterances_spoken,
        speech_errors = snap.speech_errors,
        actuator_sent = snap.actuator_sent,
        actuator_dropped = snap.actuator_dropped,
        "pipeline stopped"
    );
}

/// Hand each action to its output adapter, in order.
fn dispatch(ctx: &mut PipelineContext, actions: &[GuidanceAction]) {
    for action in actions {
        match action {
            GuidanceAction::Speak { kind, text } => {
                debug!(?kind, "utterance");
                match ctx.speech.speak(text) {
                    Ok(()) => {
                        ctx.diagnostics
                            .utterances_spoken
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        ctx.diagnostics.speech_errors.fetch_add(1, Ordering::Relaxed);
                        error!("speech renderer failed: {e}");
                    }
                }
            }
            GuidanceAction::Actuate { command } => match ctx.actuator.as_mut() {
                Some(link) => match link.send(command.as_byte()) {
                    Ok(()) => {
                        ctx.diagnostics.actuator_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        ctx.diagnostics
                            .actuator_dropped
                            .fetch_add(1, Ordering::Relaxed);
                        warn!(?command, "actuator write failed: {e}");
                    }
                },
                None => {
                    ctx.diagnostics
                        .actuator_dropped
                        .fetch_add(1, Ordering::Relaxed);
                }
            },
        }
    }
}

/// The loop ended on its own: clear the running flag and, unless a newer run
/// has started since, publish the status.
fn finish(ctx: &PipelineContext, status: EngineStatus, detail: Option<String>) {
    ctx.running.store(false, Ordering::SeqCst);

    let mut current = ctx.status.lock();
    if ctx.generation.load(Ordering::SeqCst) != ctx.run_id {
        debug!(run = ctx.run_id, "superseded run ended; status left to the newer run");
        return;
    }
    *current = status;
    let _ = ctx.status_tx.send(EngineStatusEvent { status, detail });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use image::RgbImage;

    use crate::{
        detection::{BoundingBox, Detection, Frame},
        detector::{ObjectDetector, ScriptedDetector},
        engine::{EngineConfig, CLEAR_PATH_TEXT},
        error::{GuidanceError, Result},
        frames::{frame_channel, FrameSender},
    };

    #[derive(Clone, Default)]
    struct RecordingSpeech {
        spoken: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl SpeechRenderer for RecordingSpeech {
        fn speak(&mut self, text: &str) -> Result<()> {
            if self.fail {
                return Err(GuidanceError::Speech("synth offline".into()));
            }
            self.spoken.lock().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingActuator {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl ActuatorLink for RecordingActuator {
        fn send(&mut self, byte: u8) -> Result<()> {
            self.bytes.lock().push(byte);
            Ok(())
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(GuidanceError::Detector("inference crashed".into()))
        }

        fn labels(&self) -> Vec<String> {
            Vec::new()
        }
    }

    struct Harness {
        ctx: PipelineContext,
        frames: FrameSender,
        action_rx: broadcast::Receiver<GuidanceEvent>,
        status_rx: broadcast::Receiver<EngineStatusEvent>,
    }

    /// Engine clock seeded ten seconds in the past so the startup window is over.
    fn harness(
        detector: DetectorHandle,
        speech: RecordingSpeech,
        actuator: Option<RecordingActuator>,
    ) -> Harness {
        let started_at = Instant::now()
            .checked_sub(Duration::from_secs(10))
            .expect("monotonic clock older than ten seconds");
        let (frames, source) = frame_channel(8, Duration::from_millis(5));
        let (action_tx, action_rx) = broadcast::channel(16);
        let (status_tx, status_rx) = broadcast::channel(16);

        Harness {
            ctx: PipelineContext {
                engine: DecisionEngine::new(EngineConfig::default(), started_at),
                detector,
                source: Box::new(source),
                speech: Box::new(speech),
                actuator: actuator.map(|a| Box::new(a) as Box<dyn ActuatorLink>),
                running: Arc::new(AtomicBool::new(true)),
                generation: Arc::new(AtomicU64::new(1)),
                run_id: 1,
                action_tx,
                status_tx,
                status: Arc::new(Mutex::new(EngineStatus::Running)),
                seq: Arc::new(AtomicU64::new(0)),
                diagnostics: Arc::new(PipelineDiagnostics::default()),
            },
            frames,
            action_rx,
            status_rx,
        }
    }

    fn person_script() -> DetectorHandle {
        DetectorHandle::new(ScriptedDetector::new(vec![vec![Detection::new(
            "person",
            0.9,
            BoundingBox::new(0.0, 0.0, 50.0, 50.0),
        )]]))
    }

    #[test]
    fn run_speaks_and_actuates_then_stops_at_end_of_stream() {
        let speech = RecordingSpeech::default();
        let actuator = RecordingActuator::default();
        let mut h = harness(person_script(), speech.clone(), Some(actuator.clone()));
        let status = Arc::clone(&h.ctx.status);
        let running = Arc::clone(&h.ctx.running);
        let diagnostics = Arc::clone(&h.ctx.diagnostics);

        assert!(h.frames.offer(RgbImage::new(300, 300)));
        drop(h.frames);
        run(h.ctx);

        assert_eq!(
            *speech.spoken.lock(),
            vec!["There is a person to your left, it seems far.".to_string()]
        );
        assert_eq!(*actuator.bytes.lock(), vec![b'n']);

        let event = h.action_rx.try_recv().expect("guidance event");
        assert_eq!(event.seq, 0);
        assert_eq!(event.frame_seq, 0);
        assert_eq!(event.actions.len(), 2);

        assert_eq!(*status.lock(), EngineStatus::Stopped);
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(
            h.status_rx.try_recv().expect("status event").status,
            EngineStatus::Stopped
        );

        let snap = diagnostics.snapshot();
        assert_eq!(snap.frames_in, 1);
        assert_eq!(snap.detections_seen, 1);
        assert_eq!(snap.utterances_spoken, 1);
        assert_eq!(snap.actuator_sent, 1);
    }

    #[test]
    fn run_drops_actuator_commands_without_a_link() {
        let speech = RecordingSpeech::default();
        let h = harness(person_script(), speech.clone(), None);
        let diagnostics = Arc::clone(&h.ctx.diagnostics);

        assert!(h.frames.offer(RgbImage::new(300, 300)));
        drop(h.frames);
        run(h.ctx);

        assert_eq!(speech.spoken.lock().len(), 1);
        let snap = diagnostics.snapshot();
        assert_eq!(snap.actuator_sent, 0);
        assert_eq!(snap.actuator_dropped, 1);
    }

    #[test]
    fn run_skips_frames_the_detector_fails_on() {
        let speech = RecordingSpeech::default();
        let h = harness(DetectorHandle::new(FailingDetector), speech.clone(), None);
        let diagnostics = Arc::clone(&h.ctx.diagnostics);

        assert!(h.frames.offer(RgbImage::new(300, 300)));
        assert!(h.frames.offer(RgbImage::new(300, 300)));
        drop(h.frames);
        run(h.ctx);

        // No clear-path announcement either: the engine never saw the frames.
        assert!(speech.spoken.lock().is_empty());
        let snap = diagnostics.snapshot();
        assert_eq!(snap.frames_in, 2);
        assert_eq!(snap.detector_errors, 2);
    }

    #[test]
    fn run_keeps_going_when_speech_fails() {
        let speech = RecordingSpeech {
            fail: true,
            ..RecordingSpeech::default()
        };
        let actuator = RecordingActuator::default();
        let h = harness(person_script(), speech, Some(actuator.clone()));
        let diagnostics = Arc::clone(&h.ctx.diagnostics);

        assert!(h.frames.offer(RgbImage::new(300, 300)));
        drop(h.frames);
        run(h.ctx);

        assert_eq!(*actuator.bytes.lock(), vec![b'n']);
        assert_eq!(diagnostics.snapshot().speech_errors, 1);
    }

    #[test]
    fn run_announces_clear_path_for_empty_frames() {
        let speech = RecordingSpeech::default();
        let actuator = RecordingActuator::default();
        let h = harness(
            DetectorHandle::new(ScriptedDetector::new(Vec::new())),
            speech.clone(),
            Some(actuator.clone()),
        );

        assert!(h.frames.offer(RgbImage::new(64, 64)));
        assert!(h.frames.offer(RgbImage::new(64, 64)));
        drop(h.frames);
        run(h.ctx);

        // Second empty frame is inside the 5 s window.
        assert_eq!(*speech.spoken.lock(), vec![CLEAR_PATH_TEXT.to_string()]);
        assert_eq!(*actuator.bytes.lock(), vec![b'n']);
    }

    #[test]
    fn run_exits_immediately_when_not_running() {
        let speech = RecordingSpeech::default();
        let h = harness(person_script(), speech.clone(), None);
        h.ctx.running.store(false, Ordering::SeqCst);
        let status = Arc::clone(&h.ctx.status);
        let diagnostics = Arc::clone(&h.ctx.diagnostics);

        assert!(h.frames.offer(RgbImage::new(300, 300)));
        run(h.ctx);

        assert_eq!(diagnostics.snapshot().frames_in, 0);
        assert!(speech.spoken.lock().is_empty());
        // Stop requests own the status; the loop does not overwrite it.
        assert_eq!(*status.lock(), EngineStatus::Running);
    }

    #[test]
    fn superseded_run_leaves_status_alone() {
        let speech = RecordingSpeech::default();
        let mut h = harness(person_script(), speech, None);
        let status = Arc::clone(&h.ctx.status);
        let running = Arc::clone(&h.ctx.running);
        // The service has started generation 2 since this run began.
        h.ctx.generation.store(2, Ordering::SeqCst);

        drop(h.frames);
        run(h.ctx);

        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(*status.lock(), EngineStatus::Running);
        assert!(matches!(
            h.status_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
