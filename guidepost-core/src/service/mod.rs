//! `GuidanceService`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! GuidanceService::new()
//!     └─► warm_up()          → detector loaded, status = WarmingUp → Idle
//!         └─► start(..)      → pipeline spawned, status = Running
//!             └─► stop()     → running=false, status = Stopped
//! ```
//!
//! The pipeline also stops on its own when the frame source ends; the status
//! then moves to `Stopped` without a `stop()` call.
//!
//! ## Threading
//!
//! Each `start()` builds a fresh `DecisionEngine` and moves it into a
//! `spawn_blocking` task together with the adapters. The engine state is
//! never shared; the service only sees it through broadcast events and the
//! diagnostics counters.
//!
//! A run gets its own running flag, diagnostics and generation number.
//! `stop()` clears the current run's flag, so `start()` may be called again
//! before the previous task has exited. That task then drops its next frame
//! and ends without touching the newer run's flag or status.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    detector::DetectorHandle,
    engine::{DecisionEngine, EngineConfig},
    error::{GuidanceError, Result},
    feedback::{ActuatorLink, SpeechRenderer},
    frames::FrameSource,
    ipc::events::{EngineStatus, EngineStatusEvent, GuidanceEvent},
};

/// Broadcast channel capacity: events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// The top-level service handle.
///
/// `GuidanceService` is `Send + Sync`; wrap it in an `Arc` to share it with
/// signal handlers and event-forwarding tasks.
pub struct GuidanceService {
    config: EngineConfig,
    detector: DetectorHandle,
    /// Flag of the newest run; `true` while it is active.
    running: Mutex<Arc<AtomicBool>>,
    /// Incremented by every `start()`.
    generation: Arc<AtomicU64>,
    status: Arc<Mutex<EngineStatus>>,
    action_tx: broadcast::Sender<GuidanceEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Monotonically increasing event sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Mutex<Arc<pipeline::PipelineDiagnostics>>,
}

impl GuidanceService {
    /// Create a new service. Does not start processing; call `warm_up()`
    /// then `start()`.
    pub fn new(config: EngineConfig, detector: DetectorHandle) -> Self {
        let (action_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            detector,
            running: Mutex::new(Arc::new(AtomicBool::new(false))),
            generation: Arc::new(AtomicU64::new(0)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            action_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Mutex::new(Arc::new(pipeline::PipelineDiagnostics::default())),
        }
    }

    /// Load the detector. Call once before `start()`.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up detector");
        if let Err(e) = self.detector.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        if !self.detector.recognizes(&self.config.traffic_light_label) {
            warn!(
                label = %self.config.traffic_light_label,
                "detector vocabulary lacks the traffic light label; stop/go announcements disabled"
            );
        }
        self.set_status(EngineStatus::Idle, None);
        info!("detector ready");
        Ok(())
    }

    /// Spawn the pipeline on a blocking task.
    ///
    /// The cooldown clock starts now, so the first announcement comes no
    /// earlier than one cooldown after this call.
    ///
    /// # Errors
    /// - `GuidanceError::AlreadyRunning` if already started.
    pub fn start(
        &self,
        source: Box<dyn FrameSource>,
        speech: Box<dyn SpeechRenderer>,
        actuator: Option<Box<dyn ActuatorLink>>,
    ) -> Result<JoinHandle<()>> {
        let mut current = self.running.lock();
        if current.load(Ordering::SeqCst) {
            return Err(GuidanceError::AlreadyRunning);
        }

        let running = Arc::new(AtomicBool::new(true));
        *current = Arc::clone(&running);
        let diagnostics = Arc::new(pipeline::PipelineDiagnostics::default());
        *self.diagnostics.lock() = Arc::clone(&diagnostics);
        let run_id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(EngineStatus::Running, None);
        drop(current);

        if actuator.is_none() {
            info!("no actuator link; vibration commands will be dropped");
        }

        let ctx = pipeline::PipelineContext {
            engine: DecisionEngine::new(self.config.clone(), Instant::now()),
            detector: self.detector.clone(),
            source,
            speech,
            actuator,
            running,
            generation: Arc::clone(&self.generation),
            run_id,
            action_tx: self.action_tx.clone(),
            status_tx: self.status_tx.clone(),
            status: Arc::clone(&self.status),
            seq: Arc::clone(&self.seq),
            diagnostics,
        };

        let handle = tokio::task::spawn_blocking(move || pipeline::run(ctx));
        info!(run = run_id, "guidance service started");
        Ok(handle)
    }

    /// Ask the current run to stop. Its task exits after the frame source or
    /// detector call in progress returns, discarding that frame.
    ///
    /// # Errors
    /// - `GuidanceError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.lock().swap(false, Ordering::SeqCst) {
            return Err(GuidanceError::NotRunning);
        }
        self.set_status(EngineStatus::Stopped, None);
        info!("guidance service stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().load(Ordering::SeqCst)
    }

    /// Current status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to per-frame guidance actions.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<GuidanceEvent> {
        self.action_tx.subscribe()
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.lock().snapshot()
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
