//! `DecisionEngine`: per-frame perception-to-feedback policy.
//!
//! ## Cycle
//!
//! ```text
//! detections ──► confidence filter ──► zone / proximity
//!                                         │
//!                    ┌────────────────────┴───────────────────┐
//!              traffic light                              obstacle
//!         HSV color → stop/go line              dedup + cooldown → sentence
//!                                                   vibrate / no-vibrate
//!                    └────────────────────┬───────────────────┘
//!                           no obstacles? → "Path is clear ahead."
//! ```
//!
//! The engine owns its `EngineState` outright and takes `&mut self` per
//! frame, so frames are processed strictly one at a time. It never fails:
//! low-confidence detections, empty crops and missing actuators all collapse
//! into "no action".

pub mod debounce;
pub mod dedup;

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::{
    detection::{Detection, Frame},
    geometry::{classify_proximity, classify_zone, ProximityThresholds},
    ipc::events::{ActuatorCommand, GuidanceAction, UtteranceKind},
    signal::{HsvSignalInterpreter, SignalColor, SignalConfig, TrafficSignalInterpreter},
};

pub use debounce::DebounceClock;
pub use dedup::{AnnouncementKey, Deduplicator};

pub const RED_LIGHT_TEXT: &str = "Stop. Red light ahead.";
pub const GREEN_LIGHT_TEXT: &str = "Green light. You may cross.";
pub const CLEAR_PATH_TEXT: &str = "Path is clear ahead.";

/// Configuration for `DecisionEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Detections below this confidence are ignored. Default: 0.5.
    pub confidence_threshold: f32,
    /// Minimum gap before an object or traffic-light utterance. Default: 3 s.
    pub object_cooldown: Duration,
    /// Minimum gap before a clear-path utterance. Default: 5 s.
    pub clear_path_cooldown: Duration,
    /// Area thresholds for `Close` / `VeryClose`.
    pub proximity: ProximityThresholds,
    /// Traffic light color bands and pixel counts.
    pub signal: SignalConfig,
    /// Detector label that routes a detection to the traffic light rule.
    pub traffic_light_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            object_cooldown: Duration::from_secs(3),
            clear_path_cooldown: Duration::from_secs(5),
            proximity: ProximityThresholds::default(),
            signal: SignalConfig::default(),
            traffic_light_label: "traffic_light".into(),
        }
    }
}

/// Everything the engine remembers between frames.
///
/// `announced` only grows while a frame contains a qualifying obstacle and is
/// only cleared when the clear-path line is spoken.
#[derive(Debug, Clone)]
pub struct EngineState {
    clock: DebounceClock,
    announced: Deduplicator,
}

impl EngineState {
    pub fn new(started_at: Instant) -> Self {
        Self {
            clock: DebounceClock::new(started_at),
            announced: Deduplicator::new(),
        }
    }

    pub fn announced(&self) -> &Deduplicator {
        &self.announced
    }
}

/// Stateful decision core. Construct once per camera and feed it every frame.
pub struct DecisionEngine {
    config: EngineConfig,
    interpreter: Box<dyn TrafficSignalInterpreter>,
    state: EngineState,
}

impl DecisionEngine {
    /// Build an engine with the HSV traffic light classifier from
    /// `config.signal`. `started_at` seeds the cooldown clock.
    pub fn new(config: EngineConfig, started_at: Instant) -> Self {
        let interpreter = Box::new(HsvSignalInterpreter::new(config.signal));
        Self::with_interpreter(config, interpreter, started_at)
    }

    pub fn with_interpreter(
        config: EngineConfig,
        interpreter: Box<dyn TrafficSignalInterpreter>,
        started_at: Instant,
    ) -> Self {
        Self {
            config,
            interpreter,
            state: EngineState::new(started_at),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Run one decision cycle.
    ///
    /// Actions come back in detection order with the clear-path announcement
    /// (if any) last.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        now: Instant,
    ) -> Vec<GuidanceAction> {
        let mut actions = Vec::new();
        let mut clear_path = true;

        for det in detections {
            if det.confidence < self.config.confidence_threshold {
                trace!(label = %det.label, confidence = det.confidence, "below confidence threshold");
                continue;
            }

            let zone = classify_zone(det.bbox.center_x(), frame.width());
            let proximity = classify_proximity(det.bbox.area(), &self.config.proximity);
            debug!(label = %det.label, %zone, %proximity, "detection");

            if det.label == self.config.traffic_light_label {
                self.handle_traffic_light(frame, det, now, &mut actions);
                continue;
            }

            clear_path = false;

            let key = AnnouncementKey::new(det.label.as_str(), zone, proximity);
            if self.state.announced.should_announce(&key)
                && self.state.clock.may_announce(now, self.config.object_cooldown)
            {
                actions.push(GuidanceAction::speak(
                    UtteranceKind::Object,
                    format!(
                        "There is a {} to your {}, it seems {}.",
                        det.label, zone, proximity
                    ),
                ));
                self.state.clock.record(now);
                self.state.announced.record(key);
            }

            let command = if proximity.is_near() {
                ActuatorCommand::Vibrate
            } else {
                ActuatorCommand::NoVibrate
            };
            actions.push(GuidanceAction::actuate(command));
        }

        if clear_path
            && self
                .state
                .clock
                .may_announce(now, self.config.clear_path_cooldown)
        {
            actions.push(GuidanceAction::speak(UtteranceKind::ClearPath, CLEAR_PATH_TEXT));
            self.state.clock.record(now);
            self.state.announced.reset();
            actions.push(GuidanceAction::actuate(ActuatorCommand::NoVibrate));
        }

        actions
    }

    fn handle_traffic_light(
        &mut self,
        frame: &Frame,
        det: &Detection,
        now: Instant,
        actions: &mut Vec<GuidanceAction>,
    ) {
        let color = match frame.crop(&det.bbox) {
            Some(region) => self.interpreter.classify(&region),
            None => {
                debug!(bbox = ?det.bbox, "empty traffic light crop");
                SignalColor::Unknown
            }
        };

        let text = match color {
            SignalColor::Red => RED_LIGHT_TEXT,
            SignalColor::Green => GREEN_LIGHT_TEXT,
            SignalColor::Unknown => return,
        };

        if self.state.clock.may_announce(now, self.config.object_cooldown) {
            actions.push(GuidanceAction::speak(UtteranceKind::TrafficLight, text));
            self.state.clock.record(now);
        }
    }
}
