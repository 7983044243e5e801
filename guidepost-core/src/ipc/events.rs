//! Event and action types emitted by the guidance pipeline.
//!
//! ## Channels
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `GuidanceEvent` | `GuidanceService::subscribe_actions` |
//! | `EngineStatusEvent` | `GuidanceService::subscribe_status` |
//!
//! Everything serialises as camelCase JSON so a UI or logger on the other side
//! of a socket can consume it unchanged.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Which rule produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UtteranceKind {
    Object,
    TrafficLight,
    ClearPath,
}

/// Single-byte command for the vibration device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActuatorCommand {
    Vibrate,
    NoVibrate,
}

impl ActuatorCommand {
    /// Wire byte understood by the actuator firmware.
    pub fn as_byte(self) -> u8 {
        match self {
            ActuatorCommand::Vibrate => b'v',
            ActuatorCommand::NoVibrate => b'n',
        }
    }
}

/// One output of a decision cycle, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GuidanceAction {
    Speak { kind: UtteranceKind, text: String },
    Actuate { command: ActuatorCommand },
}

impl GuidanceAction {
    pub fn speak(kind: UtteranceKind, text: impl Into<String>) -> Self {
        GuidanceAction::Speak {
            kind,
            text: text.into(),
        }
    }

    pub fn actuate(command: ActuatorCommand) -> Self {
        GuidanceAction::Actuate { command }
    }

    /// The sentence, if this is an utterance.
    pub fn text(&self) -> Option<&str> {
        match self {
            GuidanceAction::Speak { text, .. } => Some(text),
            GuidanceAction::Actuate { .. } => None,
        }
    }

    /// The command, if this drives the actuator.
    pub fn command(&self) -> Option<ActuatorCommand> {
        match self {
            GuidanceAction::Actuate { command } => Some(*command),
            GuidanceAction::Speak { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Guidance events
// ---------------------------------------------------------------------------

/// Broadcast for every frame that produced at least one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Sequence number of the frame the actions were decided on.
    pub frame_seq: u64,
    pub actions: Vec<GuidanceAction>,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the service state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the guidance service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created but `start()` not yet called.
    Idle,
    /// Loading detector weights.
    WarmingUp,
    /// Consuming frames and announcing.
    Running,
    /// Frame stream ended or stop requested; may be restarted.
    Stopped,
    /// Unrecoverable error; restart required.
    Error,
}
