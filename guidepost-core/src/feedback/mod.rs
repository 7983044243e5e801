//! Output adapters: speech and vibration.
//!
//! The pipeline calls these synchronously from its own thread, one action at
//! a time, so implementations never see overlapping calls.

pub mod actuator;
pub mod speech;

pub use actuator::{open_actuator, ActuatorConfig};
pub use speech::{CommandSpeech, LogSpeech, SpeechConfig};

use crate::error::Result;

/// Renders a sentence as audio.
pub trait SpeechRenderer: Send + 'static {
    /// Speak `text`. Should block until playback is finished (or at least
    /// queued in order) so the engine's cooldowns stay meaningful.
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Byte-level link to the vibration device.
pub trait ActuatorLink: Send + 'static {
    /// Forward one command byte (`b'v'` or `b'n'`).
    fn send(&mut self, byte: u8) -> Result<()>;
}
