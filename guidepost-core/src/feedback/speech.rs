//! Speech renderers.

use std::process::Command;

use tracing::{debug, info};

use super::SpeechRenderer;
use crate::error::{GuidanceError, Result};

/// Voice settings for `CommandSpeech`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    /// Executable to run, e.g. `espeak-ng` or `espeak`.
    pub program: String,
    /// Words per minute. Default: 150 (slower than most engines' default).
    pub rate_wpm: u32,
    /// Volume in [0.0, 1.0]. Default: 1.0.
    pub volume: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".into(),
            rate_wpm: 150,
            volume: 1.0,
        }
    }
}

/// Writes every sentence to the log instead of speaking it.
#[derive(Debug, Default)]
pub struct LogSpeech;

impl SpeechRenderer for LogSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        info!(text, "speaking");
        Ok(())
    }
}

/// Speaks through an eSpeak-compatible command line synthesizer and waits
/// for it to finish.
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    config: SpeechConfig,
}

impl CommandSpeech {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    /// Whether the configured program can be launched at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.program)
            .arg("--version")
            .output()
            .is_ok()
    }

    fn build_command(&self, text: &str) -> Command {
        // eSpeak amplitude: 0..=200, 100 is normal. Full volume maps to normal.
        let amplitude = (self.config.volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("-s")
            .arg(self.config.rate_wpm.to_string())
            .arg("-a")
            .arg(amplitude.to_string())
            .arg("--")
            .arg(text);
        cmd
    }
}

impl SpeechRenderer for CommandSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        let text = sanitize(text);
        if text.is_empty() {
            return Ok(());
        }

        info!(text = %text, "speaking");
        let output = self
            .build_command(&text)
            .output()
            .map_err(|e| GuidanceError::Speech(format!("failed to run {}: {e}", self.config.program)))?;

        if !output.status.success() {
            return Err(GuidanceError::Speech(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("speech finished");
        Ok(())
    }
}

/// Turn control characters into spaces and collapse whitespace runs; labels
/// come from a model vocabulary but the text still ends up on a command line.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_carries_rate_volume_and_text() {
        let speech = CommandSpeech::new(SpeechConfig {
            program: "espeak-ng".into(),
            rate_wpm: 150,
            volume: 0.5,
        });
        let cmd = speech.build_command("Path is clear ahead.");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "espeak-ng");
        assert_eq!(args, vec!["-s", "150", "-a", "50", "--", "Path is clear ahead."]);
    }

    #[test]
    fn volume_is_clamped() {
        let speech = CommandSpeech::new(SpeechConfig {
            volume: 3.0,
            ..SpeechConfig::default()
        });
        let cmd = speech.build_command("hi");
        let amplitude = cmd.get_args().nth(3).map(|a| a.to_string_lossy().into_owned());
        assert_eq!(amplitude.as_deref(), Some("100"));
    }

    #[test]
    fn default_volume_is_normal_amplitude() {
        let speech = CommandSpeech::new(SpeechConfig::default());
        let cmd = speech.build_command("hi");
        let amplitude = cmd.get_args().nth(3).map(|a| a.to_string_lossy().into_owned());
        assert_eq!(amplitude.as_deref(), Some("100"));
    }

    #[test]
    fn sanitize_keeps_words_apart() {
        assert_eq!(sanitize("Stop.\nRed\u{7}light "), "Stop. Red light");
        assert_eq!(sanitize("  a\t\t b\r\n"), "a b");
        assert_eq!(sanitize("\n\u{7}"), "");
    }

    #[test]
    fn missing_program_is_a_speech_error() {
        let mut speech = CommandSpeech::new(SpeechConfig {
            program: "guidepost-definitely-not-a-synth".into(),
            ..SpeechConfig::default()
        });
        assert!(!speech.is_available());
        let err = speech.speak("hello").expect_err("should fail");
        assert!(matches!(err, GuidanceError::Speech(_)));
    }

    #[test]
    fn log_speech_never_fails() {
        assert!(LogSpeech.speak("There is a person to your left, it seems far.").is_ok());
    }
}
