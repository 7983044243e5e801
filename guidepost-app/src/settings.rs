//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use guidepost_core::{
    engine::EngineConfig,
    feedback::{ActuatorConfig, SpeechConfig},
    geometry::ProximityThresholds,
    signal::SignalConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub confidence_threshold: f32,
    pub object_cooldown_ms: u64,
    pub clear_path_cooldown_ms: u64,
    pub close_area: f32,
    pub very_close_area: f32,
    pub red_pixel_threshold: usize,
    pub green_pixel_threshold: usize,
    pub traffic_light_label: String,
    pub speech_program: String,
    pub speech_rate_wpm: u32,
    pub speech_volume: f32,
    pub actuator_enabled: bool,
    pub serial_port: String,
    pub baud_rate: u32,
    /// ONNX detector weights. `None` means the bundled models directory.
    pub model_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let speech = SpeechConfig::default();
        let actuator = ActuatorConfig::default();
        Self {
            confidence_threshold: engine.confidence_threshold,
            object_cooldown_ms: engine.object_cooldown.as_millis() as u64,
            clear_path_cooldown_ms: engine.clear_path_cooldown.as_millis() as u64,
            close_area: engine.proximity.close_area,
            very_close_area: engine.proximity.very_close_area,
            red_pixel_threshold: engine.signal.red_pixel_threshold,
            green_pixel_threshold: engine.signal.green_pixel_threshold,
            traffic_light_label: engine.traffic_light_label,
            speech_program: speech.program,
            speech_rate_wpm: speech.rate_wpm,
            speech_volume: speech.volume,
            actuator_enabled: actuator.enabled,
            serial_port: actuator.port,
            baud_rate: actuator.baud_rate,
            model_path: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = Self::default();

        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self.object_cooldown_ms = self.object_cooldown_ms.clamp(250, 60_000);
        self.clear_path_cooldown_ms = self.clear_path_cooldown_ms.clamp(250, 120_000);
        self.close_area = self.close_area.max(0.0);
        self.very_close_area = self.very_close_area.max(self.close_area);
        self.speech_rate_wpm = self.speech_rate_wpm.clamp(80, 450);
        self.speech_volume = self.speech_volume.clamp(0.0, 1.0);

        self.traffic_light_label = normalize_label(&self.traffic_light_label)
            .unwrap_or(defaults.traffic_light_label);
        self.speech_program = non_empty(&self.speech_program).unwrap_or(defaults.speech_program);
        self.serial_port = non_empty(&self.serial_port).unwrap_or(defaults.serial_port);
        if self.baud_rate == 0 {
            self.baud_rate = defaults.baud_rate;
        }
        self.model_path = self
            .model_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            confidence_threshold: self.confidence_threshold,
            object_cooldown: Duration::from_millis(self.object_cooldown_ms),
            clear_path_cooldown: Duration::from_millis(self.clear_path_cooldown_ms),
            proximity: ProximityThresholds {
                close_area: self.close_area,
                very_close_area: self.very_close_area,
            },
            signal: SignalConfig {
                red_pixel_threshold: self.red_pixel_threshold,
                green_pixel_threshold: self.green_pixel_threshold,
                ..SignalConfig::default()
            },
            traffic_light_label: self.traffic_light_label.clone(),
        }
    }

    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            program: self.speech_program.clone(),
            rate_wpm: self.speech_rate_wpm,
            volume: self.speech_volume,
        }
    }

    pub fn actuator_config(&self) -> ActuatorConfig {
        ActuatorConfig {
            enabled: self.actuator_enabled,
            port: self.serial_port.clone(),
            baud_rate: self.baud_rate,
        }
    }
}

/// Detector labels use underscores ("traffic light" → "traffic_light").
fn normalize_label(raw: &str) -> Option<String> {
    let label = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    (!label.is_empty()).then_some(label)
}

fn non_empty(raw: &str) -> Option<String> {
    let s = raw.trim();
    (!s.is_empty()).then(|| s.to_string())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Guidepost")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("guidepost")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("guidepost-settings-{name}-{}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let settings = AppSettings::default();
        let engine = settings.engine_config();
        let reference = EngineConfig::default();

        assert_eq!(engine.confidence_threshold, reference.confidence_threshold);
        assert_eq!(engine.object_cooldown, Duration::from_secs(3));
        assert_eq!(engine.clear_path_cooldown, Duration::from_secs(5));
        assert_eq!(engine.proximity, reference.proximity);
        assert_eq!(engine.signal, reference.signal);
        assert_eq!(engine.traffic_light_label, "traffic_light");
        assert_eq!(settings.actuator_config(), ActuatorConfig::default());
        assert_eq!(settings.speech_config(), SpeechConfig::default());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let raw = r#"{ "serialPort": "/dev/ttyUSB0", "objectCooldownMs": 2000 }"#;
        let settings: AppSettings = serde_json::from_str(raw).expect("parse");

        assert_eq!(settings.serial_port, "/dev/ttyUSB0");
        assert_eq!(settings.object_cooldown_ms, 2_000);
        assert_eq!(settings.clear_path_cooldown_ms, 5_000);
        assert_eq!(settings.baud_rate, 9_600);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = AppSettings {
            confidence_threshold: 1.7,
            object_cooldown_ms: 0,
            close_area: 30_000.0,
            very_close_area: 10_000.0,
            speech_volume: -2.0,
            traffic_light_label: " Traffic Light ".into(),
            speech_program: "   ".into(),
            serial_port: String::new(),
            baud_rate: 0,
            model_path: Some(PathBuf::new()),
            ..AppSettings::default()
        };
        settings.normalize();

        assert_eq!(settings.confidence_threshold, 1.0);
        assert_eq!(settings.object_cooldown_ms, 250);
        assert_eq!(settings.very_close_area, 30_000.0);
        assert_eq!(settings.speech_volume, 0.0);
        assert_eq!(settings.traffic_light_label, "traffic_light");
        assert_eq!(settings.speech_program, "espeak-ng");
        assert_eq!(settings.serial_port, "COM3");
        assert_eq!(settings.baud_rate, 9_600);
        assert!(settings.model_path.is_none());
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let path = scratch_file("persist");
        let settings = AppSettings {
            actuator_enabled: false,
            speech_rate_wpm: 180,
            ..AppSettings::default()
        };

        save_settings(&path, &settings).expect("save");
        let loaded = load_settings(&path);
        assert_eq!(loaded, settings);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn missing_or_corrupt_file_yields_defaults() {
        let path = scratch_file("corrupt");
        assert_eq!(load_settings(&path), AppSettings::default());

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).expect("mkdir");
        }
        fs::write(&path, "{ not json").expect("write");
        assert_eq!(load_settings(&path), AppSettings::default());

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }
}
