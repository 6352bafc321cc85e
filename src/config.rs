//! Radio settings, loadable from a JSON file.
//!
//! Every field has a default, so a config file only needs the values it
//! changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RadioError, Result};
use crate::narrative::generator::GeneratorOptions;
use crate::queue::QueueSettings;

/// Radio settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Tempo in beats per minute
    pub bpm: f64,
    /// Bars per narrative
    pub bars: usize,
    /// Narratives produced in a key before moving to the next one
    pub narratives_per_key: usize,
    /// Times each narrative is played back to back
    pub repeat: usize,
    /// Comma-separated key notations, or "fifths" / "harmonious"
    pub keys: String,
    pub drums: bool,
    pub bass: bool,
    pub max_queue_length: usize,
    /// JSON object of sample name → WAV path
    pub sample_manifest: PathBuf,
    /// History file updated when the radio stops
    pub history_path: PathBuf,
    /// Rate every sample must be recorded at; others are skipped
    pub sample_rate: u32,
    /// Seed for the narrative generator; random when absent
    pub seed: Option<u64>,
    pub timing: TimingConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bpm: 124.0,
            bars: 8,
            narratives_per_key: 1,
            repeat: 1,
            keys: "C,G,E,G".to_string(),
            drums: false,
            bass: false,
            max_queue_length: 10,
            sample_manifest: PathBuf::from("sample_config.json"),
            history_path: PathBuf::from("history/radio.json"),
            sample_rate: 44100,
            seed: None,
            timing: TimingConfig::default(),
        }
    }
}

/// Waits and backoffs, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub producer_backoff_ms: u64,
    pub pause_poll_ms: u64,
    pub replay_grace_ms: u64,
    pub empty_queue_wait_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            producer_backoff_ms: 30_000,
            pause_poll_ms: 100,
            replay_grace_ms: 500,
            empty_queue_wait_ms: 1_000,
        }
    }
}

impl TimingConfig {
    pub fn producer_backoff(&self) -> Duration {
        Duration::from_millis(self.producer_backoff_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn replay_grace(&self) -> Duration {
        Duration::from_millis(self.replay_grace_ms)
    }

    pub fn empty_queue_wait(&self) -> Duration {
        Duration::from_millis(self.empty_queue_wait_ms)
    }
}

impl RadioConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: RadioConfig = serde_json::from_str(&content)
            .map_err(|e| RadioError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(RadioError::Config(format!("bpm must be positive, got {}", self.bpm)));
        }
        let counts = [
            ("bars", self.bars),
            ("narratives_per_key", self.narratives_per_key),
            ("repeat", self.repeat),
            ("max_queue_length", self.max_queue_length),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(RadioError::Config(format!("{name} must be at least 1")));
        }
        if self.sample_rate == 0 {
            return Err(RadioError::Config("sample_rate must be positive".to_string()));
        }
        Ok(())
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            capacity: self.max_queue_length,
            bars: self.bars,
            backoff: self.timing.producer_backoff(),
        }
    }

    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            drums: self.drums,
            bass: self.bass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RadioConfig::default();
        assert_eq!(config.bpm, 124.0);
        assert_eq!(config.bars, 8);
        assert_eq!(config.keys, "C,G,E,G");
        assert_eq!(config.max_queue_length, 10);
        assert_eq!(config.timing.producer_backoff(), Duration::from_secs(30));
        assert_eq!(config.timing.pause_poll(), Duration::from_millis(100));
        assert_eq!(config.timing.replay_grace(), Duration::from_millis(500));
        assert_eq!(config.timing.empty_queue_wait(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radio.json");
        fs::write(
            &path,
            r#"{"bpm": 90, "keys": "fifths", "drums": true, "timing": {"pause_poll_ms": 10}}"#,
        )
        .unwrap();

        let config = RadioConfig::load(&path).unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.keys, "fifths");
        assert!(config.generator_options().drums);
        assert!(!config.generator_options().bass);
        assert_eq!(config.bars, 8);
        assert_eq!(config.timing.pause_poll_ms, 10);
        assert_eq!(config.timing.replay_grace_ms, 500);

        let settings = config.queue_settings();
        assert_eq!(settings.capacity, 10);
        assert_eq!(settings.bars, 8);
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radio.json");

        fs::write(&path, r#"{"repeat": 0}"#).unwrap();
        assert!(matches!(RadioConfig::load(&path), Err(RadioError::Config(m)) if m.contains("repeat")));

        fs::write(&path, r#"{"bpm": -1}"#).unwrap();
        assert!(matches!(RadioConfig::load(&path), Err(RadioError::Config(_))));

        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(RadioConfig::load(&path), Err(RadioError::Config(_))));

        assert!(matches!(
            RadioConfig::load(&dir.path().join("missing.json")),
            Err(RadioError::Io(_))
        ));
    }
}
