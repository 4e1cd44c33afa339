//! YAML configuration loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure, loaded from `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Run under an external session manager: restore the saved session
    /// snapshot at startup and write it back at shutdown. Protocol
    /// behavior is unaffected.
    #[serde(default)]
    pub session_mode: bool,
}

/// MIDI port selection. Patterns are matched case-insensitively as
/// substrings of the port names reported by the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Input port name pattern. Empty means auto-detect.
    #[serde(default)]
    pub input_port: String,
    /// Output port name pattern. Empty means auto-detect.
    #[serde(default)]
    pub output_port: String,
    /// Connect to the device at startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: String::new(),
            output_port: String::new(),
            auto_connect: true,
        }
    }
}

/// Synchronizer tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// How long to wait for a device response before retrying.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Retries per request before declaring the device unreachable.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Also fetch the factory programs during the initial query.
    #[serde(default)]
    pub fetch_factory: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            retries: default_retries(),
            fetch_factory: false,
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_response_timeout_ms() -> u64 { 250 }
fn default_retries() -> u32 { 3 }

impl AppConfig {
    /// Load configuration from a YAML file. A missing file yields the
    /// defaults so a fresh install runs without any setup.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = AppConfig::load(Path::new("/nonexistent/config.yaml")).unwrap();
        assert!(config.midi.auto_connect);
        assert_eq!(config.sync.response_timeout_ms, 250);
        assert_eq!(config.sync.retries, 3);
        assert!(!config.sync.fetch_factory);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: AppConfig = serde_yaml::from_str("midi:\n  input_port: VOX\n").unwrap();
        assert_eq!(config.midi.input_port, "VOX");
        assert!(config.midi.output_port.is_empty());
        assert_eq!(config.sync.retries, 3);
        assert!(!config.session_mode);
    }

    #[test]
    fn session_mode_is_opt_in() {
        assert!(!AppConfig::default().session_mode);
        let config: AppConfig = serde_yaml::from_str("session_mode: true\n").unwrap();
        assert!(config.session_mode);
    }

    #[test]
    fn round_trips_through_yaml() {
        let mut config = AppConfig::default();
        config.midi.input_port = "Valvetronix".into();
        config.sync.response_timeout_ms = 500;
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.midi.input_port, "Valvetronix");
        assert_eq!(back.sync.response_timeout_ms, 500);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = AppConfig::default();
        config.sync.fetch_factory = true;
        config.save(&path).unwrap();
        let back = AppConfig::load(&path).unwrap();
        assert!(back.sync.fetch_factory);
    }
}
