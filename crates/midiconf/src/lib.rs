//! Configuration loading for midiproc.
//!
//! Shared by the bridge and peer binaries. Every field has a compiled
//! default, so an empty or missing config is valid.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/midiproc/config.toml` (system)
//! 2. `~/.config/midiproc/config.toml` (user)
//! 3. `./midiproc.toml` (local override, or the `--config` path instead)
//! 4. Environment variables (`MIDIPROC_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [bridge]
//! capacity = 64
//! handoff_capacity = 128
//! suppress_note_on = true
//! suppress_note_off = true
//! pass_through = false
//!
//! [transport]
//! outbound = "ipc:///tmp/midiproc-out"
//! inbound = "ipc:///tmp/midiproc-in"
//! recv_poll_ms = 100
//!
//! [driver]
//! client_name = "midiproc"
//! sample_rate = 48000
//! period_frames = 256
//! input_port = "Keystation"
//! output_port = "FluidSynth"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{BridgeSection, DriverSection, TelemetrySection, TransportSection};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete midiproc configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiprocConfig {
    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub driver: DriverSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl MidiprocConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with `config_path` replacing the local `./midiproc.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (mut config, mut sources) = Self::load_files(&files)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        Ok((config, sources))
    }

    /// Merge exactly these files, in order, without env overrides.
    pub fn load_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        // Each file was already checked, so the merge deserializes too
        let config = toml::Value::Table(merged)
            .try_into::<MidiprocConfig>()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: files.last().cloned().unwrap_or_default(),
                message: e.to_string(),
            })?;
        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::from("# midiproc configuration\n\n");
        output.push_str(&toml::to_string_pretty(self).unwrap_or_default());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MidiprocConfig::default();
        assert_eq!(config.bridge.capacity, 32);
        assert_eq!(config.bridge.handoff_capacity, 64);
        assert!(config.bridge.suppress_note_on);
        assert!(config.bridge.suppress_note_off);
        assert!(!config.bridge.pass_through);
        assert_eq!(config.transport.outbound, "ipc:///tmp/midiproc-out");
        assert_eq!(config.transport.inbound, "ipc:///tmp/midiproc-in");
        assert_eq!(config.transport.recv_poll_ms, 100);
        assert_eq!(config.driver.sample_rate, 48000);
        assert_eq!(config.driver.period_frames, 256);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: MidiprocConfig = toml::from_str("").unwrap();
        assert_eq!(config, MidiprocConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: MidiprocConfig = toml::from_str("[bridge]\npass_through = true\n").unwrap();
        assert!(config.bridge.pass_through);
        assert_eq!(config.bridge.capacity, 32);
        assert!(config.bridge.suppress_note_on);
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = MidiprocConfig::default();
        config.driver.input_port = "Keystation".to_string();
        config.bridge.capacity = 96;

        let text = config.to_toml();
        assert!(text.starts_with("# midiproc configuration"));
        let parsed: MidiprocConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
