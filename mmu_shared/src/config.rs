//! Monitor configuration shared by the service, the CLI, and tests.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! debug = false
//! printer_profile = "MK4"
//!
//! [prompt]
//! enabled = true
//! timeout = 30
//! use_default_filament = true
//! default_filament = 2
//!
//! [filament]
//! use_filament_map = true
//! filament_map = [{ id = 3 }, { id = 1 }, { id = 2 }, { id = 0 }, { id = 4 }]
//!
//! [commands]
//! temperature_wait = "M109"
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes::{DEFAULT_TEMPERATURE_WAIT, TOOL_CHANGE_PLACEHOLDER};
use crate::profile::PrinterProfile;
use crate::state::{SLOT_COUNT, Slot};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    /// Forces a profile instead of detecting it from the firmware.
    #[serde(default)]
    pub printer_profile: Option<PrinterProfile>,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub filament: FilamentConfig,
    #[serde(default)]
    pub commands: CommandConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PromptConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds before an unanswered prompt falls back.
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    #[serde(default)]
    pub use_default_filament: bool,
    /// Slot used on timeout when `use_default_filament` is set; -1 for none.
    #[serde(default = "default_filament")]
    pub default_filament: i64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: default_timeout(),
            use_default_filament: false,
            default_filament: default_filament(),
        }
    }
}

impl PromptConfig {
    pub fn timeout_duration(&self) -> std::time::Duration {
        let secs = if self.timeout < 1 { default_timeout() } else { self.timeout };
        std::time::Duration::from_secs(secs as u64)
    }

    /// The slot to fall back to on timeout, if one is configured and valid.
    pub fn fallback_filament(&self) -> Option<Slot> {
        if !self.use_default_filament {
            return None;
        }
        u8::try_from(self.default_filament).ok().and_then(Slot::new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilamentMapEntry {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilamentConfig {
    #[serde(default)]
    pub use_filament_map: bool,
    /// Entry `n` names the physical slot that tool `n` is sent to.
    #[serde(default = "default_filament_map")]
    pub filament_map: Vec<FilamentMapEntry>,
}

impl Default for FilamentConfig {
    fn default() -> Self {
        Self {
            use_filament_map: false,
            filament_map: default_filament_map(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommandConfig {
    #[serde(default = "default_tool_change")]
    pub tool_change: String,
    #[serde(default = "default_temperature_wait")]
    pub temperature_wait: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            tool_change: default_tool_change(),
            temperature_wait: default_temperature_wait(),
        }
    }
}

impl Config {
    /// Repairs values a settings form can leave invalid.
    pub fn normalize(&mut self) {
        if self.prompt.timeout < 1 {
            tracing::warn!("Prompt timeout {} is below 1, using {}", self.prompt.timeout, default_timeout());
            self.prompt.timeout = default_timeout();
        }
        if self.prompt.default_filament < -1 || self.prompt.default_filament >= SLOT_COUNT as i64 {
            tracing::warn!("Default filament {} is out of range, disabling it", self.prompt.default_filament);
            self.prompt.default_filament = -1;
        }
        if self.commands.temperature_wait.trim().is_empty() {
            self.commands.temperature_wait = default_temperature_wait();
        }
        if self.commands.tool_change.trim().is_empty() {
            self.commands.tool_change = default_tool_change();
        }
    }
}

fn default_true() -> bool { true }
fn default_timeout() -> i64 { 30 }
fn default_filament() -> i64 { -1 }
fn default_tool_change() -> String { TOOL_CHANGE_PLACEHOLDER.to_string() }
fn default_temperature_wait() -> String { DEFAULT_TEMPERATURE_WAIT.to_string() }
fn default_filament_map() -> Vec<FilamentMapEntry> {
    (0..SLOT_COUNT as i64).map(|id| FilamentMapEntry { id }).collect()
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(mut config) => {
                config.normalize();
                Ok(config)
            }
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert!(config.prompt.enabled);
        assert_eq!(config.prompt.timeout, 30);
        assert!(!config.prompt.use_default_filament);
        assert_eq!(config.prompt.default_filament, -1);
        assert!(!config.filament.use_filament_map);
        assert_eq!(config.filament.filament_map.len(), 5);
        assert_eq!(config.filament.filament_map[3], FilamentMapEntry { id: 3 });
        assert_eq!(config.commands.temperature_wait, "M109");
        assert_eq!(config.commands.tool_change, "Tx");
        assert_eq!(config.printer_profile, None);
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("mmu.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "printer_profile = 'MK4'\n[prompt]\ntimeout = 10\nuse_default_filament = true\ndefault_filament = 2\n[filament]\nuse_filament_map = true\nfilament_map = [{{ id = 3 }}]"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.printer_profile, Some(PrinterProfile::Mk4));
        assert_eq!(config.prompt.timeout, 10);
        assert_eq!(config.prompt.fallback_filament(), Slot::new(2));
        assert_eq!(config.filament.filament_map, vec![FilamentMapEntry { id: 3 }]);
        // Defaults for missing fields
        assert!(config.prompt.enabled);
        assert_eq!(config.commands.temperature_wait, "M109");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_normalize_repairs_settings() {
        let mut config = Config::default();
        config.prompt.timeout = 0;
        config.prompt.default_filament = 9;
        config.commands.temperature_wait = "  ".to_string();
        config.normalize();
        assert_eq!(config.prompt.timeout, 30);
        assert_eq!(config.prompt.default_filament, -1);
        assert_eq!(config.commands.temperature_wait, "M109");
    }

    #[test]
    fn test_fallback_filament_requires_flag() {
        let mut prompt = PromptConfig { default_filament: 1, ..Default::default() };
        assert_eq!(prompt.fallback_filament(), None);
        prompt.use_default_filament = true;
        assert_eq!(prompt.fallback_filament(), Slot::new(1));
        prompt.default_filament = -1;
        assert_eq!(prompt.fallback_filament(), None);
    }

    #[test]
    fn test_timeout_duration_minimum() {
        let prompt = PromptConfig { timeout: -5, ..Default::default() };
        assert_eq!(prompt.timeout_duration(), std::time::Duration::from_secs(30));
        let prompt = PromptConfig { timeout: 1, ..Default::default() };
        assert_eq!(prompt.timeout_duration(), std::time::Duration::from_secs(1));
    }
}
