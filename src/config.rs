//! Bridge configuration.

use crate::error::{BridgeError, Result};
use crate::types::{Action, MuteStrategy, Scancode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Bridge configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Speaker settings
    #[serde(default)]
    pub speaker: SpeakerConfig,
    /// Scancode (hex or decimal string) to action name
    #[serde(default)]
    pub ir_codes: BTreeMap<String, String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Speaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerConfig {
    /// Skip mDNS and validate this address instead
    #[serde(default)]
    pub static_ip: Option<String>,
    /// Case-insensitive substring of the advertised service name
    #[serde(default = "default_name")]
    pub name: String,
    /// Volume change per volume_up / volume_down press
    #[serde(default = "default_volume_step")]
    pub volume_step: i32,
    /// Mute strategy
    #[serde(default)]
    pub mute: MuteStrategy,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            static_ip: None,
            name: default_name(),
            volume_step: default_volume_step(),
            mute: MuteStrategy::default(),
        }
    }
}

fn default_name() -> String {
    "Phantom".to_string()
}

fn default_volume_step() -> i32 {
    2
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.speaker.name.trim().is_empty() {
            return Err(BridgeError::Config("speaker.name must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Resolve `ir_codes` into the immutable lookup table
    pub fn action_map(&self) -> Result<ActionMap> {
        ActionMap::from_entries(&self.ir_codes)
    }
}

/// Immutable scancode to action table
#[derive(Debug, Clone, Default)]
pub struct ActionMap {
    actions: HashMap<Scancode, Action>,
}

impl ActionMap {
    /// Build from configured `code => action name` entries.
    ///
    /// Malformed codes are a configuration error. Unknown action names are
    /// skipped with a warning and behave like unmapped codes.
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Result<Self> {
        let mut actions = HashMap::with_capacity(entries.len());
        for (code, name) in entries {
            let code = parse_scancode(code)?;
            match Action::from_name(name) {
                Some(action) => {
                    actions.insert(code, action);
                }
                None => tracing::warn!("Ignoring unknown action '{}' for code {:#x}", name, code),
            }
        }
        Ok(Self { actions })
    }

    pub fn get(&self, code: Scancode) -> Option<Action> {
        self.actions.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<(Scancode, Action)> for ActionMap {
    fn from_iter<T: IntoIterator<Item = (Scancode, Action)>>(iter: T) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

/// Parse `0x`-prefixed hex or plain decimal
pub fn parse_scancode(raw: &str) -> Result<Scancode> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => Scancode::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|_| BridgeError::Config(format!("invalid IR code '{}'", raw)))
}
