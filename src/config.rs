//! Head host configuration, loaded from a TOML file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HeadConfig {
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub experience: ExperienceSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialSettings {
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackSettings {
    /// Directory instruction sequences are loaded from.
    #[serde(default = "default_instruction_dir")]
    pub instruction_dir: PathBuf,

    /// Move time injected when a row leaves the column empty.
    #[serde(default = "default_move_time")]
    pub default_move_time_ms: u32,

    /// Positions within this distance of the last send are not re-sent.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: i32,

    /// Warn when an instruction fires this much later than scheduled.
    #[serde(default = "default_drift_warn_ms")]
    pub drift_warn_ms: u64,
}

/// Sequences played per experience state. Several entries mean one is
/// picked at random each time the state is entered.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ExperienceSettings {
    #[serde(default)]
    pub idle: Vec<String>,
    #[serde(default)]
    pub activating: Vec<String>,
    #[serde(default)]
    pub active: Vec<String>,
    #[serde(default)]
    pub deactivating: Vec<String>,
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud() -> u32 {
    115_200
}

fn default_instruction_dir() -> PathBuf {
    PathBuf::from("instructions")
}

fn default_move_time() -> u32 {
    200
}

fn default_dedup_threshold() -> i32 {
    5
}

fn default_drift_warn_ms() -> u64 {
    50
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            instruction_dir: default_instruction_dir(),
            default_move_time_ms: default_move_time(),
            dedup_threshold: default_dedup_threshold(),
            drift_warn_ms: default_drift_warn_ms(),
        }
    }
}

impl PlaybackSettings {
    pub fn drift_warn(&self) -> Duration {
        Duration::from_millis(self.drift_warn_ms)
    }
}

pub fn load_config(path: &str) -> Result<HeadConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config = toml::from_str(&contents)?;
    Ok(config)
}
