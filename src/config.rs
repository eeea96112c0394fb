// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{APP_DIR_NAME, RELAY_MIN_INTERVAL, STILL_SETTLE_DELAY};
use crate::errors::{AppError, AppResult};
use crate::media::ProcessingMode;
use crate::pipelines::photo::{StillCaptureSettings, StillRequestPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the settings file inside the config directory
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket endpoint for the frame relay (`None` disables relaying)
    pub relay_url: Option<String>,
    /// Processing mode the session starts in
    pub processing_mode: ProcessingMode,
    /// Where snapshots are written (default: ~/Pictures/edge-camera)
    pub output_dir: Option<PathBuf>,
    /// Minimum spacing between relayed frames
    pub relay_interval_ms: u64,
    /// Delay between autofocus trigger and still capture
    pub still_settle_ms: u64,
    /// What happens to a still request while another one is pending
    pub still_request_policy: StillRequestPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: None,
            processing_mode: ProcessingMode::default(),
            output_dir: None,
            relay_interval_ms: RELAY_MIN_INTERVAL.as_millis() as u64,
            still_settle_ms: STILL_SETTLE_DELAY.as_millis() as u64,
            still_request_policy: StillRequestPolicy::default(),
        }
    }
}

impl Config {
    /// Default location of the settings file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location
    pub fn load() -> AppResult<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::path()
            .ok_or_else(|| AppError::Config("No config directory available".into()))?;
        self.save_to(&path)
    }

    /// Write pretty-printed JSON to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Resolved snapshot directory
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(crate::storage::default_output_dir)
    }

    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }

    pub fn still_settings(&self) -> StillCaptureSettings {
        StillCaptureSettings {
            settle_delay: Duration::from_millis(self.still_settle_ms),
            policy: self.still_request_policy,
            ..StillCaptureSettings::default()
        }
    }
}
