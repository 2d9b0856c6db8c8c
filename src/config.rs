// SPDX-License-Identifier: GPL-3.0-only

//! Persistent application configuration
//!
//! Stored as pretty-printed JSON in `<config_dir>/photobox/config.json`.
//! Missing fields take their defaults so older files keep loading.

use crate::backends::camera::CameraMode;
use crate::constants::{self, APP_NAME};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend to use (auto probes DSLR, webcam, synthetic in that order)
    pub backend: CameraMode,
    /// Directory receiving still captures
    pub photo_dir: PathBuf,
    /// Studio mode enabled at startup
    pub studio_mode: bool,
    /// Folder receiving copies of captures while studio mode is on
    pub forward_folder: Option<PathBuf>,
    pub dslr: DslrConfig,
    pub webcam: WebcamConfig,
    pub synthetic: SyntheticConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: CameraMode::default(),
            photo_dir: default_photo_dir(),
            studio_mode: false,
            forward_folder: None,
            dslr: DslrConfig::default(),
            webcam: WebcamConfig::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// DSLR backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DslrConfig {
    /// Camera-control program (looked up on PATH)
    pub tool: String,
    /// Delay between live view cycles
    #[serde(with = "duration_ms")]
    pub preview_interval: Duration,
    /// Consecutive failed cycles before live view stops
    pub failure_budget: u32,
    /// Wait after terminating conflicting services
    #[serde(with = "duration_ms")]
    pub usb_settle: Duration,
    /// Wait after the release command during a connection reset
    #[serde(with = "duration_ms")]
    pub reset_settle: Duration,
}

impl Default for DslrConfig {
    fn default() -> Self {
        Self {
            tool: constants::gphoto::DEFAULT_TOOL.to_string(),
            preview_interval: constants::dslr::PREVIEW_INTERVAL,
            failure_budget: constants::dslr::FAILURE_BUDGET,
            usb_settle: constants::usb::SETTLE_DELAY,
            reset_settle: constants::dslr::RESET_SETTLE,
        }
    }
}

/// Frame-grabber backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebcamConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Driver-side buffer count
    pub buffer_count: u32,
    /// Mirror frames horizontally (selfie mode)
    pub mirror: bool,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            device_index: constants::webcam::DEVICE_INDEX,
            width: constants::webcam::WIDTH,
            height: constants::webcam::HEIGHT,
            fps: constants::webcam::FPS,
            buffer_count: constants::webcam::BUFFER_COUNT,
            mirror: true,
        }
    }
}

/// Synthetic backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: constants::synthetic::WIDTH,
            height: constants::synthetic::HEIGHT,
            fps: constants::synthetic::FPS,
        }
    }
}

impl SyntheticConfig {
    /// Frame period, with the rate clamped to 30-60 fps
    pub fn frame_period(&self) -> Duration {
        let fps = self.fps.clamp(30, 60);
        Duration::from_micros(1_000_000 / u64::from(fps))
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(AppError::Config(format!("{}: {}", path.display(), e))),
        };

        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("no config directory available".into()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

/// `<pictures>/photobox`, or `./photos` where no pictures dir exists
fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .map(|dir| dir.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("photos"))
}

/// Serialize `Duration` as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
