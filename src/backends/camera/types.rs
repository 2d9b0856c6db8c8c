// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use super::process::ProcessError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;

/// Backend selection requested by the user or the config file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    /// Probe DSLR, then webcam, then fall back to synthetic
    #[default]
    Auto,
    /// External camera-control tool (gphoto2)
    Dslr,
    /// Local frame-grabbing device
    Webcam,
    /// Procedurally rendered placeholder frames
    Synthetic,
}

impl std::fmt::Display for CameraMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraMode::Auto => write!(f, "auto"),
            CameraMode::Dslr => write!(f, "dslr"),
            CameraMode::Webcam => write!(f, "webcam"),
            CameraMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Concrete backend variant, chosen once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dslr,
    FrameGrabber,
    Synthetic,
}

impl BackendKind {
    /// Short name used in the status record
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Dslr => "dslr",
            BackendKind::FrameGrabber => "webcam",
            BackendKind::Synthetic => "synthetic",
        }
    }

    /// Human-readable name for error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Dslr => "DSLR",
            BackendKind::FrameGrabber => "Webcam",
            BackendKind::Synthetic => "Synthetic camera",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded preview frame
///
/// Pixel data is shared behind an `Arc`, so cloning a frame out of the slot
/// is cheap and the clone stays valid after the slot is overwritten.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    /// Per-session counter, strictly increasing within one live view run
    pub sequence: u64,
    /// When the frame was produced
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Single-slot "latest frame" channel
///
/// Publishing overwrites the previous frame; readers get a point-in-time
/// snapshot. No history is kept.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    sender: Arc<watch::Sender<Option<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Replace the current frame
    pub fn publish(&self, frame: Frame) {
        self.sender.send_replace(Some(frame));
    }

    /// Snapshot of the most recently published frame
    pub fn latest(&self) -> Option<Frame> {
        self.sender.borrow().clone()
    }

    /// Receiver woken on every publication
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.sender.subscribe()
    }

    pub fn clear(&self) {
        self.sender.send_replace(None);
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed set of DSLR settings exposed for manual control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKey {
    Iso,
    Aperture,
    ShutterSpeed,
    WhiteBalance,
    ImageFormat,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::Iso,
        SettingKey::Aperture,
        SettingKey::ShutterSpeed,
        SettingKey::WhiteBalance,
        SettingKey::ImageFormat,
    ];

    /// Config key name understood by the camera-control tool
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Iso => "iso",
            SettingKey::Aperture => "aperture",
            SettingKey::ShutterSpeed => "shutterspeed",
            SettingKey::WhiteBalance => "whitebalance",
            SettingKey::ImageFormat => "imageformat",
        }
    }

    /// Case-insensitive lookup by config key name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configuration entry as reported by the device
///
/// Stale as soon as anything changes the device; refresh explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettingDescriptor {
    pub name: String,
    pub label: Option<String>,
    pub current: Option<String>,
    pub choices: Vec<String>,
}

/// Cached setting name → current value
pub type SettingsMap = HashMap<String, String>;

/// A still photo written to durable storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedPhoto {
    pub path: PathBuf,
    /// Copy made by the forwarding sink, if studio forwarding succeeded
    pub forwarded_to: Option<PathBuf>,
}

/// Status record exposed by the facade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub mode: String,
    pub connected: bool,
    pub live_view_active: bool,
    pub studio_mode: bool,
    pub manual_control_available: bool,
    pub forward_folder: Option<PathBuf>,
    /// Why the last acquisition loop ended on its own
    pub last_error: Option<String>,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Backend is not available on this system
    #[error("Backend not available: {0}")]
    NotAvailable(String),
    /// Failed to initialize backend
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
    /// Camera device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Operation needs a connected device
    #[error("Camera not connected")]
    NotConnected,
    /// External command exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Device is claimed by another process
    #[error("USB device claimed by another process: {0}")]
    UsbClaimConflict(String),
    /// External command exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),
    /// Captured file could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(String),
    /// No frame has been produced yet
    #[error("No frame available")]
    NoFrameAvailable,
    /// Operation not offered by this backend
    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<image::ImageError> for BackendError {
    fn from(err: image::ImageError) -> Self {
        BackendError::Decode(err.to_string())
    }
}

impl From<ProcessError> for BackendError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound(program) => BackendError::NotAvailable(program),
            ProcessError::Timeout { .. } => BackendError::Timeout(err.to_string()),
            ProcessError::Io(msg) => BackendError::Io(msg),
        }
    }
}
