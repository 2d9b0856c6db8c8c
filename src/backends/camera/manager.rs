// SPDX-License-Identifier: GPL-3.0-only

//! Camera facade
//!
//! The manager provides:
//! - Backend selection and lifecycle (initialization, shutdown)
//! - Live view control and lock-free access to the latest frame
//! - Still capture with optional studio forwarding
//! - Settings, USB remediation and connection reset for the DSLR backend
//!
//! Frames are read straight from the shared [`FrameSlot`] and never take the
//! manager lock, so a long still capture does not stall the preview.

use super::process::{SharedRunner, SystemCommandRunner};
use super::selector;
use super::types::*;
use super::webcam::{FrameSourceOpener, SystemFrameSourceOpener};
use super::{CameraBackend, CameraSettings, UsbResolution};
use crate::config::Config;
use crate::errors::{AppError, AppResult, CameraError};
use crate::storage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Internal manager state
struct ManagerState {
    backend: Box<dyn CameraBackend>,
    kind: BackendKind,
    photo_dir: PathBuf,
    studio_mode: bool,
    forward_folder: Option<PathBuf>,
    /// Cached so `status()` never has to query the device
    manual_control_available: bool,
    shut_down: bool,
}

impl ManagerState {
    fn refresh_manual_control(&mut self) {
        self.manual_control_available = self
            .backend
            .settings()
            .map(|s| s.manual_control_available())
            .unwrap_or(false);
    }

    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.shut_down {
            Err(CameraError::Closed)
        } else {
            Ok(())
        }
    }

    fn is_connected(&self) -> bool {
        !self.shut_down && self.backend.is_connected()
    }

    fn settings(&mut self) -> Result<&mut dyn CameraSettings, CameraError> {
        self.ensure_open()?;
        let kind = self.kind;
        self.backend
            .settings()
            .ok_or_else(|| CameraError::Unsupported(kind.display_name().to_string()))
    }
}

/// Camera facade
///
/// Thread-safe and cheap to clone; clones share one session.
#[derive(Clone)]
pub struct CameraBackendManager {
    state: Arc<Mutex<ManagerState>>,
    frames: FrameSlot,
}

impl CameraBackendManager {
    /// Select and start a backend using the system tool runner and video devices
    pub fn initialize(mode: CameraMode, config: &Config) -> AppResult<Self> {
        let runner = SystemCommandRunner::shared()
            .map_err(|e| AppError::Other(format!("failed to start process runtime: {}", e)))?;
        Ok(Self::initialize_with(
            mode,
            config,
            runner,
            &SystemFrameSourceOpener,
        )?)
    }

    /// Select and start a backend with explicit device access
    pub fn initialize_with(
        mode: CameraMode,
        config: &Config,
        runner: SharedRunner,
        opener: &dyn FrameSourceOpener,
    ) -> Result<Self, CameraError> {
        info!(mode = %mode, "Initializing camera");

        let frames = FrameSlot::new();
        let backend = selector::select_and_build(mode, config, runner, opener, frames.clone())?;

        Ok(Self::with_backend(backend, frames, config))
    }

    /// Wrap an already constructed backend publishing into `frames`
    pub fn with_backend(backend: Box<dyn CameraBackend>, frames: FrameSlot, config: &Config) -> Self {
        let kind = backend.kind();
        let mut state = ManagerState {
            backend,
            kind,
            photo_dir: config.photo_dir.clone(),
            studio_mode: config.studio_mode,
            forward_folder: config.forward_folder.clone(),
            manual_control_available: false,
            shut_down: false,
        };
        state.refresh_manual_control();

        info!(
            backend = %kind.display_name(),
            connected = state.backend.is_connected(),
            "Camera ready"
        );

        Self {
            state: Arc::new(Mutex::new(state)),
            frames,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Backend chosen for this session
    pub fn kind(&self) -> BackendKind {
        self.lock().kind
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_connected()
    }

    /// Start the acquisition loop; repeated calls keep the running loop
    pub fn start_live_view(&self) -> Result<(), CameraError> {
        let mut state = self.lock();
        state.ensure_open()?;
        if !state.backend.is_connected() {
            warn!("Live view requested without a connected camera");
            return Err(CameraError::NotConnected);
        }
        state
            .backend
            .start_live_view()
            .map_err(|e| CameraError::LiveViewFailed(e.to_string()))
    }

    /// Ask the acquisition loop to stop; returns without waiting for it
    pub fn stop_live_view(&self) {
        self.lock().backend.stop_live_view();
    }

    pub fn is_live_view_active(&self) -> bool {
        self.lock().backend.is_live_view_active()
    }

    /// Most recently published frame; never blocks on acquisition
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.latest()
    }

    /// Receiver notified on every published frame
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Frame>> {
        self.frames.subscribe()
    }

    /// Take a still photo
    ///
    /// `filename` may be a bare name (placed in the photo directory) or a
    /// path. In studio mode the result is also copied to the forwarding
    /// folder; a failed copy is logged and does not fail the capture.
    pub fn capture(&self, filename: Option<&Path>) -> Result<CapturedPhoto, CameraError> {
        let mut state = self.lock();
        state.ensure_open()?;
        if !state.backend.is_connected() {
            return Err(CameraError::NotConnected);
        }

        let prefix = state.backend.photo_prefix();
        let target = storage::resolve_capture_path(&state.photo_dir, filename, prefix)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let path = state
            .backend
            .capture_still(&target)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        info!(path = %path.display(), "Photo captured");

        let forwarded_to = match (&state.forward_folder, state.studio_mode) {
            (Some(folder), true) => match storage::forward_copy(&path, folder) {
                Ok(copy) => Some(copy),
                Err(e) => {
                    warn!(error = %e, folder = %folder.display(), "Forwarding copy failed");
                    None
                }
            },
            _ => None,
        };

        Ok(CapturedPhoto { path, forwarded_to })
    }

    /// Allowed values for a setting; empty when unknown or unsupported
    pub fn setting_choices(&self, name: &str) -> Vec<String> {
        match self.describe_setting(name) {
            Ok(descriptor) => descriptor.choices,
            Err(e) => {
                debug!(setting = name, error = %e, "No choices available");
                Vec::new()
            }
        }
    }

    /// Query one setting's current value and choices from the device
    pub fn describe_setting(&self, name: &str) -> Result<SettingDescriptor, CameraError> {
        let key = parse_setting(name)?;
        let mut state = self.lock();
        state
            .settings()?
            .describe_setting(key)
            .map_err(|e| CameraError::Setting(name.to_string(), e.to_string()))
    }

    pub fn set_setting(&self, name: &str, value: &str) -> Result<(), CameraError> {
        let key = parse_setting(name)?;
        let mut state = self.lock();
        state
            .settings()?
            .set_setting(key, value)
            .map_err(|e| CameraError::Setting(name.to_string(), e.to_string()))
    }

    /// Cached setting values; empty on backends without settings
    pub fn settings(&self) -> SettingsMap {
        let mut state = self.lock();
        state
            .backend
            .settings()
            .map(|s| s.cached_settings())
            .unwrap_or_default()
    }

    /// Reload every cached setting from the device
    pub fn refresh_settings(&self) -> Result<SettingsMap, CameraError> {
        let mut state = self.lock();
        let refreshed = state.settings()?.refresh_settings()?;
        state.refresh_manual_control();
        Ok(refreshed)
    }

    /// First `limit` configuration keys the device exposes
    pub fn list_config_keys(&self, limit: usize) -> Result<Vec<String>, CameraError> {
        let mut state = self.lock();
        Ok(state.settings()?.list_config_keys(limit)?)
    }

    /// Switch the camera body back to manual control
    pub fn enable_manual_control(&self) -> Result<(), CameraError> {
        let mut state = self.lock();
        state.settings()?.enable_manual_control()?;
        state.refresh_manual_control();
        Ok(())
    }

    /// Turn on studio mode, optionally forwarding to a new folder
    ///
    /// Without a folder the previously configured one is reused; with none
    /// configured at all, studio mode is on but nothing is copied.
    pub fn enable_forwarding(&self, folder: Option<PathBuf>) -> AppResult<()> {
        let mut state = self.lock();
        if let Some(folder) = folder {
            std::fs::create_dir_all(&folder)?;
            state.forward_folder = Some(folder);
        }

        match &state.forward_folder {
            Some(folder) => info!(folder = %folder.display(), "Studio forwarding enabled"),
            None => warn!("Studio mode enabled without a forwarding folder"),
        }
        state.studio_mode = true;
        Ok(())
    }

    pub fn disable_forwarding(&self) {
        let mut state = self.lock();
        if state.studio_mode {
            info!("Studio forwarding disabled");
        }
        state.studio_mode = false;
    }

    pub fn status(&self) -> CameraStatus {
        build_status(&self.lock())
    }

    /// Status without waiting, `None` while another call holds the camera
    pub fn try_status(&self) -> Option<CameraStatus> {
        let state = match self.state.try_lock() {
            Ok(state) => state,
            Err(std::sync::TryLockError::Poisoned(e)) => e.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return None,
        };
        Some(build_status(&state))
    }

    /// Release and re-detect the device
    pub fn reset_connection(&self) -> Result<(), CameraError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.backend.reset_connection()?;
        state.refresh_manual_control();
        Ok(())
    }

    /// Terminate services holding the device and re-detect it
    pub fn resolve_usb_conflict(&self) -> Result<UsbResolution, CameraError> {
        let mut state = self.lock();
        state.ensure_open()?;
        let resolution = state.backend.resolve_usb_conflict()?;
        if resolution.resolved() {
            state.refresh_manual_control();
        }
        Ok(resolution)
    }

    /// Stop live view and release every device and temp resource
    ///
    /// Safe to call more than once; dropping the last backend reference
    /// performs the same cleanup.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        info!("Shutting down camera");
        state.backend.shutdown();
        state.shut_down = true;
        self.frames.clear();
    }
}

fn parse_setting(name: &str) -> Result<SettingKey, CameraError> {
    SettingKey::from_name(name)
        .ok_or_else(|| CameraError::Setting(name.to_string(), "unknown setting".into()))
}

fn build_status(state: &ManagerState) -> CameraStatus {
    CameraStatus {
        mode: state.kind.as_str().to_string(),
        connected: state.is_connected(),
        live_view_active: state.backend.is_live_view_active(),
        studio_mode: state.studio_mode,
        manual_control_available: state.manual_control_available,
        forward_folder: state.forward_folder.clone(),
        last_error: state.backend.last_error(),
    }
}

impl std::fmt::Debug for CameraBackendManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CameraBackendManager")
            .field("kind", &state.kind)
            .field("connected", &state.backend.is_connected())
            .field("studio_mode", &state.studio_mode)
            .finish()
    }
}
