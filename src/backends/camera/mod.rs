// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! Three structurally different capture sources sit behind one trait:
//!
//! ```text
//! ┌──────────────────────┐
//! │ CameraBackendManager │  ← facade: start/stop, capture, settings, status
//! └──────────┬───────────┘
//!            │ BackendKind tag + Box<dyn CameraBackend>
//!            ▼
//! ┌──────────────────────┐
//! │  CameraBackend trait │
//! └──────────┬───────────┘
//!      ┌─────┼──────────┐
//!      ▼     ▼          ▼
//!   ┌────┐ ┌──────┐ ┌─────────┐
//!   │DSLR│ │Webcam│ │Synthetic│
//!   └────┘ └──────┘ └─────────┘
//! ```
//!
//! Each backend owns at most one acquisition loop
//! ([`frame_loop::CaptureLoopController`]) which publishes into the session's
//! [`FrameSlot`].

pub mod dslr;
pub mod format_converters;
pub mod frame_loop;
pub mod manager;
pub mod process;
pub mod selector;
pub mod synthetic;
pub mod types;
pub mod webcam;

pub use dslr::UsbResolution;
pub use manager::CameraBackendManager;
pub use types::*;

use std::path::{Path, PathBuf};

/// Capability contract shared by every capture backend
pub trait CameraBackend: Send {
    /// Which variant this is
    fn kind(&self) -> BackendKind;

    /// True once a usable device has been detected
    fn is_connected(&self) -> bool;

    /// Start the acquisition loop
    ///
    /// Must not spawn a second loop while one is already running.
    fn start_live_view(&mut self) -> BackendResult<()>;

    /// Stop the acquisition loop and wait for it to exit
    fn stop_live_view(&mut self);

    /// Whether the acquisition loop is currently cycling
    fn is_live_view_active(&self) -> bool;

    /// Reason the most recent loop ended on its own, if it did
    fn last_error(&self) -> Option<String>;

    /// Take a still photo and write it to `path`
    fn capture_still(&mut self, path: &Path) -> BackendResult<PathBuf>;

    /// Prefix for time-stamped default filenames
    fn photo_prefix(&self) -> &'static str;

    /// Device configuration access (DSLR only)
    fn settings(&mut self) -> Option<&mut dyn CameraSettings> {
        None
    }

    /// Release and re-detect the device
    fn reset_connection(&mut self) -> BackendResult<()> {
        Err(BackendError::Unsupported(format!(
            "connection reset on {} backend",
            self.kind()
        )))
    }

    /// Terminate services holding the device and re-detect it
    fn resolve_usb_conflict(&mut self) -> BackendResult<UsbResolution> {
        Err(BackendError::Unsupported(format!(
            "USB remediation on {} backend",
            self.kind()
        )))
    }

    /// Stop the loop and release every device handle and temp resource
    ///
    /// Safe to call more than once.
    fn shutdown(&mut self);
}

/// Configuration query and mutation for backends that expose it
pub trait CameraSettings {
    /// Query the device for a setting's current value and allowed values
    fn describe_setting(&mut self, key: SettingKey) -> BackendResult<SettingDescriptor>;

    /// Apply a value; on success the cached map reflects it immediately
    fn set_setting(&mut self, key: SettingKey, value: &str) -> BackendResult<()>;

    /// Snapshot of the cached values (no device access)
    fn cached_settings(&self) -> SettingsMap;

    /// Reload every cached value from the device
    fn refresh_settings(&mut self) -> BackendResult<SettingsMap>;

    /// First `limit` configuration keys the device reports
    fn list_config_keys(&mut self, limit: usize) -> BackendResult<Vec<String>>;

    /// Whether the body's own controls are usable (PTP rather than PC-remote)
    fn manual_control_available(&mut self) -> bool;

    /// Switch the body back to manual (PTP) control
    fn enable_manual_control(&mut self) -> BackendResult<()>;
}
