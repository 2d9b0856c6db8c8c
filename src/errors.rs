// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the photo box application

use crate::backends::camera::types::BackendError;
use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Camera-related errors
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// Storage/filesystem errors
    #[error("Storage error: {0}")]
    Storage(String),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the camera facade
///
/// Backend-internal failures are handled inside the backends; only operation
/// results and state transitions cross into this type.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    /// Requested backend could not be brought up (e.g. "DSLR unavailable")
    #[error("{0} unavailable: {1}")]
    Unavailable(&'static str, String),
    /// Operation requires a connected device
    #[error("Camera not connected")]
    NotConnected,
    /// Session was shut down; build a new one to continue
    #[error("Camera session has been shut down")]
    Closed,
    /// Live view could not be started
    #[error("Live view failed to start: {0}")]
    LiveViewFailed(String),
    /// Still capture failed; no file was produced
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    /// Operation is only available on some backends
    #[error("Not supported by the {0} backend")]
    Unsupported(String),
    /// Setting could not be read or applied
    #[error("Setting '{0}' failed: {1}")]
    Setting(String, String),
    /// Any other backend error
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Camera(CameraError::Backend(err))
    }
}
