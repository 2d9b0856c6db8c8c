// SPDX-License-Identifier: MPL-2.0

//! Photo box - kiosk camera engine
//!
//! Drives a DSLR through gphoto2, a local webcam, or a synthetic placeholder
//! camera behind one facade, with a background live view loop, still
//! capture and optional forwarding of every photo to a watched folder.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera backends, selection and the capture facade
//! - [`config`]: User configuration handling
//! - [`diagnostics`]: Step-by-step DSLR diagnostics report
//! - [`storage`]: Photo file naming and forwarding
//! - [`terminal`]: Terminal live view
//!
//! # Example
//!
//! ```no_run
//! use photobox::backends::camera::{CameraBackendManager, CameraMode};
//! use photobox::config::Config;
//!
//! let config = Config::default();
//! let camera = CameraBackendManager::initialize(CameraMode::Auto, &config)?;
//! camera.start_live_view()?;
//! let photo = camera.capture(None)?;
//! println!("{}", photo.path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod errors;
pub mod storage;
pub mod terminal;

// Re-export commonly used types
pub use backends::camera::{BackendKind, CameraBackendManager, CameraMode, CameraStatus};
pub use config::Config;
pub use errors::{AppError, AppResult, CameraError};
