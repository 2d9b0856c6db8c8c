// SPDX-License-Identifier: MPL-2.0

//! Capture backends
//!
//! The CLI and terminal viewer only ever talk to
//! [`camera::CameraBackendManager`]; the DSLR, webcam and synthetic sources
//! live below it in [`camera`].

pub mod camera;
