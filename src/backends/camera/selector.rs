// SPDX-License-Identifier: GPL-3.0-only

//! Backend selection
//!
//! `auto` walks the tiers DSLR → webcam → synthetic. Every probe swallows
//! its own failure and falls through, and so does a backend that passed its
//! probe but then fails to come up, so `auto` always ends up with a backend.
//! Forced modes skip probing and surface failures instead.
//!
//! The webcam probe keeps the handle it opened and hands it to the backend,
//! so no other process can claim the device between probe and use.

use super::dslr::{DslrBackend, commands};
use super::process::SharedRunner;
use super::synthetic::SyntheticBackend;
use super::types::*;
use super::webcam::{FrameSource, FrameSourceOpener, WebcamBackend};
use super::CameraBackend;
use crate::config::Config;
use crate::errors::CameraError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of selection, carrying anything the probe already acquired
pub enum BackendSelection {
    Dslr,
    /// Webcam; `Some` when the probe already holds the open device
    FrameGrabber(Option<Box<dyn FrameSource>>),
    Synthetic,
}

impl BackendSelection {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSelection::Dslr => BackendKind::Dslr,
            BackendSelection::FrameGrabber(_) => BackendKind::FrameGrabber,
            BackendSelection::Synthetic => BackendKind::Synthetic,
        }
    }
}

impl std::fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSelection::FrameGrabber(source) => f
                .debug_tuple("FrameGrabber")
                .field(&source.as_ref().map(|s| s.describe()))
                .finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Whether the host can run the DSLR tool at all
pub fn host_supports_dslr() -> bool {
    !cfg!(target_os = "windows")
}

/// Decide which backend to build for `mode`
pub fn select(
    mode: CameraMode,
    config: &Config,
    runner: &SharedRunner,
    opener: &dyn FrameSourceOpener,
) -> BackendSelection {
    match mode {
        CameraMode::Dslr => return BackendSelection::Dslr,
        CameraMode::Webcam => return BackendSelection::FrameGrabber(None),
        CameraMode::Synthetic => return BackendSelection::Synthetic,
        CameraMode::Auto => {}
    }

    if host_supports_dslr() {
        if commands::tool_available(runner.as_ref(), &config.dslr.tool) {
            info!(tool = %config.dslr.tool, "Selected DSLR backend");
            return BackendSelection::Dslr;
        }
        debug!("DSLR tool not available, trying webcam");
    } else {
        debug!("DSLR probe skipped on this platform");
    }

    match opener.open(&config.webcam) {
        Ok(source) => {
            info!(device = %source.describe(), "Selected webcam backend");
            return BackendSelection::FrameGrabber(Some(source));
        }
        Err(e) => debug!(error = %e, "No webcam, falling back to synthetic"),
    }

    info!("Selected synthetic backend");
    BackendSelection::Synthetic
}

/// Instantiate the backend for a selection
///
/// Synthetic always succeeds. A DSLR or webcam failure is reported as that
/// backend being unavailable.
pub fn build(
    selection: BackendSelection,
    config: &Config,
    runner: SharedRunner,
    opener: &dyn FrameSourceOpener,
    slot: FrameSlot,
) -> Result<Box<dyn CameraBackend>, CameraError> {
    match selection {
        BackendSelection::Dslr => DslrBackend::new(runner, config.dslr.clone(), slot)
            .map(|b| Box::new(b) as Box<dyn CameraBackend>)
            .map_err(|e| {
                warn!(error = %e, "DSLR backend failed to initialize");
                CameraError::Unavailable("DSLR", e.to_string())
            }),
        BackendSelection::FrameGrabber(Some(source)) => Ok(Box::new(WebcamBackend::from_source(
            source,
            config.webcam.clone(),
            slot,
        ))),
        BackendSelection::FrameGrabber(None) => {
            WebcamBackend::open(opener, config.webcam.clone(), slot)
                .map(|b| Box::new(b) as Box<dyn CameraBackend>)
                .map_err(|e| {
                    warn!(error = %e, "Webcam backend failed to initialize");
                    CameraError::Unavailable("Webcam", e.to_string())
                })
        }
        BackendSelection::Synthetic => Ok(Box::new(SyntheticBackend::new(
            config.synthetic.clone(),
            slot,
        ))),
    }
}

/// Select and build the backend for `mode`
///
/// Under `auto`, a backend failing after its probe passed falls through to
/// the next tier.
pub fn select_and_build(
    mode: CameraMode,
    config: &Config,
    runner: SharedRunner,
    opener: &dyn FrameSourceOpener,
    slot: FrameSlot,
) -> Result<Box<dyn CameraBackend>, CameraError> {
    let mut selection = select(mode, config, &runner, opener);
    loop {
        let kind = selection.kind();
        match build(selection, config, Arc::clone(&runner), opener, slot.clone()) {
            Ok(backend) => return Ok(backend),
            Err(e) if mode == CameraMode::Auto && kind != BackendKind::Synthetic => {
                warn!(error = %e, backend = %kind, "Falling back to the next backend");
                selection = next_tier(kind, config, opener);
            }
            Err(e) => return Err(e),
        }
    }
}

fn next_tier(
    failed: BackendKind,
    config: &Config,
    opener: &dyn FrameSourceOpener,
) -> BackendSelection {
    if failed == BackendKind::Dslr {
        match opener.open(&config.webcam) {
            Ok(source) => return BackendSelection::FrameGrabber(Some(source)),
            Err(e) => debug!(error = %e, "No webcam, falling back to synthetic"),
        }
    }
    BackendSelection::Synthetic
}
