// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera for running without hardware

pub mod render;

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use super::CameraBackend;
use crate::config::SyntheticConfig;
use crate::constants;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Backend rendering placeholder frames; always connected
pub struct SyntheticBackend {
    config: SyntheticConfig,
    slot: FrameSlot,
    live_view: Option<CaptureLoopController>,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig, slot: FrameSlot) -> Self {
        info!(
            width = config.width,
            height = config.height,
            period = ?config.frame_period(),
            "Synthetic camera ready"
        );
        Self {
            config,
            slot,
            live_view: None,
        }
    }

    fn join_live_view(&mut self) {
        if let Some(mut controller) = self.live_view.take() {
            controller.stop();
        }
    }
}

impl CameraBackend for SyntheticBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn start_live_view(&mut self) -> BackendResult<()> {
        if self.is_live_view_active() {
            debug!("Synthetic live view already running");
            return Ok(());
        }
        self.join_live_view();

        let slot = self.slot.clone();
        let (width, height) = (self.config.width, self.config.height);
        let mut counter = 0u64;

        self.live_view = Some(CaptureLoopController::start(
            "synthetic",
            Some(self.config.frame_period()),
            move || {
                let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
                let image = render::render_frame(
                    width,
                    height,
                    counter,
                    &timestamp,
                    constants::synthetic::EXPOSURE_CAPTION,
                );
                counter += 1;
                slot.publish(Frame::new(image, counter));
                LoopAction::Continue
            },
        ));
        info!("Synthetic live view started");
        Ok(())
    }

    fn stop_live_view(&mut self) {
        if let Some(controller) = self.live_view.as_ref().filter(|c| c.is_running()) {
            controller.request_stop();
            info!("Synthetic live view stopping");
        }
    }

    fn is_live_view_active(&self) -> bool {
        self.live_view
            .as_ref()
            .map(CaptureLoopController::is_running)
            .unwrap_or(false)
    }

    fn last_error(&self) -> Option<String> {
        None
    }

    fn capture_still(&mut self, path: &Path) -> BackendResult<PathBuf> {
        let frame = self.slot.latest().ok_or(BackendError::NoFrameAvailable)?;
        crate::storage::save_image(&frame.image, path)?;
        info!(path = %path.display(), sequence = frame.sequence, "Synthetic photo saved");
        Ok(path.to_path_buf())
    }

    fn photo_prefix(&self) -> &'static str {
        constants::files::SYNTHETIC_PREFIX
    }

    fn shutdown(&mut self) {
        self.join_live_view();
    }
}

impl Drop for SyntheticBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            width: 64,
            height: 48,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn test_capture_before_first_frame_fails() {
        let mut backend = SyntheticBackend::new(small_config(), FrameSlot::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dummy.jpg");

        assert_eq!(
            backend.capture_still(&path),
            Err(BackendError::NoFrameAvailable)
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_live_view_then_capture() {
        let slot = FrameSlot::new();
        let mut backend = SyntheticBackend::new(small_config(), slot.clone());
        assert!(backend.is_connected());

        backend.start_live_view().unwrap();
        backend.start_live_view().unwrap();
        let mut waited = 0;
        while slot.latest().map(|f| f.sequence < 3).unwrap_or(true) && waited < 200 {
            std::thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        backend.stop_live_view();
        assert!(!backend.is_live_view_active());

        let latest = slot.latest().unwrap();
        assert!(latest.sequence >= 3);
        assert_eq!((latest.width(), latest.height()), (64, 48));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dummy.jpg");
        backend.capture_still(&path).unwrap();
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (64, 48));
    }

    #[test]
    fn test_frame_counter_increases() {
        let slot = FrameSlot::new();
        let mut backend = SyntheticBackend::new(small_config(), slot.clone());
        backend.start_live_view().unwrap();

        let mut seen = Vec::new();
        for _ in 0..200 {
            if let Some(frame) = slot.latest()
                && seen.last() != Some(&frame.sequence)
            {
                seen.push(frame.sequence);
            }
            if seen.len() >= 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        backend.shutdown();

        assert!(seen.len() >= 4, "{:?}", seen);
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
    }
}
