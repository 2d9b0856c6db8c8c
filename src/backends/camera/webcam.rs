// SPDX-License-Identifier: GPL-3.0-only

//! Frame-grabber backend for local webcams
//!
//! The device is polled as fast as it delivers frames. Unlike the DSLR
//! backend there is no retry budget: the first failed read ends live view.
//! Frames are mirrored horizontally so the preview behaves like a mirror.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use super::CameraBackend;
use crate::config::WebcamConfig;
use crate::constants;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// An opened frame-grabbing device
///
/// Dropping the source releases the device.
pub trait FrameSource: Send {
    /// Block until the next frame is available and decode it
    fn read_frame(&mut self) -> BackendResult<RgbImage>;

    /// Human readable device description for logs
    fn describe(&self) -> String;
}

/// Opens frame sources from configuration
pub trait FrameSourceOpener: Send + Sync {
    fn open(&self, config: &WebcamConfig) -> BackendResult<Box<dyn FrameSource>>;
}

type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

/// Webcam backend
pub struct WebcamBackend {
    config: WebcamConfig,
    slot: FrameSlot,
    device: SharedSource,
    live_view: Option<CaptureLoopController>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl WebcamBackend {
    /// Open the configured device and wrap it
    pub fn open(
        opener: &dyn FrameSourceOpener,
        config: WebcamConfig,
        slot: FrameSlot,
    ) -> BackendResult<Self> {
        let source = opener.open(&config)?;
        Ok(Self::from_source(source, config, slot))
    }

    /// Wrap an already opened device (e.g. the one the selector probed)
    pub fn from_source(source: Box<dyn FrameSource>, config: WebcamConfig, slot: FrameSlot) -> Self {
        info!(device = %source.describe(), "Webcam backend ready");
        Self {
            config,
            slot,
            device: Arc::new(Mutex::new(Some(source))),
            live_view: None,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    fn join_live_view(&mut self) {
        if let Some(mut controller) = self.live_view.take() {
            controller.stop();
        }
    }

    fn set_last_error(&self, message: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = message;
    }
}

/// Read one frame and apply the preview orientation
fn read_oriented(device: &SharedSource, mirror: bool) -> BackendResult<RgbImage> {
    let mut guard = device.lock().unwrap_or_else(|e| e.into_inner());
    let source = guard.as_mut().ok_or(BackendError::NotConnected)?;
    let frame = source.read_frame()?;
    Ok(if mirror {
        image::imageops::flip_horizontal(&frame)
    } else {
        frame
    })
}

impl CameraBackend for WebcamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::FrameGrabber
    }

    fn is_connected(&self) -> bool {
        self.device
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn start_live_view(&mut self) -> BackendResult<()> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        if self.is_live_view_active() {
            debug!("Webcam live view already running");
            return Ok(());
        }
        self.join_live_view();

        self.set_last_error(None);
        let device = Arc::clone(&self.device);
        let slot = self.slot.clone();
        let last_error = Arc::clone(&self.last_error);
        let mirror = self.config.mirror;
        let mut sequence = 0u64;

        self.live_view = Some(CaptureLoopController::start("webcam", None, move || {
            match read_oriented(&device, mirror) {
                Ok(image) => {
                    sequence += 1;
                    if sequence % constants::timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(sequence, "Webcam frame published");
                    }
                    slot.publish(Frame::new(image, sequence));
                    LoopAction::Continue
                }
                Err(e) => {
                    error!(error = %e, "Webcam read failed, stopping live view");
                    *last_error.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(format!("Webcam read failed: {}", e));
                    LoopAction::Stop
                }
            }
        }));
        info!("Webcam live view started");
        Ok(())
    }

    fn stop_live_view(&mut self) {
        if let Some(controller) = self.live_view.as_ref().filter(|c| c.is_running()) {
            controller.request_stop();
            info!("Webcam live view stopping");
        }
    }

    fn is_live_view_active(&self) -> bool {
        self.live_view
            .as_ref()
            .map(CaptureLoopController::is_running)
            .unwrap_or(false)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn capture_still(&mut self, path: &Path) -> BackendResult<PathBuf> {
        // A fresh read, not whatever the preview last published
        let image = read_oriented(&self.device, self.config.mirror)
            .map_err(|e| BackendError::CommandFailed(format!("could not read frame: {}", e)))?;
        crate::storage::save_image(&image, path)?;
        info!(path = %path.display(), "Webcam photo saved");
        Ok(path.to_path_buf())
    }

    fn photo_prefix(&self) -> &'static str {
        constants::files::WEBCAM_PREFIX
    }

    fn shutdown(&mut self) {
        // The loop shares the device; it must be gone before the release
        self.join_live_view();
        let released = self
            .device
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(source) = released {
            info!(device = %source.describe(), "Releasing webcam");
            drop(source);
        }
    }
}

impl Drop for WebcamBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opener for the platform's video capture devices
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFrameSourceOpener;

impl FrameSourceOpener for SystemFrameSourceOpener {
    #[cfg(target_os = "linux")]
    fn open(&self, config: &WebcamConfig) -> BackendResult<Box<dyn FrameSource>> {
        Ok(Box::new(v4l_source::V4lFrameSource::open(config)?))
    }

    #[cfg(not(target_os = "linux"))]
    fn open(&self, _config: &WebcamConfig) -> BackendResult<Box<dyn FrameSource>> {
        Err(BackendError::NotAvailable(
            "frame grabbing is only supported on Linux".into(),
        ))
    }
}

#[cfg(target_os = "linux")]
mod v4l_source {
    use super::FrameSource;
    use crate::backends::camera::format_converters::yuyv_to_rgb;
    use crate::backends::camera::types::{BackendError, BackendResult};
    use crate::config::WebcamConfig;
    use image::RgbImage;
    use tracing::{info, warn};
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::prelude::*;
    use v4l::video::Capture;
    use v4l::video::capture::Parameters;
    use v4l::{Format, FourCC};

    /// V4L2 capture device with a memory-mapped stream
    pub struct V4lFrameSource {
        // Declared before the device so it is unmapped first
        stream: Stream<'static>,
        format: Format,
        index: usize,
        _device: Device,
    }

    impl V4lFrameSource {
        pub fn open(config: &WebcamConfig) -> BackendResult<Self> {
            let index = config.device_index as usize;
            let device = Device::new(index).map_err(|e| {
                BackendError::DeviceNotFound(format!(
                    "video device {}: {}",
                    config.device_index, e
                ))
            })?;

            // MJPG keeps 640x480@60 within USB 2 bandwidth; YUYV as fallback
            let requested = Format::new(config.width, config.height, FourCC::new(b"MJPG"));
            let format = match device.set_format(&requested) {
                Ok(f) if f.fourcc == FourCC::new(b"MJPG") => f,
                _ => {
                    let fallback = Format::new(config.width, config.height, FourCC::new(b"YUYV"));
                    device.set_format(&fallback).map_err(|e| {
                        BackendError::InitializationFailed(format!("failed to set format: {}", e))
                    })?
                }
            };

            if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
                warn!(error = %e, fps = config.fps, "Could not set frame rate");
            }

            let stream = Stream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
                .map_err(|e| {
                    BackendError::InitializationFailed(format!("failed to create stream: {}", e))
                })?;

            info!(
                index = config.device_index,
                width = format.width,
                height = format.height,
                fourcc = %format.fourcc,
                "Video device opened"
            );

            Ok(Self {
                stream,
                format,
                index,
                _device: device,
            })
        }
    }

    impl FrameSource for V4lFrameSource {
        fn read_frame(&mut self) -> BackendResult<RgbImage> {
            let (buf, meta) = self.stream.next()?;
            let used = (meta.bytesused as usize).min(buf.len());
            let data = if used > 0 { &buf[..used] } else { buf };

            if self.format.fourcc == FourCC::new(b"MJPG") {
                Ok(image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgb8())
            } else {
                yuyv_to_rgb(data, self.format.width, self.format.height).ok_or_else(|| {
                    BackendError::Decode(format!(
                        "short YUYV buffer ({} bytes for {}x{})",
                        data.len(),
                        self.format.width,
                        self.format.height
                    ))
                })
            }
        }

        fn describe(&self) -> String {
            format!(
                "/dev/video{} {}x{} {}",
                self.index, self.format.width, self.format.height, self.format.fourcc
            )
        }
    }
}
