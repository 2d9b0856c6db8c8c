// SPDX-License-Identifier: GPL-3.0-only

//! DSLR backend driven by an external camera-control tool (gphoto2)
//!
//! # State
//!
//! ```text
//! Uninitialized ─► ToolChecked ─► DeviceDetected ─┬─► LiveViewRunning
//!                                                 └─► CapabilitiesQueried
//! ```
//!
//! Live view runs at 2 frames per second to spare the shutter mechanism.
//! Every tool invocation holds the device lock, so a still capture, a
//! settings change and a live view cycle never talk to the body at once.

pub mod commands;
pub mod config_output;
pub mod usb;

pub use usb::{UsbConflictResolver, UsbResolution};

use super::frame_loop::{CaptureLoopController, FailureBudget, LoopAction};
use super::process::{CommandOutput, SharedRunner};
use super::types::*;
use super::{CameraBackend, CameraSettings};
use crate::config::DslrConfig;
use crate::constants::{self, dslr::MAX_PREVIEW_WIDTH, gphoto};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the DSLR backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslrState {
    Uninitialized,
    /// Tool answered its version probe, no camera seen (yet)
    ToolChecked,
    /// Auto-detect reported a USB camera; idle
    DeviceDetected,
    /// Acquisition loop is cycling
    LiveViewRunning,
    /// Idle, with the settings cache loaded from the device
    CapabilitiesQueried,
}

/// State shared between the control thread and the live view loop
struct DslrShared {
    runner: SharedRunner,
    tool: String,
    temp_dir: PathBuf,
    connected: AtomicBool,
    /// Serializes every invocation of the tool
    device_lock: Mutex<()>,
    last_error: Mutex<Option<String>>,
    usb: UsbConflictResolver,
}

impl DslrShared {
    fn lock_device(&self) -> MutexGuard<'_, ()> {
        self.device_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, args: &[String], timeout: Duration) -> BackendResult<CommandOutput> {
        Ok(self
            .runner
            .run(&self.tool, &commands::as_refs(args), timeout)?)
    }

    /// Run a command, remediating a USB claim conflict at most once
    ///
    /// `remediation_allowed` is consumed by the first remediation so callers
    /// that issue several commands for one operation share a single attempt.
    /// The caller must hold the device lock.
    fn run_with_recovery(
        &self,
        args: &[String],
        timeout: Duration,
        remediation_allowed: &mut bool,
    ) -> BackendResult<CommandOutput> {
        let output = self.run(args, timeout)?;
        if output.success() {
            return Ok(output);
        }

        if !output.is_claim_conflict() {
            return Err(BackendError::CommandFailed(output.failure_summary()));
        }

        if !*remediation_allowed {
            return Err(BackendError::UsbClaimConflict(output.failure_summary()));
        }
        *remediation_allowed = false;

        warn!(command = ?args, "Camera claimed by another process, attempting remediation");
        let resolution = self.usb.resolve();
        self.connected
            .store(resolution.device_detected, Ordering::SeqCst);

        let retry = self.run(args, timeout)?;
        if retry.success() {
            info!("Command succeeded after USB remediation");
            Ok(retry)
        } else if retry.is_claim_conflict() {
            Err(BackendError::UsbClaimConflict(retry.failure_summary()))
        } else {
            Err(BackendError::CommandFailed(retry.failure_summary()))
        }
    }

    fn set_last_error(&self, message: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = message;
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// One live view acquisition loop's state
struct PreviewWorker {
    shared: Arc<DslrShared>,
    slot: FrameSlot,
    budget: FailureBudget,
    cycle: u64,
    sequence: u64,
}

impl PreviewWorker {
    fn new(shared: Arc<DslrShared>, slot: FrameSlot, failure_budget: u32) -> Self {
        Self {
            shared,
            slot,
            budget: FailureBudget::new(failure_budget),
            cycle: 0,
            sequence: 0,
        }
    }

    /// Run one cycle and apply the failure budget
    fn step(&mut self) -> LoopAction {
        match self.capture_preview() {
            Ok(image) => {
                self.budget.record_success();
                self.sequence += 1;
                if self.sequence % constants::timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        sequence = self.sequence,
                        width = image.width(),
                        height = image.height(),
                        "Preview frame published"
                    );
                }
                self.slot.publish(Frame::new(image, self.sequence));
                LoopAction::Continue
            }
            Err(e) => {
                let exhausted = self.budget.record_failure();
                warn!(
                    error = %e,
                    consecutive = self.budget.consecutive_failures(),
                    limit = self.budget.limit(),
                    "Live view cycle failed"
                );
                if exhausted {
                    let message = format!(
                        "Live view stopped after {} consecutive failures: {}",
                        self.budget.consecutive_failures(),
                        e
                    );
                    error!("{}", message);
                    self.shared.set_last_error(Some(message));
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            }
        }
    }

    /// Grab, decode and clean up one preview image
    fn capture_preview(&mut self) -> BackendResult<image::RgbImage> {
        // Rotate file names so a late write from a killed attempt can't
        // clobber the file being decoded
        let path = self.shared.temp_dir.join(format!(
            "preview_{}.jpg",
            self.cycle % constants::dslr::PREVIEW_FILE_ROTATION
        ));
        self.cycle += 1;
        let _ = std::fs::remove_file(&path);

        let _device = self.shared.lock_device();
        let mut remediation_allowed = true;
        let mut last_error = BackendError::CommandFailed("no preview command attempted".into());

        for args in commands::preview_variants(&path) {
            match self.shared.run_with_recovery(
                &args,
                gphoto::PREVIEW_TIMEOUT,
                &mut remediation_allowed,
            ) {
                Ok(_) if path.exists() => {
                    let decoded = decode_preview(&path);
                    let _ = std::fs::remove_file(&path);
                    return decoded;
                }
                Ok(_) => {
                    last_error =
                        BackendError::CommandFailed("preview command wrote no file".into());
                }
                // Remediation already spent on this cycle; other forms would hit the same wall
                Err(e @ BackendError::UsbClaimConflict(_)) => return Err(e),
                Err(e) => {
                    debug!(error = %e, "Preview command form failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Decode a preview file, downscaling anything wider than full HD
fn decode_preview(path: &Path) -> BackendResult<image::RgbImage> {
    let image = image::open(path)?.to_rgb8();
    if image.width() <= MAX_PREVIEW_WIDTH {
        return Ok(image);
    }

    let height = (u64::from(image.height()) * u64::from(MAX_PREVIEW_WIDTH)
        / u64::from(image.width()))
    .max(1) as u32;
    Ok(image::imageops::resize(
        &image,
        MAX_PREVIEW_WIDTH,
        height,
        FilterType::Lanczos3,
    ))
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "Removed partial capture"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial capture"),
    }
}

/// DSLR camera backend
pub struct DslrBackend {
    shared: Arc<DslrShared>,
    config: DslrConfig,
    slot: FrameSlot,
    state: DslrState,
    settings: SettingsMap,
    live_view: Option<CaptureLoopController>,
    temp_dir_removed: bool,
}

impl DslrBackend {
    /// Check the tool, detect the camera and load the settings cache
    ///
    /// Fails only when the tool itself is unusable; a missing camera leaves
    /// the backend disconnected.
    pub fn new(runner: SharedRunner, config: DslrConfig, slot: FrameSlot) -> BackendResult<Self> {
        if !commands::tool_available(runner.as_ref(), &config.tool) {
            return Err(BackendError::NotAvailable(format!(
                "{} is not installed or not working",
                config.tool
            )));
        }

        let temp_dir = std::env::temp_dir().join(format!(
            "{}-dslr-{}",
            constants::APP_NAME,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&temp_dir)?;
        debug!(path = %temp_dir.display(), "Created preview directory");

        let shared = Arc::new(DslrShared {
            usb: UsbConflictResolver::new(Arc::clone(&runner), &config.tool, config.usb_settle),
            runner,
            tool: config.tool.clone(),
            temp_dir,
            connected: AtomicBool::new(false),
            device_lock: Mutex::new(()),
            last_error: Mutex::new(None),
        });

        let mut backend = Self {
            shared,
            config,
            slot,
            state: DslrState::ToolChecked,
            settings: SettingsMap::new(),
            live_view: None,
            temp_dir_removed: false,
        };

        if backend.detect() {
            if let Err(e) = backend.refresh_settings() {
                warn!(error = %e, "Could not load camera settings");
            }
        }

        Ok(backend)
    }

    pub fn state(&self) -> DslrState {
        if self.is_live_view_active() {
            DslrState::LiveViewRunning
        } else {
            self.state
        }
    }

    /// Run auto-detect and update the connection state
    fn detect(&mut self) -> bool {
        let found = {
            let _device = self.shared.lock_device();
            commands::detect_device(self.shared.runner.as_ref(), &self.shared.tool)
        };
        self.shared.connected.store(found, Ordering::SeqCst);
        self.state = if found {
            DslrState::DeviceDetected
        } else {
            DslrState::ToolChecked
        };
        found
    }

    fn ensure_connected(&self) -> BackendResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BackendError::NotConnected)
        }
    }

    /// Run one config query under the device lock
    fn query_config(&self, key: &str) -> BackendResult<SettingDescriptor> {
        let _device = self.shared.lock_device();
        let mut remediation_allowed = true;
        let output = self.shared.run_with_recovery(
            &commands::get_config(key),
            gphoto::CONFIG_TIMEOUT,
            &mut remediation_allowed,
        )?;
        Ok(config_output::parse_get_config(key, &output.stdout))
    }

    fn apply_config(&self, key: &str, value: &str) -> BackendResult<()> {
        let _device = self.shared.lock_device();
        let mut remediation_allowed = true;
        self.shared.run_with_recovery(
            &commands::set_config(key, value),
            gphoto::SET_CONFIG_TIMEOUT,
            &mut remediation_allowed,
        )?;
        Ok(())
    }

    /// Stop the loop and wait until it no longer touches the device
    fn join_live_view(&mut self) {
        if let Some(mut controller) = self.live_view.take() {
            controller.stop();
            debug!("DSLR live view loop joined");
        }
    }

    fn remove_temp_dir(&mut self) {
        if self.temp_dir_removed {
            return;
        }
        match std::fs::remove_dir_all(&self.shared.temp_dir) {
            Ok(()) => debug!(path = %self.shared.temp_dir.display(), "Removed preview directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "Failed to remove preview directory"),
        }
        self.temp_dir_removed = true;
    }
}

impl CameraBackend for DslrBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dslr
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn start_live_view(&mut self) -> BackendResult<()> {
        self.ensure_connected()?;

        if self.is_live_view_active() {
            debug!("DSLR live view already running");
            return Ok(());
        }
        // Reap a loop that ended on its own or is still winding down
        self.join_live_view();

        self.shared.set_last_error(None);
        let mut worker = PreviewWorker::new(
            Arc::clone(&self.shared),
            self.slot.clone(),
            self.config.failure_budget,
        );
        self.live_view = Some(CaptureLoopController::start(
            "dslr",
            Some(self.config.preview_interval),
            move || worker.step(),
        ));
        info!("DSLR live view started");
        Ok(())
    }

    fn stop_live_view(&mut self) {
        if let Some(controller) = self.live_view.as_ref().filter(|c| c.is_running()) {
            controller.request_stop();
            info!("DSLR live view stopping");
        }
    }

    fn is_live_view_active(&self) -> bool {
        self.live_view
            .as_ref()
            .map(CaptureLoopController::is_running)
            .unwrap_or(false)
    }

    fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    fn capture_still(&mut self, path: &Path) -> BackendResult<PathBuf> {
        self.ensure_connected()?;
        info!(path = %path.display(), "Capturing DSLR photo");

        let _device = self.shared.lock_device();
        let mut remediation_allowed = true;
        if let Err(e) = self.shared.run_with_recovery(
            &commands::capture_and_download(path),
            gphoto::CAPTURE_TIMEOUT,
            &mut remediation_allowed,
        ) {
            // The tool may have started the download before failing
            discard_partial(path);
            return Err(e);
        }

        if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(BackendError::CommandFailed(
                "capture reported success but no file was written".into(),
            ))
        }
    }

    fn photo_prefix(&self) -> &'static str {
        constants::files::DSLR_PREFIX
    }

    fn settings(&mut self) -> Option<&mut dyn CameraSettings> {
        Some(self)
    }

    fn reset_connection(&mut self) -> BackendResult<()> {
        info!("Resetting DSLR connection");
        self.join_live_view();

        {
            let _device = self.shared.lock_device();
            match self.shared.run(&commands::exit(), gphoto::EXIT_TIMEOUT) {
                Ok(out) if !out.success() => {
                    debug!(error = %out.failure_summary(), "Release command failed")
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Release command could not run"),
            }
        }

        std::thread::sleep(self.config.reset_settle);

        if self.detect() {
            Ok(())
        } else {
            Err(BackendError::DeviceNotFound(
                "camera not detected after reset".into(),
            ))
        }
    }

    fn resolve_usb_conflict(&mut self) -> BackendResult<UsbResolution> {
        // Services are killed underneath the device; nothing may be mid-command
        self.join_live_view();

        let resolution = {
            let _device = self.shared.lock_device();
            self.shared.usb.resolve()
        };
        self.shared
            .connected
            .store(resolution.device_detected, Ordering::SeqCst);
        self.state = if resolution.device_detected {
            DslrState::DeviceDetected
        } else {
            DslrState::ToolChecked
        };
        Ok(resolution)
    }

    fn shutdown(&mut self) {
        self.join_live_view();
        self.remove_temp_dir();
    }
}

impl CameraSettings for DslrBackend {
    fn describe_setting(&mut self, key: SettingKey) -> BackendResult<SettingDescriptor> {
        self.ensure_connected()?;
        let descriptor = self.query_config(key.as_str())?;
        if let Some(current) = &descriptor.current {
            self.settings.insert(key.as_str().to_string(), current.clone());
        }
        Ok(descriptor)
    }

    fn set_setting(&mut self, key: SettingKey, value: &str) -> BackendResult<()> {
        self.ensure_connected()?;
        let value = value.trim();
        if value.is_empty() {
            return Err(BackendError::CommandFailed(format!(
                "empty value for {}",
                key
            )));
        }

        self.apply_config(key.as_str(), value)?;
        info!(setting = %key, value, "Camera setting changed");
        self.settings
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn cached_settings(&self) -> SettingsMap {
        self.settings.clone()
    }

    fn refresh_settings(&mut self) -> BackendResult<SettingsMap> {
        self.ensure_connected()?;

        let mut refreshed = SettingsMap::new();
        for key in SettingKey::ALL {
            match self.query_config(key.as_str()) {
                Ok(descriptor) => {
                    if let Some(current) = descriptor.current {
                        refreshed.insert(key.as_str().to_string(), current);
                    }
                }
                Err(e) => debug!(setting = %key, error = %e, "Setting not readable"),
            }
        }

        info!(count = refreshed.len(), "Loaded camera settings");
        self.settings = refreshed.clone();
        self.state = DslrState::CapabilitiesQueried;
        Ok(refreshed)
    }

    fn list_config_keys(&mut self, limit: usize) -> BackendResult<Vec<String>> {
        self.ensure_connected()?;
        let _device = self.shared.lock_device();
        let mut remediation_allowed = true;
        let output = self.shared.run_with_recovery(
            &commands::list_config(),
            gphoto::CONFIG_TIMEOUT,
            &mut remediation_allowed,
        )?;
        Ok(config_output::parse_config_list(&output.stdout, limit))
    }

    fn manual_control_available(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.query_config(gphoto::CAPTURE_MODE_KEY) {
            Ok(descriptor) => config_output::is_manual_capture_mode(&descriptor),
            Err(e) => {
                debug!(error = %e, "Capture mode not readable");
                false
            }
        }
    }

    fn enable_manual_control(&mut self) -> BackendResult<()> {
        self.ensure_connected()?;
        self.apply_config(gphoto::CAPTURE_MODE_KEY, "0")?;
        info!("Camera switched to manual control");
        Ok(())
    }
}

impl Drop for DslrBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::process::testing::{ScriptedRunner, filename_arg, write_test_jpeg};
    use crate::backends::camera::process::ProcessError;
    use std::sync::atomic::AtomicU32;

    const DETECT_OUTPUT: &str = "Model                 Port\n\
        -----------------------------------\n\
        Canon EOS 600D        usb:001,004\n";

    const CLAIM_ERROR: &str =
        "*** Error ***\nAn error occurred in the io-library ('Could not claim the USB device')\n";

    fn test_config() -> DslrConfig {
        DslrConfig {
            preview_interval: Duration::from_millis(1),
            usb_settle: Duration::ZERO,
            reset_settle: Duration::ZERO,
            ..DslrConfig::default()
        }
    }

    /// Camera that answers probes and config queries; previews via `preview`
    fn camera_runner<F>(preview: F) -> Arc<ScriptedRunner>
    where
        F: Fn(&[&str]) -> Result<CommandOutput, ProcessError> + Send + Sync + 'static,
    {
        ScriptedRunner::new(move |program, args| {
            if program != "gphoto2" {
                // pgrep/pkill/systemctl during remediation: nothing running
                return Ok(CommandOutput::failed(1, ""));
            }
            match args.first().copied() {
                Some("--version") => Ok(CommandOutput::ok("gphoto2 2.5.28\n")),
                Some("--auto-detect") => Ok(CommandOutput::ok(DETECT_OUTPUT)),
                Some("--get-config") => Ok(CommandOutput::ok(format!(
                    "Label: {}\nCurrent: {}\nChoice: 0 100\nChoice: 1 200\n",
                    args[1],
                    if args[1] == "capture" { "0" } else { "100" }
                ))),
                Some("--set-config") if !args.contains(&"--capture-preview") => {
                    Ok(CommandOutput::ok(""))
                }
                Some("--list-config") => Ok(CommandOutput::ok("/main/a\n/main/b\n/main/c\n")),
                Some("--capture-image-and-download") => {
                    if let Some(path) = filename_arg(args) {
                        write_test_jpeg(path, 8, 6);
                    }
                    Ok(CommandOutput::ok(""))
                }
                Some("--exit") => Ok(CommandOutput::ok("")),
                _ => preview(args),
            }
        })
    }

    fn backend_with(runner: Arc<ScriptedRunner>) -> DslrBackend {
        DslrBackend::new(runner, test_config(), FrameSlot::new()).unwrap()
    }

    fn worker_for(backend: &DslrBackend) -> PreviewWorker {
        PreviewWorker::new(
            Arc::clone(&backend.shared),
            backend.slot.clone(),
            backend.config.failure_budget,
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_missing_tool_is_not_available() {
        let runner = ScriptedRunner::new(|program, _| Err(ProcessError::NotFound(program.into())));
        let result = DslrBackend::new(runner, test_config(), FrameSlot::new());
        assert!(matches!(result, Err(BackendError::NotAvailable(_))));
    }

    #[test]
    fn test_init_detects_and_loads_settings() {
        let backend = backend_with(camera_runner(|_| Ok(CommandOutput::ok(""))));
        assert!(backend.is_connected());
        assert_eq!(backend.state(), DslrState::CapabilitiesQueried);
        assert_eq!(backend.cached_settings().len(), SettingKey::ALL.len());
        assert_eq!(backend.cached_settings()["iso"], "100");
    }

    #[test]
    fn test_no_camera_leaves_backend_disconnected() {
        let runner = ScriptedRunner::new(|_, args| match args.first().copied() {
            Some("--auto-detect") => Ok(CommandOutput::ok("Model  Port\n")),
            _ => Ok(CommandOutput::ok("gphoto2 2.5.28\n")),
        });
        let mut backend = backend_with(runner);
        assert!(!backend.is_connected());
        assert_eq!(backend.state(), DslrState::ToolChecked);
        assert_eq!(backend.start_live_view(), Err(BackendError::NotConnected));

        let target = std::env::temp_dir().join(format!("never-{}.jpg", uuid::Uuid::new_v4()));
        assert_eq!(backend.capture_still(&target), Err(BackendError::NotConnected));
        assert!(!target.exists());
    }

    #[test]
    fn test_preview_cycle_decodes_and_cleans_up() {
        let backend = backend_with(camera_runner(|args| {
            write_test_jpeg(filename_arg(args).unwrap(), 32, 24);
            Ok(CommandOutput::ok(""))
        }));
        let mut worker = worker_for(&backend);

        assert_eq!(worker.step(), LoopAction::Continue);
        let frame = backend.slot.latest().unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 24));
        assert_eq!(frame.sequence, 1);

        let leftovers = std::fs::read_dir(&backend.shared.temp_dir).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_wide_preview_is_downscaled() {
        let backend = backend_with(camera_runner(|args| {
            write_test_jpeg(filename_arg(args).unwrap(), 3840, 2160);
            Ok(CommandOutput::ok(""))
        }));
        let mut worker = worker_for(&backend);

        worker.step();
        let frame = backend.slot.latest().unwrap();
        assert_eq!((frame.width(), frame.height()), (1920, 1080));
    }

    #[test]
    fn test_alternative_preview_forms_are_tried() {
        // Only the viewfinder variant works on this body
        let backend = backend_with(camera_runner(|args| {
            if args.contains(&"viewfinder=1") {
                write_test_jpeg(filename_arg(args).unwrap(), 16, 16);
                Ok(CommandOutput::ok(""))
            } else {
                Ok(CommandOutput::failed(1, "Unsupported operation"))
            }
        }));
        let mut worker = worker_for(&backend);

        assert_eq!(worker.step(), LoopAction::Continue);
        assert!(backend.slot.latest().is_some());
    }

    #[test]
    fn test_claim_conflict_triggers_exactly_one_remediation() {
        let runner = camera_runner(|_| Ok(CommandOutput::failed(1, CLAIM_ERROR)));
        let backend = backend_with(runner.clone());
        let mut worker = worker_for(&backend);
        let pgrep_before = runner.count("pgrep");

        assert_eq!(worker.step(), LoopAction::Continue);

        // One remediation probes each known service once
        let services = crate::constants::usb::CONFLICTING_SERVICES.len();
        assert_eq!(runner.count("pgrep") - pgrep_before, services);
        // Original attempt plus one retry, no fallback forms after the conflict persists
        assert_eq!(runner.count("--capture-preview"), 2);
        assert_eq!(worker.budget.consecutive_failures(), 1);
    }

    #[test]
    fn test_remediation_then_success_counts_as_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let backend = backend_with(camera_runner(move |args| {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(CommandOutput::failed(1, CLAIM_ERROR))
            } else {
                write_test_jpeg(filename_arg(args).unwrap(), 8, 8);
                Ok(CommandOutput::ok(""))
            }
        }));
        let mut worker = worker_for(&backend);

        assert_eq!(worker.step(), LoopAction::Continue);
        assert_eq!(worker.budget.consecutive_failures(), 0);
        assert!(backend.slot.latest().is_some());
    }

    #[test]
    fn test_four_failures_do_not_stop_live_view() {
        let backend = backend_with(camera_runner(|_| Ok(CommandOutput::failed(1, "busy"))));
        let mut worker = worker_for(&backend);
        for _ in 0..4 {
            assert_eq!(worker.step(), LoopAction::Continue);
        }
        assert_eq!(worker.step(), LoopAction::Stop);
        assert!(backend.last_error().is_some());
    }

    #[test]
    fn test_failure_budget_stops_loop_and_reports() {
        let mut backend =
            backend_with(camera_runner(|_| Ok(CommandOutput::failed(1, "busy"))));

        backend.start_live_view().unwrap();
        assert!(wait_until(|| !backend.is_live_view_active()));

        assert_eq!(backend.state(), DslrState::CapabilitiesQueried);
        let reason = backend.last_error().unwrap();
        assert!(reason.contains("5 consecutive failures"), "{}", reason);
    }

    #[test]
    fn test_timeouts_count_against_budget() {
        let runner = camera_runner(|_| {
            Err(ProcessError::Timeout {
                program: "gphoto2".into(),
                timeout: gphoto::PREVIEW_TIMEOUT,
            })
        });
        let backend = backend_with(runner.clone());
        let mut worker = worker_for(&backend);

        assert_eq!(worker.step(), LoopAction::Continue);
        assert_eq!(worker.budget.consecutive_failures(), 1);
        // Timeouts are not claim conflicts: no remediation
        assert_eq!(runner.count("pgrep"), 0);
    }

    #[test]
    fn test_start_twice_runs_one_loop() {
        let runner = camera_runner(|args| {
            write_test_jpeg(filename_arg(args).unwrap(), 8, 8);
            Ok(CommandOutput::ok(""))
        });
        let mut backend = backend_with(runner);

        backend.start_live_view().unwrap();
        backend.start_live_view().unwrap();
        assert!(backend.is_live_view_active());
        assert_eq!(backend.state(), DslrState::LiveViewRunning);

        let slot = backend.slot.clone();
        assert!(wait_until(|| slot.latest().map(|f| f.sequence >= 3).unwrap_or(false)));
        backend.stop_live_view();
        assert!(!backend.is_live_view_active());
    }

    #[test]
    fn test_capture_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shot.jpg");
        let mut backend = backend_with(camera_runner(|_| Ok(CommandOutput::ok(""))));

        let path = backend.capture_still(&target).unwrap();
        assert_eq!(path, target);
        assert!(target.exists());
    }

    #[test]
    fn test_capture_failure_produces_no_file() {
        let runner = ScriptedRunner::new(|_, args| match args.first().copied() {
            Some("--auto-detect") => Ok(CommandOutput::ok(DETECT_OUTPUT)),
            Some("--capture-image-and-download") => {
                Ok(CommandOutput::failed(1, "Out of focus"))
            }
            _ => Ok(CommandOutput::ok("")),
        });
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shot.jpg");
        let mut backend = backend_with(runner);

        assert!(matches!(
            backend.capture_still(&target),
            Err(BackendError::CommandFailed(_))
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_timed_out_capture_leaves_no_partial_file() {
        let runner = ScriptedRunner::new(|_, args| match args.first().copied() {
            Some("--auto-detect") => Ok(CommandOutput::ok(DETECT_OUTPUT)),
            Some("--capture-image-and-download") => {
                std::fs::write(filename_arg(args).unwrap(), b"\xff\xd8partial").unwrap();
                Err(ProcessError::Timeout {
                    program: "gphoto2".into(),
                    timeout: gphoto::CAPTURE_TIMEOUT,
                })
            }
            _ => Ok(CommandOutput::ok("")),
        });
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shot.jpg");
        let mut backend = backend_with(runner);

        assert!(matches!(
            backend.capture_still(&target),
            Err(BackendError::Timeout(_))
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_conflicted_capture_leaves_no_partial_file() {
        let runner = ScriptedRunner::new(|program, args| match args.first().copied() {
            Some("--version") => Ok(CommandOutput::ok("gphoto2 2.5.28\n")),
            Some("--auto-detect") => Ok(CommandOutput::ok(DETECT_OUTPUT)),
            Some("--capture-image-and-download") => {
                std::fs::write(filename_arg(args).unwrap(), b"\xff\xd8").unwrap();
                Ok(CommandOutput::failed(1, CLAIM_ERROR))
            }
            // No conflicting services running
            _ if program == "pgrep" => Ok(CommandOutput::failed(1, "")),
            _ => Ok(CommandOutput::ok("")),
        });
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shot.jpg");
        let mut backend = backend_with(runner.clone());

        assert!(matches!(
            backend.capture_still(&target),
            Err(BackendError::UsbClaimConflict(_))
        ));
        assert!(!target.exists());
        // Original attempt plus the single retry after remediation
        assert_eq!(runner.count("--capture-image-and-download"), 2);
    }

    #[test]
    fn test_stop_does_not_wait_for_slow_preview() {
        let mut backend = backend_with(camera_runner(|args| {
            std::thread::sleep(Duration::from_millis(300));
            write_test_jpeg(filename_arg(args).unwrap(), 8, 8);
            Ok(CommandOutput::ok(""))
        }));
        backend.start_live_view().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let started = std::time::Instant::now();
        backend.stop_live_view();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(!backend.is_live_view_active());

        // Teardown waits for the in-flight cycle before removing its files
        let temp_dir = backend.shared.temp_dir.clone();
        backend.shutdown();
        assert!(!temp_dir.exists());
    }

    #[test]
    fn test_set_setting_updates_cache() {
        let runner = camera_runner(|_| Ok(CommandOutput::ok("")));
        let mut backend = backend_with(runner.clone());

        backend.set_setting(SettingKey::Iso, "200").unwrap();

        assert_eq!(backend.cached_settings()["iso"], "200");
        assert_eq!(runner.count("--set-config iso=200"), 1);
    }

    #[test]
    fn test_describe_setting_lists_choices() {
        let mut backend = backend_with(camera_runner(|_| Ok(CommandOutput::ok(""))));
        let descriptor = backend.describe_setting(SettingKey::Aperture).unwrap();
        assert_eq!(descriptor.choices, vec!["100", "200"]);
        assert_eq!(backend.list_config_keys(2).unwrap(), vec!["/main/a", "/main/b"]);
    }

    #[test]
    fn test_manual_control_query_and_switch() {
        let runner = camera_runner(|_| Ok(CommandOutput::ok("")));
        let mut backend = backend_with(runner.clone());
        assert!(backend.manual_control_available());
        backend.enable_manual_control().unwrap();
        assert_eq!(runner.count("--set-config capture=0"), 1);
    }

    #[test]
    fn test_reset_releases_and_redetects() {
        let runner = camera_runner(|_| Ok(CommandOutput::ok("")));
        let mut backend = backend_with(runner.clone());
        let detects_before = runner.count("--auto-detect");

        backend.reset_connection().unwrap();

        assert_eq!(runner.count("--exit"), 1);
        assert_eq!(runner.count("--auto-detect"), detects_before + 1);
        assert!(backend.is_connected());
    }

    #[test]
    fn test_standalone_usb_resolution() {
        let runner = camera_runner(|_| Ok(CommandOutput::ok("")));
        let mut backend = backend_with(runner.clone());

        let resolution = backend.resolve_usb_conflict().unwrap();
        assert!(resolution.resolved());
        assert!(backend.is_connected());
    }

    #[test]
    fn test_shutdown_removes_temp_dir() {
        let mut backend = backend_with(camera_runner(|_| Ok(CommandOutput::ok(""))));
        let temp_dir = backend.shared.temp_dir.clone();
        assert!(temp_dir.exists());
        backend.shutdown();
        assert!(!temp_dir.exists());
        // Second shutdown is a no-op
        backend.shutdown();
    }
}
