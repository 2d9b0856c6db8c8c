// SPDX-License-Identifier: GPL-3.0-only

//! USB claim conflict remediation
//!
//! Desktop volume monitors grab PTP cameras as soon as they are plugged in,
//! after which the camera-control tool fails with "Could not claim the USB
//! device". Remediation terminates those services (gracefully, then
//! forcefully), waits for the device to settle and re-detects it. Success
//! is only reported when the device is seen again.
//!
//! The host-level steps below are only run on explicit request: turning off
//! desktop automount, generating udev rules and re-enumerating the camera
//! on the USB bus.

use super::commands;
use crate::backends::camera::process::SharedRunner;
use crate::constants::usb::{
    AUTOMOUNT_OVERRIDES, CAMERA_VENDORS, CONFLICTING_SERVICES, KILL_TIMEOUT,
    MEDIA_HANDLING_SCHEMA, UDEV_RULES_FILE,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one remediation attempt
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UsbResolution {
    /// Services that were running and are gone now
    pub terminated: Vec<String>,
    /// Services that survived every termination attempt
    pub still_running: Vec<String>,
    /// Auto-detect saw the camera afterwards
    pub device_detected: bool,
}

impl UsbResolution {
    pub fn resolved(&self) -> bool {
        self.device_detected
    }
}

/// Finds and terminates processes holding the camera
pub struct UsbConflictResolver {
    runner: SharedRunner,
    tool: String,
    services: Vec<String>,
    settle: Duration,
}

impl UsbConflictResolver {
    pub fn new(runner: SharedRunner, tool: &str, settle: Duration) -> Self {
        Self {
            runner,
            tool: tool.to_string(),
            services: CONFLICTING_SERVICES.iter().map(|s| s.to_string()).collect(),
            settle,
        }
    }

    /// Run the full remediation procedure once
    pub fn resolve(&self) -> UsbResolution {
        info!("Resolving USB claim conflict");
        let mut resolution = UsbResolution::default();

        for service in &self.services {
            if !self.is_running(service) {
                debug!(service = %service, "Not running");
                continue;
            }

            info!(service = %service, "Stopping conflicting service");
            self.run_quiet("pkill", &["-TERM", "-f", service]);
            self.run_quiet("killall", &[service]);
            self.run_quiet("systemctl", &["--user", "stop", &format!("{}.service", service)]);

            if self.is_running(service) {
                warn!(service = %service, "Service survived graceful stop, killing");
                self.run_quiet("pkill", &["-KILL", "-f", service]);
            }

            if self.is_running(service) {
                warn!(service = %service, "Service is still running");
                resolution.still_running.push(service.clone());
            } else {
                resolution.terminated.push(service.clone());
            }
        }

        if !resolution.terminated.is_empty() || !resolution.still_running.is_empty() {
            debug!(settle = ?self.settle, "Waiting for USB device to settle");
            std::thread::sleep(self.settle);
        }

        resolution.device_detected = commands::detect_device(self.runner.as_ref(), &self.tool);

        if resolution.device_detected {
            info!(terminated = ?resolution.terminated, "USB conflict resolved");
        } else {
            warn!(
                terminated = ?resolution.terminated,
                still_running = ?resolution.still_running,
                "Camera not detected after USB remediation"
            );
        }

        resolution
    }

    /// Stop the desktop from mounting cameras on plug-in
    pub fn disable_automount(&self) -> Vec<SetupStep> {
        AUTOMOUNT_OVERRIDES
            .iter()
            .map(|&(key, value)| {
                let args = ["set", MEDIA_HANDLING_SCHEMA, key, value];
                let succeeded = self.run_checked("gsettings", &args);
                SetupStep::new(format!("{} {}", key, value), succeeded)
            })
            .collect()
    }

    /// Re-enumerate every camera found under `sysfs_devices`
    ///
    /// Uses `usbreset` when installed; otherwise toggles the device's
    /// `authorized` attribute, which needs write access to sysfs.
    pub fn reset_camera_devices(&self, sysfs_devices: &Path, delay: Duration) -> Vec<SetupStep> {
        let devices = find_camera_devices(sysfs_devices);
        if devices.is_empty() {
            warn!(path = %sysfs_devices.display(), "No camera found on the USB bus");
            return Vec::new();
        }

        let have_usbreset = self.run_checked("which", &["usbreset"]);
        devices
            .iter()
            .map(|device| {
                let succeeded = if have_usbreset {
                    let id = device.id();
                    self.run_checked("usbreset", &[id.as_str()])
                } else {
                    reauthorize(&device.path, delay)
                };
                if succeeded {
                    info!(device = %device, "USB device reset");
                } else {
                    warn!(device = %device, "USB device reset failed");
                }
                SetupStep::new(format!("reset {}", device), succeeded)
            })
            .collect()
    }

    fn run_checked(&self, program: &str, args: &[&str]) -> bool {
        match self.runner.run(program, args, KILL_TIMEOUT) {
            Ok(out) if out.success() => true,
            Ok(out) => {
                debug!(program, ?args, error = %out.failure_summary(), "Command failed");
                false
            }
            Err(e) => {
                debug!(program, ?args, error = %e, "Command could not run");
                false
            }
        }
    }

    fn is_running(&self, service: &str) -> bool {
        match self.runner.run("pgrep", &["-f", service], KILL_TIMEOUT) {
            Ok(out) => out.success() && !out.stdout.trim().is_empty(),
            Err(e) => {
                debug!(service, error = %e, "pgrep failed");
                false
            }
        }
    }

    fn run_quiet(&self, program: &str, args: &[&str]) {
        match self.runner.run(program, args, KILL_TIMEOUT) {
            Ok(out) if !out.success() => {
                debug!(program, ?args, error = %out.failure_summary(), "Command failed")
            }
            Ok(_) => {}
            Err(e) => debug!(program, ?args, error = %e, "Command could not run"),
        }
    }
}

/// One host-level setup action and whether it worked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupStep {
    pub description: String,
    pub succeeded: bool,
}

impl SetupStep {
    fn new(description: String, succeeded: bool) -> Self {
        Self {
            description,
            succeeded,
        }
    }
}

/// A camera as seen in sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub path: PathBuf,
    pub vendor: String,
    pub product: String,
    pub maker: &'static str,
}

impl UsbDevice {
    /// `vendor:product`, the form `usbreset` accepts
    pub fn id(&self) -> String {
        format!("{}:{}", self.vendor, self.product)
    }
}

impl std::fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.maker, self.id())
    }
}

/// USB devices from a known camera vendor, sorted by sysfs path
pub fn find_camera_devices(sysfs_devices: &Path) -> Vec<UsbDevice> {
    let Ok(entries) = std::fs::read_dir(sysfs_devices) else {
        return Vec::new();
    };

    let read_attr = |dir: &Path, name: &str| {
        std::fs::read_to_string(dir.join(name))
            .ok()
            .map(|v| v.trim().to_lowercase())
    };

    let mut devices: Vec<UsbDevice> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let vendor = read_attr(&path, "idVendor")?;
            let &(_, maker) = CAMERA_VENDORS.iter().find(|(id, _)| *id == vendor)?;
            let product = read_attr(&path, "idProduct").unwrap_or_default();
            Some(UsbDevice {
                path,
                vendor,
                product,
                maker,
            })
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

fn reauthorize(device: &Path, delay: Duration) -> bool {
    let authorized = device.join("authorized");
    let toggle = |value: &str| match std::fs::write(&authorized, value) {
        Ok(()) => true,
        Err(e) => {
            debug!(path = %authorized.display(), error = %e, "Could not write authorized");
            false
        }
    };

    if !toggle("0") {
        return false;
    }
    std::thread::sleep(delay);
    toggle("1")
}

/// udev rules granting the session user access to cameras and hiding
/// them from udisks and gvfs
pub fn udev_rules() -> String {
    let mut rules = String::from("# Camera access for gphoto2; keeps desktop automount away\n");
    for (vendor, maker) in CAMERA_VENDORS {
        let matcher = format!("SUBSYSTEM==\"usb\", ATTRS{{idVendor}}==\"{}\"", vendor);
        rules.push_str(&format!("\n# {}\n", maker));
        rules.push_str(&format!("{}, MODE=\"0664\", GROUP=\"plugdev\"\n", matcher));
        rules.push_str(&format!("{}, TAG+=\"uaccess\"\n", matcher));
        rules.push_str(&format!("{}, ENV{{UDISKS_IGNORE}}=\"1\"\n", matcher));
        rules.push_str(&format!("{}, ENV{{GVFS_IGNORE}}=\"1\"\n", matcher));
    }
    rules
}

/// Write the udev rules into `dir` for the administrator to install
pub fn write_udev_rules(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(UDEV_RULES_FILE);
    std::fs::write(&path, udev_rules())?;
    info!(path = %path.display(), "udev rules written");
    Ok(path)
}
